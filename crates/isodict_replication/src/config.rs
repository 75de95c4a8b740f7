//! Configuration for replication.

/// The part a replicator plays. Chosen once, when it is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplicationRole {
    /// Commits locally and ships its logs.
    #[default]
    Leader,
    /// Applies logs shipped by a leader.
    Follower,
}

impl ReplicationRole {
    /// Returns true for [`ReplicationRole::Leader`].
    pub const fn is_leader(self) -> bool {
        matches!(self, ReplicationRole::Leader)
    }
}

/// Configuration for a [`Replicator`](crate::Replicator).
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Role of this replica.
    pub role: ReplicationRole,
    /// Maximum number of logs shipped by one pump.
    pub max_batch: usize,
}

impl ReplicationConfig {
    /// Creates a configuration for `role` with default batching.
    pub const fn new(role: ReplicationRole) -> Self {
        Self {
            role,
            max_batch: 64,
        }
    }

    /// Creates a leader configuration.
    pub const fn leader() -> Self {
        Self::new(ReplicationRole::Leader)
    }

    /// Creates a follower configuration.
    pub const fn follower() -> Self {
        Self::new(ReplicationRole::Follower)
    }

    /// Sets the maximum number of logs shipped by one pump.
    ///
    /// A value of zero is treated as one.
    pub const fn max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = if max_batch == 0 { 1 } else { max_batch };
        self
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::leader()
    }
}
