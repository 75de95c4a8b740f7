//! Error types for replication.

use isodict_codec::CodecError;
use isodict_core::CoreError;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while shipping or applying committed logs.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// The transport failed to deliver a log.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether shipping can be retried.
        retryable: bool,
    },

    /// A leader-only operation was called on a follower.
    #[error("replicator is not the leader")]
    NotLeader,

    /// A follower-only operation was called on a leader.
    #[error("replicator is not a follower")]
    NotFollower,

    /// A log could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The local store rejected a log.
    #[error("store error: {0}")]
    Store(#[from] CoreError),

    /// The commit subscription was closed.
    #[error("commit subscription disconnected")]
    Disconnected,
}

impl ReplicationError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed operation can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplicationError::Transport { retryable, .. } => *retryable,
            ReplicationError::Store(err) => err.is_retryable(),
            _ => false,
        }
    }
}
