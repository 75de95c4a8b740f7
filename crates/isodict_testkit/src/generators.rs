//! Property-based test generators using proptest.

use proptest::prelude::*;

/// A write a generated transaction performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Add or update `key` with `value`.
    Put {
        /// Target key.
        key: String,
        /// New value.
        value: i64,
    },
    /// Remove `key`.
    Remove {
        /// Target key.
        key: String,
    },
}

impl Op {
    /// Returns the key this operation touches.
    pub fn key(&self) -> &str {
        match self {
            Op::Put { key, .. } | Op::Remove { key } => key,
        }
    }
}

/// Strategy for keys drawn from a small alphabet, so generated
/// transactions collide often.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e]{1,2}").expect("Invalid regex")
}

/// Strategy for a single write.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (key_strategy(), any::<i64>()).prop_map(|(key, value)| Op::Put { key, value }),
        1 => key_strategy().prop_map(|key| Op::Remove { key }),
    ]
}

/// Strategy for the writes of one transaction.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..=max_len)
}

/// Strategy for a sequence of transactions.
pub fn transactions_strategy(
    max_transactions: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<Vec<Op>>> {
    prop::collection::vec(ops_strategy(max_ops), 1..=max_transactions)
}
