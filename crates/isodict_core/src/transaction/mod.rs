//! Transactions and their write logs.
//!
//! A [`Transaction`] is the unit of isolation: a private snapshot of the
//! committed map plus a [`WriteLog`] of buffered mutations that the store
//! applies atomically on commit.

mod operation;
mod state;

pub use operation::{WriteKind, WriteLog, WriteOperation};
pub use state::Transaction;
