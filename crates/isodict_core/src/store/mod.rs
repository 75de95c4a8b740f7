//! Committed state and the commit feed.

mod feed;
mod isolated;

pub use feed::{CommitFeed, CommittedLog};
pub use isolated::IsolatedStore;
