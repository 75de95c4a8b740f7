//! Shared inputs for the isodict benchmarks.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod utils;

pub use utils::{generate_entries, key, random_payload, Profile};
