//! Benchmark utilities.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A small nested record, representative of what callers store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Opaque payload.
    pub payload: Vec<u8>,
}

impl Profile {
    /// Generates a profile with a random payload of `payload_size` bytes.
    pub fn random(payload_size: usize) -> Self {
        let mut rng = rand::thread_rng();
        let name: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        Self {
            name,
            tags: (0..4).map(|i| format!("tag-{i}")).collect(),
            payload: random_payload(payload_size),
        }
    }
}

/// Generates random bytes of the specified size.
pub fn random_payload(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Returns the key used for the `i`th benchmark entry.
pub fn key(i: usize) -> String {
    format!("key-{i:06}")
}

/// Generates `count` keyed profiles with `payload_size`-byte payloads.
pub fn generate_entries(count: usize, payload_size: usize) -> Vec<(String, Profile)> {
    (0..count)
        .map(|i| (key(i), Profile::random(payload_size)))
        .collect()
}
