//! Deep-copy primitives.
//!
//! A value crosses an isolation boundary every time it moves between the
//! committed store and a transaction. The cloner decides how that copy is
//! made.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Produces a copy of a value that shares no mutable state with the original.
pub trait ValueCloner<V>: Send + Sync {
    /// Returns a deep copy of `value`.
    fn deep_clone(&self, value: &V) -> CodecResult<V>;
}

/// A cloner shared between a store and its transactions.
pub type SharedCloner<V> = Arc<dyn ValueCloner<V>>;

/// Deep copy through a CBOR serialize/deserialize round trip.
///
/// Every pointer inside the value (including `Arc` and other shared
/// handles) is replaced by a fresh allocation, so the copy can never be
/// used to mutate the original by reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCloner;

impl<V> ValueCloner<V> for CborCloner
where
    V: Serialize + DeserializeOwned,
{
    fn deep_clone(&self, value: &V) -> CodecResult<V> {
        let bytes = to_cbor(value)?;
        from_cbor(&bytes)
    }
}

/// Copy via `Clone`.
///
/// Only appropriate for primitive or immutable-like types (numbers,
/// `String`, plain structs of those) where `Clone` already yields an
/// independent value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneCloner;

impl<V> ValueCloner<V> for CloneCloner
where
    V: Clone,
{
    fn deep_clone(&self, value: &V) -> CodecResult<V> {
        Ok(value.clone())
    }
}

/// Encodes a value to CBOR bytes.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}
