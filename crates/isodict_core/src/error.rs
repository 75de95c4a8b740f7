//! Error types for isodict core.

use crate::types::TransactionId;
use std::time::Duration;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in isodict core operations.
///
/// The variants fall into three classes callers can act on:
/// retry ([`CoreError::is_retryable`]), fix the calling code
/// ([`CoreError::is_caller_error`]) or give up on the unit of work
/// ([`CoreError::is_systemic`]).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The operation is not permitted by the declared intent or scope.
    #[error("validation failed: {message}")]
    Validation {
        /// Why the operation was rejected.
        message: String,
    },

    /// No open transaction with this ID exists in the store.
    #[error("transaction not found: {id}")]
    TransactionNotFound {
        /// The unknown transaction ID.
        id: TransactionId,
    },

    /// The intention lock was not granted in time.
    ///
    /// Buffered writes survive; the caller may retry or roll back.
    #[error("lock acquisition for {id} timed out after {waited:?}")]
    LockTimeout {
        /// The waiting transaction.
        id: TransactionId,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The commit could not be applied. Nothing was written.
    #[error("commit of {id} failed: {reason}")]
    CommitFailed {
        /// The transaction being committed.
        id: TransactionId,
        /// Reason for the failure.
        reason: String,
    },

    /// The lock manager's bookkeeping is inconsistent.
    #[error("lock manager invariant violated: {message}")]
    LockInvariant {
        /// Description of the inconsistency.
        message: String,
    },

    /// A value could not be deep-copied.
    #[error("codec error: {0}")]
    Codec(#[from] isodict_codec::CodecError),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a transaction not found error.
    pub fn not_found(id: TransactionId) -> Self {
        Self::TransactionNotFound { id }
    }

    /// Creates a commit failed error.
    pub fn commit_failed(id: TransactionId, reason: impl Into<String>) -> Self {
        Self::CommitFailed {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a lock invariant error.
    pub fn lock_invariant(message: impl Into<String>) -> Self {
        Self::LockInvariant {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same operation is reasonable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::LockTimeout { .. })
    }

    /// Returns true if the error is caused by the calling code.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CoreError::Validation { .. } | CoreError::TransactionNotFound { .. }
        )
    }

    /// Returns true if the error is a failure of the store itself.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            CoreError::CommitFailed { .. } | CoreError::LockInvariant { .. } | CoreError::Codec(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isodict_codec::CodecError;

    #[test]
    fn error_classes() {
        let id = TransactionId::new();

        let timeout = CoreError::LockTimeout {
            id,
            waited: Duration::from_millis(10),
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_caller_error());

        assert!(CoreError::validation("write under read intent").is_caller_error());
        assert!(CoreError::not_found(id).is_caller_error());

        assert!(CoreError::commit_failed(id, "boom").is_systemic());
        assert!(CoreError::lock_invariant("negative holders").is_systemic());
        assert!(CoreError::from(CodecError::encoding_failed("x")).is_systemic());
    }

    #[test]
    fn error_display() {
        let err = CoreError::validation("key 'b' is outside the declared scope");
        assert_eq!(
            err.to_string(),
            "validation failed: key 'b' is outside the declared scope"
        );
    }
}
