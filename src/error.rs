//! Error types for the tracker's persistence layer.

use thiserror::Error;

/// Errors raised by stores, repositories, queries and the backup codec.
///
/// Every error is scoped to the operation that raised it; none of them
/// leave the database unusable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required field was missing or a unique index would be violated.
    #[error("constraint violation in '{store}': {reason}")]
    ConstraintViolation { store: String, reason: String },

    /// An update or delete targeted a record that does not exist.
    #[error("{store} #{id} not found")]
    NotFound { store: String, id: i64 },

    /// The underlying engine failed to open, read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single record of a restore document could not be inserted.
    #[error("malformed record in '{store}' (entry {position}): {reason}")]
    MalformedImportRecord {
        store: String,
        position: usize,
        reason: String,
    },

    /// Some dependent jobs could not be unlinked, so the profile was kept.
    #[error(
        "profile #{profile_id} was not deleted: {} job(s) still linked ({still_linked:?}), {} unlinked",
        still_linked.len(),
        unlinked.len()
    )]
    PartialCascadeFailure {
        profile_id: i64,
        unlinked: Vec<i64>,
        still_linked: Vec<i64>,
    },
}

impl StoreError {
    pub(crate) fn constraint(store: &str, reason: impl Into<String>) -> Self {
        StoreError::ConstraintViolation {
            store: store.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(store: &str, id: i64) -> Self {
        StoreError::NotFound {
            store: store.to_string(),
            id,
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::StoreUnavailable(format!("record codec: {}", err))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StoreUnavailable(err.to_string())
    }
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_cascade_message_lists_linked_jobs() {
        let err = StoreError::PartialCascadeFailure {
            profile_id: 4,
            unlinked: vec![1],
            still_linked: vec![2, 3],
        };
        let msg = err.to_string();
        assert!(msg.contains("profile #4"));
        assert!(msg.contains("2 job(s) still linked"));
        assert!(msg.contains("[2, 3]"));
    }

    #[test]
    fn test_sqlite_errors_map_to_store_unavailable() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, StoreError::StoreUnavailable(_)));
    }
}
