//! # Error Types
//!
//! Domain-specific error types for catsync-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  catsync-core errors (this file)                                       │
//! │  ├── CoreError        - Collaborator and lookup failures               │
//! │  └── ValidationError  - Schema and configuration input failures        │
//! │                                                                         │
//! │  catsync-engine errors (separate crate)                                │
//! │  └── SyncError        - Config, catalog and job runtime failures       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Read-path failures (a value that cannot be read during closure
//! expansion) are logged and swallowed by the engine; they never reach the
//! caller of a status query.

use thiserror::Error;

use crate::types::ItemKey;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by collaborators behind the core ports.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An attribute value could not be read.
    ///
    /// ## When This Occurs
    /// - The value layer denies access to the attribute
    /// - A transient failure in the backing store
    #[error("Failed to read {attribute} on item {item}: {reason}")]
    ReadFailed {
        item: ItemKey,
        attribute: String,
        reason: String,
    },

    /// Item cannot be found.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemKey),

    /// The job runtime refused an execution.
    #[error("Job runtime rejected execution: {0}")]
    JobRejected(String),

    /// The job runtime no longer accepts work.
    #[error("Job runtime is shutting down")]
    RuntimeStopped,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for schema definitions and configuration entries.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Invalid format (e.g., malformed attribute qualifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., a type registered twice).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Reference to a type the schema does not know.
    #[error("Unknown type: {0}")]
    UnknownType(String),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_failed_message() {
        let err = CoreError::ReadFailed {
            item: ItemKey::new(42),
            attribute: "Product.media".to_string(),
            reason: "access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read Product.media on item 42: access denied"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::UnknownType("Widget".into()).into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.to_string(), "Validation error: Unknown type: Widget");
    }
}
