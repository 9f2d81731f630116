//! # Engine Error Types
//!
//! Error types for engine operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Catalog      │  │      Job Runtime        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  UnknownRule    │  │  ShuttingDown           │ │
//! │  │  ConfigLoad...  │  │  UnknownVersion │  │  Core(JobRejected)      │ │
//! │  │  ConfigSave...  │  │                 │  │  (kept in the report)   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Status queries never fail: they degrade to NOT_AVAILABLE. Errors      │
//! │  surface from configuration and dispatch only.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use catsync_core::{CoreError, RuleId, VersionId};

/// Result type alias for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Catalog Errors
    // =========================================================================
    /// A rule id given by the caller does not exist.
    #[error("Unknown synchronization rule: {0}")]
    UnknownRule(RuleId),

    /// A version id given by the caller does not exist.
    #[error("Unknown replica version: {0}")]
    UnknownVersion(VersionId),

    // =========================================================================
    // Job Runtime Errors
    // =========================================================================
    /// The job runtime no longer accepts work.
    #[error("Job runtime is shutting down")]
    ShuttingDown,

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Error raised behind a core port.
    #[error(transparent)]
    Core(CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::RuntimeStopped => SyncError::ShuttingDown,
            other => SyncError::Core(other),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried.
    ///
    /// A rejected submission may succeed later; a stopped runtime or a bad
    /// configuration will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Core(CoreError::ReadFailed { .. })
                | SyncError::Core(CoreError::JobRejected(_))
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::Core(CoreError::Validation(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catsync_core::ValidationError;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::from(CoreError::JobRejected("queue full".into())).is_retryable());

        assert!(!SyncError::ShuttingDown.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::UnknownRule(RuleId::new("r9")).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::ConfigLoadFailed("missing".into()).is_config_error());
        let validation = CoreError::Validation(ValidationError::Required {
            field: "types".into(),
        });
        assert!(SyncError::from(validation).is_config_error());
        assert!(!SyncError::ShuttingDown.is_config_error());
    }

    #[test]
    fn test_runtime_stopped_maps_to_shutting_down() {
        assert!(matches!(
            SyncError::from(CoreError::RuntimeStopped),
            SyncError::ShuttingDown
        ));
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::UnknownVersion(VersionId::new("apparel:Staged"));
        assert_eq!(err.to_string(), "Unknown replica version: apparel:Staged");
    }
}
