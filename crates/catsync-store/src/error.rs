//! # Store Errors
//!
//! Failures raised while building or loading the in-process adapters.
//! Port methods themselves report through [`catsync_core::CoreError`].

use std::path::PathBuf;

use thiserror::Error;

use catsync_core::{ItemKey, ValidationError};

/// Errors from the in-process adapters and fixture loading.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An operation referenced an item that was never added.
    #[error("Unknown item: {0}")]
    UnknownItem(ItemKey),

    /// The item has no replica version, so it cannot be a counterpart.
    #[error("Item {0} does not belong to a replica version")]
    MissingVersion(ItemKey),

    /// Fixture file could not be read.
    #[error("Failed to read fixture {path}: {source}")]
    FixtureIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file could not be parsed.
    #[error("Failed to parse fixture: {0}")]
    FixtureParse(String),

    /// A worker channel was closed.
    #[error("Channel error: {0}")]
    ChannelClosed(String),

    /// The fixture describes an invalid schema or reference.
    #[error("Invalid fixture: {0}")]
    Validation(#[from] ValidationError),
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::FixtureParse(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::FixtureParse(err.to_string())
    }
}

/// Convenience type alias for Results with StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
