//! # catsync-core: Pure Domain Model for catsync
//!
//! Types, status algebra, schema registry and collaborator ports shared by
//! the engine and its adapters. Nothing in here performs I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        catsync Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Surrounding application / CLI                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                      catsync-engine                             │   │
//! │  │   walker • rule selector • evaluator • dispatcher • contexts    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ports                                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ catsync-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌────────┐ ┌────────┐ ┌────────┐ ┌───────────┐   │   │
//! │  │   │  types  │ │ status │ │ schema │ │ access │ │   ports   │   │   │
//! │  │   └─────────┘ └────────┘ └────────┘ └────────┘ └───────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                ▲                                        │
//! │  ┌─────────────────────────────┴───────────────────────────────────┐   │
//! │  │           catsync-store (in-process port adapters)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, versions, rules, ledger records
//! - [`status`] - `SyncStatus` and its aggregation rule
//! - [`schema`] - Schema registry trait and in-memory implementation
//! - [`value`] - Attribute values
//! - [`access`] - Principal and scoped elevated reads
//! - [`ports`] - Collaborator traits
//! - [`error`] - Domain error types
//! - [`validation`] - Reference configuration entry parsing
//!
//! ## Example Usage
//!
//! ```rust
//! use catsync_core::SyncStatus;
//!
//! let own = SyncStatus::Ok;
//! let referenced = SyncStatus::NotOk;
//! assert_eq!(own.combine(referenced), SyncStatus::NotOk);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod error;
pub mod ports;
pub mod schema;
pub mod status;
pub mod types;
pub mod validation;
pub mod value;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::{AccessContext, ElevatedRead, Principal};
pub use error::{CoreError, CoreResult, ValidationError};
pub use ports::{
    Authorizer, CatalogRepository, CompletionInfo, Execution, ExecutionConfigurator,
    ExecutionKind, JobRuntime, TimestampLedger, ValueReader,
};
pub use schema::{AttributeDescriptor, Multiplicity, SchemaRegistry, StaticSchema, ValueKind};
pub use status::SyncStatus;
pub use types::*;
pub use validation::ReferenceEntry;
pub use value::AttributeValue;
