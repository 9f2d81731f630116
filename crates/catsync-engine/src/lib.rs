//! # catsync-engine: Consistency and Dispatch Engine
//!
//! Decides whether a versioned catalog item, together with everything it
//! references, is consistent with its counterparts in the replica versions
//! its rules target, and batches out-of-sync items into rule executions.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        catsync-engine                                   │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncEngine (facade)                         │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │      ┌───────────────┬────────┴───────┬────────────────┐               │
//! │      ▼               ▼                ▼                ▼                │
//! │  ┌─────────┐   ┌───────────┐   ┌────────────┐   ┌────────────┐         │
//! │  │ walker  │   │  rules    │   │ evaluator  │   │ dispatcher │         │
//! │  │         │   │           │   │            │   │            │         │
//! │  │ closure │   │ type gate │   │ push/pull  │   │ rule pools │         │
//! │  │ depth   │   │ auth gate │   │ aggregation│   │ executions │         │
//! │  │ cache   │   │ history   │   │            │   │            │         │
//! │  └─────────┘   └───────────┘   └────────────┘   └────────────┘         │
//! │                                                                         │
//! │  context (SyncContext)  •  navigation (ledger)  •  config  •  error    │
//! │                                                                         │
//! │  OUTSIDE WORLD: only through catsync-core ports (Collaborators)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `SyncEngine` facade
//! - [`walker`] - Reference closure with a per-type descriptor cache
//! - [`rules`] - Applicable rules and the permission gate
//! - [`evaluator`] - Push and pull statuses
//! - [`dispatcher`] - Execution batching and submission
//! - [`context`] - `SyncContext` assembly
//! - [`navigation`] - Ledger navigation
//! - [`config`] - Engine configuration (TOML + environment)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use catsync_engine::{Collaborators, EngineConfig, SyncEngine};
//!
//! let config = EngineConfig::load_or_default(None);
//! let engine = SyncEngine::new(ports, config)?;
//!
//! let context = engine.sync_context(&item, &ctx);
//! println!("{:?}", context.push_status);
//! ```

use std::sync::Arc;

use catsync_core::{
    Authorizer, CatalogRepository, JobRuntime, SchemaRegistry, TimestampLedger, ValueReader,
};

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod navigation;
pub mod rules;
pub mod walker;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AccessSettings, EngineConfig, InitialSyncCheck, InitialSyncSettings, ReferenceSettings};
pub use context::{SyncContext, SyncContextBuilder};
pub use dispatcher::{
    DispatchReport, DispatchRequest, ItemInput, RuleCompletionAdapter, SubmittedExecution,
    SyncDispatcher,
};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use evaluator::{ConsistencyEvaluator, PullEvaluation, PushEvaluation};
pub use navigation::LedgerNavigator;
pub use rules::{RuleScope, RuleSelector, RuleSummary};
pub use walker::ReferenceWalker;

// =============================================================================
// Collaborators
// =============================================================================

/// The external services the engine consumes.
#[derive(Clone)]
pub struct Collaborators {
    pub schema: Arc<dyn SchemaRegistry>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub ledger: Arc<dyn TimestampLedger>,
    pub values: Arc<dyn ValueReader>,
    pub authorizer: Arc<dyn Authorizer>,
    pub jobs: Arc<dyn JobRuntime>,
}
