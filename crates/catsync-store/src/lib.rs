//! # catsync-store: In-Process Port Adapters
//!
//! Implementations of the catsync-core ports that keep everything in
//! memory. The CLI wires them from a [`CatalogFixture`]; the engine's tests
//! build them directly.
//!
//! ## Module Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        catsync-store                                    │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         fixture.rs                               │  │
//! │  │        TOML / JSON ──► schema + catalog + ledger + grants        │  │
//! │  └───────┬──────────────────┬──────────────────┬────────────────────┘  │
//! │          ▼                  ▼                  ▼                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐                │
//! │  │  catalog.rs  │   │  ledger.rs   │   │   auth.rs    │                │
//! │  │ items,rules, │   │  timestamps  │   │ admins and   │                │
//! │  │ counterparts │   │  (upsert)    │   │ grants       │                │
//! │  │ values       │   └──────────────┘   └──────────────┘                │
//! │  └──────────────┘                                                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ jobs.rs   QueuedJobRuntime ──mpsc──► JobWorker (tokio task)      │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod catalog;
pub mod error;
pub mod fixture;
pub mod jobs;
pub mod ledger;

pub use auth::StaticAuthorization;
pub use catalog::MemoryCatalog;
pub use error::{StoreError, StoreResult};
pub use fixture::{CatalogFixture, FixtureParts};
pub use jobs::{DescendantCall, JobWorker, JobWorkerHandle, QueuedJobRuntime, DEFAULT_QUEUE_CAPACITY};
pub use ledger::MemoryLedger;
