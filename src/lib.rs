//! # Index Ledger
//!
//! A namespace-scoped record manager for incremental vector store ingestion.
//!
//! Index Ledger maintains a durable mapping from content-derived keys to
//! last-write timestamps (and an optional group id), partitioned by
//! namespace. Ingestion pipelines use it to decide which documents need to
//! be re-written to a downstream vector store and which stale entries can be
//! pruned, without re-processing unchanged content.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────┐
//! │  Ingestion   │──▶│  reconcile   │──▶│  RecordManager  │
//! │  pipeline    │   │ none/incr/   │   │ Postgres/SQLite │
//! │  (caller)    │   │ full cleanup │   │ /in-memory      │
//! └──────────────┘   └──────────────┘   └─────────────────┘
//! ```
//!
//! Timestamps always come from the store's own clock, so skew between
//! ingestion workers never corrupts staleness decisions. Concurrent workers
//! need no client-side locking: the backing store's unique constraint on
//! `(key, namespace)` and atomic upsert provide mutual exclusion.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Connection pools and backend selection |
//! | [`error`] | Error taxonomy |
//! | [`reconcile`] | Per-run reconciliation with cleanup policies |
//! | [`store`] | The [`RecordManager`] trait and its backends |

pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod store;

pub use error::{RecordError, Result};
pub use reconcile::{reconcile, CleanupPolicy, ReconcileOutcome};
pub use store::{IndexRecord, ListOptions, RecordManager, SchemaStatus, UpdateOptions};
