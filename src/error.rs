//! Error taxonomy for the record ledger.
//!
//! Argument-shape problems are caught locally before any round trip to the
//! backing store; everything the store itself reports is propagated
//! unmodified inside [`RecordError::Store`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecordError>;

#[derive(Error, Debug)]
pub enum RecordError {
    /// `group_ids` was supplied to `update` with a different length than `keys`.
    #[error("number of keys ({keys}) does not match number of group ids ({group_ids})")]
    GroupIdMismatch { keys: usize, group_ids: usize },

    /// The store's clock is behind the caller's `time_at_least` watermark.
    ///
    /// Writing anyway would stamp records with a time that looks older than
    /// the caller's view of the run, so the write is refused.
    #[error("time sync issue with database: server time {server} < requested minimum {requested}")]
    TimeSync { server: f64, requested: f64 },

    /// Reading the store's server-side clock failed.
    #[error("failed to read server time: {0}")]
    Clock(#[source] sqlx::Error),

    /// Table names are interpolated into SQL and must be plain identifiers.
    #[error("invalid table name {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTableName(String),

    /// Incremental cleanup scopes deletions by group id, so it cannot run
    /// without one group id per key.
    #[error("incremental cleanup requires group ids")]
    MissingGroupIds,

    #[error("config error: {0}")]
    Config(String),

    /// Any other failure from the backing store.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
