//! Storage abstraction for the record ledger.
//!
//! The [`RecordManager`] trait defines the operations an ingestion pipeline
//! needs to track which content has already been written to a downstream
//! vector store, enabling pluggable backends (Postgres, SQLite, in-memory).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::{RecordError, Result};

/// One row of the ledger: a content-derived key, the namespace it belongs
/// to, the server-side timestamp of its last write, and an optional group id
/// used to scope bulk deletion to a single ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub key: String,
    pub namespace: String,
    pub updated_at: f64,
    pub group_id: Option<String>,
}

/// Options for [`RecordManager::update`].
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Refuse the write unless the store's clock is at least this value
    /// (epoch seconds). Guards against stale-clock callers silently
    /// overwriting newer records.
    pub time_at_least: Option<f64>,
    /// One group id per key, positionally matched. `None` entries are
    /// stored as NULL.
    pub group_ids: Option<Vec<Option<String>>>,
}

/// Filters for [`RecordManager::list_keys`]. All filters are optional and
/// ANDed together.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only keys with `updated_at` strictly before this value.
    pub before: Option<f64>,
    /// Only keys with `updated_at` strictly after this value.
    pub after: Option<f64>,
    /// Cap on the number of keys returned.
    pub limit: Option<usize>,
    /// Only keys whose group id is in this set.
    pub group_ids: Option<Vec<String>>,
}

/// Result of [`RecordManager::ensure_schema`].
///
/// Hosted backends do not hold DDL privileges, so a missing schema is
/// reported with the statements an operator must apply rather than applied
/// in place. Embedded backends own their storage file and report `Ready`
/// after creating it themselves.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaStatus {
    /// The backing table exists.
    Ready,
    /// The backing table is absent; apply these statements to create it.
    Missing { statements: Vec<String> },
}

/// Abstract record manager backend.
///
/// All operations are scoped to the namespace the instance was constructed
/// with. Concurrent callers need no client-side coordination: correctness
/// rests on the backing store's unique constraint on `(key, namespace)` and
/// its atomic upsert.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`server_time`](RecordManager::server_time) | Read the store's authoritative clock |
/// | [`update`](RecordManager::update) | Upsert records for a batch of keys |
/// | [`exists`](RecordManager::exists) | Per-key presence check, input order |
/// | [`list_keys`](RecordManager::list_keys) | Filtered key listing for reconciliation |
/// | [`delete_keys`](RecordManager::delete_keys) | Namespace-scoped bulk delete |
/// | [`ensure_schema`](RecordManager::ensure_schema) | Idempotent schema check |
#[async_trait]
pub trait RecordManager: Send + Sync {
    /// The namespace this instance reads and writes.
    fn namespace(&self) -> &str;

    /// Check that the backing structure exists. Never destructive.
    async fn ensure_schema(&self) -> Result<SchemaStatus>;

    /// The store's current clock, epoch seconds as double precision.
    ///
    /// Records are always stamped with this clock, never the caller's,
    /// which protects against skew between ingestion workers and the store.
    async fn server_time(&self) -> Result<f64>;

    /// Upsert one record per key with `updated_at` set to the store's
    /// current time. Conflicting `(key, namespace)` rows are overwritten,
    /// not duplicated. No-op on empty `keys`.
    async fn update(&self, keys: &[String], options: &UpdateOptions) -> Result<()>;

    /// Whether each key currently has a record in this namespace, in input
    /// order. Empty input yields empty output. Query failures propagate;
    /// they are never reported as all-absent.
    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>>;

    /// Keys in this namespace matching all supplied filters. No ordering
    /// guarantee.
    async fn list_keys(&self, options: &ListOptions) -> Result<Vec<String>>;

    /// Remove matching records in this namespace only. No-op on empty
    /// `keys`.
    async fn delete_keys(&self, keys: &[String]) -> Result<()>;
}

/// Table names cannot be bound as SQL parameters, so backends interpolate
/// them and constructors must reject anything that is not a bare identifier.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(RecordError::InvalidTableName(name.to_string()))
    }
}

/// Resolve the per-key group ids for an update, defaulting to NULL for
/// every key. Length mismatches fail here, before any round trip.
pub(crate) fn resolve_group_ids(
    keys: &[String],
    options: &UpdateOptions,
) -> Result<Vec<Option<String>>> {
    match &options.group_ids {
        Some(group_ids) if group_ids.len() != keys.len() => Err(RecordError::GroupIdMismatch {
            keys: keys.len(),
            group_ids: group_ids.len(),
        }),
        Some(group_ids) => Ok(group_ids.clone()),
        None => Ok(vec![None; keys.len()]),
    }
}

/// Enforce the caller's `time_at_least` watermark against the store clock.
pub(crate) fn check_watermark(server_time: f64, options: &UpdateOptions) -> Result<()> {
    if let Some(requested) = options.time_at_least {
        if server_time < requested {
            return Err(RecordError::TimeSync {
                server: server_time,
                requested,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_must_be_bare_identifiers() {
        assert!(validate_table_name("upsertion_records").is_ok());
        assert!(validate_table_name("_t2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("records; drop table x").is_err());
        assert!(validate_table_name("rec\"ords").is_err());
    }

    #[test]
    fn group_ids_default_to_null_per_key() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let resolved = resolve_group_ids(&keys, &UpdateOptions::default()).unwrap();
        assert_eq!(resolved, vec![None, None]);
    }

    #[test]
    fn group_id_length_mismatch_is_rejected() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let options = UpdateOptions {
            group_ids: Some(vec![Some("g1".to_string())]),
            ..Default::default()
        };
        let err = resolve_group_ids(&keys, &options).unwrap_err();
        assert!(matches!(
            err,
            RecordError::GroupIdMismatch {
                keys: 2,
                group_ids: 1
            }
        ));
    }

    #[test]
    fn watermark_ahead_of_server_clock_is_rejected() {
        let options = UpdateOptions {
            time_at_least: Some(200.0),
            ..Default::default()
        };
        assert!(matches!(
            check_watermark(100.0, &options),
            Err(RecordError::TimeSync { .. })
        ));
        assert!(check_watermark(200.0, &options).is_ok());
        assert!(check_watermark(100.0, &UpdateOptions::default()).is_ok());
    }
}
