//! In-memory [`RecordManager`] implementation for testing.
//!
//! Uses a `HashMap` keyed by `(namespace, key)` behind `std::sync::RwLock`.
//! The backing map can be shared across instances with different namespaces
//! so tests can exercise namespace isolation without a database.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::Result;

use super::{
    check_watermark, resolve_group_ids, IndexRecord, ListOptions, RecordManager, SchemaStatus,
    UpdateOptions,
};

type RecordMap = HashMap<(String, String), IndexRecord>;

/// In-memory record manager. The clock is the process clock.
pub struct InMemoryRecordManager {
    namespace: String,
    records: Arc<RwLock<RecordMap>>,
}

impl InMemoryRecordManager {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A manager over the same backing map but a different namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            records: Arc::clone(&self.records),
        }
    }

    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1e6
    }
}

#[async_trait]
impl RecordManager for InMemoryRecordManager {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus> {
        Ok(SchemaStatus::Ready)
    }

    async fn server_time(&self) -> Result<f64> {
        Ok(self.now())
    }

    async fn update(&self, keys: &[String], options: &UpdateOptions) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let group_ids = resolve_group_ids(keys, options)?;
        let updated_at = self.now();
        check_watermark(updated_at, options)?;

        let mut records = self.records.write().unwrap();
        for (key, group_id) in keys.iter().zip(group_ids) {
            records.insert(
                (self.namespace.clone(), key.clone()),
                IndexRecord {
                    key: key.clone(),
                    namespace: self.namespace.clone(),
                    updated_at,
                    group_id,
                },
            );
        }
        Ok(())
    }

    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        let records = self.records.read().unwrap();
        Ok(keys
            .iter()
            .map(|key| records.contains_key(&(self.namespace.clone(), key.clone())))
            .collect())
    }

    async fn list_keys(&self, options: &ListOptions) -> Result<Vec<String>> {
        let group_set: Option<HashSet<&String>> = options
            .group_ids
            .as_ref()
            .map(|gids| gids.iter().collect());

        let records = self.records.read().unwrap();
        let mut keys: Vec<String> = records
            .values()
            .filter(|r| r.namespace == self.namespace)
            .filter(|r| options.before.map(|b| r.updated_at < b).unwrap_or(true))
            .filter(|r| options.after.map(|a| r.updated_at > a).unwrap_or(true))
            .filter(|r| match &group_set {
                Some(set) => r.group_id.as_ref().map(|g| set.contains(g)).unwrap_or(false),
                None => true,
            })
            .map(|r| r.key.clone())
            .collect();

        if let Some(limit) = options.limit {
            keys.truncate(limit);
        }
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut records = self.records.write().unwrap();
        for key in keys {
            records.remove(&(self.namespace.clone(), key.clone()));
        }
        Ok(())
    }
}
