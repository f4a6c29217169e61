//! SQLite-backed [`RecordManager`] implementation.
//!
//! Embedded backend for single-machine pipelines. Unlike the hosted
//! Postgres backend it owns its database file, so `ensure_schema` applies
//! DDL directly instead of emitting it for an operator.
//!
//! Server time is computed inside SQLite from `julianday('now')`, which
//! carries sub-second precision, so the "store clock" invariant holds even
//! though the store runs in-process.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{RecordError, Result};

use super::{
    check_watermark, resolve_group_ids, validate_table_name, ListOptions, RecordManager,
    SchemaStatus, UpdateOptions,
};

pub struct SqliteRecordManager {
    pool: SqlitePool,
    table: String,
    namespace: String,
}

impl SqliteRecordManager {
    pub fn new(
        pool: SqlitePool,
        table: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            pool,
            table,
            namespace: namespace.into(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordManager for SqliteRecordManager {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL,
                namespace TEXT NOT NULL,
                updated_at REAL NOT NULL,
                group_id TEXT,
                UNIQUE(key, namespace)
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        for column in ["updated_at", "key", "namespace", "group_id"] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table}({column})",
                table = self.table,
                column = column
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(SchemaStatus::Ready)
    }

    async fn server_time(&self) -> Result<f64> {
        // Epoch seconds as double precision; 2440587.5 is the Julian day of
        // the Unix epoch.
        sqlx::query_scalar("SELECT (julianday('now') - 2440587.5) * 86400.0")
            .fetch_one(&self.pool)
            .await
            .map_err(RecordError::Clock)
    }

    async fn update(&self, keys: &[String], options: &UpdateOptions) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let group_ids = resolve_group_ids(keys, options)?;
        let updated_at = self.server_time().await?;
        check_watermark(updated_at, options)?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, key, namespace, updated_at, group_id) ",
            self.table
        ));
        qb.push_values(keys.iter().zip(group_ids), |mut row, (key, group_id)| {
            row.push_bind(Uuid::new_v4().to_string())
                .push_bind(key.clone())
                .push_bind(self.namespace.clone())
                .push_bind(updated_at)
                .push_bind(group_id);
        });
        qb.push(
            " ON CONFLICT(key, namespace) DO UPDATE SET \
             updated_at = excluded.updated_at, group_id = excluded.group_id",
        );
        qb.build().execute(&self.pool).await?;

        debug!(
            namespace = %self.namespace,
            keys = keys.len(),
            "upserted records"
        );
        Ok(())
    }

    async fn exists(&self, keys: &[String]) -> Result<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT key FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());
        qb.push(" AND key IN (");
        {
            let mut separated = qb.separated(", ");
            for key in keys {
                separated.push_bind(key.clone());
            }
        }
        qb.push(")");

        let found: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        let found: HashSet<String> = found.into_iter().collect();

        Ok(keys.iter().map(|key| found.contains(key)).collect())
    }

    async fn list_keys(&self, options: &ListOptions) -> Result<Vec<String>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT key FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());

        if let Some(before) = options.before {
            qb.push(" AND updated_at < ").push_bind(before);
        }
        if let Some(after) = options.after {
            qb.push(" AND updated_at > ").push_bind(after);
        }
        if let Some(group_ids) = &options.group_ids {
            qb.push(" AND group_id IN (");
            {
                let mut separated = qb.separated(", ");
                for group_id in group_ids {
                    separated.push_bind(group_id.clone());
                }
            }
            qb.push(")");
        }
        if let Some(limit) = options.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        Ok(qb.build_query_scalar().fetch_all(&self.pool).await?)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());
        qb.push(" AND key IN (");
        {
            let mut separated = qb.separated(", ");
            for key in keys {
                separated.push_bind(key.clone());
            }
        }
        qb.push(")");
        qb.build().execute(&self.pool).await?;

        debug!(
            namespace = %self.namespace,
            keys = keys.len(),
            "deleted records"
        );
        Ok(())
    }
}
