//! Postgres-backed [`RecordManager`] implementation.
//!
//! Primary hosted backend. Matches the original record-manager table shape:
//! `id uuid` generated server-side, `key`/`namespace` text, `updated_at`
//! double precision epoch seconds, nullable `group_id`, unique on
//! `(key, namespace)`.
//!
//! The connection role is not expected to hold DDL privileges, so
//! `ensure_schema` never creates anything: it reports the statements an
//! operator must apply, including the `get_server_timestamp()` function the
//! store clock relies on.

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};

use crate::error::{RecordError, Result};

use super::{
    check_watermark, resolve_group_ids, validate_table_name, ListOptions, RecordManager,
    SchemaStatus, UpdateOptions,
};

pub struct PostgresRecordManager {
    pool: PgPool,
    table: String,
    namespace: String,
}

impl PostgresRecordManager {
    pub fn new(
        pool: PgPool,
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

    fn schema_statements(&self) -> Vec<String> {
        let table = &self.table;
        let mut statements = vec![format!(
            "create table if not exists {table} (\n\
             \x20   id uuid primary key default gen_random_uuid(),\n\
             \x20   key text not null,\n\
             \x20   namespace text not null,\n\
             \x20   updated_at double precision not null,\n\
             \x20   group_id text,\n\
             \x20   unique (key, namespace)\n\
             );"
        )];
        for column in ["updated_at", "key", "namespace", "group_id"] {
            statements.push(format!(
                "create index if not exists {column}_index on {table} ({column});"
            ));
        }
        statements.push(
            "create or replace function get_server_timestamp()\n\
             \x20   returns double precision as $$\n\
             begin\n\
             \x20   return extract(epoch from current_timestamp);\n\
             end; $$ language plpgsql;"
                .to_string(),
        );
        statements
    }
}

#[async_trait]
impl RecordManager for PostgresRecordManager {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn ensure_schema(&self) -> Result<SchemaStatus> {
        let table_exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await?;

        if table_exists {
            return Ok(SchemaStatus::Ready);
        }

        warn!(table = %self.table, "record table is missing; schema must be applied by an operator");
        Ok(SchemaStatus::Missing {
            statements: self.schema_statements(),
        })
    }

    async fn server_time(&self) -> Result<f64> {
        sqlx::query_scalar("SELECT get_server_timestamp()")
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

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (key, namespace, updated_at, group_id) ",
            self.table
        ));
        qb.push_values(keys.iter().zip(group_ids), |mut row, (key, group_id)| {
            row.push_bind(key.clone())
                .push_bind(self.namespace.clone())
                .push_bind(updated_at)
                .push_bind(group_id);
        });
        qb.push(
            " ON CONFLICT (key, namespace) DO UPDATE SET \
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

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT key FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());
        qb.push(" AND key = ANY(");
        qb.push_bind(keys.to_vec());
        qb.push(")");

        let found: Vec<String> = qb.build_query_scalar().fetch_all(&self.pool).await?;
        let found: HashSet<String> = found.into_iter().collect();

        Ok(keys.iter().map(|key| found.contains(key)).collect())
    }

    async fn list_keys(&self, options: &ListOptions) -> Result<Vec<String>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT key FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());

        if let Some(before) = options.before {
            qb.push(" AND updated_at < ").push_bind(before);
        }
        if let Some(after) = options.after {
            qb.push(" AND updated_at > ").push_bind(after);
        }
        if let Some(group_ids) = &options.group_ids {
            qb.push(" AND group_id = ANY(");
            qb.push_bind(group_ids.clone());
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

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("DELETE FROM {} WHERE namespace = ", self.table));
        qb.push_bind(self.namespace.clone());
        qb.push(" AND key = ANY(");
        qb.push_bind(keys.to_vec());
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
