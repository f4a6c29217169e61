use anyhow::{bail, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;
use crate::store::postgres::PostgresRecordManager;
use crate::store::sqlite::SqliteRecordManager;
use crate::store::RecordManager;

pub async fn connect_sqlite(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn connect_postgres(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    Ok(pool)
}

/// Build the record manager the config asks for.
pub async fn open_manager(config: &Config) -> Result<Box<dyn RecordManager>> {
    match config.store.backend.as_str() {
        "sqlite" => {
            let Some(path) = config.store.path.as_ref() else {
                bail!("store.path must be set for the sqlite backend");
            };
            let pool = connect_sqlite(path).await?;
            Ok(Box::new(SqliteRecordManager::new(
                pool,
                config.store.table.clone(),
                config.index.namespace.clone(),
            )?))
        }
        "postgres" => {
            let Some(url) = config.store.url.as_ref() else {
                bail!("store.url must be set for the postgres backend");
            };
            let pool = connect_postgres(url).await?;
            Ok(Box::new(PostgresRecordManager::new(
                pool,
                config.store.table.clone(),
                config.index.namespace.clone(),
            )?))
        }
        other => bail!("Unknown store backend: '{}'", other),
    }
}
