//! # Index Ledger CLI (`ixl`)
//!
//! The `ixl` binary exposes the record ledger for scripting and operations:
//! schema initialization, batch writes, presence checks, filtered listing,
//! deletion, and full reconcile runs.
//!
//! ## Usage
//!
//! ```bash
//! ixl --config ./ledger.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ixl init` | Check/create the backing schema (prints DDL for hosted backends) |
//! | `ixl time` | Print the store's server time |
//! | `ixl update <keys...>` | Upsert records for the given keys |
//! | `ixl exists <keys...>` | Report per-key presence |
//! | `ixl list` | List keys, optionally filtered |
//! | `ixl delete <keys...>` | Delete records in this namespace |
//! | `ixl reconcile <keys...>` | Write a run's keys and prune stale records |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use index_ledger::config::load_config;
use index_ledger::db::open_manager;
use index_ledger::reconcile::{reconcile, CleanupPolicy};
use index_ledger::store::{ListOptions, SchemaStatus, UpdateOptions};

/// Index Ledger CLI — a namespace-scoped record manager for incremental
/// vector store ingestion.
#[derive(Parser)]
#[command(
    name = "ixl",
    about = "Index Ledger — track what has been written to a vector store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backing schema exists.
    ///
    /// The embedded SQLite backend creates its table and indexes directly.
    /// The Postgres backend has no DDL privileges; when the table is
    /// missing, the required statements are printed for an operator to
    /// apply. Idempotent either way.
    Init,

    /// Print the store's server time (epoch seconds).
    Time,

    /// Upsert records for the given keys.
    Update {
        /// Keys to record, e.g. content hashes or source URIs.
        #[arg(required = true)]
        keys: Vec<String>,

        /// One group id per key, positionally matched.
        #[arg(long = "group-id")]
        group_ids: Vec<String>,

        /// Fail unless the store's clock is at least this value.
        #[arg(long)]
        time_at_least: Option<f64>,
    },

    /// Report whether each key has a record in this namespace.
    Exists {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// List keys in this namespace.
    List {
        /// Only keys updated strictly before this time (epoch seconds).
        #[arg(long)]
        before: Option<f64>,

        /// Only keys updated strictly after this time (epoch seconds).
        #[arg(long)]
        after: Option<f64>,

        /// Maximum number of keys to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Only keys tagged with one of these group ids.
        #[arg(long = "group-id")]
        group_ids: Vec<String>,
    },

    /// Delete records for the given keys (this namespace only).
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Write one run's keys and prune stale records per the cleanup policy.
    Reconcile {
        /// Keys seen in the current run.
        #[arg(required = true)]
        keys: Vec<String>,

        /// One group id per key (source document id), positionally matched.
        /// Required for the incremental policy.
        #[arg(long = "group-id")]
        group_ids: Vec<String>,

        /// Cleanup policy: none, incremental, or full. Defaults to the
        /// configured `index.cleanup`.
        #[arg(long)]
        policy: Option<CleanupPolicy>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let manager = open_manager(&config).await?;

    match cli.command {
        Commands::Init => match manager.ensure_schema().await? {
            SchemaStatus::Ready => {
                println!("schema ok (namespace '{}')", manager.namespace());
            }
            SchemaStatus::Missing { statements } => {
                println!("table '{}' is missing.", config.store.table);
                println!("Execute the following SQL statements to create it:");
                for statement in statements {
                    println!();
                    println!("{}", statement);
                }
            }
        },
        Commands::Time => {
            println!("{}", manager.server_time().await?);
        }
        Commands::Update {
            keys,
            group_ids,
            time_at_least,
        } => {
            let options = UpdateOptions {
                time_at_least,
                group_ids: to_group_options(&group_ids),
            };
            manager.update(&keys, &options).await?;
            println!("updated {} keys", keys.len());
        }
        Commands::Exists { keys } => {
            let flags = manager.exists(&keys).await?;
            for (key, present) in keys.iter().zip(flags) {
                println!("{}\t{}", key, present);
            }
        }
        Commands::List {
            before,
            after,
            limit,
            group_ids,
        } => {
            let options = ListOptions {
                before,
                after,
                limit,
                group_ids: if group_ids.is_empty() {
                    None
                } else {
                    Some(group_ids)
                },
            };
            for key in manager.list_keys(&options).await? {
                println!("{}", key);
            }
        }
        Commands::Delete { keys } => {
            manager.delete_keys(&keys).await?;
            println!("deleted {} keys", keys.len());
        }
        Commands::Reconcile {
            keys,
            group_ids,
            policy,
        } => {
            let policy = policy.unwrap_or(config.index.cleanup);
            let group_ids = to_group_options(&group_ids);
            let outcome = reconcile(manager.as_ref(), &keys, group_ids.as_deref(), policy).await?;
            println!("reconcile ({})", policy);
            println!("  added: {}", outcome.added);
            println!("  updated: {}", outcome.updated);
            println!("  deleted: {}", outcome.deleted);
        }
    }

    Ok(())
}

fn to_group_options(group_ids: &[String]) -> Option<Vec<Option<String>>> {
    if group_ids.is_empty() {
        None
    } else {
        Some(group_ids.iter().cloned().map(Some).collect())
    }
}
