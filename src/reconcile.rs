//! Reconciliation of one ingestion run against the ledger.
//!
//! An ingestion pipeline hands over the keys it saw in the current run (with
//! an optional group id per key, typically the source document id) and a
//! cleanup policy. The run is stamped with the store's clock, upserted, and
//! stale records are pruned according to the policy:
//!
//! - `none` — never delete;
//! - `incremental` — delete prior versions of documents whose key set
//!   changed, scoped to this run's group ids;
//! - `full` — also delete records absent from the run entirely (mirror
//!   sync).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::{RecordError, Result};
use crate::store::{ListOptions, RecordManager, UpdateOptions};

/// Deletion policy applied after the run's keys are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    #[default]
    None,
    Incremental,
    Full,
}

impl FromStr for CleanupPolicy {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "incremental" => Ok(Self::Incremental),
            "full" => Ok(Self::Full),
            other => Err(RecordError::Config(format!(
                "unknown cleanup policy '{other}' (expected none, incremental, or full)"
            ))),
        }
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Incremental => write!(f, "incremental"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Counts from one reconcile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Keys that had no record before this run.
    pub added: usize,
    /// Keys that already had a record and were re-stamped.
    pub updated: usize,
    /// Stale records removed by the cleanup policy.
    pub deleted: usize,
}

/// Write one run's keys and prune stale records per `policy`.
///
/// `group_ids`, when given, must carry one entry per key (positional). The
/// run start is snapshotted from the store's clock and used both as the
/// `time_at_least` watermark for the write and as the staleness cutoff for
/// cleanup, so records written by this run are never pruned by it.
pub async fn reconcile(
    manager: &dyn RecordManager,
    keys: &[String],
    group_ids: Option<&[Option<String>]>,
    policy: CleanupPolicy,
) -> Result<ReconcileOutcome> {
    if let Some(gids) = group_ids {
        if gids.len() != keys.len() {
            return Err(RecordError::GroupIdMismatch {
                keys: keys.len(),
                group_ids: gids.len(),
            });
        }
    }
    if policy == CleanupPolicy::Incremental && group_ids.is_none() && !keys.is_empty() {
        return Err(RecordError::MissingGroupIds);
    }

    // Dedupe while keeping first occurrence, carrying its group id along.
    let mut seen = HashSet::new();
    let mut run_keys = Vec::new();
    let mut run_group_ids = Vec::new();
    for (i, key) in keys.iter().enumerate() {
        if seen.insert(key.clone()) {
            run_keys.push(key.clone());
            run_group_ids.push(group_ids.map(|g| g[i].clone()).unwrap_or(None));
        }
    }

    let index_start = manager.server_time().await?;

    let existed = manager.exists(&run_keys).await?;
    let updated = existed.iter().filter(|e| **e).count();
    let added = run_keys.len() - updated;

    manager
        .update(
            &run_keys,
            &UpdateOptions {
                time_at_least: Some(index_start),
                group_ids: Some(run_group_ids.clone()),
            },
        )
        .await?;

    let stale = match policy {
        CleanupPolicy::None => Vec::new(),
        CleanupPolicy::Incremental => {
            let run_groups: Vec<String> = {
                let mut groups: Vec<String> =
                    run_group_ids.iter().flatten().cloned().collect::<HashSet<_>>().into_iter().collect();
                groups.sort();
                groups
            };
            if run_groups.is_empty() {
                Vec::new()
            } else {
                manager
                    .list_keys(&ListOptions {
                        before: Some(index_start),
                        group_ids: Some(run_groups),
                        ..Default::default()
                    })
                    .await?
            }
        }
        CleanupPolicy::Full => {
            manager
                .list_keys(&ListOptions {
                    before: Some(index_start),
                    ..Default::default()
                })
                .await?
        }
    };

    manager.delete_keys(&stale).await?;

    debug!(
        namespace = %manager.namespace(),
        %policy,
        added,
        updated,
        deleted = stale.len(),
        "reconcile complete"
    );

    Ok(ReconcileOutcome {
        added,
        updated,
        deleted: stale.len(),
    })
}
