//! Pool janitor.
//!
//! Removes fixtures whose kickoff is more than [`RETENTION_HOURS`] in the past.
//! The whole pool is read in one go and the deletions are applied as a
//! single multi-path update.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::{paths, KeyValueStore};

/// How long a fixture stays in the pool after kickoff.
pub const RETENTION_HOURS: i64 = 3;

pub struct PoolJanitor {
    store: Arc<dyn KeyValueStore>,
}

impl PoolJanitor {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Delete every fixture that kicked off strictly before the retention
    /// cutoff. Returns the number removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = (now - Duration::hours(RETENTION_HOURS)).timestamp_millis();

        let pool = self
            .store
            .get(paths::MATCH_POOL)
            .await
            .context("Failed to read match pool")?;
        let Some(Value::Object(dates)) = pool else {
            debug!("Match pool empty, nothing to prune");
            return Ok(0);
        };

        let updates = stale_paths(&dates, cutoff);
        let removed = updates.len();
        if removed > 0 {
            self.store
                .update(updates)
                .await
                .context("Failed to delete stale fixtures")?;
        }

        info!(removed, cutoff, "Match pool pruned");
        Ok(removed)
    }
}

/// `matchPool/{date}/{id} -> null` for each stale record.
fn stale_paths(dates: &Map<String, Value>, cutoff: i64) -> Map<String, Value> {
    let mut updates = Map::new();
    for (date, fixtures) in dates {
        let Value::Object(fixtures) = fixtures else {
            continue;
        };
        for (id, record) in fixtures {
            // Records without a readable timestamp are left alone.
            let Some(ts) = record.get("timestamp").and_then(Value::as_f64) else {
                continue;
            };
            if (ts as i64) < cutoff {
                updates.insert(format!("{}/{date}/{id}", paths::MATCH_POOL), Value::Null);
            }
        }
    }
    updates
}
