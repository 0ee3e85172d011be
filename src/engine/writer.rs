//! Pool writer: fixtures into `matchPool`, then the `poolMetadata` singleton.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::{paths, set_typed, KeyValueStore};
use crate::types::{Fixture, PoolMetadata, StoreTimestamp};

pub struct PoolWriter {
    store: Arc<dyn KeyValueStore>,
    next_update: Duration,
}

impl PoolWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, next_update: Duration) -> Self {
        Self { store, next_update }
    }

    /// Write every fixture, then overwrite the metadata.
    ///
    /// Each write replaces whatever was at the fixture's path. There is no
    /// grouping: a failure part-way leaves the earlier writes in place.
    pub async fn write(&self, fixtures: &[Fixture], now: DateTime<Utc>) -> Result<PoolMetadata> {
        let mut written: BTreeSet<(&str, i64)> = BTreeSet::new();
        let mut leagues: BTreeSet<i64> = BTreeSet::new();

        for fixture in fixtures {
            let path = paths::fixture(&fixture.date, fixture.fixture_id);
            set_typed(self.store.as_ref(), &path, fixture)
                .await
                .with_context(|| format!("Failed to write fixture {path}"))?;
            debug!(%path, "Fixture written");

            written.insert((fixture.date.as_str(), fixture.fixture_id));
            leagues.insert(fixture.league_id);
        }

        let metadata = PoolMetadata {
            last_update: StoreTimestamp::server(),
            total_matches: written.len() as u64,
            leagues: leagues.into_iter().collect(),
            next_update: (now + self.next_update).timestamp_millis(),
        };
        set_typed(self.store.as_ref(), paths::POOL_METADATA, &metadata)
            .await
            .context("Failed to write pool metadata")?;

        info!(
            total_matches = metadata.total_matches,
            leagues = ?metadata.leagues,
            "Match pool written"
        );
        Ok(metadata)
    }
}
