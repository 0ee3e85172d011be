//! Fixture fetcher.
//!
//! Lists fixtures upstream and turns them into normalized, un-enriched
//! records. A failed listing is logged and yields nothing: one bad
//! league or date never stops the others.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::data::normalize::{clean_team_name, split_kickoff};
use crate::data::throttle::Throttle;
use crate::data::{ApiFixtureItem, FixtureQuery, FootballApi};
use crate::types::Fixture;

/// A normalized fixture awaiting enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureShell {
    pub record: Fixture,
    /// Season used for the statistics lookup.
    pub season: i32,
}

pub struct FixtureFetcher {
    api: Arc<dyn FootballApi>,
    throttle: Arc<Throttle>,
}

impl FixtureFetcher {
    pub fn new(api: Arc<dyn FootballApi>, throttle: Arc<Throttle>) -> Self {
        Self { api, throttle }
    }

    /// Fetch and normalize. Never fails; upstream problems are logged.
    ///
    /// `fallback_season` is used when the upstream league carries none.
    pub async fn fetch(
        &self,
        key: &SecretString,
        query: &FixtureQuery,
        fallback_season: i32,
        now_millis: i64,
    ) -> Vec<FixtureShell> {
        self.throttle.wait().await;

        let items = match self.api.fixtures(key, query).await {
            Ok(items) => items,
            Err(e) => {
                error!(query = %query.label(), error = %e, "Fixture fetch failed");
                return Vec::new();
            }
        };

        let shells: Vec<FixtureShell> = items
            .iter()
            .filter_map(|item| Self::to_shell(item, fallback_season, now_millis))
            .collect();

        debug!(
            query = %query.label(),
            upstream = items.len(),
            kept = shells.len(),
            "Fixtures fetched"
        );
        shells
    }

    /// Normalize one upstream item. `None` when its kickoff is unreadable.
    pub fn to_shell(item: &ApiFixtureItem, fallback_season: i32, now_millis: i64) -> Option<FixtureShell> {
        let Some(kickoff) = split_kickoff(&item.fixture.date) else {
            warn!(
                fixture_id = item.fixture.id,
                date = %item.fixture.date,
                "Skipping fixture with unreadable kickoff"
            );
            return None;
        };

        let record = Fixture {
            fixture_id: item.fixture.id,
            home_team: clean_team_name(&item.teams.home.name),
            away_team: clean_team_name(&item.teams.away.name),
            home_team_id: item.teams.home.id,
            away_team_id: item.teams.away.id,
            league: item.league.name.clone(),
            league_id: item.league.id,
            date: kickoff.date,
            time: kickoff.time,
            timestamp: kickoff.timestamp,
            status: item.fixture.status.short.clone(),
            home_stats: None,
            away_stats: None,
            h2h: Vec::new(),
            last_updated: now_millis,
        };

        Some(FixtureShell {
            record,
            season: item.league.season.unwrap_or(fallback_season),
        })
    }
}
