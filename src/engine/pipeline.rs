//! Match pool refresh: fetch → enrich → write → prune.
//!
//! One run is strictly sequential. Every football call of the run goes
//! through the same [`Throttle`], so the provider sees at most one call
//! per interval no matter which stage issues it.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use super::enricher::Enricher;
use super::fetcher::FixtureFetcher;
use super::janitor::PoolJanitor;
use super::writer::PoolWriter;
use crate::config::AppConfig;
use crate::data::normalize::season_for;
use crate::data::throttle::Throttle;
use crate::data::{FixtureQuery, FootballApi};
use crate::storage::{read_secret, KeyValueStore};
use crate::types::{Fixture, RefreshSummary};

/// What a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Each configured league over an inclusive date range.
    Leagues { from: NaiveDate, to: NaiveDate },
    /// Every league on one date.
    Date(NaiveDate),
}

impl RefreshPlan {
    /// Parse a `YYYY-MM-DD` date parameter into a single-date plan.
    pub fn for_date_param(raw: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{raw}', expected YYYY-MM-DD"))?;
        Ok(RefreshPlan::Date(date))
    }
}

pub struct MatchPoolRefresher {
    store: Arc<dyn KeyValueStore>,
    fetcher: FixtureFetcher,
    enricher: Enricher,
    writer: PoolWriter,
    janitor: PoolJanitor,
    football_key: String,
    leagues: Vec<i64>,
    days_ahead: i64,
    rollover_month: u32,
}

impl MatchPoolRefresher {
    pub fn new(store: Arc<dyn KeyValueStore>, api: Arc<dyn FootballApi>, cfg: &AppConfig) -> Self {
        let throttle = Arc::new(Throttle::new(StdDuration::from_millis(cfg.football.throttle_ms)));
        Self::with_throttle(store, api, cfg, throttle)
    }

    /// Build with an explicit gate (tests pass an unlimited one).
    pub fn with_throttle(
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn FootballApi>,
        cfg: &AppConfig,
        throttle: Arc<Throttle>,
    ) -> Self {
        Self {
            fetcher: FixtureFetcher::new(api.clone(), throttle.clone()),
            enricher: Enricher::new(api, throttle, cfg.pipeline.enrich, cfg.football.h2h_last),
            writer: PoolWriter::new(store.clone(), Duration::hours(cfg.pipeline.next_update_hours)),
            janitor: PoolJanitor::new(store.clone()),
            store,
            football_key: cfg.secrets.football_key.clone(),
            leagues: cfg.football.leagues.clone(),
            days_ahead: cfg.pipeline.days_ahead,
            rollover_month: cfg.football.season_rollover_month,
        }
    }

    /// Today through today + `days_ahead`, UTC.
    pub fn default_plan(&self, now: DateTime<Utc>) -> RefreshPlan {
        let from = now.date_naive();
        RefreshPlan::Leagues { from, to: from + Duration::days(self.days_ahead) }
    }

    /// Run the configured league refresh now.
    pub async fn run_scheduled(&self) -> Result<RefreshSummary> {
        let now = Utc::now();
        self.run_at(self.default_plan(now), now).await
    }

    pub async fn run(&self, plan: RefreshPlan) -> Result<RefreshSummary> {
        self.run_at(plan, Utc::now()).await
    }

    /// Run `plan` as if the clock read `now`.
    pub async fn run_at(&self, plan: RefreshPlan, now: DateTime<Utc>) -> Result<RefreshSummary> {
        info!(?plan, "Starting match pool refresh");

        let key = read_secret(self.store.as_ref(), &self.football_key)
            .await?
            .ok_or_else(|| anyhow!("{} not found in remote config", self.football_key))?;

        let now_millis = now.timestamp_millis();
        let mut fixtures: Vec<Fixture> = Vec::new();

        match plan {
            RefreshPlan::Leagues { from, to } => {
                let season = season_for(from, self.rollover_month);
                for &league_id in &self.leagues {
                    let query = FixtureQuery::LeagueRange { league_id, season, from, to };
                    let shells = self.fetcher.fetch(&key, &query, season, now_millis).await;
                    let batch = self.enricher.enrich_batch(&key, shells).await;
                    info!(
                        league_id,
                        fixtures = batch.fixtures.len(),
                        failed_lookups = batch.failures.len(),
                        "League processed"
                    );
                    fixtures.extend(batch.fixtures);
                }
            }
            RefreshPlan::Date(date) => {
                let season = season_for(date, self.rollover_month);
                let query = FixtureQuery::Date(date);
                let shells = self.fetcher.fetch(&key, &query, season, now_millis).await;
                let batch = self.enricher.enrich_batch(&key, shells).await;
                info!(%date, fixtures = batch.fixtures.len(), "Date processed");
                fixtures.extend(batch.fixtures);
            }
        }

        if fixtures.is_empty() {
            warn!("Refresh produced no fixtures");
        }

        let metadata = self.writer.write(&fixtures, now).await?;
        let pruned = self.janitor.prune(now).await?;

        let summary = RefreshSummary {
            total_matches: metadata.total_matches,
            leagues: metadata.leagues.len(),
            timestamp: now,
            pruned,
        };
        info!(%summary, "Match pool refresh complete");
        Ok(summary)
    }
}
