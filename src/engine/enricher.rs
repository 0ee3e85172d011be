//! Fixture enrichment.
//!
//! Attaches both teams' season statistics and their head-to-head history
//! to each fixture. The three lookups are independent: a failed one leaves
//! its field null / empty, is logged, and is reported through
//! [`EnrichmentOutcome`]. The fixture itself is always kept.

use secrecy::SecretString;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::fetcher::FixtureShell;
use crate::data::throttle::Throttle;
use crate::data::FootballApi;
use crate::types::Fixture;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one enrichment lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum EnrichmentOutcome<T> {
    Fetched(T),
    Failed(String),
    /// Enrichment is disabled.
    Skipped,
}

impl<T> EnrichmentOutcome<T> {
    pub fn is_failed(&self) -> bool {
        matches!(self, EnrichmentOutcome::Failed(_))
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            EnrichmentOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// The fetched value, or `fallback` for failures and skips.
    pub fn into_value_or(self, fallback: T) -> T {
        match self {
            EnrichmentOutcome::Fetched(v) => v,
            _ => fallback,
        }
    }
}

/// Which lookup an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentField {
    HomeStats,
    AwayStats,
    HeadToHead,
}

/// All three lookups for one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub home_stats: EnrichmentOutcome<Option<Value>>,
    pub away_stats: EnrichmentOutcome<Option<Value>>,
    pub h2h: EnrichmentOutcome<Vec<Value>>,
}

impl Enrichment {
    pub fn skipped() -> Self {
        Self {
            home_stats: EnrichmentOutcome::Skipped,
            away_stats: EnrichmentOutcome::Skipped,
            h2h: EnrichmentOutcome::Skipped,
        }
    }

    /// Failures as `(field, reason)` pairs.
    pub fn failures(&self) -> Vec<(EnrichmentField, String)> {
        let mut out = Vec::new();
        if let Some(r) = self.home_stats.failure_reason() {
            out.push((EnrichmentField::HomeStats, r.to_string()));
        }
        if let Some(r) = self.away_stats.failure_reason() {
            out.push((EnrichmentField::AwayStats, r.to_string()));
        }
        if let Some(r) = self.h2h.failure_reason() {
            out.push((EnrichmentField::HeadToHead, r.to_string()));
        }
        out
    }

    /// Move the fetched values onto the record.
    pub fn apply(self, fixture: &mut Fixture) {
        fixture.home_stats = self.home_stats.into_value_or(None);
        fixture.away_stats = self.away_stats.into_value_or(None);
        fixture.h2h = self.h2h.into_value_or(Vec::new());
    }
}

/// A lookup that failed, for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentFailure {
    pub fixture_id: i64,
    pub field: EnrichmentField,
    pub reason: String,
}

/// Enriched fixtures plus what went wrong on the way.
#[derive(Debug, Clone, Default)]
pub struct EnrichedBatch {
    pub fixtures: Vec<Fixture>,
    pub failures: Vec<EnrichmentFailure>,
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

pub struct Enricher {
    api: Arc<dyn FootballApi>,
    throttle: Arc<Throttle>,
    enabled: bool,
    h2h_last: Option<u32>,
}

impl Enricher {
    pub fn new(
        api: Arc<dyn FootballApi>,
        throttle: Arc<Throttle>,
        enabled: bool,
        h2h_last: Option<u32>,
    ) -> Self {
        Self { api, throttle, enabled, h2h_last }
    }

    /// Run the three lookups for one fixture.
    pub async fn enrich(&self, key: &SecretString, shell: &FixtureShell) -> Enrichment {
        if !self.enabled {
            return Enrichment::skipped();
        }
        let r = &shell.record;

        self.throttle.wait().await;
        let home_stats = match self
            .api
            .team_statistics(key, r.home_team_id, r.league_id, shell.season)
            .await
        {
            Ok(stats) => EnrichmentOutcome::Fetched(stats),
            Err(e) => {
                warn!(team_id = r.home_team_id, error = %e, "Team statistics unavailable");
                EnrichmentOutcome::Failed(e.to_string())
            }
        };

        self.throttle.wait().await;
        let away_stats = match self
            .api
            .team_statistics(key, r.away_team_id, r.league_id, shell.season)
            .await
        {
            Ok(stats) => EnrichmentOutcome::Fetched(stats),
            Err(e) => {
                warn!(team_id = r.away_team_id, error = %e, "Team statistics unavailable");
                EnrichmentOutcome::Failed(e.to_string())
            }
        };

        self.throttle.wait().await;
        let h2h = match self
            .api
            .head_to_head(key, r.home_team_id, r.away_team_id, self.h2h_last)
            .await
        {
            Ok(meetings) => EnrichmentOutcome::Fetched(meetings),
            Err(e) => {
                warn!(fixture_id = r.fixture_id, error = %e, "Head-to-head unavailable");
                EnrichmentOutcome::Failed(e.to_string())
            }
        };

        Enrichment { home_stats, away_stats, h2h }
    }

    /// Enrich every shell, in order, one at a time.
    pub async fn enrich_batch(&self, key: &SecretString, shells: Vec<FixtureShell>) -> EnrichedBatch {
        let mut batch = EnrichedBatch {
            fixtures: Vec::with_capacity(shells.len()),
            failures: Vec::new(),
        };
        if shells.is_empty() {
            return batch;
        }

        for shell in shells {
            let enrichment = self.enrich(key, &shell).await;
            let fixture_id = shell.record.fixture_id;
            batch.failures.extend(enrichment.failures().into_iter().map(|(field, reason)| {
                EnrichmentFailure { fixture_id, field, reason }
            }));

            let mut record = shell.record;
            enrichment.apply(&mut record);
            batch.fixtures.push(record);
        }

        info!(
            fixtures = batch.fixtures.len(),
            failed_lookups = batch.failures.len(),
            enabled = self.enabled,
            "Batch enrichment complete"
        );
        batch
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
