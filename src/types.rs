//! Shared types for the match pool service.
//!
//! These are the records persisted in the realtime database and the
//! summaries passed between the pipeline stages. Store records use
//! camelCase field names so the mobile client can read them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// One cached match, stored at `matchPool/{date}/{fixtureId}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub league: String,
    pub league_id: i64,
    /// `YYYY-MM-DD`, partition key in the pool.
    pub date: String,
    /// `HH:MM`, as printed in the upstream kickoff string.
    pub time: String,
    /// Kickoff instant in epoch millis.
    pub timestamp: i64,
    /// Upstream short status code (`NS`, `1H`, `FT`, ...).
    pub status: String,
    // The database drops nulls and empty arrays, so both must default on read.
    #[serde(default)]
    pub home_stats: Option<serde_json::Value>,
    #[serde(default)]
    pub away_stats: Option<serde_json::Value>,
    #[serde(default)]
    pub h2h: Vec<serde_json::Value>,
    pub last_updated: i64,
}

impl Fixture {
    /// Helper to build a test fixture with sensible defaults.
    #[cfg(test)]
    pub fn sample(fixture_id: i64, date: &str, timestamp: i64) -> Self {
        Fixture {
            fixture_id,
            home_team: "Goztepe".to_string(),
            away_team: "Besiktas".to_string(),
            home_team_id: 994,
            away_team_id: 549,
            league: "Super Lig".to_string(),
            league_id: 203,
            date: date.to_string(),
            time: "19:00".to_string(),
            timestamp,
            status: "NS".to_string(),
            home_stats: None,
            away_stats: None,
            h2h: Vec::new(),
            last_updated: timestamp,
        }
    }
}

impl fmt::Display for Fixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} vs {} ({}, {} {}, {})",
            self.fixture_id,
            self.home_team,
            self.away_team,
            self.league,
            self.date,
            self.time,
            self.status,
        )
    }
}

// ---------------------------------------------------------------------------
// Pool metadata
// ---------------------------------------------------------------------------

/// A timestamp field that is either a concrete value or a request for the
/// database to stamp its own clock (`{".sv": "timestamp"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreTimestamp {
    Millis(i64),
    Server {
        #[serde(rename = ".sv")]
        sv: String,
    },
}

impl StoreTimestamp {
    /// The server-assigned placeholder.
    pub fn server() -> Self {
        StoreTimestamp::Server { sv: "timestamp".to_string() }
    }

    pub fn millis(&self) -> Option<i64> {
        match self {
            StoreTimestamp::Millis(ms) => Some(*ms),
            StoreTimestamp::Server { .. } => None,
        }
    }
}

/// Singleton aggregate at `poolMetadata`, overwritten on every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetadata {
    pub last_update: StoreTimestamp,
    pub total_matches: u64,
    #[serde(default)]
    pub leagues: Vec<i64>,
    pub next_update: i64,
}

// ---------------------------------------------------------------------------
// Refresh summary
// ---------------------------------------------------------------------------

/// Outcome of one pipeline run, returned by the manual trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub total_matches: u64,
    /// Number of distinct leagues touched.
    pub leagues: usize,
    pub timestamp: DateTime<Utc>,
    /// Records removed by the janitor at the end of the run.
    #[serde(default)]
    pub pruned: usize,
}

impl fmt::Display for RefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "refresh at {}: matches={} leagues={} pruned={}",
            self.timestamp.to_rfc3339(),
            self.total_matches,
            self.leagues,
            self.pruned,
        )
    }
}

// ---------------------------------------------------------------------------
// Purchases
// ---------------------------------------------------------------------------

/// A verified store purchase, stored at `purchases/{userId}/{tokenKey}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub product_id: String,
    #[serde(default)]
    pub order_id: String,
    pub package_name: String,
    #[serde(default)]
    pub purchase_token: String,
    /// Purchase (or subscription start) time in epoch millis.
    #[serde(default)]
    pub purchase_time: i64,
    pub verified: bool,
    pub acknowledged: bool,
    pub verified_at: i64,
    pub is_subscription: bool,
    /// Raw upstream code: `paymentState` for subscriptions,
    /// `purchaseState` for one-time products.
    #[serde(default)]
    pub purchase_state: i64,
}

impl PurchaseRecord {
    /// Replay guard: nothing left to do for this token.
    pub fn is_settled(&self) -> bool {
        self.verified && self.acknowledged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
