//! Mock football provider for integration testing.
//!
//! A deterministic `FootballApi` that serves canned fixtures per date and
//! per league, can be told to fail specific calls, and records every call
//! it receives. No network.

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use matchpool::data::{ApiFixtureItem, FixtureQuery, FootballApi, UpstreamError};

/// Build one upstream fixture item.
pub fn fixture_item(id: i64, league_id: i64, kickoff: &str, home: (i64, &str), away: (i64, &str)) -> ApiFixtureItem {
    serde_json::from_value(json!({
        "fixture": {"id": id, "date": kickoff, "status": {"short": "NS"}},
        "league": {"id": league_id, "name": format!("League {league_id}"), "season": 2023},
        "teams": {
            "home": {"id": home.0, "name": home.1},
            "away": {"id": away.0, "name": away.1}
        }
    }))
    .expect("fixture item")
}

#[derive(Default)]
pub struct MockFootball {
    by_date: HashMap<NaiveDate, Vec<ApiFixtureItem>>,
    by_league: HashMap<i64, Vec<ApiFixtureItem>>,
    failing_leagues: HashSet<i64>,
    failing_stats: HashSet<i64>,
    calls: Mutex<Vec<String>>,
    keys_seen: Mutex<HashSet<String>>,
}

impl MockFootball {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date(mut self, date: NaiveDate, items: Vec<ApiFixtureItem>) -> Self {
        self.by_date.insert(date, items);
        self
    }

    pub fn with_league(mut self, league_id: i64, items: Vec<ApiFixtureItem>) -> Self {
        self.by_league.insert(league_id, items);
        self
    }

    /// Fixture listing for this league returns HTTP 500.
    pub fn failing_league(mut self, league_id: i64) -> Self {
        self.failing_leagues.insert(league_id);
        self
    }

    /// Statistics for this team return HTTP 500.
    pub fn failing_stats_for(mut self, team_id: i64) -> Self {
        self.failing_stats.insert(team_id);
        self
    }

    /// Every call so far, e.g. `fixtures date 2024-03-05`, `stats 994`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn keys_seen(&self) -> HashSet<String> {
        self.keys_seen.lock().unwrap().clone()
    }

    fn record(&self, key: &SecretString, call: String) {
        self.keys_seen.lock().unwrap().insert(key.expose_secret().clone());
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl FootballApi for MockFootball {
    async fn fixtures(&self, key: &SecretString, query: &FixtureQuery) -> Result<Vec<ApiFixtureItem>, UpstreamError> {
        self.record(key, format!("fixtures {}", query.label()));
        match query {
            FixtureQuery::Date(date) => Ok(self.by_date.get(date).cloned().unwrap_or_default()),
            FixtureQuery::LeagueRange { league_id, .. } => {
                if self.failing_leagues.contains(league_id) {
                    return Err(UpstreamError::Status { status: 500, body: "upstream down".into() });
                }
                Ok(self.by_league.get(league_id).cloned().unwrap_or_default())
            }
        }
    }

    async fn team_statistics(
        &self,
        key: &SecretString,
        team_id: i64,
        league_id: i64,
        season: i32,
    ) -> Result<Option<Value>, UpstreamError> {
        self.record(key, format!("stats {team_id}"));
        if self.failing_stats.contains(&team_id) {
            return Err(UpstreamError::Status { status: 500, body: "stats unavailable".into() });
        }
        Ok(Some(json!({
            "team": {"id": team_id},
            "league": {"id": league_id, "season": season},
            "form": "WDLWW"
        })))
    }

    async fn head_to_head(
        &self,
        key: &SecretString,
        home_team_id: i64,
        away_team_id: i64,
        _last: Option<u32>,
    ) -> Result<Vec<Value>, UpstreamError> {
        self.record(key, format!("h2h {home_team_id}-{away_team_id}"));
        Ok(vec![json!({"fixture": {"id": 1}, "goals": {"home": 2, "away": 1}})])
    }

    async fn raw(
        &self,
        key: &SecretString,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, UpstreamError> {
        self.record(key, format!("raw {endpoint}"));
        Ok(json!({"errors": [], "endpoint": endpoint, "params": params, "response": []}))
    }
}
