//! Upstream football data.
//!
//! Defines the [`FootballApi`] trait over API-Football and the typed shapes
//! of the parts of its payloads the pipeline reads. Statistics and
//! head-to-head entries stay opaque JSON; they are passed through verbatim.

pub mod football;
pub mod normalize;
pub mod throttle;

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Which fixtures to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureQuery {
    /// One league over an inclusive date range.
    LeagueRange {
        league_id: i64,
        season: i32,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// Every league on one date.
    Date(NaiveDate),
}

impl FixtureQuery {
    /// Query-string parameters for `/fixtures`.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            FixtureQuery::LeagueRange { league_id, season, from, to } => vec![
                ("league", league_id.to_string()),
                ("season", season.to_string()),
                ("from", normalize::format_date(*from)),
                ("to", normalize::format_date(*to)),
            ],
            FixtureQuery::Date(date) => vec![("date", normalize::format_date(*date))],
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            FixtureQuery::LeagueRange { league_id, from, to, .. } => {
                format!("league {league_id} {from}..{to}")
            }
            FixtureQuery::Date(date) => format!("date {date}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream payloads (API-Football v3)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFixtureItem {
    pub fixture: ApiFixture,
    pub league: ApiLeague,
    pub teams: ApiTeams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiFixture {
    pub id: i64,
    /// ISO 8601 kickoff with offset, e.g. `2024-03-05T19:00:00+03:00`.
    pub date: String,
    pub status: ApiStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub short: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiLeague {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub season: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTeams {
    pub home: ApiTeam,
    pub away: ApiTeam,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTeam {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode upstream payload: {0}")]
    Decode(String),

    /// API-Football reports quota and parameter problems in an `errors`
    /// field of an HTTP 200 response.
    #[error("upstream reported errors: {0}")]
    Api(String),
}

impl UpstreamError {
    /// Build from a transport error, dropping the URL (it may carry keys).
    pub fn transport(e: reqwest::Error) -> Self {
        UpstreamError::Transport(e.without_url().to_string())
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over the football data provider.
///
/// The API key is passed per call: it is read from remote config at the
/// start of each run and never stored on the client.
#[async_trait]
pub trait FootballApi: Send + Sync {
    /// List fixtures.
    async fn fixtures(
        &self,
        key: &SecretString,
        query: &FixtureQuery,
    ) -> Result<Vec<ApiFixtureItem>, UpstreamError>;

    /// Season statistics for one team in one league. `None` when the
    /// provider has nothing for that team.
    async fn team_statistics(
        &self,
        key: &SecretString,
        team_id: i64,
        league_id: i64,
        season: i32,
    ) -> Result<Option<Value>, UpstreamError>;

    /// Past meetings between two teams.
    async fn head_to_head(
        &self,
        key: &SecretString,
        home_team_id: i64,
        away_team_id: i64,
        last: Option<u32>,
    ) -> Result<Vec<Value>, UpstreamError>;

    /// Forward an arbitrary GET and return the raw payload.
    async fn raw(
        &self,
        key: &SecretString,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, UpstreamError>;
}
