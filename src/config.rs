//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, service-account JSON) are never in the file: the
//! config names the `remoteConfig/{KEY}` entries that hold them, and the
//! database credentials are referenced by env-var name.

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub football: FootballConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub purchases: PurchasesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { enabled: true, port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Firebase Realtime Database over REST.
    Rtdb,
    /// In-process tree; for local runs only.
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: String,
    /// Env var holding the path of a service-account JSON file.
    /// Unset means unauthenticated access (emulator).
    #[serde(default)]
    pub credentials_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl StoreConfig {
    /// Service-account file path named by `credentials_env`. `None` when
    /// no variable is configured, or it is unset or blank.
    pub fn credentials_path(&self) -> Option<String> {
        let name = self.credentials_env.as_deref()?;
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: String::new(),
            credentials_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Names of the `remoteConfig/*` entries holding secrets.
#[derive(Debug, Deserialize, Clone)]
pub struct SecretsConfig {
    pub football_key: String,
    pub gemini_key: String,
    pub service_account: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            football_key: "API_FOOTBALL_KEY".to_string(),
            gemini_key: "GEMINI_API_KEY".to_string(),
            service_account: "GOOGLE_SERVICE_ACCOUNT".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FootballConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Leagues refreshed by the scheduled run.
    pub leagues: Vec<i64>,
    /// Minimum spacing between upstream calls.
    pub throttle_ms: u64,
    /// Months before this one belong to the previous season.
    /// 1 means the season is always the calendar year.
    pub season_rollover_month: u32,
    /// Optional `last` limit for head-to-head history.
    #[serde(default)]
    pub h2h_last: Option<u32>,
}

impl Default for FootballConfig {
    fn default() -> Self {
        Self {
            base_url: "https://v3.football.api-sports.io".to_string(),
            timeout_secs: 30,
            leagues: vec![203, 39, 140, 78, 135, 61],
            throttle_ms: 400,
            season_rollover_month: 1,
            h2h_last: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Attach team statistics and head-to-head history.
    pub enrich: bool,
    /// The league refresh covers today through today + `days_ahead`.
    pub days_ahead: i64,
    /// Offset of `poolMetadata.nextUpdate` from the run time.
    pub next_update_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { enrich: true, days_ahead: 1, next_update_hours: 12 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    /// Local fire times, `HH:MM`.
    pub times: Vec<String>,
    /// Label only; the offset below is what the scheduler uses.
    pub timezone: String,
    pub utc_offset_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            times: vec!["06:00".to_string(), "18:00".to_string()],
            timezone: "Europe/Istanbul".to_string(),
            utc_offset_hours: 3,
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured fire times.
    pub fn fire_times(&self) -> Result<Vec<NaiveTime>> {
        self.times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t, "%H:%M")
                    .with_context(|| format!("Invalid schedule time: {t}"))
            })
            .collect()
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .with_context(|| format!("Invalid UTC offset: {}h", self.utc_offset_hours))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Firebase project whose ID tokens are accepted.
    pub project_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PurchasesConfig {
    pub play_base_url: String,
    pub timeout_secs: u64,
    /// A product id containing any of these is a subscription.
    pub subscription_patterns: Vec<String>,
}

impl Default for PurchasesConfig {
    fn default() -> Self {
        Self {
            play_base_url: "https://androidpublisher.googleapis.com".to_string(),
            timeout_secs: 30,
            subscription_patterns: vec![
                "subscription".to_string(),
                "_monthly".to_string(),
                "_yearly".to_string(),
                "premium_".to_string(),
            ],
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }
}
