//! matchpool: entry point.
//!
//! Loads configuration, initialises structured logging, wires the store
//! and upstream clients, serves the HTTP endpoints and runs the refresh
//! schedule until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use matchpool::auth::firebase::FirebaseTokenVerifier;
use matchpool::auth::oauth::{RemoteConfigTokenSource, ServiceAccountKey, ServiceAccountTokenSource, TokenSource};
use matchpool::config::{self, StoreBackend};
use matchpool::data::football::ApiFootballClient;
use matchpool::engine::scheduler::Scheduler;
use matchpool::engine::MatchPoolRefresher;
use matchpool::gateway::ProxyGateway;
use matchpool::llm::gemini::GeminiClient;
use matchpool::purchases::play::{GooglePlayClient, ANDROID_PUBLISHER_SCOPE};
use matchpool::purchases::PurchaseVerifier;
use matchpool::server::{self, ServiceState};
use matchpool::storage::memory::MemoryStore;
use matchpool::storage::rtdb::{RtdbStore, DATABASE_SCOPES};
use matchpool::storage::KeyValueStore;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("MATCHPOOL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    info!(
        config = %config_path,
        store = ?cfg.store.backend,
        leagues = ?cfg.football.leagues,
        "matchpool starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = build_store(&cfg)?;

    let football = Arc::new(
        ApiFootballClient::new(&cfg.football.base_url, Duration::from_secs(cfg.football.timeout_secs))
            .context("Failed to build API-Football client")?,
    );
    let llm = Arc::new(
        GeminiClient::new(&cfg.llm.base_url, &cfg.llm.model, Duration::from_secs(cfg.llm.timeout_secs))
            .context("Failed to build Gemini client")?,
    );

    let play_tokens: Arc<dyn TokenSource> = Arc::new(RemoteConfigTokenSource::new(
        store.clone(),
        &cfg.secrets.service_account,
        &[ANDROID_PUBLISHER_SCOPE],
    ));
    let play = Arc::new(
        GooglePlayClient::new(
            &cfg.purchases.play_base_url,
            play_tokens,
            Duration::from_secs(cfg.purchases.timeout_secs),
        )
        .context("Failed to build Play Developer client")?,
    );

    let identity = Arc::new(
        FirebaseTokenVerifier::new(&cfg.auth.project_id).context("Failed to build ID token verifier")?,
    );

    let refresher = Arc::new(MatchPoolRefresher::new(store.clone(), football.clone(), &cfg));

    // -- HTTP server -----------------------------------------------------

    if cfg.server.enabled {
        let state = Arc::new(ServiceState {
            refresher: refresher.clone(),
            gateway: ProxyGateway::new(store.clone(), llm, football, cfg.secrets.clone()),
            purchases: PurchaseVerifier::new(store.clone(), play, cfg.purchases.subscription_patterns.clone()),
            identity,
        });
        server::spawn_server(state, cfg.server.port).await?;
    } else {
        info!("HTTP server disabled");
    }

    // -- Schedule --------------------------------------------------------

    let shutdown = tokio::signal::ctrl_c();

    if cfg.schedule.enabled {
        let scheduler = Scheduler::new(
            refresher,
            cfg.schedule.fire_times()?,
            cfg.schedule.offset()?,
            cfg.schedule.timezone.clone(),
        );
        info!(
            times = ?cfg.schedule.times,
            timezone = %cfg.schedule.timezone,
            "Scheduler running. Press Ctrl+C to stop."
        );
        tokio::select! {
            _ = scheduler.run() => {}
            _ = shutdown => info!("Shutdown signal received."),
        }
    } else {
        info!("Scheduler disabled. Press Ctrl+C to stop.");
        shutdown.await.context("Failed to listen for Ctrl+C")?;
        info!("Shutdown signal received.");
    }

    info!("matchpool shut down cleanly.");
    Ok(())
}

/// Build the configured store backend.
fn build_store(cfg: &config::AppConfig) -> Result<Arc<dyn KeyValueStore>> {
    match cfg.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory store; nothing is persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Rtdb => {
            let tokens: Option<Arc<dyn TokenSource>> = match cfg.store.credentials_path() {
                Some(path) => {
                    let key = ServiceAccountKey::from_file(&path)
                        .with_context(|| format!("Failed to load service account from {path}"))?;
                    info!(client_email = %key.client_email, "Database access via service account");
                    Some(Arc::new(ServiceAccountTokenSource::new(key, DATABASE_SCOPES)?))
                }
                None => {
                    warn!("No database credentials configured, using unauthenticated access");
                    None
                }
            };

            let store = RtdbStore::new(
                &cfg.store.database_url,
                tokens,
                Duration::from_secs(cfg.store.timeout_secs),
            )?;
            Ok(Arc::new(store))
        }
    }
}

/// Initialise the tracing subscriber.
///
/// Defaults to `matchpool=info`; `RUST_LOG` overrides. Set
/// `MATCHPOOL_LOG_JSON` for JSON lines.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchpool=info"));

    let json_logging = std::env::var("MATCHPOOL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
