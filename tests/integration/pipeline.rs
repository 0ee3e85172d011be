//! End-to-end refresh runs against the in-memory store.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;

use matchpool::config::AppConfig;
use matchpool::data::throttle::Throttle;
use matchpool::engine::janitor::PoolJanitor;
use matchpool::engine::{MatchPoolRefresher, RefreshPlan};
use matchpool::storage::memory::MemoryStore;
use matchpool::storage::{get_typed, paths};
use matchpool::types::{Fixture, PoolMetadata};

use crate::mock_football::{fixture_item, MockFootball};

fn march_5() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

/// Early morning on the 5th: every fixture of the day is still ahead.
fn run_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap()
}

fn store_with_key() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_data(json!({
        "remoteConfig": {"API_FOOTBALL_KEY": "football-secret"}
    })))
}

fn refresher(store: Arc<MemoryStore>, api: Arc<MockFootball>, cfg: &AppConfig) -> MatchPoolRefresher {
    MatchPoolRefresher::with_throttle(store, api, cfg, Arc::new(Throttle::unlimited()))
}

fn day_fixtures() -> Vec<matchpool::data::ApiFixtureItem> {
    vec![
        fixture_item(1001, 203, "2024-03-05T17:00:00+03:00", (994, "Göztepe"), (549, "Beşiktaş")),
        fixture_item(1002, 203, "2024-03-05T20:00:00+03:00", (611, "Fenerbahçe"), (645, "Galatasaray")),
        fixture_item(1003, 39, "2024-03-05T20:00:00+00:00", (42, "Arsenal"), (49, "Chelsea")),
        fixture_item(1004, 140, "2024-03-05T21:00:00+01:00", (541, "Real Madrid"), (529, "Barcelona")),
    ]
}

#[tokio::test]
async fn test_single_date_writes_every_fixture() {
    let store = store_with_key();
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    let r = refresher(store.clone(), api.clone(), &AppConfig::default());

    let summary = r.run_at(RefreshPlan::Date(march_5()), run_time()).await.unwrap();
    assert_eq!(summary.total_matches, 4);
    assert_eq!(summary.leagues, 3);
    assert_eq!(summary.pruned, 0);

    let day = store.snapshot()["matchPool"]["2024-03-05"].clone();
    assert_eq!(day.as_object().unwrap().len(), 4);

    let meta: PoolMetadata = get_typed(store.as_ref(), paths::POOL_METADATA).await.unwrap().unwrap();
    assert_eq!(meta.total_matches, 4);
    assert_eq!(meta.leagues, vec![39, 140, 203]);
    assert_eq!(meta.next_update, run_time().timestamp_millis() + 12 * 3_600_000);
    assert!(meta.last_update.millis().is_some());

    // One listing, then two stats calls and one h2h per fixture.
    assert_eq!(api.count("fixtures"), 1);
    assert_eq!(api.count("stats"), 8);
    assert_eq!(api.count("h2h"), 4);
    assert_eq!(api.keys_seen().into_iter().collect::<Vec<_>>(), vec!["football-secret".to_string()]);
}

#[tokio::test]
async fn test_stored_records_are_normalized() {
    let store = store_with_key();
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    refresher(store.clone(), api, &AppConfig::default())
        .run_at(RefreshPlan::Date(march_5()), run_time())
        .await
        .unwrap();

    let f: Fixture = get_typed(store.as_ref(), &paths::fixture("2024-03-05", 1001)).await.unwrap().unwrap();
    assert_eq!(f.home_team, "Goztepe");
    assert_eq!(f.away_team, "Besiktas");
    assert_eq!(f.time, "17:00");
    assert_eq!(f.timestamp, 1_709_647_200_000);
    assert_eq!(f.last_updated, run_time().timestamp_millis());
    assert_eq!(f.home_stats.unwrap()["team"]["id"], 994);
    assert_eq!(f.h2h.len(), 1);
}

#[tokio::test]
async fn test_stats_failure_still_writes_fixture() {
    let store = store_with_key();
    let api = Arc::new(
        MockFootball::new()
            .with_date(march_5(), day_fixtures())
            .failing_stats_for(994),
    );
    let summary = refresher(store.clone(), api, &AppConfig::default())
        .run_at(RefreshPlan::Date(march_5()), run_time())
        .await
        .unwrap();
    assert_eq!(summary.total_matches, 4);

    let f: Fixture = get_typed(store.as_ref(), &paths::fixture("2024-03-05", 1001)).await.unwrap().unwrap();
    assert!(f.home_stats.is_none());
    assert!(f.away_stats.is_some());
    assert_eq!(f.h2h.len(), 1);
}

#[tokio::test]
async fn test_enrichment_disabled() {
    let store = store_with_key();
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    let mut cfg = AppConfig::default();
    cfg.pipeline.enrich = false;

    refresher(store.clone(), api.clone(), &cfg)
        .run_at(RefreshPlan::Date(march_5()), run_time())
        .await
        .unwrap();

    assert_eq!(api.count("stats"), 0);
    assert_eq!(api.count("h2h"), 0);
    let f: Fixture = get_typed(store.as_ref(), &paths::fixture("2024-03-05", 1003)).await.unwrap().unwrap();
    assert!(f.home_stats.is_none());
    assert!(f.h2h.is_empty());
}

#[tokio::test]
async fn test_failing_league_does_not_stop_the_others() {
    let store = store_with_key();
    let api = Arc::new(
        MockFootball::new()
            .failing_league(203)
            .with_league(39, vec![fixture_item(2001, 39, "2024-03-05T20:00:00+00:00", (42, "Arsenal"), (49, "Chelsea"))])
            .with_league(61, vec![fixture_item(2002, 61, "2024-03-06T20:00:00+01:00", (85, "PSG"), (81, "Marseille"))]),
    );
    let r = refresher(store.clone(), api.clone(), &AppConfig::default());

    let summary = r.run_at(r.default_plan(run_time()), run_time()).await.unwrap();

    assert_eq!(api.count("fixtures"), 6);
    assert_eq!(summary.total_matches, 2);
    let snap = store.snapshot();
    assert!(snap["matchPool"]["2024-03-05"].get("2001").is_some());
    assert!(snap["matchPool"]["2024-03-06"].get("2002").is_some());
    assert_eq!(snap["poolMetadata"]["leagues"], json!([39, 61]));
}

#[tokio::test]
async fn test_rerun_overwrites_and_prunes_once() {
    let stale_kickoff = Utc.with_ymd_and_hms(2024, 3, 4, 18, 0, 0).unwrap().timestamp_millis();
    let store = Arc::new(MemoryStore::with_data(json!({
        "remoteConfig": {"API_FOOTBALL_KEY": "football-secret"},
        "matchPool": {"2024-03-04": {"999": {"fixtureId": 999, "timestamp": stale_kickoff}}}
    })));
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    let r = refresher(store.clone(), api, &AppConfig::default());

    let first = r.run_at(RefreshPlan::Date(march_5()), run_time()).await.unwrap();
    assert_eq!(first.pruned, 1);
    assert!(store.snapshot()["matchPool"].get("2024-03-04").is_none());

    let second = r.run_at(RefreshPlan::Date(march_5()), run_time()).await.unwrap();
    assert_eq!(second.pruned, 0);
    assert_eq!(second.total_matches, 4);
    assert_eq!(store.snapshot()["matchPool"]["2024-03-05"].as_object().unwrap().len(), 4);
}

#[tokio::test]
async fn test_janitor_after_the_matches() {
    let store = store_with_key();
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    refresher(store.clone(), api, &AppConfig::default())
        .run_at(RefreshPlan::Date(march_5()), run_time())
        .await
        .unwrap();

    // At 21:00 UTC the 14:00 and 17:00 UTC kickoffs are more than 3h old;
    // the two 20:00 UTC kickoffs are not.
    let late = Utc.with_ymd_and_hms(2024, 3, 5, 21, 0, 0).unwrap();
    let janitor = PoolJanitor::new(store.clone());
    assert_eq!(janitor.prune(late).await.unwrap(), 2);
    assert_eq!(janitor.prune(late).await.unwrap(), 0);

    let day = store.snapshot()["matchPool"]["2024-03-05"].clone();
    assert!(day.get("1001").is_none());
    assert!(day.get("1002").is_none());
    assert!(day.get("1003").is_some());
    assert!(day.get("1004").is_some());
}

#[tokio::test]
async fn test_missing_key_aborts_run() {
    let store = Arc::new(MemoryStore::new());
    let api = Arc::new(MockFootball::new().with_date(march_5(), day_fixtures()));
    let err = refresher(store.clone(), api.clone(), &AppConfig::default())
        .run_at(RefreshPlan::Date(march_5()), run_time())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("API_FOOTBALL_KEY"));
    assert!(api.calls().is_empty());
    assert!(store.write_log().is_empty());
}
