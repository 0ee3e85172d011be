//! Twice-daily trigger.
//!
//! Fires at fixed wall-clock times at a fixed UTC offset. A failed run is
//! logged and the loop moves on to the next fire time.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::pipeline::MatchPoolRefresher;

/// The first fire time strictly after `now`. `None` when `times` is empty.
pub fn next_fire(now: DateTime<Utc>, times: &[NaiveTime], offset: FixedOffset) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&offset).date_naive();

    [today, today + Duration::days(1)]
        .iter()
        .flat_map(|day| times.iter().map(move |t| day.and_time(*t)))
        .filter_map(|local| offset.from_local_datetime(&local).single())
        .map(|fire| fire.with_timezone(&Utc))
        .filter(|fire| *fire > now)
        .min()
}

pub struct Scheduler {
    refresher: Arc<MatchPoolRefresher>,
    times: Vec<NaiveTime>,
    offset: FixedOffset,
    timezone: String,
}

impl Scheduler {
    pub fn new(
        refresher: Arc<MatchPoolRefresher>,
        times: Vec<NaiveTime>,
        offset: FixedOffset,
        timezone: impl Into<String>,
    ) -> Self {
        Self { refresher, times, offset, timezone: timezone.into() }
    }

    /// Run forever. Callers stop it by dropping the future.
    pub async fn run(&self) {
        loop {
            let now = Utc::now();
            let Some(fire_at) = next_fire(now, &self.times, self.offset) else {
                warn!("No schedule times configured, scheduler idle");
                std::future::pending::<()>().await;
                return;
            };

            info!(
                next_run = %fire_at.with_timezone(&self.offset),
                timezone = %self.timezone,
                "Next scheduled refresh"
            );
            let wait = (fire_at - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            match self.refresher.run_scheduled().await {
                Ok(summary) => info!(%summary, "Scheduled refresh finished"),
                Err(e) => error!(error = %e, "Scheduled refresh failed, continuing"),
            }
        }
    }
}
