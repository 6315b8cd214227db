//! Cron-like triggers for the daily and weekly sync runs.

use crate::config::SyncConfig;
use crate::models::SyncFrequency;
use crate::sync::orchestrator::{SyncEngine, SyncRunReport};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use service_core::error::AppError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Daily,
    /// Once a week on the configured weekday.
    Weekly(Weekday),
}

impl Trigger {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly(_) => "weekly",
        }
    }

    pub fn frequency(&self) -> SyncFrequency {
        match self {
            Self::Daily => SyncFrequency::Daily,
            Self::Weekly(_) => SyncFrequency::Weekly,
        }
    }
}

/// First firing time strictly after `now`.
pub fn next_fire_after(trigger: Trigger, at: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let (mut date, step) = match trigger {
        Trigger::Daily => (today, 1),
        Trigger::Weekly(day) => {
            let ahead = (7 + day.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
            (today + Duration::days(i64::from(ahead)), 7)
        }
    };
    if date.and_time(at).and_utc() <= now {
        date += Duration::days(step);
    }
    date.and_time(at).and_utc()
}

pub struct SyncScheduler {
    engine: SyncEngine,
    triggers: Vec<Trigger>,
    at: NaiveTime,
    shutdown_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncScheduler {
    pub fn new(engine: SyncEngine, config: &SyncConfig) -> Self {
        let at = NaiveTime::from_hms_opt(config.run_hour, config.run_minute, 0)
            .unwrap_or(NaiveTime::MIN);
        Self {
            engine,
            triggers: vec![Trigger::Daily, Trigger::Weekly(config.weekly_day)],
            at,
            shutdown_token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Spawn one task per trigger. Calling it again is a no-op.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        for trigger in self.triggers.clone() {
            let engine = self.engine.clone();
            let shutdown = self.shutdown_token.clone();
            let at = self.at;

            self.tasks.push(tokio::spawn(async move {
                loop {
                    let now = Utc::now();
                    let next = next_fire_after(trigger, at, now);
                    let wait = (next - now).to_std().unwrap_or_default();
                    tracing::info!(trigger = trigger.name(), next_run = %next, "Sync trigger armed");

                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {}
                    }

                    let _guard = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        guard = engine.lock_runs() => guard,
                    };

                    // Not cancellable: shutdown waits for the run to finish.
                    if let Err(e) = engine
                        .run_for_frequency(trigger.frequency(), Utc::now().date_naive())
                        .await
                    {
                        tracing::error!(trigger = trigger.name(), error = %e, "Scheduled sync run failed");
                    }
                }
                tracing::info!(trigger = trigger.name(), "Sync trigger stopped");
            }));
        }

        tracing::info!(triggers = self.tasks.len(), at = %self.at, "Sync scheduler started");
    }

    /// Run a cadence immediately, serialised with the scheduled runs.
    pub async fn run_now(&self, frequency: SyncFrequency) -> Result<SyncRunReport, AppError> {
        let _guard = self.engine.lock_runs().await;
        self.engine
            .run_for_frequency(frequency, Utc::now().date_naive())
            .await
    }

    /// Stop waiting triggers and wait for an in-flight run to finish.
    pub async fn shutdown(self) {
        tracing::info!("Initiating sync scheduler shutdown");
        self.shutdown_token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Sync trigger task failed");
            }
        }
        tracing::info!("Sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn daily_fires_later_today_or_tomorrow() {
        assert_eq!(
            next_fire_after(Trigger::Daily, at(2), utc(2024, 3, 6, 1, 30)),
            utc(2024, 3, 6, 2, 0)
        );
        assert_eq!(
            next_fire_after(Trigger::Daily, at(2), utc(2024, 3, 6, 2, 0)),
            utc(2024, 3, 7, 2, 0)
        );
    }

    #[test]
    fn weekly_fires_on_next_sunday() {
        // 2024-03-06 is a Wednesday.
        assert_eq!(
            next_fire_after(Trigger::Weekly(Weekday::Sun), at(2), utc(2024, 3, 6, 12, 0)),
            utc(2024, 3, 10, 2, 0)
        );
        // Sunday after the slot rolls a full week.
        assert_eq!(
            next_fire_after(Trigger::Weekly(Weekday::Sun), at(2), utc(2024, 3, 10, 3, 0)),
            utc(2024, 3, 17, 2, 0)
        );
        // Sunday before the slot fires the same day.
        assert_eq!(
            next_fire_after(Trigger::Weekly(Weekday::Sun), at(2), utc(2024, 3, 10, 1, 0)),
            utc(2024, 3, 10, 2, 0)
        );
    }

    #[test]
    fn triggers_map_to_cadences() {
        assert_eq!(Trigger::Daily.frequency(), SyncFrequency::Daily);
        assert_eq!(Trigger::Weekly(Weekday::Mon).frequency(), SyncFrequency::Weekly);
        assert_eq!(Trigger::Weekly(Weekday::Mon).name(), "weekly");
    }
}
