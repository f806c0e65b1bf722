//! Polling scheduler and retention timer.
//!
//! Two independent interval loops: one selects the jobs whose due window
//! contains the current time and runs them one after the other, the other
//! sweeps expired records. A failure on one job or record is logged and the
//! tick moves on.

pub mod cleanup;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::backup::BackupEngine;
use crate::models::{Job, ScheduleType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Width of the window after a job's time during which a tick triggers it.
    pub due_window_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 900,
            cleanup_interval_secs: 300,
            due_window_secs: 900,
        }
    }
}

impl SchedulerSettings {
    pub fn due_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.due_window_secs as i64)
    }
}

/// Half-open `[job_time, job_time + window)` check that wraps over midnight.
pub fn is_time_due(now: NaiveTime, job_time: NaiveTime, window: TimeDelta) -> bool {
    let mut elapsed = now.signed_duration_since(job_time);
    if elapsed < TimeDelta::zero() {
        elapsed += TimeDelta::seconds(86_400);
    }
    elapsed < window
}

/// Day the due occurrence was scheduled on; yesterday when the window wrapped past midnight.
fn occurrence_weekday(now: NaiveDateTime, job_time: NaiveTime) -> Weekday {
    let today = now.date().weekday();
    if now.time() < job_time { today.pred() } else { today }
}

pub fn should_run(job: &Job, now: NaiveDateTime, window: TimeDelta) -> bool {
    if !job.active || job.schedule_type == ScheduleType::Manual {
        return false;
    }
    if !is_time_due(now.time(), job.backup_time, window) {
        return false;
    }
    match (job.schedule_type, job.weekly_day) {
        (ScheduleType::Weekly, Some(day)) => occurrence_weekday(now, job.backup_time) == day,
        _ => true,
    }
}

pub struct Scheduler {
    engine: Arc<BackupEngine>,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(engine: Arc<BackupEngine>, settings: SchedulerSettings) -> Self {
        Self { engine, settings }
    }

    /// Runs every due job in sequence, returning how many were triggered.
    pub async fn trigger_due_jobs(&self, now: NaiveDateTime) -> usize {
        let jobs = match self.engine.repository().find_active_scheduled_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!("Scheduler could not load jobs: {}", e);
                return 0;
            }
        };

        let window = self.settings.due_window();
        let mut triggered = 0;
        for job in jobs.iter().filter(|job| should_run(job, now, window)) {
            triggered += 1;
            info!("Triggering scheduled backup for job '{}'", job.name);
            match self.engine.execute_job(job.id).await {
                Ok(run) => info!(
                    "Scheduled backup '{}' finished: {} of {} destinations succeeded",
                    job.name,
                    run.succeeded(),
                    run.outcomes.len()
                ),
                Err(e) => error!("Scheduled backup '{}' failed: {}", job.name, e),
            }
        }
        triggered
    }

    pub async fn run_cleanup(&self, now: NaiveDateTime) -> usize {
        cleanup::run_cleanup(
            self.engine.repository().as_ref(),
            self.engine.storage().as_ref(),
            now,
        )
        .await
    }

    /// Spawns the polling loop and the retention loop.
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let poll = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let sweep = Duration::from_secs(self.settings.cleanup_interval_secs.max(1));
        info!(
            "Scheduler started (poll every {:?}, retention sweep every {:?})",
            poll, sweep
        );

        let scheduler = Arc::clone(&self);
        let polling = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.trigger_due_jobs(Local::now().naive_local()).await;
            }
        });

        let scheduler = self;
        let retention = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.run_cleanup(Local::now().naive_local()).await;
            }
        });

        vec![polling, retention]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;
    use crate::test_support::{job_with, source_with};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn window() -> TimeDelta {
        SchedulerSettings::default().due_window()
    }

    #[test]
    fn window_is_half_open() {
        assert!(is_time_due(at(10, 0, 0), at(10, 0, 0), window()));
        assert!(is_time_due(at(10, 14, 59), at(10, 0, 0), window()));
        assert!(!is_time_due(at(10, 15, 0), at(10, 0, 0), window()));
        assert!(!is_time_due(at(9, 59, 59), at(10, 0, 0), window()));
    }

    #[test]
    fn window_wraps_over_midnight() {
        assert!(is_time_due(at(0, 5, 0), at(23, 55, 0), window()));
        assert!(!is_time_due(at(0, 10, 0), at(23, 55, 0), window()));
    }

    #[test]
    fn weekly_day_filters_on_the_scheduled_occurrence() {
        // 2025-11-02 is a Sunday.
        let sunday_night = NaiveDate::from_ymd_opt(2025, 11, 2).unwrap().and_hms_opt(23, 58, 0).unwrap();
        let monday_after_midnight = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap().and_hms_opt(0, 5, 0).unwrap();

        let mut job = job_with(source_with(DatabaseType::Postgres, "pg_dump"), vec![]);
        job.schedule_type = ScheduleType::Weekly;
        job.backup_time = at(23, 55, 0);
        job.weekly_day = Some(Weekday::Sun);
        assert!(should_run(&job, sunday_night, window()));
        assert!(should_run(&job, monday_after_midnight, window()));

        job.weekly_day = Some(Weekday::Mon);
        assert!(!should_run(&job, sunday_night, window()));
        assert!(!should_run(&job, monday_after_midnight, window()));
    }

    #[test]
    fn weekly_without_day_fires_every_due_tick() {
        let mut job = job_with(source_with(DatabaseType::Postgres, "pg_dump"), vec![]);
        job.schedule_type = ScheduleType::Weekly;
        job.backup_time = at(2, 0, 0);
        for day in 1..=7 {
            let now = NaiveDate::from_ymd_opt(2025, 11, day).unwrap().and_hms_opt(2, 5, 0).unwrap();
            assert!(should_run(&job, now, window()));
        }
    }

    #[test]
    fn manual_and_inactive_jobs_never_run() {
        let now = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap().and_hms_opt(2, 0, 0).unwrap();
        let mut job = job_with(source_with(DatabaseType::Postgres, "pg_dump"), vec![]);
        job.backup_time = at(2, 0, 0);
        assert!(should_run(&job, now, window()));

        job.schedule_type = ScheduleType::Manual;
        assert!(!should_run(&job, now, window()));

        job.schedule_type = ScheduleType::Daily;
        job.active = false;
        assert!(!should_run(&job, now, window()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tick_runs_due_jobs_and_survives_failures() -> anyhow::Result<()> {
        use crate::test_support::{Harness, RecordingStorage, local_destination, write_tool};
        use std::path::Path;

        let tools = tempfile::tempdir()?;
        let good_tool = write_tool(tools.path(), "pg_dump", "printf 'SELECT 1;\\n'\n")?;
        let destination = local_destination(Path::new("/backups"));
        let now = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap().and_hms_opt(2, 5, 0).unwrap();

        let broken = job_with(
            source_with(DatabaseType::Postgres, "/nonexistent/pg_dump"),
            vec![destination.clone()],
        );
        let healthy = job_with(
            source_with(DatabaseType::Postgres, &good_tool.to_string_lossy()),
            vec![destination.clone()],
        );
        let mut later = healthy.clone();
        later.id = uuid::Uuid::new_v4();
        later.backup_time = at(3, 0, 0);

        let harness = Harness::new(
            vec![broken.clone(), healthy.clone(), later.clone()],
            vec![],
            RecordingStorage::default(),
        )?;
        let scheduler = Scheduler::new(harness.engine.clone(), SchedulerSettings::default());

        assert_eq!(scheduler.trigger_due_jobs(now).await, 2);
        let repository = harness.engine.repository();
        assert_eq!(repository.list_records(broken.id).await?.len(), 1);
        assert_eq!(repository.list_records(healthy.id).await?.len(), 1);
        assert!(repository.list_records(later.id).await?.is_empty());
        assert_eq!(harness.storage.uploads().len(), 1);
        Ok(())
    }

    #[test]
    fn settings_default_when_missing() {
        let settings: SchedulerSettings = serde_json::from_value(serde_json::json!({
            "cleanup_interval_secs": 60
        }))
        .unwrap();
        assert_eq!(settings.poll_interval_secs, 900);
        assert_eq!(settings.cleanup_interval_secs, 60);
    }
}
