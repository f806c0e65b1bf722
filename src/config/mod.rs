// backupctl/src/config/mod.rs
use anyhow::{Context, Result};
use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Destination, EmailConfig, Job, NotificationPolicy, ScheduleType, Source};
use crate::scheduler::SchedulerSettings;

pub const CONFIG_PATH_ENV: &str = "BACKUPCTL_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.json";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonJob {
    pub id: Uuid,
    pub name: String,
    pub source_id: Uuid,
    #[serde(default)]
    pub destination_ids: Vec<Uuid>,
    pub schedule_type: ScheduleType,
    pub backup_time: String,
    pub weekly_day: Option<String>,
    pub retention_days: u32,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub notification_policy: NotificationPolicy,
    pub notification_recipients: Option<String>,
    pub email_config_id: Option<Uuid>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub scratch_dir: Option<PathBuf>,
    pub records_file: Option<PathBuf>,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub destinations: Vec<Destination>,
    #[serde(default)]
    pub email_configs: Vec<EmailConfig>,
    #[serde(default)]
    pub jobs: Vec<JsonJob>,
}

/// Validated configuration records, with jobs resolved against their source and destinations.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    pub sources: Vec<Source>,
    pub destinations: Vec<Destination>,
    pub email_configs: Vec<EmailConfig>,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub scratch_dir: PathBuf,
    pub records_file: Option<PathBuf>,
    pub scheduler: SchedulerSettings,
    pub catalogue: Catalogue,
}

impl AppConfig {
    /// `BACKUPCTL_CONFIG` if set, `config.json` in the working directory otherwise.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        Self::from_raw(raw_json_config)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    pub fn from_raw(raw: RawJsonConfig) -> crate::errors::Result<Self> {
        let catalogue = build_catalogue(&raw)?;
        Ok(AppConfig {
            scratch_dir: raw
                .scratch_dir
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::env::temp_dir().join("backupctl")),
            records_file: raw.records_file,
            scheduler: raw.scheduler,
            catalogue,
        })
    }
}

/// Accepts `HH:MM:SS` and `HH:MM`.
pub fn parse_backup_time(value: &str) -> crate::errors::Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| AppError::Config(format!("invalid backup_time '{value}', expected HH:MM[:SS]")))
}

fn parse_weekday(value: &str) -> crate::errors::Result<Weekday> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid weekly_day '{value}'")))
}

fn build_catalogue(raw: &RawJsonConfig) -> crate::errors::Result<Catalogue> {
    for destination in &raw.destinations {
        if destination.requires_credentials() {
            destination
                .credentials()
                .map_err(|e| AppError::Config(e.to_string()))?;
        }
    }

    let sources: HashMap<Uuid, &Source> = raw.sources.iter().map(|s| (s.id, s)).collect();
    let destinations: HashMap<Uuid, &Destination> =
        raw.destinations.iter().map(|d| (d.id, d)).collect();

    let mut jobs = Vec::with_capacity(raw.jobs.len());
    for job in &raw.jobs {
        let source = sources.get(&job.source_id).ok_or_else(|| {
            AppError::Config(format!("job '{}' references unknown source {}", job.name, job.source_id))
        })?;
        let job_destinations = job
            .destination_ids
            .iter()
            .map(|id| {
                destinations.get(id).map(|d| (*d).clone()).ok_or_else(|| {
                    AppError::Config(format!("job '{}' references unknown destination {}", job.name, id))
                })
            })
            .collect::<crate::errors::Result<Vec<_>>>()?;
        if job.retention_days < 1 {
            return Err(AppError::Config(format!(
                "job '{}' must keep backups for at least 1 day (retention_days = {})",
                job.name, job.retention_days
            )));
        }
        if let Some(config_id) = job.email_config_id {
            if !raw.email_configs.iter().any(|c| c.id == config_id) {
                return Err(AppError::Config(format!(
                    "job '{}' references unknown email config {}",
                    job.name, config_id
                )));
            }
        }

        jobs.push(Job {
            id: job.id,
            name: job.name.clone(),
            source: (*source).clone(),
            destinations: job_destinations,
            schedule_type: job.schedule_type,
            backup_time: parse_backup_time(&job.backup_time)?,
            weekly_day: job.weekly_day.as_deref().map(parse_weekday).transpose()?,
            retention_days: job.retention_days,
            active: job.active,
            notification_policy: job.notification_policy,
            notification_recipients: job.notification_recipients.clone(),
            email_config_id: job.email_config_id,
        });
    }

    Ok(Catalogue {
        sources: raw.sources.clone(),
        destinations: raw.destinations.clone(),
        email_configs: raw.email_configs.clone(),
        jobs,
    })
}
