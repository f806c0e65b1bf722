//! Outcome notifications.
//!
//! The execution engine hands every terminal record to a [`Notifier`], which applies
//! the job's policy and queues the event. A single worker task resolves the mail
//! configuration, composes the report and sends it through a [`Mailer`]. Nothing
//! that happens on the worker side ever reaches the engine.

pub mod smtp;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::Result;
use crate::models::{BackupRecord, BackupStatus, EmailConfig, Job, NotificationPolicy};
use crate::repository::BackupRepository;

static RECIPIENT_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\s]+").expect("static pattern is valid"));

/// Splits a recipient list on commas, semicolons and whitespace.
pub fn parse_recipients(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        RECIPIENT_SEPARATORS
            .split(raw)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub fn should_notify(policy: NotificationPolicy, status: BackupStatus, recipients: &[String]) -> bool {
    if recipients.is_empty() {
        return false;
    }
    match policy {
        NotificationPolicy::Always => true,
        NotificationPolicy::OnFailure => status == BackupStatus::Failed,
        NotificationPolicy::Never => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

fn megabytes(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Plain-text report for one record.
pub fn compose(job: &Job, record: &BackupRecord, from: &str, to: Vec<String>) -> OutgoingMail {
    let mut body = format!(
        "Backup job report\n\nJob: {}\nStatus: {}\nDate: {}\nSource: {}\n",
        job.name,
        record.status,
        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
        job.source.name
    );
    if record.status == BackupStatus::Success {
        body.push_str(&format!(
            "\nFile: {}\nSize: {}\nRemote path: {}\n",
            record.filename.as_deref().unwrap_or("-"),
            record.size_bytes.map(megabytes).unwrap_or_else(|| "-".into()),
            record.remote_path.as_deref().unwrap_or("-"),
        ));
    } else {
        body.push_str(&format!(
            "\nError log:\n{}\n",
            record.log_summary.as_deref().unwrap_or("no details captured")
        ));
    }

    OutgoingMail {
        from: from.to_string(),
        to,
        subject: format!("Backup status: {} - {}", record.status, job.name),
        body,
    }
}

/// Delivery transport for composed mails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, config: &EmailConfig, mail: &OutgoingMail) -> Result<()>;
}

struct NotificationEvent {
    job: Job,
    record: BackupRecord,
}

/// Queue handle held by the engine. The worker stops once every handle is dropped.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub fn start(
        repository: Arc<dyn BackupRepository>,
        mailer: Arc<dyn Mailer>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(rx, repository, mailer));
        (Self { tx }, worker)
    }

    /// Queues a notification for `record` if the job's policy asks for one.
    pub fn notify(&self, job: &Job, record: &BackupRecord) {
        let recipients = parse_recipients(job.notification_recipients.as_deref());
        if !should_notify(job.notification_policy, record.status, &recipients) {
            debug!(
                "No notification for record {} ({:?}, {})",
                record.id, job.notification_policy, record.status
            );
            return;
        }
        let event = NotificationEvent {
            job: job.clone(),
            record: record.clone(),
        };
        if self.tx.send(event).is_err() {
            warn!("Notification worker is gone, dropping notification for job '{}'", job.name);
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<NotificationEvent>,
    repository: Arc<dyn BackupRepository>,
    mailer: Arc<dyn Mailer>,
) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = deliver(&event, repository.as_ref(), mailer.as_ref()).await {
            error!("Failed to send notification for job '{}': {}", event.job.name, e);
        }
    }
    debug!("Notification worker stopped");
}

async fn deliver(
    event: &NotificationEvent,
    repository: &dyn BackupRepository,
    mailer: &dyn Mailer,
) -> Result<()> {
    let Some(config_id) = event.job.email_config_id else {
        warn!("Job '{}' has no mail configuration, skipping notification", event.job.name);
        return Ok(());
    };
    let Some(config) = repository.find_email_config_by_id(config_id).await? else {
        warn!(
            "Mail configuration {} of job '{}' not found, skipping notification",
            config_id, event.job.name
        );
        return Ok(());
    };

    let recipients = parse_recipients(event.job.notification_recipients.as_deref());
    let mail = compose(&event.job, &event.record, &config.username, recipients);
    mailer.send(&config, &mail).await?;
    info!("✓ Notification '{}' sent to {}", mail.subject, mail.to.join(", "));
    Ok(())
}
