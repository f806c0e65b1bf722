//! Scheduled Database Backup Tool
//!
//! Dumps configured databases, ships the dumps to local disk, S3/GCS or FTP,
//! expires old copies and mails outcome reports.

// backupctl/src/main.rs
mod backup;
mod config;
mod errors;
mod live_log;
mod models;
mod notification;
mod repository;
mod restore;
mod scheduler;
mod storage;
mod utils;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use backup::BackupEngine;
use config::AppConfig;
use live_log::LiveLog;
use notification::{Notifier, smtp::SmtpMailer};
use repository::BackupRepository;
use repository::memory::MemoryRepository;
use scheduler::Scheduler;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use storage::{Storage, StorageManager};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            match e.downcast_ref::<errors::AppError>() {
                Some(app_error) => error!(class = ?app_error.class(), "❌ Error: {:?}", e),
                None => error!("❌ Error: {:?}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = AppConfig::default_path();
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().skip(1).collect();
    let (choice, argument) = if args.is_empty() {
        prompt_choice()?
    } else {
        (args[0].trim().to_string(), args.get(1).cloned())
    };

    let repository: Arc<dyn BackupRepository> = Arc::new(
        MemoryRepository::open(app_config.catalogue.clone(), app_config.records_file.clone())
            .await
            .context("Failed to open backup record store")?,
    );
    let storage: Arc<dyn Storage> = Arc::new(StorageManager::new());
    let (notifier, notifier_worker) = Notifier::start(repository.clone(), Arc::new(SmtpMailer::new()));
    let engine = Arc::new(BackupEngine::new(
        repository.clone(),
        storage.clone(),
        notifier,
        LiveLog::default(),
        app_config.scratch_dir.clone(),
    ));

    let outcome = dispatch(&choice, argument.as_deref(), &app_config, &engine).await;

    // Queued notifications are delivered before exiting.
    drop(engine);
    if let Err(e) = notifier_worker.await {
        error!("Notification worker ended abnormally: {}", e);
    }
    outcome
}

async fn dispatch(
    choice: &str,
    argument: Option<&str>,
    app_config: &AppConfig,
    engine: &Arc<BackupEngine>,
) -> Result<()> {
    match choice {
        "1" | "serve" => {
            info!("🕒 Starting scheduler...");
            let scheduler = Arc::new(Scheduler::new(engine.clone(), app_config.scheduler));
            let handles = scheduler.start();
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            info!("Shutting down scheduler");
            for handle in handles {
                handle.abort();
                let _ = handle.await;
            }
        }
        "2" | "run" => {
            let job_id = parse_id(argument, "job")?;
            info!("🚀 Running backup job {}", job_id);
            let printer = engine.live_log().follow(job_id, |line| println!("{line}"));
            let run = engine.execute_job(job_id).await;
            printer.finish().await;
            let run = run.context("Backup job failed")?;
            for record in &run.records {
                println!(
                    "  {} {} {}",
                    record.status,
                    record.destination_id.map(|d| d.to_string()).unwrap_or_default(),
                    record.log_summary.as_deref().unwrap_or("")
                );
            }
            if run.failed() > 0 {
                anyhow::bail!("{} of {} destinations failed", run.failed(), run.outcomes.len());
            }
        }
        "3" | "restore" => {
            let record_id = parse_id(argument, "record")?;
            info!("🔄 Restoring backup record {}", record_id);
            let job_id = engine
                .repository()
                .find_record_by_id(record_id)
                .await?
                .map(|r| r.job_id);
            let printer = job_id.map(|id| engine.live_log().follow(id, |line| println!("{line}")));
            let restored = engine.restore_backup(record_id).await;
            if let Some(printer) = printer {
                printer.finish().await;
            }
            restored.context("Restore failed")?;
        }
        "4" | "test-source" => {
            let source_id = parse_id(argument, "source")?;
            let source = engine
                .repository()
                .find_source_by_id(source_id)
                .await?
                .with_context(|| format!("Source {source_id} not found"))?;
            utils::connection::test_source_connection(&source)
                .await
                .context("Source connection test failed")?;
            println!("✓ Source '{}' is reachable", source.name);
        }
        "5" | "test-destination" => {
            let destination_id = parse_id(argument, "destination")?;
            let destination = engine
                .repository()
                .find_destination_by_id(destination_id)
                .await?
                .with_context(|| format!("Destination {destination_id} not found"))?;
            engine
                .storage()
                .test_connection(&destination)
                .await
                .context("Destination connection test failed")?;
            println!("✓ Destination '{}' is usable", destination.name);
        }
        "6" | "history" => {
            let job_id = parse_id(argument, "job")?;
            let records = engine.repository().list_records(job_id).await?;
            if records.is_empty() {
                println!("No backups recorded for job {}", job_id);
            }
            for record in records {
                println!(
                    "{}  {}  {:<11}  {}  {}",
                    record.id,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.status.to_string(),
                    record.filename.as_deref().unwrap_or("-"),
                    record.remote_path.as_deref().unwrap_or("-"),
                );
            }
        }
        _ => {
            println!(
                "❌ Invalid choice. Use serve, run <job-id>, restore <record-id>, test-source <id>, test-destination <id> or history <job-id>."
            );
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

fn parse_id(argument: Option<&str>, what: &str) -> Result<Uuid> {
    let raw = argument.with_context(|| format!("A {what} id is required"))?;
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid {what} id: {raw}"))
}

/// Prompts user to select an operation
///
/// Returns the choice and, for operations that need one, the id typed next
fn prompt_choice() -> Result<(String, Option<String>)> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Start scheduler (or type 'serve')");
    println!("2. Run a backup job now (or type 'run')");
    println!("3. Restore a backup record (or type 'restore')");
    println!("4. Test a source connection (or type 'test-source')");
    println!("5. Test a destination (or type 'test-destination')");
    println!("6. Show backup history of a job (or type 'history')");
    print!("Enter your choice: ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    let choice = input.trim().to_string();
    if matches!(choice.as_str(), "1" | "serve") {
        return Ok((choice, None));
    }

    print!("Enter the id: ");
    stdout().flush().context("Failed to flush stdout")?;
    let mut id = String::new();
    stdin().read_line(&mut id).context("Failed to read user input")?;
    Ok((choice, Some(id.trim().to_string())))
}
