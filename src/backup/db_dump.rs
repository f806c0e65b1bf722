// Dump half of the database adapter: per-engine command construction and execution.
use std::path::Path;

use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::live_log::LogPublisher;
use crate::models::{DatabaseType, Source};
use crate::utils::process::{self, CommandSpec};

pub const DEFAULT_MONGO_PORT: u16 = 27017;

/// Maps a source onto the dump tool invocation for its engine.
///
/// Oracle, SQL Server and H2 dumps need the dump file relocated from the server
/// (or driver-level scripting), so they are refused before anything is spawned.
pub fn build_dump_command(source: &Source) -> Result<CommandSpec> {
    let spec = CommandSpec::new(&source.dump_tool_path);
    match source.database_type {
        DatabaseType::Postgres => {
            let mut spec = spec
                .env("PGPASSWORD", &source.db_password)
                .args(["-h", source.db_host.as_str(), "-U", source.db_user.as_str()]);
            if let Some(port) = source.explicit_port() {
                spec = spec.args(["-p".to_string(), port.to_string()]);
            }
            Ok(spec.arg(&source.db_name))
        }
        DatabaseType::MySql | DatabaseType::MariaDb => {
            let mut spec = spec
                .env("MYSQL_PWD", &source.db_password)
                .args(["-h", source.db_host.as_str(), "-u", source.db_user.as_str()]);
            if let Some(port) = source.explicit_port() {
                spec = spec.args(["--port".to_string(), port.to_string()]);
            }
            Ok(spec.arg(&source.db_name))
        }
        DatabaseType::MongoDb => Ok(spec.args(mongo_connection_args(source)).arg("--archive")),
        DatabaseType::Oracle => Err(AppError::NotImplemented(
            "Oracle Data Pump (expdp) dumps require copying the file out of the Oracle directory".into(),
        )),
        DatabaseType::SqlServer => Err(AppError::NotImplemented(
            "SQL Server (sqlcmd) dumps require copying the .bak file off the server".into(),
        )),
        DatabaseType::H2 => Err(AppError::NotImplemented(
            "H2 backups must go through JDBC (BACKUP TO 'file.zip'), not a shell command".into(),
        )),
    }
}

/// `--host .. --port .. --db .. --username .. --password ..`, shared by mongodump and mongorestore.
pub(crate) fn mongo_connection_args(source: &Source) -> Vec<String> {
    let port = source.explicit_port().unwrap_or(DEFAULT_MONGO_PORT);
    vec![
        "--host".into(),
        source.db_host.clone(),
        "--port".into(),
        port.to_string(),
        "--db".into(),
        source.db_name.clone(),
        "--username".into(),
        source.db_user.clone(),
        "--password".into(),
        source.db_password.clone(),
    ]
}

/// Dumps `source` into `output`, returning the size of the produced file.
///
/// The dump must exit with code 0 and leave a non-empty file; otherwise the partial
/// output is removed and the dump fails.
pub async fn dump_to_file(source: &Source, output: &Path, log: &LogPublisher) -> Result<u64> {
    let spec = build_dump_command(source)?;

    log.line("STARTING DUMP PROCESS...");
    log.line(format!("Command: {}", spec.command_line()));
    info!(
        "Dumping {} source '{}' to {}",
        source.database_type,
        source.name,
        output.display()
    );

    let result = process::run_streaming(&spec, None, Some(output), log).await;
    let run = match result {
        Ok(run) => run,
        Err(e) => {
            discard_partial(output).await;
            return Err(e);
        }
    };
    log.line(format!("PROCESS FINISHED (exit code: {})", run.exit_code()));

    if !run.status.success() {
        discard_partial(output).await;
        return Err(AppError::Backup(format!(
            "dump failed with exit code {}. Check the log for details.",
            run.exit_code()
        )));
    }

    let size = match tokio::fs::metadata(output).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };
    if size == 0 {
        discard_partial(output).await;
        return Err(AppError::Backup(
            "dump finished but the output file is empty".into(),
        ));
    }

    let file_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    log.line(format!("Dump completed successfully. File: {file_name}"));
    info!("✓ Dump of '{}' written ({} bytes)", source.name, size);
    Ok(size)
}

async fn discard_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial dump {}: {}", output.display(), e);
        }
    }
}
