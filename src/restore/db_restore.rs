// Restore half of the database adapter.
use std::path::Path;

use tracing::info;

use crate::backup::db_dump::mongo_connection_args;
use crate::errors::{AppError, Result};
use crate::live_log::LogPublisher;
use crate::models::{DatabaseType, Source};
use crate::utils::process::{self, CommandSpec};

/// Maps a source onto the restore tool invocation; the dump is fed on standard input.
pub fn build_restore_command(source: &Source) -> Result<CommandSpec> {
    match source.database_type {
        DatabaseType::Postgres => {
            let program = process::sibling_tool(&source.dump_tool_path, &[("pg_dump", "psql")]);
            let mut spec = CommandSpec::new(program)
                .env("PGPASSWORD", &source.db_password)
                .args([
                    "-h",
                    source.db_host.as_str(),
                    "-U",
                    source.db_user.as_str(),
                    "-d",
                    source.db_name.as_str(),
                ]);
            if let Some(port) = source.explicit_port() {
                spec = spec.args(["-p".to_string(), port.to_string()]);
            }
            Ok(spec)
        }
        DatabaseType::MySql | DatabaseType::MariaDb => {
            let program = process::sibling_tool(
                &source.dump_tool_path,
                &[("mysqldump", "mysql"), ("mariadb-dump", "mariadb")],
            );
            let mut spec = CommandSpec::new(program)
                .env("MYSQL_PWD", &source.db_password)
                .args(["-h", source.db_host.as_str(), "-u", source.db_user.as_str()]);
            if let Some(port) = source.explicit_port() {
                spec = spec.args(["--port".to_string(), port.to_string()]);
            }
            Ok(spec.arg(&source.db_name))
        }
        DatabaseType::MongoDb => {
            let program = process::sibling_tool(&source.dump_tool_path, &[("mongodump", "mongorestore")]);
            Ok(CommandSpec::new(program)
                .args(mongo_connection_args(source))
                .args(["--drop", "--archive"]))
        }
        DatabaseType::Oracle => Err(AppError::NotImplemented(
            "Oracle Data Pump (impdp) restores require moving the file into the Oracle directory".into(),
        )),
        DatabaseType::SqlServer => Err(AppError::NotImplemented(
            "SQL Server (sqlcmd) restores require moving the .bak file onto the server".into(),
        )),
        DatabaseType::H2 => Err(AppError::NotImplemented(
            "H2 restores must go through JDBC (RUNSCRIPT FROM), not a shell command".into(),
        )),
    }
}

/// Pipes `dump_file` into the restore tool built by [`build_restore_command`].
pub async fn restore_from_file(spec: &CommandSpec, dump_file: &Path, log: &LogPublisher) -> Result<()> {
    log.line("STARTING RESTORE PROCESS...");
    log.line(format!("Command: {}", spec.command_line()));
    info!("Restoring {} with {}", dump_file.display(), spec.program);

    let run = process::run_streaming(spec, Some(dump_file), None, log)
        .await
        .map_err(|e| AppError::Restore(e.to_string()))?;
    log.line(format!("PROCESS FINISHED (exit code: {})", run.exit_code()));

    if !run.status.success() {
        return Err(AppError::Restore(format!(
            "database restore failed (exit code {}). Log: {}",
            run.exit_code(),
            run.stderr.trim_end()
        )));
    }
    info!("✓ Restore from {} completed", dump_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_log::LiveLog;
    use crate::test_support::source_with;
    use uuid::Uuid;

    #[test]
    fn postgres_restore_runs_psql_against_database() {
        let source = source_with(DatabaseType::Postgres, "/usr/bin/pg_dump");
        let spec = build_restore_command(&source).unwrap();
        assert_eq!(spec.program, "/usr/bin/psql");
        assert_eq!(spec.args, vec!["-h", "db.internal", "-U", "backup", "-d", "app"]);
    }

    #[test]
    fn mysql_and_mariadb_restore_tools() {
        let mysql = build_restore_command(&source_with(DatabaseType::MySql, "mysqldump")).unwrap();
        assert_eq!(mysql.program, "mysql");
        assert_eq!(mysql.args.last().unwrap(), "app");

        let maria = build_restore_command(&source_with(DatabaseType::MariaDb, "/opt/mariadb-dump")).unwrap();
        assert_eq!(maria.program, "/opt/mariadb");
        assert_eq!(maria.env, vec![("MYSQL_PWD".to_string(), "secret".to_string())]);
    }

    #[test]
    fn mongo_restore_drops_and_reads_archive() {
        let mut source = source_with(DatabaseType::MongoDb, "mongodump");
        source.db_port = Some(27018);
        let spec = build_restore_command(&source).unwrap();
        assert_eq!(spec.program, "mongorestore");
        assert_eq!(&spec.args[2..4], &["--port".to_string(), "27018".to_string()]);
        assert_eq!(&spec.args[spec.args.len() - 2..], &["--drop".to_string(), "--archive".to_string()]);
    }

    #[test]
    fn unsupported_engines_refuse_restore() {
        for engine in [DatabaseType::Oracle, DatabaseType::SqlServer, DatabaseType::H2] {
            let err = build_restore_command(&source_with(engine, "tool")).unwrap_err();
            assert!(matches!(err, AppError::NotImplemented(_)));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_restore_carries_stderr() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tool = crate::test_support::write_tool(
            dir.path(),
            "psql",
            "cat > /dev/null\necho 'ERROR: relation exists' >&2\nexit 3\n",
        )?;
        let dump = dir.path().join("dump.sql");
        std::fs::write(&dump, "CREATE TABLE t ();\n")?;
        let hub = LiveLog::new(8);

        let spec = CommandSpec::new(tool.to_string_lossy());
        let err = restore_from_file(&spec, &dump, &hub.publisher(Uuid::new_v4()))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, AppError::Restore(_)));
        assert!(message.contains("ERROR: relation exists"), "{message}");
        Ok(())
    }
}
