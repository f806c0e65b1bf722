// Connectivity pre-check for a backup source.
use std::time::Duration;

use tracing::info;
use which::which;

use crate::errors::{AppError, Result};
use crate::models::{DatabaseType, Source};
use crate::utils::process::{self, CommandSpec};

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the readiness probe for engines that ship one (`pg_isready`, `mysqladmin ping`).
pub fn build_connection_test_command(source: &Source) -> Result<CommandSpec> {
    match source.database_type {
        DatabaseType::Postgres => {
            let program = process::sibling_tool(&source.dump_tool_path, &[("pg_dump", "pg_isready")]);
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
                &[("mysqldump", "mysqladmin"), ("mariadb-dump", "mysqladmin")],
            );
            let mut spec = CommandSpec::new(program)
                .env("MYSQL_PWD", &source.db_password)
                .args(["-h", source.db_host.as_str(), "-u", source.db_user.as_str()]);
            if let Some(port) = source.explicit_port() {
                spec = spec.args(["-P".to_string(), port.to_string()]);
            }
            Ok(spec.arg("ping"))
        }
        other => Err(AppError::NotImplemented(format!(
            "connection test is not implemented for {other}"
        ))),
    }
}

/// Checks that the source answers, giving up after ten seconds.
pub async fn test_source_connection(source: &Source) -> Result<()> {
    let spec = build_connection_test_command(source)?;
    which(&spec.program).map_err(|_| {
        AppError::InvalidInput(format!(
            "{} executable not found. Please ensure the {} client tools are installed and in your PATH.",
            spec.program, source.database_type
        ))
    })?;

    process::run_with_timeout(&spec, CONNECTION_TEST_TIMEOUT).await?;
    info!("✓ Source '{}' is reachable at {}", source.name, source.db_host);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::source_with;

    #[test]
    fn postgres_probe_uses_pg_isready() {
        let mut source = source_with(DatabaseType::Postgres, "/usr/lib/postgresql/16/bin/pg_dump");
        source.db_port = Some(5433);
        let spec = build_connection_test_command(&source).unwrap();
        assert_eq!(spec.program, "/usr/lib/postgresql/16/bin/pg_isready");
        assert_eq!(
            spec.args,
            vec!["-h", "db.internal", "-U", "backup", "-d", "app", "-p", "5433"]
        );
        assert_eq!(spec.env, vec![("PGPASSWORD".to_string(), "secret".to_string())]);
    }

    #[test]
    fn mariadb_probe_pings_with_mysqladmin() {
        let source = source_with(DatabaseType::MariaDb, "mariadb-dump");
        let spec = build_connection_test_command(&source).unwrap();
        assert_eq!(spec.program, "mysqladmin");
        assert_eq!(spec.args, vec!["-h", "db.internal", "-u", "backup", "ping"]);
        assert_eq!(spec.env, vec![("MYSQL_PWD".to_string(), "secret".to_string())]);
    }

    #[test]
    fn other_engines_have_no_probe() {
        for engine in [DatabaseType::MongoDb, DatabaseType::Oracle, DatabaseType::H2] {
            let err = build_connection_test_command(&source_with(engine, "tool")).unwrap_err();
            assert!(matches!(err, AppError::NotImplemented(_)));
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn probe_runs_the_derived_tool() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        crate::test_support::write_tool(dir.path(), "pg_isready", "[ \"$PGPASSWORD\" = secret ]\n")?;
        let dump_tool = dir.path().join("pg_dump");
        let source = source_with(DatabaseType::Postgres, &dump_tool.to_string_lossy());
        test_source_connection(&source).await?;
        Ok(())
    }
}
