// External tool invocation: spawning, output forwarding and timeouts.
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};
use crate::live_log::LogPublisher;

/// Prefix applied to every standard error line forwarded to the live log.
pub const STDERR_PREFIX: &str = "[ERRO] ";

/// A fully built tool invocation: executable, positional arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program and arguments joined by spaces, as shown in the live log.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        cmd
    }
}

/// Derives a companion tool from the configured dump tool path, e.g. `pg_dump` -> `psql`.
///
/// Only the file name is rewritten, so directories that happen to contain the
/// tool name are left alone. Replacements are applied in order.
pub fn sibling_tool(dump_tool_path: &str, replacements: &[(&str, &str)]) -> String {
    let path = Path::new(dump_tool_path);
    let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return dump_tool_path.to_string();
    };
    let renamed = replacements
        .iter()
        .fold(file_name, |name, (from, to)| name.replace(from, to));
    path.with_file_name(renamed).to_string_lossy().into_owned()
}

/// What a finished streamed process left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

/// Runs `spec` to completion while forwarding its output line by line to `log`.
///
/// `stdin_from` feeds a file as standard input; `stdout_to` redirects standard
/// output into a file instead of forwarding it. Standard error is always forwarded
/// with [`STDERR_PREFIX`] and also captured.
pub async fn run_streaming(
    spec: &CommandSpec,
    stdin_from: Option<&Path>,
    stdout_to: Option<&Path>,
    log: &LogPublisher,
) -> Result<ProcessOutput> {
    let mut cmd = spec.to_command();

    match stdin_from {
        Some(path) => cmd.stdin(Stdio::from(File::open(path)?)),
        None => cmd.stdin(Stdio::null()),
    };
    match stdout_to {
        Some(path) => cmd.stdout(Stdio::from(File::create(path)?)),
        None => cmd.stdout(Stdio::piped()),
    };
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| AppError::Command {
        program: spec.program.clone(),
        message: format!("failed to start: {e}"),
    })?;
    debug!(program = %spec.program, pid = ?child.id(), "process started");

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(forward_lines(out, log.clone(), "")));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(forward_lines(err, log.clone(), STDERR_PREFIX)));

    let status = child.wait().await?;

    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ProcessOutput { status, stderr })
}

async fn forward_lines<R>(reader: R, log: LogPublisher, prefix: &'static str) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut captured = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                log.line(format!("{prefix}{line}"));
                captured.push_str(&line);
                captured.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
    captured
}

/// Runs a short-lived check, killing it once `limit` elapses.
pub async fn run_with_timeout(spec: &CommandSpec, limit: Duration) -> Result<()> {
    let mut cmd = spec.to_command();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| AppError::Command {
        program: spec.program.clone(),
        message: format!("failed to start: {e}"),
    })?;
    let mut stderr = child.stderr.take();

    let waited = tokio::time::timeout(limit, child.wait()).await;
    let status = match waited {
        Ok(status) => status?,
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill timed out `{}`: {}", spec.program, e);
            }
            return Err(AppError::Timeout(format!(
                "time limit ({}s) reached. Check the host and the port.",
                limit.as_secs()
            )));
        }
    };

    if !status.success() {
        let mut message = String::new();
        if let Some(err) = stderr.as_mut() {
            let _ = err.read_to_string(&mut message).await;
        }
        return Err(AppError::Command {
            program: spec.program.clone(),
            message: format!(
                "exited with code {}: {}",
                status.code().unwrap_or(-1),
                message.trim()
            ),
        });
    }
    Ok(())
}
