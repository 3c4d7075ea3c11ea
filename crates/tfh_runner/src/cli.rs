//! Process-based command runner.
//!
//! Spawns commands with `tokio::process`, captures both output streams and
//! enforces the configured timeout.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Output line from a running command.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// CLI runner options.
#[derive(Debug, Clone)]
pub struct CliRunnerOptions {
    /// Log commands instead of executing them
    pub dry_run: bool,
    /// CI mode (timestamped stream output for CI systems)
    pub ci_mode: bool,
}

impl Default for CliRunnerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            ci_mode: std::env::var("CI").is_ok(),
        }
    }
}

impl CliRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }
}

/// Render a streamed line the way CI log viewers expect it.
pub fn ci_format(line: &LogLine) -> String {
    format!(
        "[{}] [{}] {}",
        line.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
        line.stream,
        line.message
    )
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct CliRunner {
    options: CliRunnerOptions,
}

impl CliRunner {
    pub fn new(options: CliRunnerOptions) -> Self {
        Self { options }
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    fn collect<R>(&self, reader: R, stream: LogStream, echo: bool) -> JoinHandle<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let ci_mode = self.options.ci_mode;
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut output = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let log_line = LogLine {
                    timestamp: Utc::now(),
                    stream,
                    message: line.clone(),
                };
                if echo {
                    if ci_mode {
                        println!("{}", ci_format(&log_line));
                    } else {
                        info!(%stream, "{}", line);
                    }
                }
                output.push_str(&line);
                output.push('\n');
            }
            output
        })
    }
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        if self.options.dry_run {
            info!("[DRY-RUN] Assuming {} is available", program);
            return Ok(true);
        }
        let status = Command::new(program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        Ok(status.map(|s| s.success()).unwrap_or(false))
    }

    async fn run(
        &self,
        command: &CommandConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let cmd_str = command.display();
        let execution_id = uuid::Uuid::new_v4().to_string();

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            let now = Utc::now();
            return Ok(ExecutionResult {
                execution_id,
                exit_code: 0,
                stdout: format!("[DRY-RUN] Command: {}", cmd_str),
                stderr: String::new(),
                started_at: now,
                finished_at: now,
                duration_ms: 0,
            });
        }

        debug!("Executing: {}", cmd_str);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.workdir {
            cmd.current_dir(dir);
        }

        let started_at = Utc::now();
        let mut child = cmd.spawn().map_err(|e| {
            RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", command.program, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr not captured".to_string()))?;
        let stdout_handle = self.collect(stdout, LogStream::Stdout, run_config.stream_logs);
        let stderr_handle = self.collect(stderr, LogStream::Stderr, run_config.stream_logs);

        let status = if run_config.timeout_seconds > 0 {
            let limit = std::time::Duration::from_secs(run_config.timeout_seconds);
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    let _ = child.kill().await;
                    error!("{} timed out after {}s", cmd_str, run_config.timeout_seconds);
                    return Err(RunnerError::Timeout(run_config.timeout_seconds));
                }
            }
        } else {
            child.wait().await?
        };

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let exit_code = status.code().map(i64::from).unwrap_or(-1);

        if exit_code == 0 {
            debug!("{} completed in {}ms", command.program, duration_ms);
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                command.program, exit_code, duration_ms
            );
        }

        Ok(ExecutionResult {
            execution_id,
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
