//! Terraform invocation with retry on transient failures.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Output patterns that mark a failure as transient.
const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (r".*read: connection reset by peer.*", "Connection reset by remote endpoint."),
    (r".*transport is closing.*", "Failed to reach provider API."),
    (r".*unable to verify signature.*", "Failed to retrieve plugin due to transient network error."),
    (r".*unable to verify checksum.*", "Failed to retrieve plugin due to transient network error."),
    (r".*no provider exists with the given name.*", "Failed to retrieve plugin due to transient network error."),
    (r".*registry service is unreachable.*", "Failed to retrieve plugin due to transient network error."),
    (r".*Error installing provider.*", "Failed to retrieve plugin due to transient network error."),
    (r".*Failed to query available provider packages.*", "Failed to retrieve plugin due to transient network error."),
    (r".*timeout while waiting for plugin to start.*", "Failed to retrieve plugin due to transient network error."),
    (r".*timed out waiting for server handshake.*", "Failed to retrieve plugin due to transient network error."),
    (r"could not query provider registry for", "Failed to retrieve plugin due to transient network error."),
    (r".*Provider produced inconsistent result after apply.*", "Provider eventual consistency error."),
    (r"Client\.Timeout exceeded while awaiting headers", "Client timeout exceeded while awaiting headers."),
];

/// When and how often a failed terraform command is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub time_between_retries: Duration,
    retryable: Vec<(Regex, String)>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let retryable = DEFAULT_RETRYABLE_ERRORS
            .iter()
            .filter_map(|(pattern, reason)| {
                Regex::new(pattern).ok().map(|re| (re, reason.to_string()))
            })
            .collect();
        Self {
            max_retries: 3,
            time_between_retries: Duration::from_secs(5),
            retryable,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            time_between_retries: Duration::ZERO,
            retryable: Vec::new(),
        }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn time_between_retries(mut self, delay: Duration) -> Self {
        self.time_between_retries = delay;
        self
    }

    /// Register an additional retryable output pattern.
    pub fn with_retryable_error(
        mut self,
        pattern: &str,
        reason: impl Into<String>,
    ) -> RunnerResult<Self> {
        self.retryable.push((Regex::new(pattern)?, reason.into()));
        Ok(self)
    }

    /// Reason for retrying, if the output matches a retryable pattern.
    pub fn retry_reason(&self, output: &str) -> Option<&str> {
        self.retryable
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, reason)| reason.as_str())
    }
}

/// Drives the `terraform` binary for one working directory at a time.
#[derive(Clone)]
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    retry: RetryPolicy,
    run_config: RunConfig,
}

impl Terraform {
    /// Create a Terraform driver on top of a command runner.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "terraform".to_string(),
            retry: RetryPolicy::default(),
            run_config: RunConfig::default(),
        }
    }

    /// Use a different binary (e.g. `tofu`).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run terraform init.
    pub async fn init(&self, working_dir: &Path) -> RunnerResult<ExecutionResult> {
        info!("Running terraform init in {:?}", working_dir);
        self.run_command(working_dir, &["init", "-upgrade=false", "-input=false"])
            .await
    }

    /// Run terraform apply.
    pub async fn apply(&self, working_dir: &Path) -> RunnerResult<ExecutionResult> {
        info!("Running terraform apply in {:?}", working_dir);
        self.run_command(
            working_dir,
            &["apply", "-input=false", "-auto-approve", "-lock=false"],
        )
        .await
    }

    /// Run init followed by apply.
    pub async fn init_and_apply(&self, working_dir: &Path) -> RunnerResult<ExecutionResult> {
        self.init(working_dir).await?;
        self.apply(working_dir).await
    }

    /// Run terraform destroy.
    pub async fn destroy(&self, working_dir: &Path) -> RunnerResult<ExecutionResult> {
        info!("Running terraform destroy in {:?}", working_dir);
        self.run_command(
            working_dir,
            &["destroy", "-input=false", "-auto-approve", "-lock=false"],
        )
        .await
    }

    /// Whether the configured binary can be run at all.
    pub async fn is_available(&self) -> RunnerResult<bool> {
        self.runner.is_available(&self.binary).await
    }

    /// Report the installed terraform version.
    pub async fn version(&self) -> RunnerResult<String> {
        let command = CommandConfig::new(&self.binary).arg("version");
        let result = self.runner.run(&command, &self.run_config).await?;
        if !result.success() {
            return Err(RunnerError::ToolNotAvailable(self.binary.clone()));
        }
        Ok(result.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    fn build_command(&self, working_dir: &Path, args: &[&str]) -> CommandConfig {
        let mut command = CommandConfig::new(&self.binary)
            .workdir(working_dir)
            .env("TF_IN_AUTOMATION", "1");
        for arg in args {
            command = command.arg(*arg);
        }
        command.arg("-no-color")
    }

    async fn run_command(
        &self,
        working_dir: &Path,
        args: &[&str],
    ) -> RunnerResult<ExecutionResult> {
        let command = self.build_command(working_dir, args);
        let mut attempt = 0;

        loop {
            debug!("Executing {} (attempt {})", command.display(), attempt + 1);
            let result = self.runner.run(&command, &self.run_config).await?;
            if result.success() {
                return Ok(result);
            }

            let output = result.combined_output();
            if attempt < self.retry.max_retries {
                if let Some(reason) = self.retry.retry_reason(&output) {
                    attempt += 1;
                    warn!(
                        "{} failed with a retryable error ({}); retry {}/{} in {:?}",
                        command.display(),
                        reason,
                        attempt,
                        self.retry.max_retries,
                        self.retry.time_between_retries
                    );
                    tokio::time::sleep(self.retry.time_between_retries).await;
                    continue;
                }
            }

            return Err(RunnerError::CommandFailed {
                command: format!("{} {}", self.binary, args.first().unwrap_or(&"")),
                exit_code: result.exit_code,
                message: result.last_error_line().to_string(),
            });
        }
    }
}
