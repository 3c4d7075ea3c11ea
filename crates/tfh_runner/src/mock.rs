//! Mock command runner for testing.
//!
//! Provides a configurable implementation of the CommandRunner trait so
//! lifecycle code can be exercised without a real `terraform` binary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl CapturedCall {
    /// First argument, i.e. the terraform subcommand.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Mock command runner for testing.
///
/// Responses are matched by subcommand first (see [`MockRunner::respond_to`]),
/// then taken round-robin from the default response list.
#[derive(Clone)]
pub struct MockRunner {
    available: Arc<RwLock<bool>>,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    scripted: Arc<RwLock<HashMap<String, Vec<MockResponse>>>>,
    response_index: Arc<AtomicUsize>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            responses: Arc::new(RwLock::new(Vec::new())),
            scripted: Arc::new(RwLock::new(HashMap::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Set whether programs report as available.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Add a default response.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Replace the default responses.
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        *self.responses.write() = responses;
        self
    }

    /// Queue a response for a specific subcommand (`init`, `apply`, `destroy`).
    ///
    /// Queued responses are consumed in order; once drained the default
    /// responses apply again.
    pub fn respond_to(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.scripted
            .write()
            .entry(subcommand.into())
            .or_default()
            .push(response);
        self
    }

    /// Set a spawn failure to simulate.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Calls whose first argument is `subcommand`.
    pub fn calls_for(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn next_response(&self, subcommand: Option<&str>) -> MockResponse {
        if let Some(sub) = subcommand {
            let mut scripted = self.scripted.write();
            if let Some(queue) = scripted.get_mut(sub) {
                if !queue.is_empty() {
                    return queue.remove(0);
                }
            }
        }

        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, _program: &str) -> RunnerResult<bool> {
        Ok(*self.available.read())
    }

    async fn run(
        &self,
        command: &CommandConfig,
        _run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let call = CapturedCall {
            program: command.program.clone(),
            args: command.args.clone(),
            workdir: command.workdir.clone(),
            env: command.env.clone(),
        };
        let subcommand = call.subcommand().map(str::to_string);
        self.captured_calls.write().push(call);

        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }

        let response = self.next_response(subcommand.as_deref());
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            execution_id: format!("mock-{}", uuid::Uuid::new_v4()),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}
