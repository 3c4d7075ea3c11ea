//! Command configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single external command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute (resolved through `PATH`)
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory for the process
    pub workdir: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
}

impl CommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            env: HashMap::new(),
        }
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Render the command line for logs.
    pub fn display(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            if arg.contains(' ') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push(' ');
                cmd.push_str(arg);
            }
        }
        cmd
    }
}

/// Run-time execution options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Echo output lines as they arrive
    pub stream_logs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            stream_logs: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_builder() {
        let config = CommandConfig::new("terraform")
            .arg("apply")
            .arg("-auto-approve")
            .workdir("/tmp/example")
            .env("TF_IN_AUTOMATION", "1");

        assert_eq!(config.program, "terraform");
        assert_eq!(config.args, vec!["apply", "-auto-approve"]);
        assert_eq!(config.workdir, Some(PathBuf::from("/tmp/example")));
        assert_eq!(config.env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_display_quotes_spaces() {
        let config = CommandConfig::new("terraform").args(vec![
            "plan".to_string(),
            "-var=name=a b".to_string(),
        ]);
        assert_eq!(config.display(), "terraform plan '-var=name=a b'");
    }

    #[test]
    fn test_run_config_defaults() {
        let run = RunConfig::default();
        assert_eq!(run.timeout_seconds, 3600);
        assert!(!run.stream_logs);

        let run = run.timeout(30).stream_logs(true);
        assert_eq!(run.timeout_seconds, 30);
        assert!(run.stream_logs);
    }
}
