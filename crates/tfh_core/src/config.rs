//! Run-wide configuration.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Registry namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "cloudnationhq";

/// Examples directory, relative to the invocation directory.
pub const DEFAULT_EXAMPLES_PATH: &str = "../examples";

pub const DEFAULT_TERRAFORM_BINARY: &str = "terraform";

/// Per-command timeout for terraform invocations.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3600;

/// Parameters shared by every component of a test run.
///
/// Built once, either from a YAML file or through the `with_*` builders
/// (last call wins), and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Leave resources in place after apply.
    pub skip_destroy: bool,
    /// Comma-separated example names to exclude.
    pub exception: String,
    /// Comma-separated example names to run.
    pub example: String,
    /// Rewrite registry sources to the local working tree before running.
    pub local: bool,
    pub namespace: String,
    pub examples_path: PathBuf,
    /// Log terraform commands instead of executing them.
    pub dry_run: bool,
    /// Binary used for every lifecycle step, e.g. `tofu`.
    pub terraform_binary: String,
    /// Limit for a single terraform command; 0 disables it.
    pub timeout_seconds: u64,
    /// Echo terraform output as it arrives.
    pub stream_logs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_destroy: false,
            exception: String::new(),
            example: String::new(),
            local: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            examples_path: PathBuf::from(DEFAULT_EXAMPLES_PATH),
            dry_run: false,
            terraform_binary: DEFAULT_TERRAFORM_BINARY.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            stream_logs: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        debug!("Loading configuration from {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn with_skip_destroy(mut self, skip: bool) -> Self {
        self.skip_destroy = skip;
        self
    }

    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = exception.into();
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_examples_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.examples_path = path.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_terraform_binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_stream_logs(mut self, stream: bool) -> Self {
        self.stream_logs = stream;
        self
    }

    /// The exclusion list as a set of trimmed, non-empty names.
    pub fn exceptions(&self) -> BTreeSet<String> {
        split_list(&self.exception).collect()
    }

    /// The requested examples in the order given.
    pub fn examples(&self) -> Vec<String> {
        split_list(&self.example).collect()
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        split_list(&self.exception).any(|ex| ex == name)
    }
}

fn split_list(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.skip_destroy);
        assert!(!config.local);
        assert_eq!(config.namespace, "cloudnationhq");
        assert_eq!(config.examples_path, PathBuf::from("../examples"));
        assert!(!config.dry_run);
        assert_eq!(config.terraform_binary, "terraform");
        assert_eq!(config.timeout_seconds, 3600);
        assert!(!config.stream_logs);
        assert!(config.exceptions().is_empty());
        assert!(config.examples().is_empty());
    }

    #[test]
    fn test_builder_last_writer_wins() {
        let config = Config::new()
            .with_skip_destroy(true)
            .with_exception("a")
            .with_exception("b,c")
            .with_local(true)
            .with_local(false)
            .with_namespace("acme");

        assert!(config.skip_destroy);
        assert!(!config.local);
        assert_eq!(config.namespace, "acme");
        assert_eq!(
            config.exceptions(),
            BTreeSet::from(["b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn test_list_parsing_trims_and_skips_empty() {
        let config = Config::new()
            .with_exception(" default , ,complete,, ")
            .with_example("b, a ,");

        assert_eq!(
            config.exceptions(),
            BTreeSet::from(["complete".to_string(), "default".to_string()])
        );
        assert_eq!(config.examples(), vec!["b", "a"]);
        assert!(config.is_excluded("default"));
        assert!(!config.is_excluded(""));
        assert!(!config.is_excluded("a"));
    }

    #[test]
    fn test_load_yaml_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tfharness.yaml");
        std::fs::write(
            &path,
            "skip-destroy: true\nexception: private\nexamples-path: ./examples\nterraform-binary: tofu\ntimeout-seconds: 900\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert!(config.skip_destroy);
        assert_eq!(config.terraform_binary, "tofu");
        assert_eq!(config.timeout_seconds, 900);
        assert!(!config.dry_run);
        assert!(config.is_excluded("private"));
        assert_eq!(config.examples_path, PathBuf::from("./examples"));
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/tfharness.yaml")).unwrap_err();
        assert!(matches!(err, CoreError::ConfigLoad { .. }));
    }
}
