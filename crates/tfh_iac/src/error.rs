//! Error types for IaC module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Failed to read examples directory {path:?}: {source}")]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Could not determine module name and provider from repository at {0:?}")]
    UnknownModuleIdentity(PathBuf),

    #[error("Invalid cleanup pattern {pattern}: {message}")]
    Pattern { pattern: String, message: String },

    #[error("{0} panicked")]
    Panicked(String),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Runner error: {0}")]
    Runner(#[from] tfh_runner::RunnerError),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A lifecycle step that failed for one module.
#[derive(Error, Debug)]
#[error("{operation} failed for module {module}: {source}")]
pub struct ModuleError {
    pub module: String,
    pub operation: String,
    pub source: Box<IacError>,
}

impl ModuleError {
    pub fn new(module: impl Into<String>, operation: impl Into<String>, source: IacError) -> Self {
        Self {
            module: module.into(),
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}

/// Failures talking to the module registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch module versions: {0}")]
    Network(#[source] reqwest::Error),

    #[error("failed to fetch module versions: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("no versions found for module {0}")]
    NoVersions(String),
}
