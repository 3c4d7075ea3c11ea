//! Error types for the core module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while configuring or running a test run.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to load configuration from {path:?}: {message}")]
    ConfigLoad { path: PathBuf, message: String },

    #[error("No examples specified, pass --example with a comma-separated list")]
    NoExamples,

    #[error("Setup failed while converting module {module} to local source: {source}")]
    Setup {
        module: String,
        #[source]
        source: tfh_iac::ConversionError,
    },

    #[error("Teardown failed: {0}")]
    Teardown(String),

    #[error("IaC error: {0}")]
    Iac(#[from] tfh_iac::IacError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
