//! # tfh_runner
//!
//! Process execution layer for tfharness.
//!
//! Every provisioning step is delegated to an external tool (`terraform` by
//! default). This crate wraps process spawning behind the [`CommandRunner`]
//! trait so higher layers can swap in [`MockRunner`] during tests.
//!
//! # Features
//!
//! - **CliRunner**: `tokio::process` execution with timeouts and output capture
//! - **Terraform**: init/apply/destroy with retry on known transient errors
//! - **Dry-Run Mode**: log commands without executing them
//! - **Mock Runner**: scripted responses and captured calls for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tfh_runner::{CliRunner, CliRunnerOptions, Terraform};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let terraform = Terraform::new(Arc::new(CliRunner::new(CliRunnerOptions::default())));
//!     terraform.init_and_apply(Path::new("../examples/default")).await?;
//!     terraform.destroy(Path::new("../examples/default")).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod mock;
pub mod runner;
pub mod terraform;

pub use cli::{ci_format, CliRunner, CliRunnerOptions, LogLine, LogStream};
pub use config::{CommandConfig, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandRunner, ExecutionResult};
pub use terraform::{RetryPolicy, Terraform};
