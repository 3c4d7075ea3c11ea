//! # tfh_core
//!
//! Test orchestration for tfharness.
//!
//! A run takes the example modules of a Terraform module repository, applies
//! each one (in parallel or one after another), tears it down again, and
//! reports every failure at the end.
//!
//! # Architecture
//!
//! - **Config**: run-wide flags, loaded from YAML or built in code
//! - **TestRunner**: sequences setup, per-module subtests, summary, teardown
//! - **TestSetup**: hooks around a run; [`LocalSourceSetup`] rewrites example
//!   sources to the working tree and restores them afterwards
//! - **TestResults**: lock-protected aggregation shared by subtests
//! - **RunSummary**: the final per-module error report
//!
//! # Example
//!
//! ```rust,no_run
//! use tfh_core::{Config, TestRunner};
//!
//! # async fn run() -> tfh_core::CoreResult<()> {
//! let config = Config::new().with_example("default,complete").with_local(true);
//! let report = TestRunner::new(config).run_examples().await?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod results;
pub mod setup;
pub mod summary;

pub use config::{
    Config, DEFAULT_EXAMPLES_PATH, DEFAULT_NAMESPACE, DEFAULT_TERRAFORM_BINARY,
    DEFAULT_TIMEOUT_SECONDS,
};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{RunReport, SourceKind, SubtestResult, TestRunner};
pub use results::TestResults;
pub use setup::{LocalSourceSetup, TestSetup};
pub use summary::{FailedModule, RunSummary};
