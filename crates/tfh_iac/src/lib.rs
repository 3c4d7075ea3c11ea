//! # tfh_iac
//!
//! Terraform module handling for tfharness.
//!
//! This crate owns everything that touches a module's configuration on disk
//! or in the registry: discovery of example directories, the apply/destroy
//! lifecycle of each example, the reversible rewrite of registry sources to
//! local paths, and registry version lookups.
//!
//! ## Features
//!
//! - Example discovery with exclusion lists
//! - Apply/destroy/cleanup lifecycle with per-module error tracking
//! - Format-preserving source rewriting built on `hcl-edit`
//! - Latest-version lookups against the Terraform registry
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfh_iac::{HclSourceConverter, HttpRegistryClient, ModuleInfo, SourceConverter};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let converter = HclSourceConverter::new(Arc::new(HttpRegistryClient::new()?));
//! let info = ModuleInfo::new("cloudnationhq", "vnet", "azure");
//! let cancel = CancellationToken::new();
//!
//! let restores = converter
//!     .convert_to_local("../examples/default".as_ref(), &info, &cancel)
//!     .await?;
//! // ... run the example ...
//! converter.revert_to_registry(&restores, &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod converter;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod module;
pub mod registry;

pub use converter::{
    ConversionError, FileRestore, HclSourceConverter, RevertReport, SourceConverter,
    LOCAL_MODULES_DIR, LOCAL_ROOT_SOURCE,
};
pub use discovery::ModuleManager;
pub use error::{IacError, IacResult, ModuleError, RegistryError};
pub use identity::{parse_repository_name, repo_name_from_remote, ModuleInfo};
pub use module::{
    remove_generated_files, LifecycleOps, Module, TerraformOps, CLEANUP_PATTERNS, OP_APPLY,
    OP_CLEANUP, OP_DESTROY,
};
pub use registry::{HttpRegistryClient, RegistryClient, DEFAULT_REGISTRY_URL};
