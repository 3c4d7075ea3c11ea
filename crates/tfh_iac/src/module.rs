//! Testable Terraform modules and their apply/destroy/cleanup lifecycle.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use tfh_runner::{CliRunner, RunnerError, Terraform};

use crate::error::{IacError, IacResult, ModuleError};

pub const OP_APPLY: &str = "terraform apply";
pub const OP_DESTROY: &str = "terraform destroy";
pub const OP_CLEANUP: &str = "cleanup";

/// Transient artifacts terraform leaves in a module directory.
pub const CLEANUP_PATTERNS: &[&str] = &["*.terraform*", "*tfstate*", "*.lock.hcl"];

/// Provisioning capabilities a module delegates to.
///
/// The default implementation is [`TerraformOps`]; tests inject their own.
#[async_trait]
pub trait LifecycleOps: Send + Sync {
    /// Check that the provisioning tool can be used before any module runs.
    async fn preflight(&self) -> IacResult<()> {
        Ok(())
    }

    /// Create the resources described in `dir`.
    async fn apply(&self, dir: &Path) -> IacResult<()>;

    /// Tear down the resources described in `dir`.
    async fn destroy(&self, dir: &Path) -> IacResult<()>;

    /// Remove generated artifacts from `dir`.
    async fn cleanup(&self, dir: &Path, cancel: &CancellationToken) -> IacResult<()> {
        remove_generated_files(dir, cancel).map(|_| ())
    }
}

/// Lifecycle backed by the terraform CLI.
#[derive(Clone)]
pub struct TerraformOps {
    terraform: Terraform,
}

impl TerraformOps {
    pub fn new(terraform: Terraform) -> Self {
        Self { terraform }
    }
}

impl Default for TerraformOps {
    fn default() -> Self {
        Self::new(Terraform::new(Arc::new(CliRunner::default())))
    }
}

#[async_trait]
impl LifecycleOps for TerraformOps {
    async fn preflight(&self) -> IacResult<()> {
        if !self.terraform.is_available().await? {
            return Err(RunnerError::ToolNotAvailable(self.terraform.binary().to_string()).into());
        }
        let version = self.terraform.version().await?;
        info!("Using {} ({})", self.terraform.binary(), version);
        Ok(())
    }

    async fn apply(&self, dir: &Path) -> IacResult<()> {
        self.terraform.init_and_apply(dir).await?;
        Ok(())
    }

    async fn destroy(&self, dir: &Path) -> IacResult<()> {
        self.terraform.destroy(dir).await?;
        Ok(())
    }
}

/// Remove every file or directory in `dir` matching [`CLEANUP_PATTERNS`].
///
/// Cancellation is checked before each pattern. Files removed before a
/// cancellation or failure stay removed.
pub fn remove_generated_files(dir: &Path, cancel: &CancellationToken) -> IacResult<usize> {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut removed = 0;

    for pattern in CLEANUP_PATTERNS {
        if cancel.is_cancelled() {
            return Err(IacError::Cancelled);
        }

        let full_pattern = format!("{}/{}", base, pattern);
        let matches = glob::glob(&full_pattern).map_err(|e| IacError::Pattern {
            pattern: full_pattern.clone(),
            message: e.to_string(),
        })?;

        for entry in matches {
            let path = entry.map_err(|e| IacError::Io(e.into_error()))?;
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => {
                    debug!("Removed {:?}", path);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(IacError::Io(std::io::Error::new(
                        e.kind(),
                        format!("failed to remove {:?}: {}", path, e),
                    )))
                }
            }
        }
    }

    Ok(removed)
}

/// One independently testable example configuration.
#[derive(Clone)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    errors: Vec<String>,
    apply_failed: bool,
    ops: Arc<dyn LifecycleOps>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("errors", &self.errors)
            .field("apply_failed", &self.apply_failed)
            .finish()
    }
}

impl Module {
    /// Create a module driven by the terraform CLI.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::with_ops(name, path, Arc::new(TerraformOps::default()))
    }

    /// Create a module with custom lifecycle operations.
    pub fn with_ops(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        ops: Arc<dyn LifecycleOps>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            errors: Vec::new(),
            apply_failed: false,
            ops,
        }
    }

    /// Failure messages recorded so far, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Whether the provisioning step itself failed.
    pub fn apply_failed(&self) -> bool {
        self.apply_failed
    }

    /// Provision the module.
    ///
    /// On failure the module is marked as apply-failed and the wrapped error
    /// is recorded before being returned.
    pub async fn apply(&mut self, cancel: &CancellationToken) -> IacResult<()> {
        info!("Applying Terraform module: {}", self.name);

        let outcome = if cancel.is_cancelled() {
            Err(IacError::Cancelled)
        } else {
            guarded(OP_APPLY, self.ops.apply(&self.path)).await
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(cause) => {
                self.apply_failed = true;
                let err = ModuleError::new(&self.name, OP_APPLY, cause);
                self.record(&err);
                Err(err.into())
            }
        }
    }

    /// Tear the module down, then clean generated files.
    ///
    /// Teardown is attempted whatever the apply outcome. After a failed apply
    /// the teardown error is returned but not recorded.
    pub async fn destroy(&mut self, cancel: &CancellationToken) -> IacResult<()> {
        info!("Destroying Terraform module: {}", self.name);

        let destroyed = guarded(OP_DESTROY, self.ops.destroy(&self.path)).await;
        let destroy_err = destroyed
            .err()
            .map(|cause| ModuleError::new(&self.name, OP_DESTROY, cause));

        if let Some(err) = &destroy_err {
            if self.apply_failed {
                debug!("Suppressing teardown error after failed apply: {}", err);
            } else {
                self.record(err);
            }
        }

        // recorded by cleanup itself
        let _ = self.cleanup(cancel).await;

        match destroy_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Remove state, lock and plugin files from the module directory.
    pub async fn cleanup(&mut self, cancel: &CancellationToken) -> IacResult<()> {
        info!("Cleaning up in: {:?}", self.path);

        if let Err(cause) = self.ops.cleanup(&self.path, cancel).await {
            let err = ModuleError::new(&self.name, OP_CLEANUP, cause);
            if self.apply_failed {
                debug!("Suppressing cleanup error after failed apply: {}", err);
            } else {
                self.record(&err);
            }
            return Err(err.into());
        }
        Ok(())
    }

    fn record(&mut self, err: &ModuleError) {
        error!("{}", err);
        self.errors.push(err.to_string());
    }
}

/// Await a lifecycle future, turning a panic into an error.
async fn guarded<F>(operation: &str, fut: F) -> IacResult<()>
where
    F: std::future::Future<Output = IacResult<()>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(IacError::Panicked(format!(
            "{} ({})",
            operation,
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
