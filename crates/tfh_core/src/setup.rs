//! Hooks that run around a test run, and the local-source setup.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tfh_iac::{FileRestore, HclSourceConverter, HttpRegistryClient, Module, ModuleInfo, SourceConverter};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CoreError, CoreResult};

/// Work done once before any module runs and undone after the summary.
#[async_trait]
pub trait TestSetup: Send + Sync {
    /// Prepare the modules for the run. An error aborts the run.
    async fn setup(
        &self,
        modules: &[Module],
        config: &Config,
        cancel: &CancellationToken,
    ) -> CoreResult<()>;

    /// Undo whatever `setup` changed.
    async fn teardown(&self, cancel: &CancellationToken) -> CoreResult<()>;
}

/// Points the examples at the working tree instead of the registry.
///
/// Every non-excluded module directory is converted during setup; the
/// rewritten files are restored, pinned to the latest published version,
/// during teardown.
pub struct LocalSourceSetup {
    converter: Arc<dyn SourceConverter>,
    module_info: Option<ModuleInfo>,
    repository: Option<PathBuf>,
    restores: Mutex<Vec<FileRestore>>,
}

impl LocalSourceSetup {
    pub fn new(converter: Arc<dyn SourceConverter>) -> Self {
        Self {
            converter,
            module_info: None,
            repository: None,
            restores: Mutex::new(Vec::new()),
        }
    }

    /// Local setup backed by the public registry.
    pub fn with_registry() -> CoreResult<Self> {
        let registry = HttpRegistryClient::new().map_err(tfh_iac::IacError::from)?;
        Ok(Self::new(Arc::new(HclSourceConverter::new(Arc::new(registry)))))
    }

    /// Use a fixed identity instead of deriving it from the repository.
    pub fn with_module_info(mut self, info: ModuleInfo) -> Self {
        self.module_info = Some(info);
        self
    }

    /// Repository to derive the identity from. Defaults to the current directory.
    pub fn with_repository(mut self, dir: impl Into<PathBuf>) -> Self {
        self.repository = Some(dir.into());
        self
    }

    /// Files currently awaiting reversal.
    pub fn restores(&self) -> Vec<FileRestore> {
        self.restores.lock().clone()
    }

    fn resolve_module_info(&self, config: &Config) -> CoreResult<ModuleInfo> {
        if let Some(info) = &self.module_info {
            return Ok(info.clone());
        }
        let dir = match &self.repository {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(ModuleInfo::from_repository(&dir, config.namespace.clone())?)
    }
}

#[async_trait]
impl TestSetup for LocalSourceSetup {
    async fn setup(
        &self,
        modules: &[Module],
        config: &Config,
        cancel: &CancellationToken,
    ) -> CoreResult<()> {
        let info = self.resolve_module_info(config)?;
        info!("Converting examples to local source for {}", info);

        for module in modules {
            if config.is_excluded(&module.name) {
                continue;
            }

            match self.converter.convert_to_local(&module.path, &info, cancel).await {
                Ok(restores) => self.restores.lock().extend(restores),
                Err(err) => {
                    self.restores.lock().extend(err.completed.iter().cloned());
                    return Err(CoreError::Setup {
                        module: module.name.clone(),
                        source: err,
                    });
                }
            }
        }

        info!("{} file(s) converted to local source", self.restores.lock().len());
        Ok(())
    }

    async fn teardown(&self, cancel: &CancellationToken) -> CoreResult<()> {
        let restores = std::mem::take(&mut *self.restores.lock());
        if restores.is_empty() {
            return Ok(());
        }

        match self.converter.revert_to_registry(&restores, cancel).await {
            Ok(report) => {
                info!(
                    "Reverted {} file(s) to registry source ({} pinned, {} restored verbatim)",
                    report.total(),
                    report.pinned,
                    report.restored_verbatim
                );
                Ok(())
            }
            Err(e) => {
                warn!("Failed to revert files to registry source: {}", e);
                Err(CoreError::Teardown(e.to_string()))
            }
        }
    }
}
