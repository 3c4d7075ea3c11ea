//! Concurrent test orchestration.
//!
//! A run sequences optional setup, one subtest per module (apply, then
//! destroy and cleanup unless teardown is skipped), aggregation, the final
//! summary and setup teardown.

use std::fmt;
use std::sync::Arc;

use tfh_iac::{LifecycleOps, Module, ModuleManager, TerraformOps};
use tfh_runner::{CliRunner, CliRunnerOptions, RunConfig, Terraform};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::results::TestResults;
use crate::setup::{LocalSourceSetup, TestSetup};
use crate::summary::RunSummary;

/// Where the examples take the module under test from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Registry,
    Local,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Registry => write!(f, "registry"),
            SourceKind::Local => write!(f, "local"),
        }
    }
}

/// Outcome of one module's subtest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtestResult {
    pub name: String,
    pub passed: bool,
    pub errors: Vec<String>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    /// In completion order.
    pub subtests: Vec<SubtestResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.summary.passed() && self.subtests.iter().all(|s| s.passed)
    }

    pub fn subtest(&self, name: &str) -> Option<&SubtestResult> {
        self.subtests.iter().find(|s| s.name == name)
    }
}

/// Runs example modules against real or injected lifecycle operations.
pub struct TestRunner {
    config: Arc<Config>,
    setup: Option<Arc<dyn TestSetup>>,
    source_kind: SourceKind,
    ops: Option<Arc<dyn LifecycleOps>>,
    cancel: CancellationToken,
}

impl TestRunner {
    pub fn new(config: Config) -> Self {
        let source_kind = if config.local {
            SourceKind::Local
        } else {
            SourceKind::Registry
        };
        Self {
            config: Arc::new(config),
            setup: None,
            source_kind,
            ops: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Setup to run before the modules. Replaces the default local setup.
    pub fn with_setup(mut self, setup: Arc<dyn TestSetup>) -> Self {
        self.setup = Some(setup);
        self
    }

    /// Source label used in progress messages.
    pub fn with_source_kind(mut self, kind: SourceKind) -> Self {
        self.source_kind = kind;
        self
    }

    /// Lifecycle operations for modules built by discovery.
    pub fn with_ops(mut self, ops: Arc<dyn LifecycleOps>) -> Self {
        self.ops = Some(ops);
        self
    }

    /// Token observed by setup and cleanup. Cancelling it stops further work
    /// but never skips teardown of resources already created.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Injected operations, or terraform configured from the run settings.
    fn lifecycle_ops(&self) -> Arc<dyn LifecycleOps> {
        match &self.ops {
            Some(ops) => ops.clone(),
            None => Arc::new(terraform_ops(&self.config)),
        }
    }

    fn manager(&self, ops: Arc<dyn LifecycleOps>) -> ModuleManager {
        ModuleManager::new(&self.config.examples_path)
            .with_exceptions(self.config.exceptions())
            .with_ops(ops)
    }

    /// The explicit setup, or the registry-backed local setup when configured.
    fn effective_setup(&self) -> CoreResult<Option<Arc<dyn TestSetup>>> {
        if let Some(setup) = &self.setup {
            return Ok(Some(setup.clone()));
        }
        if self.config.local {
            return Ok(Some(Arc::new(LocalSourceSetup::with_registry()?)));
        }
        Ok(None)
    }

    /// Discover every example and run it.
    pub async fn run_all(&self, parallel: bool) -> CoreResult<RunReport> {
        let ops = self.lifecycle_ops();
        let modules = self.manager(ops.clone()).discover_modules()?;
        ops.preflight().await?;
        let setup = self.effective_setup()?;
        self.execute(modules, parallel, setup).await
    }

    /// Run the examples named in the configuration, in parallel.
    pub async fn run_examples(&self) -> CoreResult<RunReport> {
        let names = self.config.examples();
        if names.is_empty() {
            return Err(CoreError::NoExamples);
        }
        let ops = self.lifecycle_ops();
        let modules = self.manager(ops.clone()).modules_from_names(&names);
        ops.preflight().await?;
        let setup = self.effective_setup()?;
        self.execute(modules, true, setup).await
    }

    /// Run the given modules with the explicitly configured setup, if any.
    pub async fn run_tests(&self, modules: Vec<Module>, parallel: bool) -> CoreResult<RunReport> {
        self.execute(modules, parallel, self.setup.clone()).await
    }

    async fn execute(
        &self,
        modules: Vec<Module>,
        parallel: bool,
        setup: Option<Arc<dyn TestSetup>>,
    ) -> CoreResult<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id);

        async move {
            info!(
                "Starting test run for {} module(s) using {} source ({})",
                modules.len(),
                self.source_kind,
                if parallel { "parallel" } else { "sequential" }
            );

            if let Some(setup) = &setup {
                if let Err(e) = setup.setup(&modules, &self.config, &self.cancel).await {
                    error!("Setup failed: {}", e);
                    teardown(setup.as_ref()).await;
                    return Err(e);
                }
            }

            let results = Arc::new(TestResults::new());
            let mut subtests = Vec::new();

            let runnable = modules.into_iter().filter(|module| {
                let excluded = self.config.is_excluded(&module.name);
                if excluded {
                    info!("Skipping example {} as it is in the exception list", module.name);
                }
                !excluded
            });

            if parallel {
                let mut set = JoinSet::new();
                for module in runnable {
                    set.spawn(run_subtest(
                        module,
                        self.config.skip_destroy,
                        self.source_kind,
                        self.cancel.clone(),
                        results.clone(),
                    ));
                }
                while let Some(joined) = set.join_next().await {
                    match joined {
                        Ok(result) => subtests.push(result),
                        Err(e) => {
                            error!("Subtest task did not complete: {}", e);
                            subtests.push(SubtestResult {
                                name: "<unknown>".to_string(),
                                passed: false,
                                errors: vec![e.to_string()],
                            });
                        }
                    }
                }
            } else {
                for module in runnable {
                    subtests.push(
                        run_subtest(
                            module,
                            self.config.skip_destroy,
                            self.source_kind,
                            self.cancel.clone(),
                            results.clone(),
                        )
                        .await,
                    );
                }
            }

            let (all, _) = results.get_results();
            let summary = RunSummary::from_modules(&all);
            summary.log();

            if let Some(setup) = &setup {
                teardown(setup.as_ref()).await;
            }

            Ok(RunReport {
                run_id,
                subtests,
                summary,
            })
        }
        .instrument(span)
        .await
    }
}

/// Terraform driven through the CLI with the binary, dry-run, timeout and
/// streaming settings of `config`.
fn terraform_ops(config: &Config) -> TerraformOps {
    let mut options = CliRunnerOptions::default();
    if config.dry_run {
        options = options.dry_run();
    }
    let run_config = RunConfig::default()
        .timeout(config.timeout_seconds)
        .stream_logs(config.stream_logs);
    let terraform = Terraform::new(Arc::new(CliRunner::new(options)))
        .with_binary(&config.terraform_binary)
        .with_run_config(run_config);
    TerraformOps::new(terraform)
}

/// Undo setup with a fresh token so a cancelled run still restores files.
async fn teardown(setup: &dyn TestSetup) {
    if let Err(e) = setup.teardown(&CancellationToken::new()).await {
        warn!("Teardown failed: {}", e);
    }
}

async fn run_subtest(
    mut module: Module,
    skip_destroy: bool,
    source_kind: SourceKind,
    cancel: CancellationToken,
    results: Arc<TestResults>,
) -> SubtestResult {
    let span = info_span!("module", name = %module.name);

    async move {
        if module.apply(&cancel).await.is_ok() {
            info!(
                "Module {} applied successfully with {} source",
                module.name, source_kind
            );
        }

        if skip_destroy {
            info!("Skipping destroy for module {}", module.name);
        } else if let Err(e) = module.destroy(&cancel).await {
            if !module.apply_failed() {
                warn!("Cleanup failed for module {}: {}", module.name, e);
            }
        }

        let result = SubtestResult {
            name: module.name.clone(),
            passed: !module.has_errors(),
            errors: module.errors().to_vec(),
        };
        results.add_module(module);
        result
    }
    .instrument(span)
    .await
}
