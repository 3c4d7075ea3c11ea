//! End-to-end runs against fake provisioning and a fake registry.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::tempdir;
use tfh_core::{Config, CoreError, LocalSourceSetup, SourceKind, TestRunner};
use tfh_iac::{
    HclSourceConverter, IacError, IacResult, LifecycleOps, ModuleInfo, RegistryClient,
    RegistryError,
};
use tokio_util::sync::CancellationToken;

struct FixedRegistry(Option<&'static str>);

#[async_trait]
impl RegistryClient for FixedRegistry {
    async fn get_latest_version(
        &self,
        namespace: &str,
        name: &str,
        provider: &str,
    ) -> Result<String, RegistryError> {
        self.0
            .map(str::to_string)
            .ok_or_else(|| RegistryError::NoVersions(format!("{}/{}/{}", namespace, name, provider)))
    }
}

/// Captures each example's main.tf as it looked during apply.
#[derive(Default)]
struct SnapshotOps {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl LifecycleOps for SnapshotOps {
    async fn apply(&self, dir: &Path) -> IacResult<()> {
        let content = fs::read_to_string(dir.join("main.tf"))?;
        self.seen.lock().push(content);
        Ok(())
    }

    async fn destroy(&self, _dir: &Path) -> IacResult<()> {
        Ok(())
    }
}

const EXAMPLE_TF: &str = r#"module "vnet" {
  source  = "acme/vnet/azure"
  version = "~> 1.0"

  naming = "demo"
}
"#;

#[tokio::test]
async fn test_local_run_converts_then_pins_latest_version() {
    let examples = tempdir().unwrap();
    for name in ["default", "complete"] {
        let dir = examples.path().join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("main.tf"), EXAMPLE_TF).unwrap();
        fs::write(dir.join("terraform.tfstate"), "{}").unwrap();
    }

    let converter = HclSourceConverter::new(Arc::new(FixedRegistry(Some("4.2.0"))));
    let setup = LocalSourceSetup::new(Arc::new(converter))
        .with_module_info(ModuleInfo::new("acme", "vnet", "azure"));
    let ops = Arc::new(SnapshotOps::default());
    let config = Config::new()
        .with_examples_path(examples.path())
        .with_example("default,complete")
        .with_local(true);

    let report = TestRunner::new(config)
        .with_setup(Arc::new(setup))
        .with_ops(ops.clone())
        .with_source_kind(SourceKind::Local)
        .run_examples()
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(report.summary.total, 2);

    let seen = ops.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    for content in &seen {
        assert!(content.contains(r#""../../""#));
        assert!(!content.contains("version"));
    }

    for name in ["default", "complete"] {
        let dir = examples.path().join(name);
        assert_eq!(
            fs::read_to_string(dir.join("main.tf")).unwrap(),
            EXAMPLE_TF.replace("~> 1.0", "~> 4.2.0")
        );
        // cleanup removed terraform state
        assert!(!dir.join("terraform.tfstate").exists());
    }
}

#[tokio::test]
async fn test_registry_outage_restores_examples_verbatim() {
    let examples = tempdir().unwrap();
    let dir = examples.path().join("default");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("main.tf"), EXAMPLE_TF).unwrap();

    let setup = LocalSourceSetup::new(Arc::new(HclSourceConverter::new(Arc::new(FixedRegistry(
        None,
    )))))
    .with_module_info(ModuleInfo::new("acme", "vnet", "azure"));

    let report = TestRunner::new(Config::new().with_examples_path(examples.path()))
        .with_setup(Arc::new(setup))
        .with_ops(Arc::new(SnapshotOps::default()))
        .run_all(true)
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(fs::read_to_string(dir.join("main.tf")).unwrap(), EXAMPLE_TF);
}

#[tokio::test]
async fn test_cancelled_run_fails_modules_but_restores_sources() {
    let examples = tempdir().unwrap();
    let dir = examples.path().join("default");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("main.tf"), EXAMPLE_TF).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let setup = LocalSourceSetup::new(Arc::new(HclSourceConverter::new(Arc::new(FixedRegistry(
        Some("4.2.0"),
    )))))
    .with_module_info(ModuleInfo::new("acme", "vnet", "azure"));

    let result = TestRunner::new(Config::new().with_examples_path(examples.path()))
        .with_setup(Arc::new(setup))
        .with_ops(Arc::new(SnapshotOps::default()))
        .with_cancellation(cancel)
        .run_all(true)
        .await;

    // conversion observes the token before touching any file
    match result {
        Err(CoreError::Setup { source, .. }) => {
            assert!(matches!(source.source, IacError::Cancelled));
        }
        other => panic!("expected setup failure, got {:?}", other.map(|r| r.passed())),
    }
    assert_eq!(fs::read_to_string(dir.join("main.tf")).unwrap(), EXAMPLE_TF);
}
