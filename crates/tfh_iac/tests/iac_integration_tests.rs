//! Integration tests for module discovery, lifecycle and source conversion.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use async_trait::async_trait;
use tempfile::tempdir;
use tfh_iac::{
    HclSourceConverter, HttpRegistryClient, IacError, IacResult, LifecycleOps, ModuleInfo,
    ModuleManager, SourceConverter,
};
use tiny_http::{Response, Server};
use tokio_util::sync::CancellationToken;

/// Records the directories an operation was invoked for.
#[derive(Default)]
struct Recorder(Mutex<Vec<PathBuf>>);

impl Recorder {
    fn push(&self, dir: &Path) {
        self.0.lock().unwrap().push(dir.to_path_buf());
    }

    fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

#[derive(Default)]
struct FailingDestroy {
    applied: Recorder,
    destroyed: Recorder,
}

#[async_trait]
impl LifecycleOps for FailingDestroy {
    async fn apply(&self, dir: &Path) -> IacResult<()> {
        self.applied.push(dir);
        Ok(())
    }

    async fn destroy(&self, dir: &Path) -> IacResult<()> {
        self.destroyed.push(dir);
        Err(IacError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "state locked",
        )))
    }
}

fn registry_stub(body: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    thread::spawn(move || {
        for request in server.incoming_requests() {
            let _ = request.respond(Response::from_string(body));
        }
    });
    format!("http://{}/v1/modules", addr)
}

#[tokio::test]
async fn test_discovered_modules_run_lifecycle() {
    let examples = tempdir().unwrap();
    for name in ["default", "complete", "private"] {
        fs::create_dir(examples.path().join(name)).unwrap();
    }
    fs::write(examples.path().join("README.md"), "docs").unwrap();

    let ops = Arc::new(FailingDestroy::default());
    let manager = ModuleManager::new(examples.path())
        .with_exceptions(BTreeSet::from(["private".to_string()]))
        .with_ops(ops.clone());

    let mut modules = manager.discover_modules().unwrap();
    let names: Vec<_> = modules.iter().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["complete", "default"]);

    let cancel = CancellationToken::new();
    for module in modules.iter_mut() {
        module.apply(&cancel).await.unwrap();
        assert!(module.destroy(&cancel).await.is_err());
        assert!(!module.apply_failed());
        assert_eq!(module.errors().len(), 1);
        assert!(module.errors()[0].starts_with("terraform destroy failed for module"));
    }

    assert_eq!(ops.applied.len(), 2);
    assert_eq!(ops.destroyed.len(), 2);
}

#[tokio::test]
async fn test_convert_and_revert_against_registry() {
    let example = tempdir().unwrap();
    let main_tf = example.path().join("main.tf");
    let original = r#"module "storage" {
  source  = "cloudnationhq/sa/azure"
  version = "~> 1.0"

  storage = {
    name = "sademo"
  }
}

module "containers" {
  source  = "cloudnationhq/sa/azure//modules/containers"
  version = "~> 1.0"
}
"#;
    fs::write(&main_tf, original).unwrap();
    fs::write(example.path().join("terraform.tfvars"), "location = \"westeurope\"\n").unwrap();

    let url = registry_stub(r#"{"versions":[{"version":"3.4.1"}]}"#);
    let converter = HclSourceConverter::new(Arc::new(HttpRegistryClient::with_base_url(url).unwrap()));
    let info = ModuleInfo::new("cloudnationhq", "sa", "azure");
    let cancel = CancellationToken::new();

    let restores = converter
        .convert_to_local(example.path(), &info, &cancel)
        .await
        .unwrap();
    assert_eq!(restores.len(), 1);

    let local = fs::read_to_string(&main_tf).unwrap();
    assert!(local.contains(r#""../../""#));
    assert!(local.contains(r#""../../modules/containers""#));
    assert!(!local.contains("version"));

    let report = converter.revert_to_registry(&restores, &cancel).await.unwrap();
    assert_eq!(report.pinned, 1);
    assert_eq!(
        fs::read_to_string(&main_tf).unwrap(),
        original.replace("~> 1.0", "~> 3.4.1")
    );
}

#[tokio::test]
async fn test_file_restores_survive_json() {
    let example = tempdir().unwrap();
    let main_tf = example.path().join("main.tf");
    let original = "module \"kv\" {\n  source  = \"acme/kv/azure\"\n  version = \"1.0.0\"\n}\n";
    fs::write(&main_tf, original).unwrap();

    let url = registry_stub(r#"{"versions":[]}"#);
    let converter = HclSourceConverter::new(Arc::new(HttpRegistryClient::with_base_url(url).unwrap()));
    let cancel = CancellationToken::new();

    let restores = converter
        .convert_to_local(example.path(), &ModuleInfo::new("acme", "kv", "azure"), &cancel)
        .await
        .unwrap();
    let json = serde_json::to_string(&restores).unwrap();
    let loaded: Vec<tfh_iac::FileRestore> = serde_json::from_str(&json).unwrap();

    // empty version list restores the snapshot unchanged
    let report = converter.revert_to_registry(&loaded, &cancel).await.unwrap();
    assert_eq!(report.restored_verbatim, 1);
    assert_eq!(fs::read_to_string(&main_tf).unwrap(), original);
}
