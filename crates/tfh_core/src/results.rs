//! Concurrency-safe collection of per-module outcomes.

use parking_lot::RwLock;
use tfh_iac::Module;

#[derive(Debug, Default)]
struct Collected {
    modules: Vec<Module>,
    failed: Vec<Module>,
}

/// Every module processed in a run, plus the subset that recorded errors.
///
/// Shared between subtests behind an `Arc`. Insertion order is preserved,
/// which under parallel execution is completion order.
#[derive(Debug, Default)]
pub struct TestResults {
    inner: RwLock<Collected>,
}

impl TestResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished module. It also lands in the failed list if it has errors.
    pub fn add_module(&self, module: Module) {
        let mut inner = self.inner.write();
        if module.has_errors() {
            inner.failed.push(module.clone());
        }
        inner.modules.push(module);
    }

    /// Snapshot of `(all, failed)`.
    pub fn get_results(&self) -> (Vec<Module>, Vec<Module>) {
        let inner = self.inner.read();
        (inner.modules.clone(), inner.failed.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn failed_count(&self) -> usize {
        self.inner.read().failed.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tfh_iac::{IacError, IacResult, LifecycleOps};
    use tokio_util::sync::CancellationToken;

    struct ApplyOutcome(bool);

    #[async_trait]
    impl LifecycleOps for ApplyOutcome {
        async fn apply(&self, _dir: &Path) -> IacResult<()> {
            if self.0 {
                Ok(())
            } else {
                Err(IacError::Panicked("apply".into()))
            }
        }

        async fn destroy(&self, _dir: &Path) -> IacResult<()> {
            Ok(())
        }

        async fn cleanup(&self, _dir: &Path, _cancel: &CancellationToken) -> IacResult<()> {
            Ok(())
        }
    }

    /// A module that has already been applied, failing or not.
    pub(crate) async fn finished_module(name: &str, ok: bool) -> Module {
        let mut module = Module::with_ops(name, name, Arc::new(ApplyOutcome(ok)));
        let _ = module.apply(&CancellationToken::new()).await;
        module
    }

    #[tokio::test]
    async fn test_partitions_failed_modules() {
        let results = TestResults::new();
        results.add_module(finished_module("a", true).await);
        results.add_module(finished_module("b", false).await);
        results.add_module(finished_module("c", true).await);

        let (all, failed) = results.get_results();
        let names: Vec<_> = all.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].name, "b");
        assert_eq!(results.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds() {
        let results = Arc::new(TestResults::new());
        let mut handles = Vec::new();
        for i in 0..50 {
            let results = results.clone();
            handles.push(tokio::spawn(async move {
                let module = finished_module(&format!("m{}", i), i % 5 != 0).await;
                results.add_module(module);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let (all, failed) = results.get_results();
        assert_eq!(all.len(), 50);
        assert_eq!(failed.len(), 10);
    }

    #[test]
    fn test_empty() {
        let results = TestResults::new();
        assert!(results.is_empty());
        let (all, failed) = results.get_results();
        assert!(all.is_empty() && failed.is_empty());
    }
}
