//! Example module discovery.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{IacError, IacResult};
use crate::module::{LifecycleOps, Module, TerraformOps};

/// Finds and constructs the example modules of a repository.
pub struct ModuleManager {
    base_path: PathBuf,
    exceptions: BTreeSet<String>,
    ops: Arc<dyn LifecycleOps>,
}

impl ModuleManager {
    /// Create a manager rooted at the examples directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            exceptions: BTreeSet::new(),
            ops: Arc::new(TerraformOps::default()),
        }
    }

    /// Names to leave out of discovery.
    pub fn with_exceptions(mut self, exceptions: BTreeSet<String>) -> Self {
        self.exceptions = exceptions;
        self
    }

    /// Lifecycle operations handed to every constructed module.
    pub fn with_ops(mut self, ops: Arc<dyn LifecycleOps>) -> Self {
        self.ops = ops;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// One module per immediate subdirectory, sorted by name.
    pub fn discover_modules(&self) -> IacResult<Vec<Module>> {
        std::fs::read_dir(&self.base_path).map_err(|source| IacError::Discovery {
            path: self.base_path.clone(),
            source,
        })?;

        let mut modules = Vec::new();
        for entry in WalkDir::new(&self.base_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| IacError::Discovery {
                path: self.base_path.clone(),
                source: e.into(),
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if self.exceptions.contains(&name) {
                info!("Skipping module {} as it is in the exception list", name);
                continue;
            }

            debug!("Discovered module {} at {:?}", name, entry.path());
            modules.push(Module::with_ops(name, entry.path(), self.ops.clone()));
        }

        info!("Discovered {} modules in {:?}", modules.len(), self.base_path);
        Ok(modules)
    }

    /// Modules for an explicit list of example names.
    pub fn modules_from_names(&self, names: &[String]) -> Vec<Module> {
        names
            .iter()
            .map(|name| Module::with_ops(name, self.base_path.join(name), self.ops.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn examples_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in ["example2", "example1", "example3"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("readme.txt"), "test").unwrap();
        dir
    }

    #[test]
    fn test_discover_all_modules_sorted() {
        let dir = examples_dir();
        let modules = ModuleManager::new(dir.path()).discover_modules().unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["example1", "example2", "example3"]);
        assert_eq!(modules[0].path, dir.path().join("example1"));
    }

    #[test]
    fn test_discover_skips_exceptions() {
        let dir = examples_dir();
        let exceptions = BTreeSet::from(["example2".to_string()]);
        let modules = ModuleManager::new(dir.path())
            .with_exceptions(exceptions)
            .discover_modules()
            .unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["example1", "example3"]);
    }

    #[test]
    fn test_discover_missing_directory_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModuleManager::new(dir.path().join("missing")).discover_modules();
        assert!(matches!(result, Err(IacError::Discovery { .. })));
    }

    #[test]
    fn test_modules_from_names() {
        let manager = ModuleManager::new("../examples");
        let modules = manager.modules_from_names(&["default".to_string(), "private".to_string()]);

        assert_eq!(modules.len(), 2);
        assert_eq!(modules[1].name, "private");
        assert_eq!(modules[1].path, PathBuf::from("../examples/private"));
    }
}
