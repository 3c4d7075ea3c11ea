//! Module identity: the registry coordinates of the module under test.

use std::fmt;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IacError, IacResult};

/// Repository naming convention prefix: `terraform-<provider>-<name>`.
const REPO_PREFIX: &str = "terraform-";

/// Canonical published coordinates of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub namespace: String,
    pub name: String,
    pub provider: String,
}

impl ModuleInfo {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            provider: provider.into(),
        }
    }

    /// Registry source string, `namespace/name/provider`.
    pub fn canonical_source(&self) -> String {
        format!("{}/{}/{}", self.namespace, self.name, self.provider)
    }

    /// Derive the identity of the repository containing `dir`.
    ///
    /// The git `origin` remote is consulted first; the directory name is the
    /// fallback. A trailing `tests` directory is stepped over, since the
    /// harness is normally invoked from `<repo>/tests`.
    pub fn from_repository(dir: &Path, namespace: impl Into<String>) -> IacResult<Self> {
        let repo_dir = if dir.file_name().is_some_and(|n| n == "tests") {
            dir.parent().unwrap_or(dir)
        } else {
            dir
        };

        let from_remote = git_remote_url(repo_dir)
            .and_then(|url| repo_name_from_remote(&url))
            .and_then(|repo| parse_repository_name(&repo));

        let (provider, name) = match from_remote {
            Some(parsed) => parsed,
            None => {
                let dir_name = repo_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                parse_repository_name(&dir_name)
                    .ok_or_else(|| IacError::UnknownModuleIdentity(repo_dir.to_path_buf()))?
            }
        };

        let info = Self {
            namespace: namespace.into(),
            name,
            provider,
        };
        info!("Module under test: {}", info);
        Ok(info)
    }
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_source())
    }
}

/// Split `terraform-<provider>-<name>` into `(provider, name)`.
pub fn parse_repository_name(repo: &str) -> Option<(String, String)> {
    let rest = repo.strip_prefix(REPO_PREFIX)?;
    let (provider, name) = rest.split_once('-')?;
    if provider.is_empty() || name.is_empty() {
        return None;
    }
    Some((provider.to_string(), name.to_string()))
}

/// Last path segment of a git remote URL without the `.git` suffix.
pub fn repo_name_from_remote(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    let last = url.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn git_remote_url(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        debug!("No git origin remote in {:?}", dir);
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository_name() {
        assert_eq!(
            parse_repository_name("terraform-azure-vnet"),
            Some(("azure".to_string(), "vnet".to_string()))
        );
        assert_eq!(
            parse_repository_name("terraform-azure-app-service"),
            Some(("azure".to_string(), "app-service".to_string()))
        );
        assert_eq!(parse_repository_name("terraform-azure"), None);
        assert_eq!(parse_repository_name("terraform--vnet"), None);
        assert_eq!(parse_repository_name("module-azure-vnet"), None);
    }

    #[test]
    fn test_repo_name_from_remote() {
        assert_eq!(
            repo_name_from_remote("https://github.com/acme/terraform-azure-vnet.git\n"),
            Some("terraform-azure-vnet".to_string())
        );
        assert_eq!(
            repo_name_from_remote("git@github.com:acme/terraform-aws-vpc.git"),
            Some("terraform-aws-vpc".to_string())
        );
        assert_eq!(
            repo_name_from_remote("https://github.com/acme/terraform-gcp-net/"),
            Some("terraform-gcp-net".to_string())
        );
        assert_eq!(repo_name_from_remote(""), None);
    }

    #[test]
    fn test_from_repository_falls_back_to_directory_name() {
        let root = tempfile::tempdir().unwrap();
        let repo = root.path().join("terraform-azure-kv");
        let tests = repo.join("tests");
        std::fs::create_dir_all(&tests).unwrap();

        let info = ModuleInfo::from_repository(&tests, "acme").unwrap();
        assert_eq!(info, ModuleInfo::new("acme", "kv", "azure"));
        assert_eq!(info.canonical_source(), "acme/kv/azure");
    }

    #[test]
    fn test_from_repository_unknown_identity() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("not-a-module");
        std::fs::create_dir_all(&dir).unwrap();

        let err = ModuleInfo::from_repository(&dir, "acme").unwrap_err();
        assert!(matches!(err, IacError::UnknownModuleIdentity(_)));
    }
}
