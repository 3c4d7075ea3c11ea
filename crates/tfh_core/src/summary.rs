//! End-of-run summary.

use serde::Serialize;
use tfh_iac::Module;
use tracing::{error, info};

/// A module that finished with at least one recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedModule {
    pub name: String,
    pub errors: Vec<String>,
}

/// Outcome of a whole run, computed once from the aggregated modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub failed: Vec<FailedModule>,
}

impl RunSummary {
    pub fn from_modules(modules: &[Module]) -> Self {
        let failed = modules
            .iter()
            .filter(|m| m.has_errors())
            .map(|m| FailedModule {
                name: m.name.clone(),
                errors: m.errors().to_vec(),
            })
            .collect();
        Self {
            total: modules.len(),
            failed,
        }
    }

    pub fn passed(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Human-readable report: numbered errors per failed module and a total,
    /// or a single success banner.
    pub fn lines(&self) -> Vec<String> {
        if self.passed() {
            return vec![format!(
                "==== SUCCESS: All {} modules applied and destroyed successfully ====",
                self.total
            )];
        }

        let mut lines = Vec::new();
        for module in &self.failed {
            lines.push(format!("Module {} failed with errors:", module.name));
            for (i, err) in module.errors.iter().enumerate() {
                lines.push(format!("  {}. {}", i + 1, err));
            }
            lines.push(String::new());
        }
        lines.push(format!(
            "TOTAL: {} of {} modules failed",
            self.failed.len(),
            self.total
        ));
        lines
    }

    pub fn log(&self) {
        if self.passed() {
            for line in self.lines() {
                info!("{}", line);
            }
        } else {
            for line in self.lines() {
                error!("{}", line);
            }
        }
    }
}
