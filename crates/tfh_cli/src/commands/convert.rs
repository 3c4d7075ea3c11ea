//! Convert and revert commands - manual source rewriting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tfh_core::DEFAULT_NAMESPACE;
use tfh_iac::{FileRestore, HclSourceConverter, HttpRegistryClient, ModuleInfo, SourceConverter};

#[derive(Args)]
pub struct ConvertArgs {
    /// Example directory to rewrite
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Module name, as published in the registry
    #[arg(long)]
    pub name: String,

    /// Module provider, as published in the registry
    #[arg(long)]
    pub provider: String,

    /// Registry namespace
    #[arg(long, env = "TFH_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// File the original contents are saved to; appended to if it exists
    #[arg(long, default_value = "tfharness-restore.json")]
    pub restore_file: PathBuf,
}

#[derive(Args)]
pub struct RevertArgs {
    /// File written by the convert command
    #[arg(long, default_value = "tfharness-restore.json")]
    pub restore_file: PathBuf,
}

fn converter() -> Result<HclSourceConverter> {
    let registry = HttpRegistryClient::new().context("failed to create registry client")?;
    Ok(HclSourceConverter::new(Arc::new(registry)))
}

fn load_restores(path: &Path) -> Result<Vec<FileRestore>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read restore file {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("invalid restore file {:?}", path))
}

fn save_restores(path: &Path, restores: &[FileRestore]) -> Result<()> {
    let json = serde_json::to_string_pretty(restores)?;
    std::fs::write(path, json).with_context(|| format!("failed to write restore file {:?}", path))
}

pub async fn execute_convert(args: ConvertArgs, cancel: CancellationToken) -> Result<()> {
    let info = ModuleInfo::new(args.namespace, args.name, args.provider);
    info!("Converting {:?} to local source for {}", args.dir, info);

    let mut saved = load_restores(&args.restore_file)?;
    let outcome = converter()?
        .convert_to_local(&args.dir, &info, &cancel)
        .await;

    let (converted, failure) = match outcome {
        Ok(restores) => (restores, None),
        Err(mut e) => (std::mem::take(&mut e.completed), Some(e)),
    };
    let count = converted.len();
    saved.extend(converted);
    save_restores(&args.restore_file, &saved)?;

    if let Some(e) = failure {
        warn!("Partial conversion saved to {:?}", args.restore_file);
        return Err(e.into());
    }

    println!(
        "Converted {} file(s); restore data in {}",
        count,
        args.restore_file.display()
    );
    Ok(())
}

pub async fn execute_revert(args: RevertArgs, cancel: CancellationToken) -> Result<()> {
    let restores = load_restores(&args.restore_file)?;
    if restores.is_empty() {
        println!("Nothing to revert");
        return Ok(());
    }

    let report = converter()?
        .revert_to_registry(&restores, &cancel)
        .await
        .context("failed to revert files to registry source")?;
    std::fs::remove_file(&args.restore_file)?;

    println!(
        "Reverted {} file(s): {} pinned to latest, {} restored verbatim",
        report.total(),
        report.pinned,
        report.restored_verbatim
    );
    Ok(())
}
