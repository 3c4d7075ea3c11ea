//! Reversible rewriting of registry module sources to local paths.
//!
//! Example configurations reference the module under test by its registry
//! coordinates. Before a local test run those references are pointed at the
//! working tree, and afterwards they are put back, pinned to the latest
//! published version.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hcl_edit::expr::Expression;
use hcl_edit::structure::Body;
use hcl_edit::Span;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IacError, IacResult};
use crate::identity::ModuleInfo;
use crate::registry::RegistryClient;

/// Local source for the module under test, relative to an example directory.
pub const LOCAL_ROOT_SOURCE: &str = "../../";

/// Local directory holding sub-components of the module under test.
pub const LOCAL_MODULES_DIR: &str = "../../modules";

const TF_EXTENSION: &str = "tf";

/// Snapshot of one configuration file taken before it was rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRestore {
    pub path: PathBuf,
    pub original_content: String,
    pub module: ModuleInfo,
}

/// A conversion that stopped part way, with the files already rewritten.
#[derive(Error, Debug)]
#[error("source conversion failed after {} rewritten file(s): {source}", .completed.len())]
pub struct ConversionError {
    pub completed: Vec<FileRestore>,
    #[source]
    pub source: IacError,
}

impl ConversionError {
    fn new(completed: Vec<FileRestore>, source: IacError) -> Self {
        Self { completed, source }
    }
}

/// Outcome of a reversal pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertReport {
    /// Files restored with their version pin bumped to the latest release.
    pub pinned: usize,
    /// Files restored byte-for-byte because no version could be resolved.
    pub restored_verbatim: usize,
}

impl RevertReport {
    pub fn total(&self) -> usize {
        self.pinned + self.restored_verbatim
    }
}

/// Rewrites module sources between registry and local form.
#[async_trait]
pub trait SourceConverter: Send + Sync {
    /// Point matching module sources in `dir` at the local working tree.
    async fn convert_to_local(
        &self,
        dir: &Path,
        module: &ModuleInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileRestore>, ConversionError>;

    /// Restore every rewritten file, pinning to the latest registry version when known.
    async fn revert_to_registry(
        &self,
        restores: &[FileRestore],
        cancel: &CancellationToken,
    ) -> IacResult<RevertReport>;
}

/// Matches registry sources belonging to one module.
struct SourceMatcher {
    canonical: String,
    submodule: Regex,
}

impl SourceMatcher {
    fn new(module: &ModuleInfo) -> IacResult<Self> {
        let canonical = module.canonical_source();
        let submodule = Regex::new(&format!("^{}//modules/(.*)$", regex::escape(&canonical)))?;
        Ok(Self {
            canonical,
            submodule,
        })
    }

    /// The local replacement for `source`, if it refers to this module.
    fn local_source(&self, source: &str) -> Option<String> {
        if source == self.canonical {
            return Some(LOCAL_ROOT_SOURCE.to_string());
        }
        self.submodule.captures(source).map(|caps| {
            let sub = caps.get(1).map_or("", |m| m.as_str());
            format!("{}/{}", LOCAL_MODULES_DIR, sub.trim_start_matches('/'))
        })
    }

    fn matches(&self, source: &str) -> bool {
        source == self.canonical || self.submodule.is_match(source)
    }
}

/// A replacement of one byte range of the original text.
struct Edit {
    range: Range<usize>,
    replacement: String,
}

/// Apply non-overlapping edits to `text`, leaving every other byte alone.
fn apply_edits(text: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    let mut out = text.to_string();
    for edit in edits {
        out.replace_range(edit.range, &edit.replacement);
    }
    out
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// A string attribute's value and the byte range of its literal.
fn string_attr<'a>(body: &'a Body, key: &str) -> Option<(&'a str, Range<usize>)> {
    let attr = body.get_attribute(key)?;
    match &attr.value {
        Expression::String(s) => Some((s.value().as_str(), attr.value.span()?)),
        _ => None,
    }
}

/// Narrow `span` to the quoted literal, quotes included.
fn literal_range(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    text.get(span.clone())?;

    let mut range = span;
    while range.start < range.end && bytes[range.start].is_ascii_whitespace() {
        range.start += 1;
    }
    while range.end > range.start && bytes[range.end - 1].is_ascii_whitespace() {
        range.end -= 1;
    }
    if bytes.get(range.start) != Some(&b'"') && range.start > 0 && bytes[range.start - 1] == b'"' {
        range.start -= 1;
    }
    let closed = range.end - range.start >= 2 && bytes[range.end - 1] == b'"';
    if !closed && bytes.get(range.end) == Some(&b'"') {
        range.end += 1;
    }
    Some(range)
}

/// Widen an attribute span to its whole line, line terminator included,
/// when nothing but whitespace or a comment shares the line with it.
fn line_range(text: &str, span: Range<usize>) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let item = text.get(span.clone())?;
    if item.ends_with('\n') {
        return Some(span);
    }

    let mut start = span.start;
    while start > 0 && matches!(bytes[start - 1], b' ' | b'\t') {
        start -= 1;
    }
    let at_line_start = start == 0 || bytes[start - 1] == b'\n';

    let line_end = text[span.end..]
        .find('\n')
        .map_or(text.len(), |i| span.end + i + 1);
    let rest = text[span.end..line_end].trim();
    let rest_is_trivia = rest.is_empty() || rest.starts_with('#') || rest.starts_with("//");

    if at_line_start && rest_is_trivia {
        Some(start..line_end)
    } else {
        Some(span)
    }
}

/// Edits that point matching module blocks, at any depth, at the working tree.
fn localize_edits(text: &str, body: &Body, matcher: &SourceMatcher, edits: &mut Vec<Edit>) {
    for block in body.blocks() {
        if block.ident.as_str() == "module" {
            let local = string_attr(&block.body, "source").and_then(|(source, span)| {
                matcher.local_source(source).map(|local| (local, span))
            });
            if let Some((local, span)) = local {
                if let Some(range) = literal_range(text, span) {
                    edits.push(Edit {
                        range,
                        replacement: quote(&local),
                    });
                    let version = block
                        .body
                        .get_attribute("version")
                        .and_then(|attr| attr.span())
                        .and_then(|span| line_range(text, span));
                    if let Some(range) = version {
                        edits.push(Edit {
                            range,
                            replacement: String::new(),
                        });
                    }
                }
            }
        }
        localize_edits(text, &block.body, matcher, edits);
    }
}

/// Edits setting `~> <version>` on the version pin of matching module blocks.
fn pin_edits(
    text: &str,
    body: &Body,
    matcher: &SourceMatcher,
    version: &str,
    edits: &mut Vec<Edit>,
) {
    for block in body.blocks() {
        if block.ident.as_str() == "module" {
            let matched = string_attr(&block.body, "source")
                .map_or(false, |(source, _)| matcher.matches(source));
            let pin = string_attr(&block.body, "version")
                .and_then(|(_, span)| literal_range(text, span));
            if let (true, Some(range)) = (matched, pin) {
                edits.push(Edit {
                    range,
                    replacement: quote(&format!("~> {}", version)),
                });
            }
        }
        pin_edits(text, &block.body, matcher, version, edits);
    }
}

/// Replace `path` in one step, keeping its permissions.
pub(crate) fn write_atomic(path: &Path, content: &str) -> IacResult<()> {
    let write_err = |source: std::io::Error| IacError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(write_err)?;
    }
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// `*.tf` files directly inside `dir`, sorted by name.
fn terraform_files(dir: &Path) -> IacResult<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*.{}",
        glob::Pattern::escape(&dir.to_string_lossy()),
        TF_EXTENSION
    );
    let entries = glob::glob(&pattern).map_err(|e| IacError::Pattern {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Source converter built on `hcl-edit`.
///
/// Files are parsed to locate the literals to change, and only those byte
/// ranges are rewritten, so line endings and formatting elsewhere survive.
pub struct HclSourceConverter {
    registry: Arc<dyn RegistryClient>,
}

impl HclSourceConverter {
    pub fn new(registry: Arc<dyn RegistryClient>) -> Self {
        Self { registry }
    }

    /// Rewrite one file. `Ok(None)` means it had nothing to change.
    fn convert_file(
        &self,
        path: &Path,
        module: &ModuleInfo,
        matcher: &SourceMatcher,
    ) -> IacResult<Option<FileRestore>> {
        let original = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {:?}: {}", path, e);
                return Ok(None);
            }
        };

        let body = hcl_edit::parser::parse_body(&original).map_err(|e| IacError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut edits = Vec::new();
        localize_edits(&original, &body, matcher, &mut edits);
        if edits.is_empty() {
            return Ok(None);
        }

        write_atomic(path, &apply_edits(&original, edits))?;
        debug!("Rewrote module sources in {:?}", path);

        Ok(Some(FileRestore {
            path: path.to_path_buf(),
            original_content: original,
            module: module.clone(),
        }))
    }

    /// The original content of `restore` with matching version pins set to `~> version`.
    fn pinned_content(restore: &FileRestore, version: &str) -> IacResult<String> {
        let matcher = SourceMatcher::new(&restore.module)?;
        let original = &restore.original_content;
        let body = hcl_edit::parser::parse_body(original).map_err(|e| IacError::Parse {
            path: restore.path.clone(),
            message: e.to_string(),
        })?;

        let mut edits = Vec::new();
        pin_edits(original, &body, &matcher, version, &mut edits);
        Ok(apply_edits(original, edits))
    }
}

#[async_trait]
impl SourceConverter for HclSourceConverter {
    async fn convert_to_local(
        &self,
        dir: &Path,
        module: &ModuleInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileRestore>, ConversionError> {
        let matcher = SourceMatcher::new(module).map_err(|e| ConversionError::new(Vec::new(), e))?;
        let files = terraform_files(dir).map_err(|e| ConversionError::new(Vec::new(), e))?;

        let mut restores = Vec::new();
        for path in files {
            if cancel.is_cancelled() {
                return Err(ConversionError::new(restores, IacError::Cancelled));
            }
            match self.convert_file(&path, module, &matcher) {
                Ok(Some(restore)) => restores.push(restore),
                Ok(None) => {}
                Err(e) => return Err(ConversionError::new(restores, e)),
            }
        }

        if !restores.is_empty() {
            info!(
                "Converted {} file(s) in {:?} to local sources for {}",
                restores.len(),
                dir,
                module
            );
        }
        Ok(restores)
    }

    async fn revert_to_registry(
        &self,
        restores: &[FileRestore],
        cancel: &CancellationToken,
    ) -> IacResult<RevertReport> {
        let mut report = RevertReport::default();

        for restore in restores {
            if cancel.is_cancelled() {
                return Err(IacError::Cancelled);
            }

            let module = &restore.module;
            let latest = self
                .registry
                .get_latest_version(&module.namespace, &module.name, &module.provider)
                .await;

            let content = match latest {
                Ok(version) => match Self::pinned_content(restore, &version) {
                    Ok(content) => {
                        debug!("Pinning {:?} to ~> {}", restore.path, version);
                        report.pinned += 1;
                        content
                    }
                    Err(e) => {
                        warn!("Restoring {:?} verbatim: {}", restore.path, e);
                        report.restored_verbatim += 1;
                        restore.original_content.clone()
                    }
                },
                Err(e) => {
                    warn!(
                        "Could not resolve latest version of {}, restoring {:?} verbatim: {}",
                        module, restore.path, e
                    );
                    report.restored_verbatim += 1;
                    restore.original_content.clone()
                }
            };

            write_atomic(&restore.path, &content)?;
        }

        Ok(report)
    }
}
