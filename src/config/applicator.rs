//! Patch runner - loads a target once, applies operations in order, saves once
//!
//! This module provides the read-modify-write cycle that:
//! - Loads the target document a single time
//! - Applies every operation in caller order, each seeing the previous output
//! - Records a [`PatchResult`] per operation so no-ops stay visible
//! - Aborts before writing on a line-range error (or any miss, in strict mode)
//! - Writes the document atomically, and only if it changed

use crate::config::schema::{PatchSet, ValidationError};
use crate::document::{DocumentError, SourceDocument};
use crate::edit::{PatchError, PatchOperation, PatchResult};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How a run treats misses and whether it writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute results without writing the target
    pub dry_run: bool,
    /// Abort without writing if any operation does not apply
    pub strict: bool,
}

/// Per-run summary: one result per operation, in order.
#[derive(Debug, Clone)]
pub struct PatchReport {
    pub target: PathBuf,
    pub results: Vec<(String, PatchResult)>,
    pub original: String,
    pub patched: String,
    pub written: bool,
}

impl PatchReport {
    pub fn changed(&self) -> bool {
        self.original != self.patched
    }

    pub fn applied_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_applied()).count()
    }

    pub fn not_applied(&self) -> impl Iterator<Item = &(String, PatchResult)> {
        self.results.iter().filter(|(_, r)| !r.is_applied())
    }

    pub fn all_applied(&self) -> bool {
        self.not_applied().next().is_none()
    }
}

/// Errors that stop a run. Nothing has been written when one is returned.
#[derive(Debug)]
pub enum ApplicationError {
    /// Neither the patch set nor the caller named a target file
    MissingTarget,
    /// Loading or saving the target failed
    Document(DocumentError),
    /// Patch definitions could not be turned into operations
    Config(ValidationError),
    /// A line-range operation pointed past the end of the document
    Range { id: String, source: PatchError },
    /// Strict mode and at least one operation did not apply
    Strict {
        results: Vec<(String, PatchResult)>,
    },
}

impl fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplicationError::MissingTarget => {
                write!(f, "no target file: set meta.target or pass one explicitly")
            }
            ApplicationError::Document(e) => write!(f, "document error: {}", e),
            ApplicationError::Config(e) => write!(f, "invalid patch set: {}", e),
            ApplicationError::Range { id, source } => {
                write!(f, "patch '{}' aborted the run: {}", id, source)
            }
            ApplicationError::Strict { results } => {
                let ids: Vec<&str> = results
                    .iter()
                    .filter(|(_, r)| !r.is_applied())
                    .map(|(id, _)| id.as_str())
                    .collect();
                write!(
                    f,
                    "strict mode: {} patch(es) did not apply: {}",
                    ids.len(),
                    ids.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ApplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApplicationError::Document(e) => Some(e),
            ApplicationError::Config(e) => Some(e),
            ApplicationError::Range { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DocumentError> for ApplicationError {
    fn from(e: DocumentError) -> Self {
        ApplicationError::Document(e)
    }
}

/// Apply `operations` to `doc` in order.
///
/// Misses are recorded and skipped. A line-range error stops immediately;
/// `doc` may then hold the output of the operations before it, so callers
/// must not persist it.
pub fn apply_operations(
    doc: &mut SourceDocument,
    operations: &[(String, PatchOperation)],
) -> Result<Vec<(String, PatchResult)>, ApplicationError> {
    let mut results = Vec::with_capacity(operations.len());
    for (id, op) in operations {
        results.push(apply_one(doc, id, op)?);
    }
    Ok(results)
}

/// Like [`apply_operations`], but each definition is lowered against the
/// document as earlier patches left it.
fn apply_definitions(
    doc: &mut SourceDocument,
    set: &PatchSet,
) -> Result<Vec<(String, PatchResult)>, ApplicationError> {
    let mut results = Vec::with_capacity(set.patches.len());
    for patch in &set.patches {
        let op = patch.to_operation(doc).map_err(|issue| {
            ApplicationError::Config(ValidationError {
                issues: vec![issue],
            })
        })?;
        results.push(apply_one(doc, &patch.id, &op)?);
    }
    Ok(results)
}

fn apply_one(
    doc: &mut SourceDocument,
    id: &str,
    op: &PatchOperation,
) -> Result<(String, PatchResult), ApplicationError> {
    debug!(patch = %id, kind = op.kind(), "applying patch operation");

    let result = op.apply(doc).map_err(|source| ApplicationError::Range {
        id: id.to_string(),
        source,
    })?;

    if !result.is_applied() {
        warn!(patch = %id, "patch operation did not apply: {}", result);
    }
    Ok((id.to_string(), result))
}

/// Load `path`, apply `operations`, and save the result.
pub fn patch_file(
    path: impl AsRef<Path>,
    operations: &[(String, PatchOperation)],
    options: RunOptions,
) -> Result<PatchReport, ApplicationError> {
    let path = path.as_ref();
    let doc = SourceDocument::load(path)?;
    run(path, doc, options, |doc| apply_operations(doc, operations))
}

/// Run a patch set against its target.
///
/// The target is `target` when given, otherwise `meta.target` resolved
/// against `base_dir` (normally the patch-set file's directory). Strict mode
/// is on if either `options.strict` or `meta.strict` is set.
pub fn run_patch_set(
    set: &PatchSet,
    base_dir: &Path,
    target: Option<&Path>,
    options: RunOptions,
) -> Result<PatchReport, ApplicationError> {
    let path = resolve_target(set, base_dir, target)?;
    let doc = SourceDocument::load(&path)?;

    let options = RunOptions {
        strict: options.strict || set.meta.strict,
        ..options
    };
    run(&path, doc, options, |doc| apply_definitions(doc, set))
}

/// Resolve the file a patch set applies to.
pub fn resolve_target(
    set: &PatchSet,
    base_dir: &Path,
    target: Option<&Path>,
) -> Result<PathBuf, ApplicationError> {
    if let Some(path) = target {
        return Ok(path.to_path_buf());
    }
    match set.meta.target.as_deref().map(str::trim) {
        Some(relative) if !relative.is_empty() => Ok(base_dir.join(relative)),
        _ => Err(ApplicationError::MissingTarget),
    }
}

fn run<F>(
    path: &Path,
    mut doc: SourceDocument,
    options: RunOptions,
    apply: F,
) -> Result<PatchReport, ApplicationError>
where
    F: FnOnce(&mut SourceDocument) -> Result<Vec<(String, PatchResult)>, ApplicationError>,
{
    let original = doc.as_str().to_string();
    let results = apply(&mut doc)?;

    if options.strict && results.iter().any(|(_, r)| !r.is_applied()) {
        return Err(ApplicationError::Strict { results });
    }

    let changed = doc.as_str() != original;
    let written = changed && !options.dry_run;

    if written {
        doc.save(path)?;
        info!(path = %path.display(), "wrote patched document");
    } else if !changed {
        debug!(path = %path.display(), "document unchanged, skipping write");
    }

    Ok(PatchReport {
        target: path.to_path_buf(),
        results,
        original,
        patched: doc.into_string(),
        written,
    })
}
