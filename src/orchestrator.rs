//! Sequences the patch engines over the catalogue. One run moves through
//! `NotStarted -> GeometryComputed -> EnginesPatched -> DocumentsPatched ->
//! Done`, with `Failed` reachable from anywhere. Drift in any tracked file
//! aborts the run before anything is touched, so the target never ends up
//! with a mix of patched and unpatched files.

use std::path::{Path, PathBuf};

use crate::binary;
use crate::catalog::Catalog;
use crate::document;
use crate::error::{PatchError, PatchWarning, Result};
use crate::geometry::{self, PatchContext, Scaling, Viewport, DEFAULT_VIEWPORT};
use crate::safety::{FileState, SafetyStore};
use crate::sjson;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    GeometryComputed,
    EnginesPatched,
    DocumentsPatched,
    Done,
    Failed,
}

#[derive(Debug)]
pub struct PatchReport {
    pub viewport: Viewport,
    pub engines_patched: Vec<String>,
    pub documents_patched: Vec<String>,
    pub warnings: Vec<PatchWarning>,
}

/// Overall answer of the `status` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStatus {
    /// No hash records and the engine binaries still carry their
    /// default-viewport immediates: the tool has not touched this install.
    NotPatched,
    /// Every tracked file matches its recorded post-patch digest.
    Patched,
    /// Partially patched, drifted, or rewritten without bookkeeping:
    /// something changed out-of-band.
    Modified,
}

#[derive(Debug)]
pub struct FileStatus {
    pub path: PathBuf,
    pub state: FileState,
}

#[derive(Debug)]
pub struct StatusReport {
    pub overall: PatchStatus,
    pub files: Vec<FileStatus>,
}

/// Patch every catalogued file for the requested resolution. Binaries go
/// first, documents second, and nothing is written until the whole target
/// set has passed the drift pre-flight.
pub fn patch(
    target_root: &Path,
    catalog: &Catalog,
    width: u32,
    height: u32,
    scaling: Scaling,
    force: bool,
) -> Result<PatchReport> {
    let mut state = RunState::NotStarted;
    let result = patch_run(target_root, catalog, width, height, scaling, force, &mut state);
    if result.is_err() {
        state = RunState::Failed;
        log::debug!("run state: {state:?}");
    }
    result
}

fn patch_run(
    target_root: &Path,
    catalog: &Catalog,
    width: u32,
    height: u32,
    scaling: Scaling,
    force: bool,
    state: &mut RunState,
) -> Result<PatchReport> {
    let viewport = geometry::compute_viewport(width, height, scaling)?;
    let ctx = PatchContext::new(viewport, force);
    advance(state, RunState::GeometryComputed);
    log::info!("computed patch viewport {viewport} using {scaling} scaling");

    let store = SafetyStore::new(target_root);

    // Pre-flight: if any tracked file drifted, stop before touching anything
    // and let the caller decide whether to force a full reset.
    if !force {
        for rel in catalog.tracked_files() {
            let rel = Path::new(rel);
            if store.live_path(rel).exists() && store.check(rel)? == FileState::Drifted {
                return Err(PatchError::HashMismatch {
                    file: store.live_path(rel),
                });
            }
        }
    }

    let mut report = PatchReport {
        viewport,
        engines_patched: Vec::new(),
        documents_patched: Vec::new(),
        warnings: Vec::new(),
    };

    for engine in catalog.engines {
        let rel = Path::new(engine.path);
        log::debug!("patching {} backend at '{}'", engine.name, engine.path);
        let patterns = binary::resolve_patterns(catalog.patterns, engine.overrides);
        let original = store.acquire_original(rel, ctx.force)?;
        match binary::apply_patterns(&original, &patterns, &ctx, rel) {
            Ok((patched, mut warnings)) => {
                store.commit(rel, &patched)?;
                report.warnings.append(&mut warnings);
                report.engines_patched.push(engine.name.to_string());
                log::info!("patched '{}' with viewport {viewport}", engine.path);
            }
            Err(e) => {
                store.abandon(rel)?;
                return Err(e);
            }
        }
    }
    advance(state, RunState::EnginesPatched);

    for doc in catalog.documents {
        let rel = Path::new(doc.path);
        log::debug!("patching document at '{}'", doc.path);
        let original = store.acquire_original(rel, ctx.force)?;
        match patch_one_document(&store, rel, &original, &doc.rule, &ctx) {
            Ok(serialized) => {
                store.commit(rel, &serialized)?;
                report.documents_patched.push(doc.path.to_string());
                log::info!("patched '{}' with viewport {viewport}", doc.path);
            }
            Err(e) => {
                store.abandon(rel)?;
                return Err(e);
            }
        }
    }
    advance(state, RunState::DocumentsPatched);

    advance(state, RunState::Done);
    Ok(report)
}

fn advance(state: &mut RunState, to: RunState) {
    *state = to;
    log::debug!("run state: {to:?}");
}

/// Parse (or load the cached parse of) the pristine document, apply its rule
/// tree, and serialize the result.
fn patch_one_document(
    store: &SafetyStore,
    rel: &Path,
    original: &[u8],
    rule: &document::Rule,
    ctx: &PatchContext,
) -> Result<Vec<u8>> {
    let doc = match store.cached_document(rel)? {
        Some(doc) => doc,
        None => {
            let text = std::str::from_utf8(original).map_err(|e| PatchError::Parse {
                file: rel.to_path_buf(),
                line: 0,
                message: format!("not valid UTF-8: {e}"),
            })?;
            let doc = sjson::parse(text).map_err(|e| PatchError::Parse {
                file: rel.to_path_buf(),
                line: e.line,
                message: e.message,
            })?;
            store.cache_document(rel, &doc)?;
            doc
        }
    };
    let patched = document::patch_document(&doc, rule, ctx, rel)?;
    Ok(sjson::to_string(&patched).into_bytes())
}

/// Overwrite every patched file from its backup and drop all bookkeeping.
pub fn restore(target_root: &Path) -> Result<usize> {
    let store = SafetyStore::new(target_root);
    let restored = store.restore_all()?;
    if restored == 0 {
        log::info!("no backups to restore under '{}'", target_root.display());
    } else {
        log::info!("restored {restored} files under '{}'", target_root.display());
    }
    Ok(restored)
}

/// Re-derive the orchestration state without mutating anything: hash checks
/// for every tracked file, plus a scan of the live engine binaries for
/// default-viewport immediates as independent evidence.
pub fn status(target_root: &Path, catalog: &Catalog) -> Result<StatusReport> {
    let store = SafetyStore::new(target_root);
    // Only the default geometry matters here; the scan looks for immediates
    // a patch would have rewritten.
    let ctx = PatchContext::new(DEFAULT_VIEWPORT, false);

    let mut files = Vec::new();
    let mut tracked = 0usize;
    let mut safe = 0usize;
    let mut drifted = 0usize;
    for rel in catalog.tracked_files() {
        let rel = Path::new(rel);
        if !store.live_path(rel).exists() {
            continue;
        }
        tracked += 1;
        let state = store.check(rel)?;
        match state {
            FileState::SafeToRepatch => safe += 1,
            FileState::Drifted => drifted += 1,
            FileState::Pristine => {}
        }
        files.push(FileStatus {
            path: rel.to_path_buf(),
            state,
        });
    }

    // Independent evidence for the no-records verdict: an engine missing its
    // default-viewport immediates was rewritten even though no hash record
    // says so (for example after the bookkeeping directory was deleted).
    let mut engines_look_pristine = true;
    for engine in catalog.engines {
        let rel = Path::new(engine.path);
        let live = store.live_path(rel);
        if !live.exists() {
            continue;
        }
        let bytes = std::fs::read(&live)?;
        let patterns = binary::resolve_patterns(catalog.patterns, engine.overrides);
        for spec in &patterns {
            if binary::scan_count(&bytes, spec, &ctx) == 0 {
                log::debug!(
                    "'{}' no longer contains default-geometry pattern '{}'",
                    engine.path,
                    spec.name
                );
                engines_look_pristine = false;
            }
        }
    }

    let overall = if safe == 0 && drifted == 0 {
        if engines_look_pristine {
            PatchStatus::NotPatched
        } else {
            PatchStatus::Modified
        }
    } else if safe == tracked {
        PatchStatus::Patched
    } else {
        PatchStatus::Modified
    };

    Ok(StatusReport { overall, files })
}
