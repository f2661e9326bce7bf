//! File-level apply pipeline.
//!
//! Wraps the in-memory executor with the load/persist discipline a real
//! editing session needs: load fresh, apply, detect concurrent external
//! edits, keep a `.bak` of the previous content, persist atomically.

use std::path::Path;
use std::time::SystemTime;

use kdraft_sch::codec::DocumentCodec;

use crate::apply::{ApplyError, ApplyOutcome, apply_plan};
use crate::op::Plan;

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Apply a plan to the document stored at `path`.
///
/// The file's modification time is captured before the apply and checked
/// again before persisting; if another process wrote the file in between,
/// the apply is abandoned with [`ApplyError::ConcurrentModification`] and
/// the file is left exactly as that process wrote it.
///
/// Before persisting, the previous content is copied to `<path>.bak`. The
/// backup is best-effort: a failure to write it is logged but does not stop
/// the apply, since the atomic persist alone already guarantees the file is
/// never left half-written.
pub fn apply_to_file<C: DocumentCodec>(
    codec: &C,
    path: &Path,
    plan: &Plan,
) -> Result<ApplyOutcome, ApplyError> {
    let seen = modified_at(path);
    let doc = codec.load(path).map_err(ApplyError::Load)?;

    let outcome = apply_plan(&doc, plan)?;

    if modified_at(path) != seen {
        return Err(ApplyError::ConcurrentModification {
            path: path.to_path_buf(),
        });
    }

    let backup = path.with_extension(match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.bak"),
        None => "bak".to_string(),
    });
    if let Err(err) = std::fs::copy(path, &backup) {
        log::warn!("could not write backup {}: {err}", backup.display());
    }

    codec
        .persist(path, &outcome.document)
        .map_err(ApplyError::Persist)?;

    log::info!(
        "applied {} operation(s) to {} (+{} refs, +{} nets)",
        plan.ops.len(),
        path.display(),
        outcome.summary.created_refs.len(),
        outcome.summary.created_nets.len(),
    );
    Ok(outcome)
}
