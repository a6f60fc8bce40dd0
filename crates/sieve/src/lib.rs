//! Incremental eligibility filter.
//!
//! Classifies previously generated descriptors as still-valid (skip) versus
//! needing regeneration, given the current compilation's input set:
//!
//! 1. Purge descriptors whose source is no longer part of the compilation
//!    (renamed, moved, removed) — their artifacts are orphaned.
//! 2. Purge descriptors with any recorded artifact missing on disk.
//! 3. Purge descriptors whose earliest artifact predates the latest known
//!    change (`max(source mtime, dependency last-written)`).
//! 4. What survives is the ineligible (skip) set; its complement within the
//!    current paths is eligible and must regenerate.
//!
//! The timestamp tie-break is deliberately conservative: the staleness
//! threshold is the *maximum* of the upstream times, compared against the
//! *minimum* artifact write time, so even one stale artifact forces a full
//! regeneration of its unit.

use chrono::{DateTime, Utc};
use common::mtime_utc;
use ledger::GeneratedLedger;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Outcome of an eligibility pass.
#[derive(Debug, Default)]
pub struct Eligibility {
    /// Source paths that must be (re)processed this run.
    pub eligible: BTreeSet<PathBuf>,
    /// Descriptors left untouched in the ledger (still valid).
    pub retained: usize,
    /// Descriptors purged during classification.
    pub purged: usize,
}

impl Eligibility {
    pub fn is_eligible(&self, path: &Path) -> bool {
        self.eligible.contains(path)
    }
}

fn norm(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Partitions the prior ledger against the current input set.
///
/// `deps_last_written` is the dependency ledger's global "anything upstream
/// changed" signal; `None` means no dependencies are tracked.
pub fn partition(
    ledger: &mut GeneratedLedger,
    current_paths: &BTreeSet<PathBuf>,
    deps_last_written: Option<DateTime<Utc>>,
) -> Eligibility {
    let current: BTreeSet<String> = current_paths.iter().map(|p| norm(p)).collect();

    // Step 1: sources gone from the compilation can never be reused.
    // Assembly-level descriptors (no source path) fall here too: they
    // cannot be validated by file timestamps, so they regenerate each run.
    let mut purged = ledger.purge_where(|d| match &d.source_file_path {
        Some(path) => !current.contains(&norm(path)),
        None => true,
    });

    // Step 2: an externally deleted artifact invalidates its descriptor
    // entirely (purge, not just mark stale).
    let output_dir = ledger.output_dir().to_path_buf();
    let ext = ledger.source_ext().to_string();
    let missing: Vec<Option<String>> = ledger
        .iter()
        .filter(|d| d.artifact_paths(&output_dir, &ext).any(|p| !p.exists()))
        .map(|d| d.source_file_path.as_deref().map(norm))
        .collect();
    purged += ledger.purge_where(|d| missing.contains(&d.source_file_path.as_deref().map(norm)));

    // Step 3: staleness. Threshold is the latest upstream change; the
    // earliest artifact must not predate it.
    let stale: Vec<Option<String>> = ledger
        .iter()
        .filter(|d| {
            let Some(source) = d.source_file_path.as_deref() else {
                return false;
            };
            let source_time = mtime_utc(source);
            let threshold = match (source_time, deps_last_written) {
                (Some(s), Some(a)) => Some(s.max(a)),
                (s, a) => s.or(a),
            };
            let Some(threshold) = threshold else {
                // Source unreadable and no dependency signal: regenerate.
                return true;
            };
            let earliest = d
                .artifact_paths(&output_dir, &ext)
                .filter_map(|p| mtime_utc(&p))
                .min();
            match earliest {
                Some(earliest) => earliest < threshold,
                None => true,
            }
        })
        .map(|d| d.source_file_path.as_deref().map(norm))
        .collect();
    purged += ledger.purge_where(|d| stale.contains(&d.source_file_path.as_deref().map(norm)));

    // Step 4: survivors skip; everything else in the input set regenerates.
    let retained_keys: BTreeSet<String> = ledger
        .iter()
        .filter_map(|d| d.source_file_path.as_deref().map(norm))
        .collect();
    let eligible: BTreeSet<PathBuf> = current_paths
        .iter()
        .filter(|p| !retained_keys.contains(&norm(p)))
        .cloned()
        .collect();

    tracing::debug!(
        eligible = eligible.len(),
        retained = retained_keys.len(),
        purged,
        "eligibility computed"
    );

    Eligibility {
        eligible,
        retained: retained_keys.len(),
        purged,
    }
}
