//! Dependency ledger: loaded assembly paths from previous runs.
//!
//! The eligibility filter uses the maximum mtime across tracked paths as a
//! global "anything upstream changed" signal; a generated artifact older
//! than any tracked assembly must be regenerated.

use crate::set::DescriptorSet;
use crate::store::{self, StoreConfig};
use chrono::{DateTime, Utc};
use common::{mtime_utc, AssemblyDependencyDescriptor};
use std::path::{Path, PathBuf};

/// Persistent set of assembly paths the resolver has loaded.
#[derive(Debug)]
pub struct DependencyLedger {
    set: DescriptorSet<AssemblyDependencyDescriptor>,
    registry_path: PathBuf,
}

impl DependencyLedger {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            set: DescriptorSet::new(),
            registry_path: registry_path.into(),
        }
    }

    /// Records a loaded assembly path. Returns `false` when the path was
    /// already tracked.
    pub fn register(&mut self, path: &Path) -> bool {
        self.set.insert(AssemblyDependencyDescriptor::new(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.set.contains(Some(&*path.to_string_lossy()))
    }

    /// Drops every descriptor whose path no longer exists on disk, then
    /// persists. Returns the count removed.
    pub fn purge_not_exists(&mut self) -> usize {
        let removed = self.set.remove_where(|d| !d.assembly_path.exists());
        if removed > 0 {
            self.try_save();
        }
        removed
    }

    /// Maximum file-modified time across all tracked paths, or `None` when
    /// the tracked set is empty (or nothing is readable).
    pub fn last_written(&self) -> Option<DateTime<Utc>> {
        self.set
            .iter()
            .filter_map(|d| mtime_utc(&d.assembly_path))
            .max()
    }

    pub fn items(&self) -> Vec<AssemblyDependencyDescriptor> {
        self.set.items()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            // The deps registry has no artifact directory of its own; its
            // parent stands in for the transfer object's field.
            output_dir: self
                .registry_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            registry_path: self.registry_path.clone(),
        }
    }

    /// `false` on ordinary I/O failure, never raises.
    pub fn try_save(&self) -> bool {
        store::try_save(&self.set, &self.store_config())
    }

    /// Missing or corrupt file degrades to empty. Returns whether the
    /// loaded set is non-empty (same conflation as the generated ledger).
    pub fn try_load(&mut self) -> bool {
        self.set = store::try_load(&self.store_config());
        !self.set.is_empty()
    }
}
