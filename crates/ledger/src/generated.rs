//! Generated-unit ledger: the registry of source → artifact mappings.
//!
//! Owns the purge semantics (remove **and** delete backing artifact files)
//! and the response-file layer (one absolute generated path per line, for
//! downstream build steps).

use crate::set::DescriptorSet;
use crate::store::{self, StoreConfig};
use crate::LedgerError;
use common::{artifact_file_name, GeneratedUnitDescriptor, Keyed};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Store configuration for the generated ledger.
#[derive(Debug, Clone)]
pub struct GeneratedStoreConfig {
    /// Intermediate directory artifacts are written to.
    pub output_dir: PathBuf,
    /// Path of the registry JSON file.
    pub registry_path: PathBuf,
    /// Path of the companion response file.
    pub response_path: PathBuf,
    /// Host-language source extension (`rs`, `cs`, ...).
    pub source_ext: String,
}

/// Persistent, ordered, deduplicated collection of generated-unit
/// descriptors.
#[derive(Debug)]
pub struct GeneratedLedger {
    set: DescriptorSet<GeneratedUnitDescriptor>,
    config: GeneratedStoreConfig,
}

impl GeneratedLedger {
    pub fn new(config: GeneratedStoreConfig) -> Self {
        Self {
            set: DescriptorSet::new(),
            config,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn source_ext(&self) -> &str {
        &self.config.source_ext
    }

    /// Absolute path of the artifact file for `id`.
    pub fn artifact_path(&self, id: &Uuid) -> PathBuf {
        self.config
            .output_dir
            .join(artifact_file_name(id, &self.config.source_ext))
    }

    /// Inserts a fresh descriptor; rejects a duplicate key.
    pub fn insert(&mut self, descriptor: GeneratedUnitDescriptor) -> bool {
        self.set.insert(descriptor)
    }

    /// Purges any existing descriptor with the same key (deleting its
    /// artifact files, which the new descriptor no longer accounts for),
    /// then inserts.
    pub fn replace(&mut self, descriptor: GeneratedUnitDescriptor) {
        let key = descriptor.key().map(|k| k.to_lowercase());
        self.purge_where(|d| d.key().map(|k| k.to_lowercase()) == key);
        self.set.insert(descriptor);
    }

    /// Collection-only removal. Returns the count removed.
    pub fn remove_where(&mut self, pred: impl FnMut(&GeneratedUnitDescriptor) -> bool) -> usize {
        self.set.remove_where(pred)
    }

    /// Strong removal: deletes every backing artifact file of each matching
    /// descriptor, then removes the descriptors. An already-missing file is
    /// a normal outcome; any other delete failure is logged, never
    /// swallowed silently. Idempotent — an empty match set returns 0.
    pub fn purge_where(&mut self, mut pred: impl FnMut(&GeneratedUnitDescriptor) -> bool) -> usize {
        let doomed: Vec<GeneratedUnitDescriptor> =
            self.set.iter().filter(|d| pred(d)).cloned().collect();
        for descriptor in &doomed {
            for path in descriptor.artifact_paths(&self.config.output_dir, &self.config.source_ext)
            {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "artifact delete failed: {e}");
                    }
                }
            }
        }
        let keys: Vec<Option<String>> = doomed
            .iter()
            .map(|d| d.key().map(|k| k.to_lowercase()))
            .collect();
        self.set
            .remove_where(|d| keys.contains(&d.key().map(|k| k.to_lowercase())))
    }

    pub fn items(&self) -> Vec<GeneratedUnitDescriptor> {
        self.set.items()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedUnitDescriptor> {
        self.set.iter()
    }

    pub fn contains(&self, key: Option<&str>) -> bool {
        self.set.contains(key)
    }

    pub fn get(&self, key: Option<&str>) -> Option<&GeneratedUnitDescriptor> {
        self.set.get(key)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            output_dir: self.config.output_dir.clone(),
            registry_path: self.config.registry_path.clone(),
        }
    }

    /// Base save: registry file only. `false` on ordinary I/O failure.
    pub fn try_save(&self) -> bool {
        store::try_save(&self.set, &self.store_config())
    }

    /// Loads prior state from the registry file. Missing or corrupt files
    /// degrade to an empty set; the configured output directory always
    /// overrides the on-disk value.
    ///
    /// Returns whether the loaded (or fallback) set is non-empty. This
    /// deliberately conflates "load succeeded" with "registry non-empty" —
    /// callers use it as a "did we have prior state" flag, and the
    /// documented behavior is preserved as-is.
    pub fn try_load(&mut self) -> bool {
        self.set = store::try_load(&self.store_config());
        !self.set.is_empty()
    }

    /// Full save: registry file plus response file.
    ///
    /// A failed registry save deletes any stale response file (so no stale
    /// path list outlives the registry it described) and errors. A failed
    /// response-file write also errors so the caller knows generation
    /// output may be inconsistent with bookkeeping.
    pub fn save_with_response(&self) -> Result<(), LedgerError> {
        if !self.try_save() {
            match std::fs::remove_file(&self.config.response_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(
                        path = %self.config.response_path.display(),
                        "stale response file delete failed: {e}"
                    );
                }
            }
            return Err(LedgerError::RegistryWrite(self.config.registry_path.clone()));
        }
        self.write_response_file()?;
        Ok(())
    }

    /// One absolute generated path per line, one line per artifact, in
    /// descriptor comparator order.
    fn write_response_file(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.config.response_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(&self.config.response_path)?);
        for descriptor in self.set.iter() {
            for path in descriptor.artifact_paths(&self.config.output_dir, &self.config.source_ext)
            {
                writeln!(file, "{}", path.display())?;
            }
        }
        file.flush()?;
        Ok(())
    }
}
