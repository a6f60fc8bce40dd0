//! Registry file persistence.
//!
//! The registry serializes as a single JSON document:
//!
//! ```json
//! {
//!   "outputDirectory": "/proj/target/generated",
//!   "items": [
//!     { "sourceFilePath": "src/foo.rs",
//!       "lastModified": "2026-08-27T10:15:00Z",
//!       "generatedAssetKeys": ["0d6af0d2-..."] }
//!   ]
//! }
//! ```
//!
//! Save is create-or-truncate; concurrent readers are tolerated, concurrent
//! writers are coordinated only by OS-level file locking. Load treats a
//! missing or unreadable file as an empty registry — absence is a normal
//! condition, never an error.

use crate::set::DescriptorSet;
use common::Keyed;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Where a registry lives on disk and where its artifacts go.
///
/// Kept apart from [`DescriptorSet`] on purpose: the set is a pure ordered
/// collection, the directory and file name are store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory generated artifacts are written to.
    pub output_dir: PathBuf,
    /// Path of the registry JSON file.
    pub registry_path: PathBuf,
}

/// On-disk shape of a registry. Conversion to and from the in-memory set is
/// explicit via [`to_transfer`] / [`from_transfer`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryFile<T> {
    pub output_directory: PathBuf,
    pub items: Vec<T>,
}

/// Builds the transfer object for serialization, items in comparator order.
pub fn to_transfer<T: Keyed + Clone>(set: &DescriptorSet<T>, output_dir: &Path) -> RegistryFile<T> {
    RegistryFile {
        output_directory: output_dir.to_path_buf(),
        items: set.items(),
    }
}

/// Rebuilds the in-memory set from a transfer object.
///
/// Returns the set together with the on-disk output directory; callers
/// decide whether to honor the latter (the generation manager always
/// overrides it with its configured intermediate directory).
pub fn from_transfer<T: Keyed + Clone>(file: RegistryFile<T>) -> (DescriptorSet<T>, PathBuf) {
    let mut set = DescriptorSet::new();
    set.set_items(file.items);
    (set, file.output_directory)
}

/// Serializes `set` to `config.registry_path`, create-or-truncate.
///
/// Returns `false` on any ordinary I/O or serialization failure without
/// raising; callers that need a hard error wrap this themselves.
pub fn try_save<T: Keyed + Clone + Serialize>(set: &DescriptorSet<T>, config: &StoreConfig) -> bool {
    if let Some(parent) = config.registry_path.parent() {
        if std::fs::create_dir_all(parent).is_err() {
            return false;
        }
    }
    let file = match File::create(&config.registry_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(
                path = %config.registry_path.display(),
                "registry save failed: {e}"
            );
            return false;
        }
    };
    let transfer = to_transfer(set, &config.output_dir);
    match serde_json::to_writer_pretty(BufWriter::new(file), &transfer) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                path = %config.registry_path.display(),
                "registry serialization failed: {e}"
            );
            false
        }
    }
}

/// Loads a registry from `config.registry_path`.
///
/// Missing file, unreadable file, or corrupt JSON all degrade to an empty
/// set. The on-disk output directory is informational only and discarded;
/// the configured one wins.
pub fn try_load<T: Keyed + Clone + DeserializeOwned>(config: &StoreConfig) -> DescriptorSet<T> {
    if !config.registry_path.exists() {
        return DescriptorSet::new();
    }
    let file = match File::open(&config.registry_path) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(
                path = %config.registry_path.display(),
                "registry open failed, assuming empty: {e}"
            );
            return DescriptorSet::new();
        }
    };
    match serde_json::from_reader::<_, RegistryFile<T>>(std::io::BufReader::new(file)) {
        Ok(transfer) => {
            let (set, disk_dir) = from_transfer(transfer);
            if disk_dir != config.output_dir {
                tracing::debug!(
                    on_disk = %disk_dir.display(),
                    configured = %config.output_dir.display(),
                    "registry output directory overridden by configuration"
                );
            }
            set
        }
        Err(e) => {
            tracing::warn!(
                path = %config.registry_path.display(),
                "registry parse failed, assuming empty: {e}"
            );
            DescriptorSet::new()
        }
    }
}
