//! Descriptor records shared by the registry, the eligibility filter and the
//! generation orchestrator.
//!
//! A descriptor maps one generation trigger (a source file, or the whole
//! assembly when no file applies) to the artifacts it produced, plus the
//! source mtime snapshot taken at generation time. Descriptors are the unit
//! of bookkeeping: they round-trip through the registry file and drive the
//! "regenerate or reuse" decision on the next run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Infix between the artifact id and the host-language source extension.
pub const GENERATED_INFIX: &str = ".g.";

/// File name of one generated artifact: `{id}.g.{ext}`.
///
/// The id renders in hyphenated 32-digit form (`Uuid` display default),
/// which is also the form persisted in the registry file.
pub fn artifact_file_name(id: &Uuid, ext: &str) -> String {
    format!("{}{}{}", id.as_hyphenated(), GENERATED_INFIX, ext)
}

/// Last-modified time of `path` as UTC, or `None` when the file is missing
/// or its metadata cannot be read. Absence is a normal condition here, never
/// an error.
pub fn mtime_utc(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(mtime))
}

/// Identity and ordering key of a descriptor inside a descriptor set.
///
/// Keys compare case-insensitively; `None` sorts before any `Some`.
pub trait Keyed {
    fn key(&self) -> Option<String>;
}

/// Bookkeeping record for one generation trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedUnitDescriptor {
    /// `None` denotes an assembly-level trigger (not tied to one file).
    #[serde(default)]
    pub source_file_path: Option<PathBuf>,
    /// Source mtime snapshot at generation time; `None` when the source
    /// did not exist (assembly-level).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    /// Ordered ids of the artifacts produced from this trigger.
    #[serde(default)]
    pub generated_asset_keys: Vec<Uuid>,
}

impl GeneratedUnitDescriptor {
    /// Fresh descriptor for `source`, snapshotting its mtime now.
    pub fn for_source(source: Option<&Path>) -> Self {
        Self {
            source_file_path: source.map(Path::to_path_buf),
            last_modified: source.and_then(mtime_utc),
            generated_asset_keys: Vec::new(),
        }
    }

    /// Appends an artifact id, keeping the list ordered-but-unique.
    pub fn push_key(&mut self, id: Uuid) {
        if !self.generated_asset_keys.contains(&id) {
            self.generated_asset_keys.push(id);
        }
    }

    /// Absolute paths of this descriptor's artifacts under `output_dir`.
    pub fn artifact_paths<'a>(
        &'a self,
        output_dir: &'a Path,
        ext: &'a str,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        self.generated_asset_keys
            .iter()
            .map(move |id| output_dir.join(artifact_file_name(id, ext)))
    }
}

impl Keyed for GeneratedUnitDescriptor {
    fn key(&self) -> Option<String> {
        self.source_file_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }
}

/// Bookkeeping record for one loaded plugin or dependency assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyDependencyDescriptor {
    pub assembly_path: PathBuf,
}

impl AssemblyDependencyDescriptor {
    pub fn new(assembly_path: impl Into<PathBuf>) -> Self {
        Self {
            assembly_path: assembly_path.into(),
        }
    }
}

impl Keyed for AssemblyDependencyDescriptor {
    fn key(&self) -> Option<String> {
        Some(self.assembly_path.to_string_lossy().into_owned())
    }
}
