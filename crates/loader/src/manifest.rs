//! Sidecar dependency manifest.
//!
//! A plugin dylib may carry `{stem}.deps.json` next to itself, enumerating
//! the runtime and compile-time libraries it depends on. The host merges
//! every manifest it sees into the running [`DependencyContext`] so that
//! transitive dependencies resolve when the OS loader alone cannot find
//! them.
//!
//! ```json
//! {
//!   "runtime": [
//!     { "package": "acme-templates", "assets": ["libacme_templates.so"] }
//!   ],
//!   "compile": []
//! }
//! ```

use crate::LoaderError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One library entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Package name, matched case-insensitively during resolution.
    pub package: String,
    /// Asset file names this package ships (relative, name-only).
    #[serde(default)]
    pub assets: Vec<String>,
}

impl LibraryEntry {
    /// `true` when `name` matches the package name or any asset file name
    /// sans extension, case-insensitively.
    pub fn matches(&self, name: &str) -> bool {
        if self.package.eq_ignore_ascii_case(name) {
            return true;
        }
        self.assets.iter().any(|asset| {
            Path::new(asset)
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
        })
    }
}

/// Parsed `{stem}.deps.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepsManifest {
    #[serde(default)]
    pub runtime: Vec<LibraryEntry>,
    #[serde(default)]
    pub compile: Vec<LibraryEntry>,
}

/// Path of the sidecar manifest for a plugin at `dylib_path`.
pub fn manifest_path_for(dylib_path: &Path) -> PathBuf {
    let stem = dylib_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plugin");
    dylib_path.with_file_name(format!("{stem}.deps.json"))
}

impl DepsManifest {
    /// Reads the manifest next to `dylib_path`, if one exists.
    ///
    /// A present-but-corrupt manifest is a hard error carrying the
    /// offending path: the dependency add operation cannot proceed and is
    /// not retried.
    pub fn read_for(dylib_path: &Path) -> Result<Option<Self>, LoaderError> {
        let path = manifest_path_for(dylib_path);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| LoaderError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let manifest = serde_json::from_str(&text).map_err(|e| LoaderError::Manifest {
            path,
            message: e.to_string(),
        })?;
        Ok(Some(manifest))
    }
}
