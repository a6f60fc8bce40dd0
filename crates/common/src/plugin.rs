//! Generator plugin contract.
//!
//! A generator dylib exports a [`GeneratorDecl`] static named by
//! [`DECL_SYMBOL`]. The host checks `api_version`, then calls `register`,
//! handing the plugin a [`GeneratorRegistrar`] through which it announces
//! its [`SourceGenerator`] implementations under stable string names.
//!
//! The same trait also supports in-process ("builtin") registration, which
//! is how tests and embedders attach generators without a dylib.

use std::path::{Path, PathBuf};

/// Bump on any breaking change to [`GeneratorDecl`] or [`SourceGenerator`].
pub const PLUGIN_API_VERSION: u32 = 1;

/// Symbol name of the exported declaration static.
pub const DECL_SYMBOL: &[u8] = b"SCRIBE_DECL\0";

/// Context for one generator invocation.
///
/// Owned and cheap to clone so the invocation can run on a blocking task.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub project_dir: PathBuf,
    /// `None` for an assembly-level invocation.
    pub source_path: Option<PathBuf>,
    /// Text of the source file, when one applies and could be read.
    pub source_text: Option<String>,
    /// Preprocessor symbols active for this pass.
    pub defines: Vec<String>,
}

/// One produced compilation unit, not yet written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub content: String,
    /// Comment block emitted ahead of the content.
    pub preamble: Option<String>,
    /// Guarantee the rendered file ends with a newline.
    pub ensure_trailing_newline: bool,
}

impl GeneratedUnit {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            preamble: None,
            ensure_trailing_newline: true,
        }
    }

    /// Final file text: preamble, content, optional trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(preamble) = &self.preamble {
            out.push_str(preamble);
            if !preamble.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(&self.content);
        if self.ensure_trailing_newline && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// The pluggable generation capability.
///
/// Invoked once per (unit, discovered marker) pair. Returning zero units is
/// valid; the orchestrator drops empty descriptors at reconcile time.
pub trait SourceGenerator: Send + Sync {
    fn generate(&self, ctx: &GenerationContext) -> anyhow::Result<Vec<GeneratedUnit>>;
}

/// Receiver for a plugin's generator registrations.
pub trait GeneratorRegistrar {
    fn register(&mut self, name: &str, generator: Box<dyn SourceGenerator>);
}

/// Exported by every generator dylib as the `SCRIBE_DECL` static.
#[repr(C)]
pub struct GeneratorDecl {
    pub api_version: u32,
    pub register: unsafe extern "C" fn(registrar: &mut dyn GeneratorRegistrar),
}

/// Reports whether `path` looks like a file a plugin would be loaded from.
///
/// The allowed extension set is fixed and case-insensitive: just the
/// platform dynamic-library extension.
pub fn is_plugin_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(std::env::consts::DLL_EXTENSION))
}

/// Platform file name for a plugin named `name` (e.g. `libacme_gen.so`).
pub fn plugin_file_name(name: &str) -> String {
    format!(
        "{}{}.{}",
        std::env::consts::DLL_PREFIX,
        name,
        std::env::consts::DLL_EXTENSION
    )
}
