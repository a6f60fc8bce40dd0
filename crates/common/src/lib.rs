pub mod descriptor;
pub mod plugin;

pub use descriptor::{
    artifact_file_name, mtime_utc, AssemblyDependencyDescriptor, GeneratedUnitDescriptor, Keyed,
};
pub use plugin::{
    GeneratedUnit, GenerationContext, GeneratorDecl, GeneratorRegistrar, SourceGenerator,
    DECL_SYMBOL, PLUGIN_API_VERSION,
};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One generation trigger discovered in the current compilation.
#[derive(Debug, Clone)]
pub struct InputUnit {
    /// `None` for an assembly-level trigger (no single source file).
    pub source_path: Option<PathBuf>,
    /// Names of the generators requested by this unit's markers.
    pub generators: Vec<String>,
}

/// Opaque view of the host compilation handed to the orchestrator.
///
/// Building this is the job of an external compilation service; the engine
/// only consumes it. The CLI ships a marker-scanning stand-in.
#[derive(Debug, Clone, Default)]
pub struct Compilation {
    pub project_dir: PathBuf,
    pub units: Vec<InputUnit>,
    /// Preprocessor symbols active for this pass.
    pub defines: Vec<String>,
}

impl Compilation {
    /// Set of file-scoped source paths present in this pass.
    ///
    /// Assembly-level units (`source_path == None`) do not contribute.
    pub fn source_paths(&self) -> BTreeSet<PathBuf> {
        self.units
            .iter()
            .filter_map(|u| u.source_path.clone())
            .collect()
    }
}

/// Cooperative cancellation signal threaded through a generation run.
///
/// Checked at batch start and before each unit; a cancelled run does not
/// roll back partially written artifacts (the next run's eligibility
/// filter re-derives correctness from file timestamps).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sink for per-unit progress and failure reports during a batch.
pub trait Progress: Send + Sync {
    /// Reports a recorded per-unit failure. The batch continues.
    fn report_failure(&self, source: Option<&Path>, message: &str);

    /// Reports a successfully generated artifact.
    fn report_artifact(&self, source: Option<&Path>, artifact: &Path) {
        let _ = (source, artifact);
    }
}

/// Default progress sink that forwards to the `tracing` error channel.
#[derive(Debug, Default)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn report_failure(&self, source: Option<&Path>, message: &str) {
        match source {
            Some(path) => tracing::error!(source = %path.display(), "{message}"),
            None => tracing::error!("{message}"),
        }
    }
}
