//! Generation orchestrator.
//!
//! Drives one generation run end to end:
//! `LoadPriorState → Purge → ComputeEligibility → GenerateEligible →
//! Reconcile → Persist`. Eligible units are processed sequentially; the
//! generator invocation runs on a blocking task and is awaited, and the
//! only other suspension point is the retry backoff on a sharing-violation
//! write error. Per-unit failures are recorded and reported, never abort
//! the batch; the batch as a whole fails afterwards if any unit did.

use common::{
    CancelFlag, Compilation, GeneratedUnitDescriptor, GenerationContext, Progress, SourceGenerator,
    TracingProgress,
};
use ledger::{GeneratedLedger, GeneratedStoreConfig, LedgerError};
use loader::{LoaderConfig, PluginHost};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Retries after the first sharing-violation failure.
const SHARING_RETRIES: usize = 3;
/// Fixed backoff between attempts.
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// One recorded per-unit failure.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub source: Option<PathBuf>,
    pub message: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => write!(f, "<assembly>: {}", self.message),
        }
    }
}

/// Aggregate of every failure recorded during a batch. Raised only after
/// all eligible units have been attempted.
#[derive(Debug)]
pub struct BatchError {
    pub failures: Vec<UnitFailure>,
}

impl std::fmt::Display for BatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "generation failed for {} unit(s):", self.failures.len())?;
        for failure in &self.failures {
            writeln!(f, "  {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

/// Errors terminating a generation run.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Paths and naming for one generation manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub project_dir: PathBuf,
    /// Intermediate directory generated artifacts are written to.
    pub output_dir: PathBuf,
    pub generated_registry_path: PathBuf,
    pub response_path: PathBuf,
    pub deps_registry_path: PathBuf,
    /// Host-language source extension for artifact names.
    pub source_ext: String,
}

/// Counters from one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Eligible units actually processed.
    pub processed: usize,
    /// Artifact files written.
    pub artifacts_written: usize,
    /// Prior descriptors left untouched (still valid).
    pub skipped: usize,
    /// Whether prior registry state was found on load.
    pub had_prior_state: bool,
}

/// Owns the generated ledger and the plugin host for one run at a time.
pub struct GenerationManager {
    config: ManagerConfig,
    ledger: GeneratedLedger,
    host: PluginHost,
    progress: Arc<dyn Progress>,
}

impl GenerationManager {
    pub fn new(config: ManagerConfig, loader_config: LoaderConfig) -> Self {
        let ledger = GeneratedLedger::new(GeneratedStoreConfig {
            output_dir: config.output_dir.clone(),
            registry_path: config.generated_registry_path.clone(),
            response_path: config.response_path.clone(),
            source_ext: config.source_ext.clone(),
        });
        let deps = ledger::DependencyLedger::new(config.deps_registry_path.clone());
        Self {
            config,
            ledger,
            host: PluginHost::new(loader_config, deps),
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn ledger(&self) -> &GeneratedLedger {
        &self.ledger
    }

    pub fn host_mut(&mut self) -> &mut PluginHost {
        &mut self.host
    }

    /// One full generation run over `compilation`.
    pub async fn run(
        &mut self,
        compilation: &Compilation,
        cancel: &CancelFlag,
    ) -> Result<RunSummary, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        // LoadPriorState.
        let had_prior_state = self.ledger.try_load();
        self.host.dependency_ledger_mut().try_load();
        let pruned = self.host.dependency_ledger_mut().purge_not_exists();
        if pruned > 0 {
            tracing::debug!(pruned, "stale dependency paths dropped");
        }

        // Purge + ComputeEligibility.
        let deps_last_written = self.host.dependency_ledger().last_written();
        let current_paths = compilation.source_paths();
        let eligibility = sieve::partition(&mut self.ledger, &current_paths, deps_last_written);

        std::fs::create_dir_all(&self.config.output_dir)?;

        // GenerateEligible — sequential, failures recorded, batch continues.
        let mut failures: Vec<UnitFailure> = Vec::new();
        let mut summary = RunSummary {
            skipped: eligibility.retained,
            had_prior_state,
            ..Default::default()
        };

        for unit in &compilation.units {
            if cancel.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            if let Some(path) = &unit.source_path {
                if !eligibility.is_eligible(path) {
                    continue;
                }
            }
            summary.processed += 1;

            let descriptor = self
                .generate_unit(compilation, unit, &mut failures, &mut summary)
                .await;
            self.ledger.replace(descriptor);
        }

        // Reconcile: a descriptor with zero surviving artifacts has nothing
        // to purge — ordinary removal.
        self.ledger.remove_where(|d| d.generated_asset_keys.is_empty());

        // Persist: dependency ledger first, then the generated ledger and
        // its response file.
        if !self.host.dependency_ledger().try_save() {
            tracing::warn!(
                path = %self.config.deps_registry_path.display(),
                "dependency registry save failed"
            );
        }
        self.ledger.save_with_response()?;

        if !failures.is_empty() {
            return Err(BatchError { failures }.into());
        }
        Ok(summary)
    }

    /// Runs every generator of `unit`, writing artifacts as they come.
    /// A failure stops this unit's remaining artifacts only.
    async fn generate_unit(
        &mut self,
        compilation: &Compilation,
        unit: &common::InputUnit,
        failures: &mut Vec<UnitFailure>,
        summary: &mut RunSummary,
    ) -> GeneratedUnitDescriptor {
        let source = unit.source_path.as_deref();
        let mut descriptor = GeneratedUnitDescriptor::for_source(source);

        let record = |failures: &mut Vec<UnitFailure>, message: String| {
            self.progress.report_failure(source, &message);
            failures.push(UnitFailure {
                source: source.map(Path::to_path_buf),
                message,
            });
        };

        for name in &unit.generators {
            let generator = match self.host.ensure_generator(name) {
                Ok(g) => g,
                Err(e) => {
                    record(failures, e.to_string());
                    return descriptor;
                }
            };

            let ctx = GenerationContext {
                project_dir: compilation.project_dir.clone(),
                source_path: source.map(Path::to_path_buf),
                source_text: source.and_then(|p| std::fs::read_to_string(p).ok()),
                defines: compilation.defines.clone(),
            };

            let produced = match invoke_generator(generator, ctx).await {
                Ok(units) => units,
                Err(e) => {
                    record(failures, format!("generator `{name}` failed: {e:#}"));
                    return descriptor;
                }
            };

            for produced_unit in produced {
                let id = Uuid::new_v4();
                let path = self.ledger.artifact_path(&id);
                let rendered = produced_unit.render();
                match write_with_retry(&path, |p| write_artifact(p, &rendered)).await {
                    Ok(()) => {
                        descriptor.push_key(id);
                        summary.artifacts_written += 1;
                        self.progress.report_artifact(source, &path);
                    }
                    Err(e) => {
                        record(failures, format!("writing {} failed: {e}", path.display()));
                        return descriptor;
                    }
                }
            }
        }

        descriptor
    }
}

/// Runs the (synchronous) generator capability on a blocking task and
/// awaits it, making it effectively synchronous for the orchestrator.
async fn invoke_generator(
    generator: Arc<dyn SourceGenerator>,
    ctx: GenerationContext,
) -> anyhow::Result<Vec<common::GeneratedUnit>> {
    tokio::task::spawn_blocking(move || generator.generate(&ctx))
        .await
        .map_err(|e| anyhow::anyhow!("generator task panicked: {e}"))?
}

/// Create-or-truncate write of one rendered artifact.
fn write_artifact(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(text.as_bytes())
}

/// A sharing violation means another process holds the target file locked;
/// worth a bounded retry. Everything else is terminal for the unit.
fn is_sharing_violation(err: &std::io::Error) -> bool {
    let Some(code) = err.raw_os_error() else {
        return false;
    };
    #[cfg(windows)]
    {
        code == 32 // ERROR_SHARING_VIOLATION
    }
    #[cfg(unix)]
    {
        matches!(code, 11 | 26) // EAGAIN, ETXTBSY
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        false
    }
}

/// Attempts `attempt_write`, retrying up to [`SHARING_RETRIES`] times with
/// a fixed [`RETRY_DELAY`] when the failure is a sharing violation.
async fn write_with_retry<F>(path: &Path, mut attempt_write: F) -> std::io::Result<()>
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let mut retries = 0;
    loop {
        match attempt_write(path) {
            Ok(()) => return Ok(()),
            Err(e) if is_sharing_violation(&e) && retries < SHARING_RETRIES => {
                retries += 1;
                tracing::warn!(
                    path = %path.display(),
                    retry = retries,
                    "target file locked, backing off: {e}"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}
