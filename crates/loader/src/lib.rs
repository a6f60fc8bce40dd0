//! Dynamic generator loading and dependency resolution.
//!
//! [`PluginHost`] resolves a generator name to a loaded dylib through a
//! layered strategy (explicit reference paths, then search directories,
//! then the OS loader), keeps a merged [`DependencyContext`] of every
//! sidecar manifest seen, and guarantees at-most-once load per canonical
//! path. Loaded paths are recorded in the [`DependencyLedger`] so the next
//! run can detect upstream staleness.

pub mod chain;
pub mod context;
pub mod manifest;

pub use chain::ResolverChain;
pub use context::DependencyContext;
pub use manifest::{DepsManifest, LibraryEntry};

use common::plugin::{
    is_plugin_file, plugin_file_name, GeneratorDecl, DECL_SYMBOL, PLUGIN_API_VERSION,
};
use common::{GeneratorRegistrar, SourceGenerator};
use ledger::DependencyLedger;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Errors from plugin loading and dependency resolution.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not load library: {0}")]
    Load(#[from] libloading::Error),
    #[error("Dependency manifest {path} could not be loaded: {message}")]
    Manifest { path: PathBuf, message: String },
    #[error("Plugin {path} targets API v{found}, host speaks v{expected}")]
    ApiVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("Generator `{0}` not found")]
    NotFound(String),
}

/// Where the host looks for plugins.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Explicit dylib file paths, matched by exact file name.
    pub reference_paths: Vec<PathBuf>,
    /// Directories probed (top level only) for `{name}.{dylib-ext}`.
    pub search_dirs: Vec<PathBuf>,
    /// Optional package cache directory, probed after everything else.
    pub package_cache: Option<PathBuf>,
}

/// Owns every loaded library, the merged dependency context and the
/// registered generators. One instance per generation run; no ambient
/// state.
pub struct PluginHost {
    config: LoaderConfig,
    context: DependencyContext,
    deps: DependencyLedger,
    generators: HashMap<String, Arc<dyn SourceGenerator>>,
    loaded_paths: HashSet<PathBuf>,
    // Declared after `generators` so generator vtables are dropped before
    // their backing libraries are unloaded.
    libraries: Vec<libloading::Library>,
}

struct HostRegistrar<'a> {
    out: &'a mut HashMap<String, Arc<dyn SourceGenerator>>,
}

impl GeneratorRegistrar for HostRegistrar<'_> {
    fn register(&mut self, name: &str, generator: Box<dyn SourceGenerator>) {
        self.out.insert(name.to_lowercase(), Arc::from(generator));
    }
}

impl PluginHost {
    pub fn new(config: LoaderConfig, deps: DependencyLedger) -> Self {
        let mut fixed: Vec<PathBuf> = config.search_dirs.clone();
        if let Some(cache) = &config.package_cache {
            fixed.push(cache.clone());
        }
        Self {
            config,
            context: DependencyContext::new(fixed),
            deps,
            generators: HashMap::new(),
            loaded_paths: HashSet::new(),
            libraries: Vec::new(),
        }
    }

    pub fn dependency_ledger(&self) -> &DependencyLedger {
        &self.deps
    }

    pub fn dependency_ledger_mut(&mut self) -> &mut DependencyLedger {
        &mut self.deps
    }

    pub fn context(&self) -> &DependencyContext {
        &self.context
    }

    /// Registered generator for `name`, if any. Resolving the same name
    /// twice yields the same instance for the host's lifetime.
    pub fn generator(&self, name: &str) -> Option<Arc<dyn SourceGenerator>> {
        self.generators.get(&name.to_lowercase()).cloned()
    }

    /// Attaches an in-process generator (tests, embedding). Same namespace
    /// as dylib-registered generators.
    pub fn register_builtin(&mut self, name: &str, generator: Arc<dyn SourceGenerator>) {
        self.generators.insert(name.to_lowercase(), generator);
    }

    /// Looks up `name` through the layered strategy and loads it:
    /// reference paths first, then search directories, then the OS loader
    /// by library name alone.
    pub fn load_by_name(&mut self, name: &str) -> Result<(), LoaderError> {
        let candidates = file_name_candidates(name);

        // 1. Explicit reference paths, exact file name match.
        let reference_hit = self.config.reference_paths.iter().find(|p| {
            p.file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| candidates.iter().any(|c| c.eq_ignore_ascii_case(f)))
        });
        if let Some(path) = reference_hit.cloned() {
            self.load_by_path(&path)?;
            return Ok(());
        }

        // 2. Search directories, top level only.
        for dir in self.config.search_dirs.clone() {
            if let Some(path) = probe_dir(&dir, &candidates) {
                self.load_by_path(&path)?;
                return Ok(());
            }
        }

        // 3. OS loader default resolution, by name alone. Nothing to
        // register — there is no path to track.
        match unsafe { libloading::Library::new(plugin_file_name(name)) } {
            Ok(lib) => {
                self.adopt_library(lib, None)?;
                Ok(())
            }
            Err(_) => Err(LoaderError::NotFound(name.to_string())),
        }
    }

    /// Loads the dylib at `path`, merging its sidecar manifest and
    /// widening the resolver chain with its containing directory.
    ///
    /// At most once per canonical path: a second call is a no-op returning
    /// `false`, and the generators registered by the first load stay
    /// reference-stable.
    pub fn load_by_path(&mut self, path: &Path) -> Result<bool, LoaderError> {
        let canon = dunce::canonicalize(path)?;
        if self.loaded_paths.contains(&canon) {
            return Ok(false);
        }

        let manifest = DepsManifest::read_for(&canon)?;
        let library = unsafe { libloading::Library::new(&canon) }?;
        self.adopt_library(library, Some(&canon))?;

        // Bookkeeping only once the library is adopted: a rejected plugin
        // must not widen resolution or skew dependency staleness.
        if let Some(manifest) = manifest {
            self.context.merge(&manifest);
        }
        if let Some(parent) = canon.parent() {
            self.context.chain_mut().push_dir(parent);
        }
        self.deps.register(&canon);
        self.loaded_paths.insert(canon);
        Ok(true)
    }

    /// Resolution hook for a name the host could not find directly:
    /// consult the merged dependency context, then the resolver chain,
    /// then the explicit reference paths. Returns `false` when unresolved
    /// so the caller can report the failure.
    pub fn resolve_missing(&mut self, name: &str) -> Result<bool, LoaderError> {
        match self.missing_candidates(name).into_iter().next() {
            Some(candidate) => {
                self.load_by_path(&candidate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Candidate paths the resolution hook would try, in order. Pure
    /// lookup, no loading.
    pub fn missing_candidates(&self, name: &str) -> Vec<PathBuf> {
        let mut out = Vec::new();

        if let Some(entry) = self.context.find_runtime(name) {
            for asset in &entry.assets {
                // Manifests may list data assets too; only library files
                // are load candidates.
                if !is_plugin_file(Path::new(asset)) {
                    continue;
                }
                out.extend(self.context.chain().candidate_paths(asset));
            }
            out.extend(
                self.context
                    .chain()
                    .candidate_paths(&plugin_file_name(&entry.package)),
            );
        }

        let candidates = file_name_candidates(name);
        out.extend(
            self.config
                .reference_paths
                .iter()
                .filter(|p| {
                    p.file_name()
                        .and_then(|f| f.to_str())
                        .is_some_and(|f| candidates.iter().any(|c| c.eq_ignore_ascii_case(f)))
                })
                .cloned(),
        );

        out.retain(|p| p.exists());
        out.dedup();
        out
    }

    /// Loads the plugin for `name` if its generator is not yet registered,
    /// then returns the generator. The layered lookup plus the resolution
    /// hook; `NotFound` when every strategy comes up empty.
    pub fn ensure_generator(&mut self, name: &str) -> Result<Arc<dyn SourceGenerator>, LoaderError> {
        if let Some(generator) = self.generator(name) {
            return Ok(generator);
        }
        match self.load_by_name(name) {
            Ok(()) => {}
            Err(LoaderError::NotFound(_)) => {
                if !self.resolve_missing(name)? {
                    return Err(LoaderError::NotFound(name.to_string()));
                }
            }
            Err(e) => return Err(e),
        }
        self.generator(name)
            .ok_or_else(|| LoaderError::NotFound(name.to_string()))
    }

    /// Reads the plugin declaration (if any) and registers its generators.
    /// A library without a declaration is a plain dependency — fine.
    fn adopt_library(
        &mut self,
        library: libloading::Library,
        path: Option<&Path>,
    ) -> Result<(), LoaderError> {
        let decl_ptr = match unsafe { library.get::<*const GeneratorDecl>(DECL_SYMBOL) } {
            Ok(sym) => *sym,
            Err(_) => {
                tracing::debug!("library carries no generator declaration");
                self.libraries.push(library);
                return Ok(());
            }
        };
        let decl: &GeneratorDecl = unsafe { &*decl_ptr };
        if decl.api_version != PLUGIN_API_VERSION {
            return Err(LoaderError::ApiVersion {
                path: path.map(Path::to_path_buf).unwrap_or_default(),
                found: decl.api_version,
                expected: PLUGIN_API_VERSION,
            });
        }
        let mut registrar = HostRegistrar {
            out: &mut self.generators,
        };
        unsafe { (decl.register)(&mut registrar) };
        self.libraries.push(library);
        Ok(())
    }
}

/// File names a plugin named `name` may carry: `{name}.{dylib-ext}` and
/// the platform-prefixed form (`lib{name}.so` on unix).
fn file_name_candidates(name: &str) -> Vec<String> {
    let plain = format!("{}.{}", name, std::env::consts::DLL_EXTENSION);
    let platform = plugin_file_name(name);
    if plain.eq_ignore_ascii_case(&platform) {
        vec![plain]
    } else {
        vec![plain, platform]
    }
}

/// Top-level-only probe of `dir` for any of `candidates`.
fn probe_dir(dir: &Path, candidates: &[String]) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if candidates.iter().any(|c| c.eq_ignore_ascii_case(file_name)) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{GeneratedUnit, GenerationContext};

    struct NullGenerator;

    impl SourceGenerator for NullGenerator {
        fn generate(&self, _ctx: &GenerationContext) -> anyhow::Result<Vec<GeneratedUnit>> {
            Ok(vec![])
        }
    }

    fn host_in(tmp: &Path) -> PluginHost {
        PluginHost::new(
            LoaderConfig::default(),
            DependencyLedger::new(tmp.join("deps.json")),
        )
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_in(tmp.path());
        let err = host.load_by_name("definitely_not_a_real_generator_xyz");
        assert!(matches!(err, Err(LoaderError::NotFound(_))));
    }

    #[test]
    fn test_ensure_generator_not_found_signals_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_in(tmp.path());
        // No reference paths, no search dirs, no context entry: the
        // layered lookup and the resolution hook both come up empty, and
        // the error names the generator rather than some unrelated fault.
        let err = host.ensure_generator("acme_gen").err().unwrap();
        assert_eq!(err.to_string(), "Generator `acme_gen` not found");
    }

    #[test]
    fn test_builtin_generator_is_reference_stable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_in(tmp.path());
        host.register_builtin("Acme.Gen", Arc::new(NullGenerator));

        let first = host.ensure_generator("acme.gen").unwrap();
        let second = host.ensure_generator("ACME.GEN").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_candidates_consult_context_then_references() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        let asset = plugin_dir.join("libacme_runtime.so");
        std::fs::write(&asset, b"").unwrap();

        let reference = tmp.path().join("libother.so");
        std::fs::write(&reference, b"").unwrap();

        let mut host = PluginHost::new(
            LoaderConfig {
                reference_paths: vec![reference.clone()],
                search_dirs: vec![],
                package_cache: None,
            },
            DependencyLedger::new(tmp.path().join("deps.json")),
        );
        host.context.merge(&DepsManifest {
            runtime: vec![LibraryEntry {
                package: "acme-runtime".into(),
                assets: vec!["libacme_runtime.so".into()],
            }],
            compile: vec![],
        });
        host.context.chain_mut().push_dir(&plugin_dir);

        let candidates = host.missing_candidates("acme-runtime");
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].ends_with("libacme_runtime.so"));

        let candidates = host.missing_candidates("other");
        assert_eq!(candidates, vec![reference]);

        assert!(host.missing_candidates("nothing").is_empty());
    }

    #[test]
    fn test_missing_candidates_skip_non_library_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin_dir = tmp.path().join("plugins");
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("templates.json"), b"{}").unwrap();

        let mut host = host_in(tmp.path());
        host.context.merge(&DepsManifest {
            runtime: vec![LibraryEntry {
                package: "acme-templates".into(),
                assets: vec!["templates.json".into()],
            }],
            compile: vec![],
        });
        host.context.chain_mut().push_dir(&plugin_dir);

        assert!(host.missing_candidates("acme-templates").is_empty());
    }

    // A shared library that is always present on the host system, so the
    // cache path can be exercised with a real dlopen.
    #[cfg(unix)]
    fn system_library() -> Option<&'static Path> {
        [
            "/lib/x86_64-linux-gnu/libc.so.6",
            "/lib/aarch64-linux-gnu/libc.so.6",
            "/usr/lib/x86_64-linux-gnu/libc.so.6",
            "/usr/lib/libc.so.6",
            "/lib/libc.so.6",
            "/usr/lib/libSystem.B.dylib",
        ]
        .into_iter()
        .map(Path::new)
        .find(|p| p.exists())
    }

    #[test]
    #[cfg(unix)]
    fn test_load_by_path_is_at_most_once() {
        let Some(library) = system_library() else {
            return;
        };
        let tmp = tempfile::tempdir().unwrap();
        let mut host = host_in(tmp.path());

        assert!(host.load_by_path(library).unwrap());
        assert!(!host.load_by_path(library).unwrap(), "cache hit expected");

        // A different spelling of the same file resolves to the same
        // cache entry.
        let alias = tmp.path().join("libalias.so");
        std::os::unix::fs::symlink(library, &alias).unwrap();
        assert!(!host.load_by_path(&alias).unwrap());

        assert_eq!(host.dependency_ledger().len(), 1);
        let canon = dunce::canonicalize(library).unwrap();
        assert!(host.dependency_ledger().contains(&canon));
    }

    #[test]
    fn test_failed_load_is_not_tracked() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("libbogus.so");
        std::fs::write(&bogus, b"not a shared object").unwrap();

        let mut host = host_in(tmp.path());
        assert!(host.load_by_path(&bogus).is_err());
        assert!(host.dependency_ledger().is_empty());
        assert!(host.context().chain().is_empty());
    }

    #[test]
    fn test_probe_dir_is_top_level_only() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("libgen.so"), b"").unwrap();

        assert!(probe_dir(tmp.path(), &file_name_candidates("gen")).is_none());
        assert!(probe_dir(&nested, &file_name_candidates("gen")).is_some());
    }

    #[test]
    fn test_file_name_candidates_cover_platform_prefix() {
        let candidates = file_name_candidates("gen");
        assert!(candidates
            .iter()
            .any(|c| c == &format!("gen.{}", std::env::consts::DLL_EXTENSION)));
        assert!(candidates.contains(&plugin_file_name("gen")));
    }
}
