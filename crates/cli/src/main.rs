use clap::Parser;
use common::CancelFlag;
use loader::LoaderConfig;
use scrivener::{GenerationError, GenerationManager, ManagerConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod scan;

// Exit codes.
const EXIT_NO_SOURCES: i32 = 1;
const EXIT_NO_OUTPUT_DIR: i32 = 2;
const EXIT_GENERATION_FAILED: i32 = 3;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(version)]
#[command(about = "Incremental compile-time source generation", long_about = None)]
struct Cli {
    /// Source files or directories to scan for generation directives.
    sources: Vec<PathBuf>,

    /// Project root handed to generators.
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Intermediate directory generated files are written to.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Registry file for generated units (defaults to the output dir).
    #[arg(long)]
    generated_registry: Option<PathBuf>,

    /// Registry file for loaded plugin dependencies (defaults to the
    /// output dir).
    #[arg(long)]
    deps_registry: Option<PathBuf>,

    /// Response file listing every generated path (defaults to the
    /// output dir).
    #[arg(long)]
    response: Option<PathBuf>,

    /// Explicit generator plugin file, matched by file name. Repeatable.
    #[arg(long = "reference")]
    references: Vec<PathBuf>,

    /// Directory probed (top level only) for generator plugins. Repeatable.
    #[arg(long = "search-dir")]
    search_dirs: Vec<PathBuf>,

    /// Package cache directory, probed after everything else.
    #[arg(long)]
    package_cache: Option<PathBuf>,

    /// Preprocessor symbol gating conditional directives. Repeatable.
    #[arg(long = "define")]
    defines: Vec<String>,

    /// Generator invoked once per run without a source file. Repeatable.
    #[arg(long = "assembly-generator")]
    assembly_generators: Vec<String>,

    /// Extension of host-language sources and generated artifacts.
    #[arg(long, default_value = "rs")]
    source_ext: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(output_dir) = cli.output.clone() else {
        eprintln!("--output <DIR> is required: nowhere to write generated files.");
        std::process::exit(EXIT_NO_OUTPUT_DIR);
    };

    let files = scan::collect_source_files(&cli.sources, &cli.source_ext);
    if files.is_empty() && cli.assembly_generators.is_empty() {
        eprintln!(
            "No .{} sources found under the given inputs.",
            cli.source_ext
        );
        std::process::exit(EXIT_NO_SOURCES);
    }

    let compilation = scan::build_compilation(
        cli.project_dir.clone(),
        &files,
        cli.defines.clone(),
        &cli.assembly_generators,
    )?;

    let config = ManagerConfig {
        project_dir: cli.project_dir.clone(),
        output_dir: output_dir.clone(),
        generated_registry_path: cli
            .generated_registry
            .clone()
            .unwrap_or_else(|| output_dir.join("scribe.generated.json")),
        response_path: cli
            .response
            .clone()
            .unwrap_or_else(|| output_dir.join("scribe.generated.rsp")),
        deps_registry_path: cli
            .deps_registry
            .clone()
            .unwrap_or_else(|| output_dir.join("scribe.deps.json")),
        source_ext: cli.source_ext.clone(),
    };
    let loader_config = LoaderConfig {
        reference_paths: cli.references.clone(),
        search_dirs: cli.search_dirs.clone(),
        package_cache: cli.package_cache.clone(),
    };

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("interrupt received, stopping after the current unit...");
                cancel.cancel();
            }
        });
    }

    let mut manager = GenerationManager::new(config, loader_config);
    match manager.run(&compilation, &cancel).await {
        Ok(summary) => {
            println!("+------------------------------------------+");
            println!("| SCRIBE GENERATION                        |");
            println!("+------------------------------------------+");
            println!("| Sources scanned : {:>21} |", files.len());
            println!("| Units processed : {:>21} |", summary.processed);
            println!("| Artifacts       : {:>21} |", summary.artifacts_written);
            println!("| Up to date      : {:>21} |", summary.skipped);
            println!("+------------------------------------------+");
            if !summary.had_prior_state {
                println!("First run for this output directory.");
            }
            Ok(())
        }
        Err(GenerationError::Cancelled) => {
            eprintln!("Generation cancelled; registry left as written so far.");
            std::process::exit(EXIT_GENERATION_FAILED);
        }
        Err(e) => {
            eprintln!("Generation failed:\n{e}");
            std::process::exit(EXIT_GENERATION_FAILED);
        }
    }
}
