//! Marker scanning: a stand-in for a host compilation service.
//!
//! Sources opt into generation with a `scribe:use <generator>` directive,
//! usually inside a comment. A conditional form `scribe:use[SYMBOL] <name>`
//! only fires when `SYMBOL` is among the active defines. Files without any
//! live directive never become input units.

use aho_corasick::AhoCorasick;
use common::{Compilation, InputUnit};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const DIRECTIVE: &str = "scribe:use";

pub struct MarkerScanner {
    ac: AhoCorasick,
}

impl MarkerScanner {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            ac: AhoCorasick::new([DIRECTIVE])?,
        })
    }

    /// Generator names requested by `text`, ordered and deduplicated.
    pub fn scan_text(&self, text: &str, defines: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for hit in self.ac.find_iter(text) {
            let rest = &text[hit.end()..];
            let Some(name) = parse_directive_tail(rest, defines) else {
                continue;
            };
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                names.push(name);
            }
        }
        names
    }
}

/// Parses what follows the directive keyword: an optional `[SYMBOL]` gate,
/// whitespace, then the generator name.
fn parse_directive_tail(rest: &str, defines: &[String]) -> Option<String> {
    let mut rest = rest;

    if let Some(after_bracket) = rest.strip_prefix('[') {
        let close = after_bracket.find(']')?;
        let symbol = after_bracket[..close].trim();
        rest = &after_bracket[close + 1..];
        if !defines.iter().any(|d| d == symbol) {
            return None;
        }
    }

    let rest = rest.trim_start_matches([' ', '\t']);
    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Expands the positional inputs into source files with extension `ext`.
/// Directories are walked recursively; explicit files are taken as-is when
/// the extension matches.
pub fn collect_source_files(inputs: &[PathBuf], ext: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for input in inputs {
        if input.is_file() {
            if has_ext(input, ext) {
                files.push(input.clone());
            }
            continue;
        }
        for entry in WalkDir::new(input)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.file_type().is_file() && has_ext(entry.path(), ext) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    files.dedup();
    files
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Scans `files` for directives and assembles the compilation view. Files
/// that fail to read are skipped with a warning; `assembly_generators` adds
/// one file-less unit when non-empty.
pub fn build_compilation(
    project_dir: PathBuf,
    files: &[PathBuf],
    defines: Vec<String>,
    assembly_generators: &[String],
) -> anyhow::Result<Compilation> {
    let scanner = MarkerScanner::new()?;
    let mut units: Vec<InputUnit> = Vec::new();

    for file in files {
        let text = match std::fs::read_to_string(file) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("warning: skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let generators = scanner.scan_text(&text, &defines);
        if generators.is_empty() {
            continue;
        }
        units.push(InputUnit {
            source_path: Some(file.clone()),
            generators,
        });
    }

    if !assembly_generators.is_empty() {
        units.push(InputUnit {
            source_path: None,
            generators: assembly_generators.to_vec(),
        });
    }

    Ok(Compilation {
        project_dir,
        units,
        defines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str, defines: &[&str]) -> Vec<String> {
        let defines: Vec<String> = defines.iter().map(|s| s.to_string()).collect();
        MarkerScanner::new().unwrap().scan_text(text, &defines)
    }

    #[test]
    fn test_scan_finds_directive_in_comment() {
        let names = scan("// scribe:use acme.gen\nfn main() {}\n", &[]);
        assert_eq!(names, vec!["acme.gen"]);
    }

    #[test]
    fn test_scan_dedupes_case_insensitively() {
        let names = scan("// scribe:use Gen\n// scribe:use gen\n", &[]);
        assert_eq!(names, vec!["Gen"]);
    }

    #[test]
    fn test_conditional_directive_respects_defines() {
        let text = "// scribe:use[TRACE] tracer\n// scribe:use plain\n";
        assert_eq!(scan(text, &[]), vec!["plain"]);
        assert_eq!(scan(text, &["TRACE"]), vec!["tracer", "plain"]);
    }

    #[test]
    fn test_bare_directive_without_name_is_ignored() {
        assert!(scan("// scribe:use\n", &[]).is_empty());
        assert!(scan("// scribe:use   \n", &[]).is_empty());
    }

    #[test]
    fn test_collect_walks_directories_and_filters_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(tmp.path().join("a.rs"), b"").unwrap();
        std::fs::write(nested.join("b.rs"), b"").unwrap();
        std::fs::write(nested.join("c.txt"), b"").unwrap();

        let files = collect_source_files(&[tmp.path().to_path_buf()], "rs");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| has_ext(f, "rs")));
    }

    #[test]
    fn test_build_compilation_skips_files_without_markers() {
        let tmp = tempfile::tempdir().unwrap();
        let marked = tmp.path().join("marked.rs");
        let plain = tmp.path().join("plain.rs");
        std::fs::write(&marked, b"// scribe:use gen\n").unwrap();
        std::fs::write(&plain, b"fn main() {}\n").unwrap();

        let compilation = build_compilation(
            tmp.path().to_path_buf(),
            &[marked.clone(), plain],
            vec![],
            &[],
        )
        .unwrap();
        assert_eq!(compilation.units.len(), 1);
        assert_eq!(compilation.units[0].source_path.as_deref(), Some(marked.as_path()));
    }

    #[test]
    fn test_assembly_generators_add_fileless_unit() {
        let compilation =
            build_compilation(PathBuf::from("."), &[], vec![], &["asm-gen".into()]).unwrap();
        assert_eq!(compilation.units.len(), 1);
        assert!(compilation.units[0].source_path.is_none());
        assert_eq!(compilation.units[0].generators, vec!["asm-gen"]);
    }
}
