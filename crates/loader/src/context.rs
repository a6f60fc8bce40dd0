//! Merged dependency view.
//!
//! Accumulates the runtime/compile library lists of every plugin manifest
//! loaded so far in the process. The view only grows; entries are deduped
//! by package name (case-insensitive) with asset lists unioned.

use crate::chain::ResolverChain;
use crate::manifest::{DepsManifest, LibraryEntry};
use std::path::PathBuf;

#[derive(Debug)]
pub struct DependencyContext {
    runtime: Vec<LibraryEntry>,
    compile: Vec<LibraryEntry>,
    chain: ResolverChain,
}

impl DependencyContext {
    pub fn new(fixed_probe_dirs: Vec<PathBuf>) -> Self {
        Self {
            runtime: Vec::new(),
            compile: Vec::new(),
            chain: ResolverChain::new(fixed_probe_dirs),
        }
    }

    pub fn chain(&self) -> &ResolverChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut ResolverChain {
        &mut self.chain
    }

    /// Unions `manifest` into the merged view.
    pub fn merge(&mut self, manifest: &DepsManifest) {
        merge_entries(&mut self.runtime, &manifest.runtime);
        merge_entries(&mut self.compile, &manifest.compile);
    }

    /// Runtime library whose package name or asset stem matches `name`.
    pub fn find_runtime(&self, name: &str) -> Option<&LibraryEntry> {
        self.runtime.iter().find(|entry| entry.matches(name))
    }

    pub fn runtime_len(&self) -> usize {
        self.runtime.len()
    }
}

fn merge_entries(into: &mut Vec<LibraryEntry>, from: &[LibraryEntry]) {
    for entry in from {
        match into
            .iter_mut()
            .find(|e| e.package.eq_ignore_ascii_case(&entry.package))
        {
            Some(existing) => {
                for asset in &entry.assets {
                    if !existing
                        .assets
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(asset))
                    {
                        existing.assets.push(asset.clone());
                    }
                }
            }
            None => into.push(entry.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(package: &str, assets: &[&str]) -> DepsManifest {
        DepsManifest {
            runtime: vec![LibraryEntry {
                package: package.into(),
                assets: assets.iter().map(|s| s.to_string()).collect(),
            }],
            compile: vec![],
        }
    }

    #[test]
    fn test_merge_unions_assets() {
        let mut ctx = DependencyContext::new(vec![]);
        ctx.merge(&manifest("acme", &["liba.so"]));
        ctx.merge(&manifest("ACME", &["liba.so", "libb.so"]));

        assert_eq!(ctx.runtime_len(), 1);
        let entry = ctx.find_runtime("acme").unwrap();
        assert_eq!(entry.assets.len(), 2);
    }

    #[test]
    fn test_context_only_grows() {
        let mut ctx = DependencyContext::new(vec![]);
        ctx.merge(&manifest("acme", &[]));
        ctx.merge(&manifest("other", &[]));
        assert_eq!(ctx.runtime_len(), 2);
    }

    #[test]
    fn test_find_runtime_by_asset_stem() {
        let mut ctx = DependencyContext::new(vec![]);
        ctx.merge(&manifest("acme-gen", &["libacme_gen.so"]));
        assert!(ctx.find_runtime("libacme_gen").is_some());
        assert!(ctx.find_runtime("missing").is_none());
    }
}
