//! Layered file-name resolver.
//!
//! A single ordered list of probe directories replaces the original
//! ever-nesting composite: fixed strategies (package cache, configured
//! search roots) sit at the tail, and each newly seen plugin directory is
//! prepended, so "most recently added wins first" falls out of list order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct ResolverChain {
    /// Per-plugin directories, most recently added first.
    dirs: Vec<PathBuf>,
    /// Fixed probe directories, consulted after all plugin directories.
    fixed: Vec<PathBuf>,
    /// Canonical paths already in the chain.
    seen: HashSet<PathBuf>,
}

impl ResolverChain {
    /// Chain with the given fixed strategies (probed last, in order).
    pub fn new(fixed: Vec<PathBuf>) -> Self {
        let mut chain = Self {
            dirs: Vec::new(),
            fixed: Vec::new(),
            seen: HashSet::new(),
        };
        for dir in fixed {
            let canon = canonical(&dir);
            if chain.seen.insert(canon.clone()) {
                chain.fixed.push(canon);
            }
        }
        chain
    }

    /// Prepends `dir` to the probe order. Idempotent per directory; returns
    /// `false` when the directory was already covered.
    pub fn push_dir(&mut self, dir: &Path) -> bool {
        let canon = canonical(dir);
        if !self.seen.insert(canon.clone()) {
            return false;
        }
        self.dirs.insert(0, canon);
        true
    }

    /// Existing candidate paths for `file_name`, in probe order.
    pub fn candidate_paths(&self, file_name: &str) -> Vec<PathBuf> {
        self.dirs
            .iter()
            .chain(self.fixed.iter())
            .map(|dir| dir.join(file_name))
            .filter(|p| p.exists())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.dirs.len() + self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty() && self.fixed.is_empty()
    }
}

fn canonical(dir: &Path) -> PathBuf {
    dunce::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_dir_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut chain = ResolverChain::new(vec![]);
        assert!(chain.push_dir(tmp.path()));
        assert!(!chain.push_dir(tmp.path()));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_most_recent_directory_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("first");
        let second = tmp.path().join("second");
        std::fs::create_dir_all(&first).unwrap();
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(first.join("libgen.so"), b"").unwrap();
        std::fs::write(second.join("libgen.so"), b"").unwrap();

        let mut chain = ResolverChain::new(vec![]);
        chain.push_dir(&first);
        chain.push_dir(&second);

        let candidates = chain.candidate_paths("libgen.so");
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].starts_with(dunce::canonicalize(&second).unwrap()));
    }

    #[test]
    fn test_fixed_probes_come_last() {
        let tmp = tempfile::tempdir().unwrap();
        let fixed = tmp.path().join("cache");
        let plugin_dir = tmp.path().join("plugins");
        std::fs::create_dir_all(&fixed).unwrap();
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(fixed.join("libgen.so"), b"").unwrap();
        std::fs::write(plugin_dir.join("libgen.so"), b"").unwrap();

        let mut chain = ResolverChain::new(vec![fixed.clone()]);
        chain.push_dir(&plugin_dir);

        let candidates = chain.candidate_paths("libgen.so");
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].starts_with(dunce::canonicalize(&plugin_dir).unwrap()));
        assert!(candidates[1].starts_with(dunce::canonicalize(&fixed).unwrap()));
    }

    #[test]
    fn test_missing_candidates_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        let mut chain = ResolverChain::new(vec![tmp.path().to_path_buf()]);
        chain.push_dir(tmp.path());
        assert!(chain.candidate_paths("libnothere.so").is_empty());
    }
}
