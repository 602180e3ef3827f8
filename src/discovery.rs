//! Path filter: which files under a root get handed to the tag tool
//!
//! Ignore rules (`.gitignore`, `.ignore`, `.git/info/exclude`) are honored
//! even outside a git checkout. Symlinks are followed, but every directory
//! is entered at most once per walk, keyed by its canonical path.

use ignore::gitignore::Gitignore;
use ignore::{Match, WalkBuilder};
use log::debug;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory names skipped unless an ignore file re-includes them
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".api-lookup",
    "target",
    "node_modules",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    "obj",
    "bin",
];

const IGNORE_FILES: &[&str] = &[".gitignore", ".ignore"];

#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    skip_dirs: Vec<String>,
}

impl PathFilter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_skip_dirs(mut self, skip_dirs: Vec<String>) -> Self {
        self.skip_dirs = skip_dirs;
        self
    }

    /// Start a fresh walk. Each call is an independent traversal.
    pub fn candidates(&self) -> Candidates {
        let rules = Arc::new(SkipRules {
            names: self.skip_dirs.iter().cloned().collect(),
            ancestors: ancestor_ignores(&self.root),
        });

        let visited = Arc::new(Mutex::new(HashSet::new()));
        if let Ok(canonical) = self.root.canonicalize() {
            visited.lock().insert(canonical);
        }

        let walk = WalkBuilder::new(&self.root)
            .hidden(false)
            .follow_links(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .ignore(true)
            .parents(true)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map_or(false, |t| t.is_dir());
                if !is_dir {
                    return true;
                }
                if rules.excludes(entry.path()) {
                    debug!("Skipping directory {}", entry.path().display());
                    return false;
                }
                match entry.path().canonicalize() {
                    Ok(canonical) => visited.lock().insert(canonical),
                    Err(_) => false,
                }
            })
            .build();

        Candidates { walk }
    }

    /// Collect all candidates sorted, for callers that need a stable list
    pub fn collect_sorted(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.candidates().collect();
        files.sort();
        files
    }
}

/// Lazy sequence of candidate files
pub struct Candidates {
    walk: ignore::Walk,
}

impl Iterator for Candidates {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            match self.walk.next()? {
                Ok(entry) => {
                    if entry.file_type().map_or(false, |t| t.is_file()) {
                        return Some(entry.into_path());
                    }
                }
                // Unreadable entries and symlink loops are skipped, not fatal
                Err(e) => debug!("Walk error: {}", e),
            }
        }
    }
}

struct SkipRules {
    names: HashSet<String>,
    /// Ignore files from the root upward, nearest first
    ancestors: Vec<Gitignore>,
}

impl SkipRules {
    fn excludes(&self, dir: &Path) -> bool {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if !self.names.contains(name) {
            return false;
        }
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        // An explicit re-include in an ignore file beats the default list
        for rules in &self.ancestors {
            match rules.matched(&dir, true) {
                Match::Whitelist(_) => return false,
                Match::Ignore(_) => return true,
                Match::None => {}
            }
        }
        true
    }
}

/// Ignore files found walking from `root` upward, stopping at a repository boundary
fn ancestor_ignores(root: &Path) -> Vec<Gitignore> {
    let start = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let mut found = Vec::new();

    for dir in start.ancestors() {
        for file in IGNORE_FILES {
            let path = dir.join(file);
            if path.is_file() {
                let (rules, err) = Gitignore::new(&path);
                if let Some(e) = err {
                    debug!("Partial ignore file {}: {}", path.display(), e);
                }
                found.push(rules);
            }
        }
        if dir.join(".git").exists() {
            break;
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;
    use tempfile::TempDir;

    fn relative(root: &Path, files: Vec<PathBuf>) -> Vec<String> {
        files
            .into_iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_gitignore_rules_apply_without_git() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        fs::write(root.join(".gitignore"), "generated/\n*.tmp.h\n")?;
        fs::write(root.join("api.h"), "int f(void);")?;
        fs::write(root.join("scratch.tmp.h"), "int g(void);")?;
        fs::create_dir(root.join("generated"))?;
        fs::write(root.join("generated/out.h"), "int h(void);")?;

        let files = relative(root, PathFilter::new(root).collect_sorted());
        assert_eq!(files, vec![".gitignore", "api.h"]);
        Ok(())
    }

    #[test]
    fn test_default_skip_dirs_and_reinclude() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        fs::create_dir_all(root.join("node_modules/pkg"))?;
        fs::write(root.join("node_modules/pkg/index.h"), "")?;
        fs::create_dir_all(root.join("vendor"))?;
        fs::write(root.join("vendor/dep.h"), "")?;
        fs::write(root.join("main.h"), "")?;

        let files = relative(root, PathFilter::new(root).collect_sorted());
        assert_eq!(files, vec!["main.h"]);

        // Ignore-file rules take precedence over the default list
        fs::write(root.join(".ignore"), "!vendor/\n")?;
        let files = relative(root, PathFilter::new(root).collect_sorted());
        assert_eq!(files, vec![".ignore", "main.h", "vendor/dep.h"]);

        // And the default list itself is configurable
        let files = relative(
            root,
            PathFilter::new(root).with_skip_dirs(vec![]).collect_sorted(),
        );
        assert!(files.contains(&"node_modules/pkg/index.h".to_string()));
        Ok(())
    }

    #[test]
    fn test_empty_root_yields_nothing() -> Result<()> {
        let temp = TempDir::new()?;
        assert_eq!(PathFilter::new(temp.path()).candidates().count(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_is_restartable() -> Result<()> {
        let temp = TempDir::new()?;
        fs::write(temp.path().join("a.h"), "")?;
        let filter = PathFilter::new(temp.path());
        assert_eq!(filter.candidates().count(), 1);
        assert_eq!(filter.candidates().count(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() -> Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path();
        fs::create_dir(root.join("a"))?;
        fs::write(root.join("a/x.h"), "")?;
        std::os::unix::fs::symlink(root, root.join("a/back_to_root"))?;
        std::os::unix::fs::symlink(root.join("a"), root.join("alias"))?;

        let files = relative(root, PathFilter::new(root).collect_sorted());
        assert_eq!(files, vec!["a/x.h"]);
        Ok(())
    }
}
