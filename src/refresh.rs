//! Refresh coordinator and the generate pipeline
//!
//! Both paths end in `IndexStore::replace_group`, serialized per group name.
//! The group lock is taken only around persisting the tag file and the store
//! transaction; extraction and parsing run unlocked.

use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::paths;
use crate::query::QueryEngine;
use crate::store::types::{Declaration, SourceKind};
use crate::store::IndexStore;
use crate::tags::extractor::{CancelToken, TagExtractor};
use crate::tags::normalize::{Ingest, NormalizeStats, Normalizer};

/// Outcome of one `generate` run
#[derive(Debug, Clone, Serialize)]
pub struct GenerateSummary {
    pub group: String,
    pub declaration_count: usize,
    pub rejected: usize,
    pub duplicates: usize,
    /// False when the run produced nothing usable and the prior index was kept
    pub committed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSource {
    pub group: String,
    pub reason: String,
}

/// What a refresh pass did, per group
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub reindexed: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<FailedSource>,
}

/// One lock per group name, created on first use
#[derive(Default)]
struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    fn get(&self, group: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(group.to_string()).or_default())
    }
}

/// Owns the write side of the index
pub struct Indexer {
    store: Arc<IndexStore>,
    config: Config,
    locks: GroupLocks,
}

impl Indexer {
    pub fn new(store: Arc<IndexStore>, config: Config) -> Self {
        Self {
            store,
            config,
            locks: GroupLocks::default(),
        }
    }

    /// Open the store under the configured data directory
    pub fn open(config: Config) -> Result<Self> {
        let store = IndexStore::open(config.index_db())?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn store(&self) -> &Arc<IndexStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read side over the same store
    pub fn query_engine(&self) -> QueryEngine {
        QueryEngine::new(Arc::clone(&self.store)).with_max_page_size(self.config.max_page_size)
    }

    fn extractor(&self) -> TagExtractor {
        TagExtractor::new(self.config.ctags_bin.clone())
            .with_timeout(self.config.extract_timeout())
            .with_skip_dirs(self.config.skip_dirs.clone())
    }

    /// Extract, normalize and index `dir` as the group named after it
    ///
    /// The raw tag stream is kept as `apis/<group>.ctags` for later refreshes.
    /// Extraction failures leave both the index and the previous tag file alone.
    pub fn generate(&self, dir: &Path, cancel: &CancelToken) -> Result<GenerateSummary> {
        if !dir.is_dir() {
            return Err(IndexError::InvalidDirectory(dir.to_path_buf()));
        }
        let root = dir.canonicalize()?;
        let group = root
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .ok_or_else(|| IndexError::InvalidDirectory(dir.to_path_buf()))?;

        let apis_dir = self.config.apis_dir();
        fs::create_dir_all(&apis_dir)?;

        let mut stream = self.extractor().extract(&root, &group, cancel)?;
        let mut out = BufWriter::new(NamedTempFile::new_in(&apis_dir)?);
        let mut hasher = Sha256::new();
        let mut ingest = Ingest::new(Normalizer::new(&group, Some(&root)));

        for item in &mut stream {
            let line = match item {
                Ok(line) => line,
                Err(IndexError::EmptyResult { root, files }) => {
                    warn!(
                        "Tag tool produced no declarations for {} files under {}; keeping prior index of '{}'",
                        files,
                        root.display(),
                        group
                    );
                    let stats = ingest.stats();
                    return Ok(uncommitted(group.clone(), stats));
                }
                Err(e) => return Err(e),
            };
            writeln!(out, "{}", line.raw)?;
            hasher.update(line.raw.as_bytes());
            hasher.update(b"\n");
            ingest.push_record(line.record);
        }
        let files = stream.files();
        drop(stream);

        let (declarations, stats) = ingest.finish();
        info!(
            "Ingested '{}': {} files, {} records, {} accepted, {} rejected, {} duplicates",
            group, files, stats.records, stats.accepted, stats.rejected, stats.duplicates
        );
        if declarations.is_empty() {
            warn!("No valid declarations for '{}'; keeping prior index", group);
            return Ok(uncommitted(group, stats));
        }
        if cancel.is_cancelled() {
            return Err(IndexError::ExtractionAbandoned("cancelled by caller".to_string()));
        }

        let tmp = out.into_inner().map_err(|e| e.into_error())?;
        let fingerprint = format!("{:x}", hasher.finalize());
        let target = paths::tag_file(&self.config.data_dir, &group);

        let lock = self.locks.get(&group);
        let _guard = lock.lock();
        tmp.persist(&target).map_err(|e| e.error)?;
        let stored =
            self.store
                .replace_group(&group, SourceKind::Generated, Some(&fingerprint), &declarations)?;

        info!("Indexed '{}': {} declarations", group, stored);
        Ok(GenerateSummary {
            group,
            declaration_count: stored,
            rejected: stats.rejected,
            duplicates: stats.duplicates,
            committed: true,
        })
    }

    /// Bring the index in line with the tag-source directory
    ///
    /// Only sources whose content hash changed are re-parsed. A source that
    /// can't be parsed keeps its previously indexed group. Groups whose tag
    /// file is gone are removed.
    pub fn refresh(&self) -> Result<RefreshReport> {
        let apis_dir = self.config.apis_dir();
        fs::create_dir_all(&apis_dir)?;

        let sources = list_tag_sources(&apis_dir)?;
        let mut report = RefreshReport::default();

        for (group, path) in &sources {
            let fingerprint = match fingerprint_file(path) {
                Ok(fp) => fp,
                Err(e) => {
                    warn!("Skipping unreadable tag source {}: {}", path.display(), e);
                    report.failed.push(FailedSource {
                        group: group.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let state = self.store.group_state(group)?;
            if state.as_ref().and_then(|s| s.fingerprint.as_deref()) == Some(fingerprint.as_str()) {
                debug!("'{}' unchanged, skipping", group);
                report.unchanged.push(group.clone());
                continue;
            }

            let (declarations, stats) = match ingest_file(group, path) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Keeping prior index of '{}': {}", group, e);
                    report.failed.push(FailedSource {
                        group: group.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let source_kind = state
                .map(|s| s.source_kind)
                .unwrap_or(SourceKind::Imported);

            let lock = self.locks.get(group);
            let _guard = lock.lock();
            // A concurrent generate may have rewritten the file since it was hashed
            if fingerprint_file(path).ok().as_deref() != Some(fingerprint.as_str()) {
                debug!("'{}' changed during refresh, leaving it to the newer writer", group);
                report.unchanged.push(group.clone());
                continue;
            }
            let stored = self
                .store
                .replace_group(group, source_kind, Some(&fingerprint), &declarations)?;
            info!(
                "Reindexed '{}': {} declarations ({} rejected, {} duplicates)",
                group, stored, stats.rejected, stats.duplicates
            );
            report.reindexed.push(group.clone());
        }

        let present: BTreeSet<&str> = sources.iter().map(|(g, _)| g.as_str()).collect();
        for group in self.store.get_groups()? {
            if present.contains(group.as_str()) {
                continue;
            }
            let lock = self.locks.get(&group);
            let _guard = lock.lock();
            if paths::tag_file(&self.config.data_dir, &group).exists() {
                continue;
            }
            if self.store.delete_group(&group)? {
                info!("Removed '{}': tag source is gone", group);
                report.removed.push(group);
            }
        }

        info!(
            "Refresh: {} reindexed, {} unchanged, {} removed, {} failed",
            report.reindexed.len(),
            report.unchanged.len(),
            report.removed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Drop a group and its tag file. Returns false if neither existed.
    pub fn remove_group(&self, group: &str) -> Result<bool> {
        let lock = self.locks.get(group);
        let _guard = lock.lock();

        let file_removed = match fs::remove_file(paths::tag_file(&self.config.data_dir, group)) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let rows_removed = self.store.delete_group(group)?;
        if file_removed || rows_removed {
            info!("Removed group '{}'", group);
        }
        Ok(file_removed || rows_removed)
    }
}

fn uncommitted(group: String, stats: NormalizeStats) -> GenerateSummary {
    GenerateSummary {
        group,
        declaration_count: 0,
        rejected: stats.rejected,
        duplicates: stats.duplicates,
        committed: false,
    }
}

/// `*.ctags` files in the tag-source directory, by group name
fn list_tag_sources(apis_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(apis_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(group) = paths::group_of_tag_file(&path) {
            sources.push((group, path));
        }
    }
    sources.sort();
    Ok(sources)
}

/// Hex SHA-256 of a file's contents
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Parse a stored tag file into its declaration set
fn ingest_file(group: &str, path: &Path) -> Result<(Vec<Declaration>, NormalizeStats)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut ingest = Ingest::new(Normalizer::new(group, None));

    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        ingest.push_line(String::from_utf8_lossy(&buf).trim_end());
    }

    let (declarations, stats) = ingest.finish();
    if declarations.is_empty() {
        return Err(IndexError::SourceParse {
            path: path.to_path_buf(),
            reason: format!(
                "no valid declarations ({} records, {} rejected)",
                stats.records, stats.rejected
            ),
        });
    }
    Ok((declarations, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::TempDir;

    const SDL_TAGS: &str = r#"{"_type": "ptag", "name": "JSON_OUTPUT_VERSION", "path": "0.0", "pattern": "in development"}
{"_type": "tag", "name": "SDL_Init", "path": "/home/dev/sdl/include/SDL.h", "pattern": "/^bool SDL_Init(SDL_InitFlags flags);$/", "line": 12, "kind": "prototype", "signature": "(SDL_InitFlags flags)", "typeref": "typename:bool", "language": "C"}
{"_type": "tag", "name": "SDL_Quit", "path": "/home/dev/sdl/include/SDL.h", "line": 20, "kind": "prototype", "signature": "(void)", "typeref": "typename:void"}
"#;

    fn indexer(temp: &TempDir) -> Result<Indexer> {
        let config = Config::with_data_dir(temp.path().join("data"));
        Ok(Indexer::new(Arc::new(IndexStore::open_in_memory()?), config))
    }

    fn drop_tag_file(indexer: &Indexer, group: &str, contents: &str) -> Result<PathBuf> {
        let path = paths::tag_file(&indexer.config().data_dir, group);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn test_refresh_imports_dropped_file() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        drop_tag_file(&indexer, "sdl", SDL_TAGS)?;

        let report = indexer.refresh()?;
        assert_eq!(report.reindexed, vec!["sdl"]);

        let engine = indexer.query_engine();
        let files = engine.list_api_files("sdl", 0, 0)?;
        assert_eq!(files.items, vec!["include/SDL.h"]);
        let hit = engine.search_declarations("SDL_Init", 0, 1)?;
        assert_eq!(hit.items[0].signature.as_deref(), Some("bool SDL_Init(SDL_InitFlags flags)"));

        let state = indexer.store().group_state("sdl")?.unwrap();
        assert_eq!(state.source_kind, SourceKind::Imported);
        Ok(())
    }

    #[test]
    fn test_refresh_skips_unchanged_and_reindexes_changed() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        drop_tag_file(&indexer, "sdl", SDL_TAGS)?;
        indexer.refresh()?;

        let report = indexer.refresh()?;
        assert!(report.reindexed.is_empty());
        assert_eq!(report.unchanged, vec!["sdl"]);

        let smaller = SDL_TAGS.lines().take(2).collect::<Vec<_>>().join("\n");
        drop_tag_file(&indexer, "sdl", &smaller)?;
        let report = indexer.refresh()?;
        assert_eq!(report.reindexed, vec!["sdl"]);
        assert_eq!(indexer.store().declaration_count("sdl")?, 1);
        Ok(())
    }

    #[test]
    fn test_malformed_source_keeps_prior_group() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        drop_tag_file(&indexer, "sdl", SDL_TAGS)?;
        indexer.refresh()?;

        drop_tag_file(&indexer, "sdl", "this is not json\n{\"_type\": \"tag\"}\n")?;
        let report = indexer.refresh()?;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].group, "sdl");
        assert_eq!(indexer.store().declaration_count("sdl")?, 2);
        Ok(())
    }

    #[test]
    fn test_vanished_source_removes_group() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        let path = drop_tag_file(&indexer, "sdl", SDL_TAGS)?;
        drop_tag_file(&indexer, "zlib", r#"{"_type": "tag", "name": "inflate", "path": "zlib.h", "line": 3, "kind": "prototype"}"#)?;
        indexer.refresh()?;
        assert_eq!(indexer.store().get_groups()?, vec!["sdl", "zlib"]);

        fs::remove_file(path)?;
        let report = indexer.refresh()?;
        assert_eq!(report.removed, vec!["sdl"]);
        assert_eq!(indexer.store().get_groups()?, vec!["zlib"]);
        Ok(())
    }

    #[test]
    fn test_remove_group_deletes_file_and_rows() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        let path = drop_tag_file(&indexer, "sdl", SDL_TAGS)?;
        indexer.refresh()?;

        assert!(indexer.remove_group("sdl")?);
        assert!(!path.exists());
        assert!(indexer.store().get_groups()?.is_empty());
        assert!(!indexer.remove_group("sdl")?);
        Ok(())
    }

    #[test]
    fn test_generate_rejects_non_directory() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x")?;

        let err = indexer.generate(&file, &CancelToken::new()).unwrap_err();
        assert!(matches!(err, IndexError::InvalidDirectory(_)));
        let err = indexer
            .generate(&temp.path().join("missing"), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidDirectory(_)));
        Ok(())
    }

    #[test]
    fn test_generate_empty_directory_commits_nothing() -> Result<()> {
        let temp = TempDir::new()?;
        let indexer = indexer(&temp)?;
        let src = temp.path().join("emptyapi");
        fs::create_dir(&src)?;

        let summary = indexer.generate(&src, &CancelToken::new())?;
        assert!(!summary.committed);
        assert_eq!(summary.group, "emptyapi");
        assert!(indexer.store().get_groups()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() -> Result<()> {
        let temp = TempDir::new()?;
        let path = temp.path().join("f");
        fs::write(&path, "abc")?;
        assert_eq!(
            fingerprint_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }
}
