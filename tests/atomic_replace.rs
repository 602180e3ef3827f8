//! Readers racing a writer that keeps swapping a group between two versions
//! must only ever see one whole version.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

use api_lookup::store::types::{Declaration, DeclarationKind, SourceKind};
use api_lookup::{IndexStore, QueryEngine};

const ROUNDS: usize = 40;
const READERS: usize = 3;

fn version(tag: &str, size: usize) -> Vec<Declaration> {
    (0..size)
        .map(|i| Declaration {
            group: "gfx".to_string(),
            name: format!("gfx_{}_{:03}", tag, i),
            kind: DeclarationKind::Prototype,
            signature: Some(format!("void gfx_{}_{:03}(void)", tag, i)),
            return_type: Some("void".to_string()),
            scope: None,
            file_path: format!("{}/{:03}.h", tag, i),
            line: Some(i as u32 + 1),
            language: Some("C".to_string()),
        })
        .collect()
}

/// Which version a search result belongs to, if it is a whole one
fn classify(names: &[String], total: usize) -> Option<&'static str> {
    if total == 30 && names.len() == 30 && names.iter().all(|n| n.starts_with("gfx_old_")) {
        return Some("old");
    }
    if total == 75 && names.len() == 75 && names.iter().all(|n| n.starts_with("gfx_new_")) {
        return Some("new");
    }
    None
}

fn race(store: Arc<IndexStore>) -> Result<()> {
    let old = version("old", 30);
    let new = version("new", 75);
    store.replace_group("gfx", SourceKind::Generated, Some("old"), &old)?;

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let engine = QueryEngine::new(Arc::clone(&store));
            let done = Arc::clone(&done);
            thread::spawn(move || -> Result<usize> {
                let mut checks = 0;
                loop {
                    let page = engine.search_declarations("gfx", 0, 500)?;
                    let names: Vec<String> = page.items.into_iter().map(|d| d.name).collect();
                    anyhow::ensure!(
                        classify(&names, page.total).is_some(),
                        "mixed result: {} items, total {}",
                        names.len(),
                        page.total
                    );

                    let files = engine.list_api_files("gfx", 0, 500)?;
                    let old_files = files.items.iter().all(|f| f.starts_with("old/"));
                    let new_files = files.items.iter().all(|f| f.starts_with("new/"));
                    anyhow::ensure!(
                        (old_files && files.total == 30) || (new_files && files.total == 75),
                        "mixed file list: {} items, total {}",
                        files.items.len(),
                        files.total
                    );
                    checks += 1;
                    if done.load(Ordering::SeqCst) {
                        break;
                    }
                }
                Ok(checks)
            })
        })
        .collect();

    for round in 0..ROUNDS {
        let (decls, fp) = if round % 2 == 0 { (&new, "new") } else { (&old, "old") };
        store.replace_group("gfx", SourceKind::Generated, Some(fp), decls)?;
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        let checks = reader
            .join()
            .map_err(|_| anyhow::anyhow!("reader panicked"))??;
        assert!(checks > 0);
    }

    // ROUNDS is even, so the last write was "old"
    assert_eq!(store.declaration_count("gfx")?, 30);
    Ok(())
}

#[test]
fn test_atomic_replace_in_memory() -> Result<()> {
    race(Arc::new(IndexStore::open_in_memory()?))
}

#[test]
fn test_atomic_replace_file_backed() -> Result<()> {
    let temp = TempDir::new()?;
    race(Arc::new(IndexStore::open(temp.path().join("index.db"))?))
}

#[test]
fn test_other_groups_unaffected_by_replace() -> Result<()> {
    let temp = TempDir::new()?;
    let store = Arc::new(IndexStore::open(temp.path().join("index.db"))?);
    let mut stable = version("old", 5);
    for decl in &mut stable {
        decl.group = "audio".to_string();
    }
    store.replace_group("audio", SourceKind::Imported, None, &stable)?;

    for round in 0..10 {
        let decls = version(if round % 2 == 0 { "new" } else { "old" }, 10 + round);
        store.replace_group("gfx", SourceKind::Generated, None, &decls)?;
        assert_eq!(store.declaration_count("audio")?, 5);
    }
    assert!(store.delete_group("gfx")?);
    assert_eq!(store.get_groups()?, vec!["audio"]);
    Ok(())
}
