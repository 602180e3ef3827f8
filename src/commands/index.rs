//! Write-side commands: generate, refresh, remove, status

use anyhow::{bail, Context, Result};
use std::path::Path;

use super::print_json;
use api_lookup::tags::extractor::CancelToken;
use api_lookup::Indexer;

pub fn generate(indexer: &Indexer, dir: &Path, json: bool) -> Result<()> {
    let summary = indexer
        .generate(dir, &CancelToken::new())
        .with_context(|| format!("Failed to index {}", dir.display()))?;
    if json {
        return print_json(&summary);
    }

    if summary.committed {
        println!(
            "✓ Indexed '{}': {} declarations ({} rejected, {} duplicates dropped)",
            summary.group, summary.declaration_count, summary.rejected, summary.duplicates
        );
    } else {
        println!(
            "⚠ No declarations found for '{}'; previous index (if any) kept",
            summary.group
        );
    }
    Ok(())
}

pub fn refresh(indexer: &Indexer, json: bool) -> Result<()> {
    let report = indexer.refresh().context("Refresh failed")?;
    if json {
        return print_json(&report);
    }

    for group in &report.reindexed {
        println!("✓ reindexed {group}");
    }
    for group in &report.removed {
        println!("✗ removed   {group}");
    }
    for failed in &report.failed {
        println!("⚠ kept      {} ({})", failed.group, failed.reason);
    }
    println!(
        "{} reindexed, {} unchanged, {} removed, {} failed",
        report.reindexed.len(),
        report.unchanged.len(),
        report.removed.len(),
        report.failed.len()
    );
    Ok(())
}

pub fn remove(indexer: &Indexer, api: &str) -> Result<()> {
    if !indexer.remove_group(api)? {
        bail!("No API named '{}' is indexed", api);
    }
    println!("✓ Removed '{}'", api);
    Ok(())
}

pub fn status(indexer: &Indexer, json: bool) -> Result<()> {
    let groups = indexer.store().group_summaries()?;
    if json {
        return print_json(&groups);
    }

    println!("Data directory: {}", indexer.config().data_dir.display());
    let bin = &indexer.config().ctags_bin;
    match which::which(bin) {
        Ok(path) => println!("Tag tool:       {}", path.display()),
        Err(_) => println!("Tag tool:       {} (not found)", bin),
    }

    if groups.is_empty() {
        println!("\nNo APIs indexed.");
        return Ok(());
    }
    println!();
    for group in groups {
        println!(
            "  {:<24} {:>8} declarations  {:<9}  {}",
            group.name,
            group.declaration_count,
            group.source_kind.as_str(),
            group.indexed_at
        );
    }
    Ok(())
}
