pub mod index;
pub mod query;
pub mod serve;

use anyhow::{Context, Result};
use serde::Serialize;

use api_lookup::{Config, Indexer};

/// Open the index under the configured data directory
pub fn open_indexer(config: Config) -> Result<Indexer> {
    let db = config.index_db();
    Indexer::open(config).with_context(|| format!("Failed to open index at {}", db.display()))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
