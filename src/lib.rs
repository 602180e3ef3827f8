//! Declaration index over ctags output: extraction, normalization,
//! durable storage and ranked lookup.

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod mcp;
pub mod paths;
pub mod query;
pub mod refresh;
pub mod store;
pub mod tags;

pub use config::Config;
pub use error::{IndexError, Result};
pub use query::QueryEngine;
pub use refresh::Indexer;
pub use store::IndexStore;
