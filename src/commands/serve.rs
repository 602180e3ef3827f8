use anyhow::Result;
use log::warn;
use std::sync::Arc;

use api_lookup::{mcp, Indexer};

/// Startup refresh, then the MCP stdio loop
pub fn execute(indexer: Indexer) -> Result<()> {
    // A broken tag source must not keep the server from answering queries
    if let Err(e) = indexer.refresh() {
        warn!("Startup refresh failed: {}", e);
    }
    mcp::run_mcp_server(Arc::new(indexer))
}
