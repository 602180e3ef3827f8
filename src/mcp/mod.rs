//! MCP (Model Context Protocol) server
//!
//! JSON-RPC 2.0, one message per line over stdio. Blocking I/O, no SDK.

mod protocol;
mod server;

pub use server::{run_mcp_server, serve};
