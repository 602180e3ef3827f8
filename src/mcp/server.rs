//! MCP server - stdio transport
//!
//! Queries are answered inline on the reader thread. `generate_ctags` and
//! `refresh_apis` run on worker threads so a long extraction never blocks
//! searches. Closing stdin cancels extractions still in flight.

use anyhow::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::protocol::{
    Request, Response, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
use crate::query::QueryEngine;
use crate::refresh::Indexer;
use crate::tags::extractor::CancelToken;

/// Run MCP server over stdio
pub fn run_mcp_server(indexer: Arc<Indexer>) -> Result<()> {
    let stdin = std::io::stdin();
    serve(indexer, stdin.lock(), std::io::stdout())
}

struct Worker {
    cancel: CancelToken,
    handle: JoinHandle<()>,
}

/// Serve line-delimited requests from `input` until EOF
pub fn serve<R, W>(indexer: Arc<Indexer>, input: R, output: W) -> Result<()>
where
    R: BufRead,
    W: Write + Send + 'static,
{
    let out = Arc::new(Mutex::new(output));
    let engine = indexer.query_engine();
    let mut workers: Vec<Worker> = Vec::new();

    info!("MCP server ready");

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        workers.retain(|w| !w.handle.is_finished());

        let request: Request = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                send(&out, &Response::error(None, PARSE_ERROR, &format!("Parse error: {}", e)))?;
                continue;
            }
        };

        if request.jsonrpc != "2.0" {
            let resp = Response::error(
                request.id.clone(),
                INVALID_REQUEST,
                &format!("Invalid JSON-RPC version: expected 2.0, got {}", request.jsonrpc),
            );
            send(&out, &resp)?;
            continue;
        }

        if request.is_notification() {
            debug!("notification: {}", request.method);
            continue;
        }

        if let Some(job) = background_job(&request) {
            workers.push(spawn_worker(&indexer, &out, request.id.clone(), job));
            continue;
        }

        send(&out, &dispatch(&request, &engine))?;
    }

    if !workers.is_empty() {
        info!("stdin closed, cancelling {} running job(s)", workers.len());
    }
    for worker in &workers {
        worker.cancel.cancel();
    }
    for worker in workers {
        if worker.handle.join().is_err() {
            warn!("worker thread panicked");
        }
    }
    Ok(())
}

fn send<W: Write>(out: &Mutex<W>, response: &Response) -> Result<()> {
    let text = serde_json::to_string(response)?;
    let mut out = out.lock();
    writeln!(out, "{}", text)?;
    out.flush()?;
    Ok(())
}

/// Write-side tool calls, run off the reader thread
enum Job {
    Generate(PathBuf),
    Refresh,
}

fn background_job(req: &Request) -> Option<Job> {
    if req.method != "tools/call" {
        return None;
    }
    let (name, args) = tool_call(req);
    match name {
        "generate_ctags" => {
            let dir = args.get("include_directory").and_then(|v| v.as_str())?;
            Some(Job::Generate(PathBuf::from(dir)))
        }
        "refresh_apis" => Some(Job::Refresh),
        _ => None,
    }
}

fn spawn_worker<W>(
    indexer: &Arc<Indexer>,
    out: &Arc<Mutex<W>>,
    id: Option<Value>,
    job: Job,
) -> Worker
where
    W: Write + Send + 'static,
{
    let cancel = CancelToken::new();
    let handle = {
        let indexer = Arc::clone(indexer);
        let out = Arc::clone(out);
        let cancel = cancel.clone();
        thread::spawn(move || {
            let response = match job {
                Job::Generate(dir) => match indexer.generate(&dir, &cancel) {
                    Ok(summary) => Response::tool_json(id, &summary),
                    Err(e) => {
                        warn!("generate_ctags {} failed: {}", dir.display(), e);
                        Response::error(id, INTERNAL_ERROR, &e.to_string())
                    }
                },
                Job::Refresh => match indexer.refresh() {
                    Ok(report) => Response::tool_json(id, &report),
                    Err(e) => Response::error(id, INTERNAL_ERROR, &e.to_string()),
                },
            };
            if let Err(e) = send(&out, &response) {
                warn!("failed to write response: {}", e);
            }
        })
    };
    Worker { cancel, handle }
}

fn dispatch(req: &Request, engine: &QueryEngine) -> Response {
    match req.method.as_str() {
        "initialize" => handle_initialize(req),
        "ping" => Response::success(req.id.clone(), json!({})),
        "tools/list" => handle_list_tools(req),
        "tools/call" => handle_tool_call(req, engine),
        _ => Response::error(req.id.clone(), METHOD_NOT_FOUND, "Method not found"),
    }
}

fn handle_initialize(req: &Request) -> Response {
    Response::success(
        req.id.clone(),
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": "api-lookup",
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
    )
}

fn paging_properties(default_limit: usize) -> Value {
    json!({
        "offset": {
            "type": "integer",
            "description": "Number of results to skip (default: 0)",
            "default": 0
        },
        "limit": {
            "type": "integer",
            "description": format!("Maximum results to return (default: {})", default_limit),
            "default": default_limit
        }
    })
}

fn with_paging(mut properties: Value, default_limit: usize) -> Value {
    if let (Some(props), Value::Object(paging)) =
        (properties.as_object_mut(), paging_properties(default_limit))
    {
        props.extend(paging);
    }
    properties
}

fn handle_list_tools(req: &Request) -> Response {
    use crate::query::{DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};

    Response::success(
        req.id.clone(),
        json!({
            "tools": [
                {
                    "name": "search_declarations",
                    "description": "Search indexed API declarations by name. Exact matches rank first, then prefix, then substring matches, then signature-only hits.",
                    "inputSchema": {
                        "type": "object",
                        "properties": with_paging(json!({
                            "name": {
                                "type": "string",
                                "description": "Name or fragment to look up (case-insensitive)"
                            }
                        }), DEFAULT_SEARCH_LIMIT),
                        "required": ["name"]
                    }
                },
                {
                    "name": "list_indexed_apis",
                    "description": "List the names of all indexed APIs.",
                    "inputSchema": { "type": "object", "properties": {} }
                },
                {
                    "name": "list_api_files",
                    "description": "List the files indexed for one API, sorted by path.",
                    "inputSchema": {
                        "type": "object",
                        "properties": with_paging(json!({
                            "api_name": {
                                "type": "string",
                                "description": "API name as returned by list_indexed_apis"
                            }
                        }), DEFAULT_LIST_LIMIT),
                        "required": ["api_name"]
                    }
                },
                {
                    "name": "list_functions_by_file",
                    "description": "List the declarations in one file, across all APIs, in line order.",
                    "inputSchema": {
                        "type": "object",
                        "properties": with_paging(json!({
                            "file_path": {
                                "type": "string",
                                "description": "File path relative to the API root, as returned by list_api_files"
                            }
                        }), DEFAULT_LIST_LIMIT),
                        "required": ["file_path"]
                    }
                },
                {
                    "name": "generate_ctags",
                    "description": "Index a source directory as an API named after the directory. Replaces any previous index of that API.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "include_directory": {
                                "type": "string",
                                "description": "Directory to scan"
                            }
                        },
                        "required": ["include_directory"]
                    }
                },
                {
                    "name": "refresh_apis",
                    "description": "Re-import tag files that changed in the tag-source directory and drop APIs whose file is gone.",
                    "inputSchema": { "type": "object", "properties": {} }
                }
            ]
        }),
    )
}

fn tool_call(req: &Request) -> (&str, &Value) {
    let name = req
        .params
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let args = req.params.get("arguments").unwrap_or(&Value::Null);
    (name, args)
}

fn int_arg(args: &Value, key: &str) -> i64 {
    args.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
}

fn required_str<'a>(req: &Request, args: &'a Value, key: &str) -> Result<&'a str, Response> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        Response::error(
            req.id.clone(),
            INVALID_PARAMS,
            &format!("Missing required parameter: {}", key),
        )
    })
}

fn handle_tool_call(req: &Request, engine: &QueryEngine) -> Response {
    let (name, args) = tool_call(req);
    let id = req.id.clone();

    let result = match name {
        "search_declarations" => {
            let query = match required_str(req, args, "name") {
                Ok(q) => q,
                Err(resp) => return resp,
            };
            engine
                .search_declarations(query, int_arg(args, "offset"), int_arg(args, "limit"))
                .map(|page| Response::tool_json(id.clone(), &page))
        }
        "list_indexed_apis" => engine
            .list_indexed_apis()
            .map(|apis| Response::tool_json(id.clone(), &apis)),
        "list_api_files" => {
            let api = match required_str(req, args, "api_name") {
                Ok(a) => a,
                Err(resp) => return resp,
            };
            engine
                .list_api_files(api, int_arg(args, "offset"), int_arg(args, "limit"))
                .map(|page| Response::tool_json(id.clone(), &page))
        }
        "list_functions_by_file" => {
            let file = match required_str(req, args, "file_path") {
                Ok(f) => f,
                Err(resp) => return resp,
            };
            engine
                .list_functions_by_file(file, int_arg(args, "offset"), int_arg(args, "limit"))
                .map(|page| Response::tool_json(id.clone(), &page))
        }
        // Only reached without a usable directory argument
        "generate_ctags" => {
            return match required_str(req, args, "include_directory") {
                Ok(_) => Response::error(id, INTERNAL_ERROR, "generate_ctags was not scheduled"),
                Err(resp) => resp,
            };
        }
        _ => {
            return Response::error(id, INVALID_PARAMS, &format!("Unknown tool: {}", name));
        }
    };

    result.unwrap_or_else(|e| Response::error(req.id.clone(), INTERNAL_ERROR, &e.to_string()))
}
