//! JSON-RPC server that reads newline-delimited requests from stdin and
//! writes responses to stdout.
//!
//! Requests are handled one at a time on the server's single database
//! connection. The loop ends on stdin EOF or Ctrl-C.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::contactgraph::ContactGraph;
use crate::errors::Result;

use super::methods::{handle_method, is_known_method, method_action};
use super::transport::{ErrorCode, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION};

/// Runtime counters for the RPC server.
pub struct ServerStats {
    started_at: Instant,
    total_requests: AtomicU64,
    errors: AtomicU64,
    method_counts: Mutex<HashMap<String, u64>>,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            method_counts: Mutex::new(HashMap::new()),
        }
    }
}

/// The RPC server wrapping a `ContactGraph`.
pub struct RpcServer {
    cg: ContactGraph,
    stats: ServerStats,
}

impl RpcServer {
    pub fn new(cg: ContactGraph) -> Self {
        Self {
            cg,
            stats: ServerStats::new(),
        }
    }

    /// Returns the wrapped graph so the caller can close it.
    pub fn into_inner(self) -> ContactGraph {
        self.cg
    }

    /// Serves stdin/stdout until stdin closes or Ctrl-C is received.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(service = %self.cg.get_config().service_name, "rpc server listening on stdio");

        loop {
            let line = tokio::select! {
                next = lines.next_line() => match next {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to read request");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    info!("received Ctrl-C, shutting down");
                    break;
                }
            };

            let Some(response) = self.handle_line(&line) else {
                continue;
            };

            let json_line = match serde_json::to_string(&response) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to serialize response");
                    continue;
                }
            };
            if let Err(e) = stdout.write_all(format!("{json_line}\n").as_bytes()).await {
                error!(error = %e, "failed to write response");
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!(error = %e, "failed to flush stdout");
                break;
            }
        }

        Ok(())
    }

    /// Handles one raw input line. Returns `None` for blank lines and
    /// notifications.
    pub fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(&request),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                Some(JsonRpcResponse::error(
                    Value::Null,
                    ErrorCode::ParseError,
                    format!("failed to parse JSON-RPC request: {}", e),
                ))
            }
        }
    }

    /// Dispatches a parsed request.
    pub fn handle_request(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        let id = request.id.clone();

        let response = if request.jsonrpc != JSONRPC_VERSION {
            JsonRpcResponse::error(
                id,
                ErrorCode::InvalidRequest,
                format!("unsupported jsonrpc version: {}", request.jsonrpc),
            )
        } else if !is_known_method(&request.method) {
            JsonRpcResponse::error(
                id,
                ErrorCode::MethodNotFound,
                format!("method not found: {}", request.method),
            )
        } else {
            self.call(id, &request.method, request.params.clone())
        };

        if response.error.is_some() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }

        if request.is_notification() {
            debug!(method = %request.method, "notification handled");
            return None;
        }
        Some(response)
    }

    fn call(&self, id: Value, method: &str, params: Option<Value>) -> JsonRpcResponse {
        if let Ok(mut counts) = self.stats.method_counts.lock() {
            *counts.entry(method.to_string()).or_insert(0) += 1;
        }

        let server_stats = (method == "stats").then(|| self.server_stats_json());
        let params = params.unwrap_or_else(|| json!({}));

        match handle_method(&self.cg, method, params, server_stats) {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                if e.is_client_error() {
                    warn!(method, error = %e, "rejected request");
                } else {
                    error!(method, error = %e, "request failed");
                }
                JsonRpcResponse::from_error(id, method_action(method), &e)
            }
        }
    }

    /// Returns the current server counters as JSON.
    pub fn server_stats_json(&self) -> Value {
        let method_counts: Value = self
            .stats
            .method_counts
            .lock()
            .map(|counts| json!(*counts))
            .unwrap_or(json!({}));

        json!({
            "uptime_secs": self.stats.started_at.elapsed().as_secs(),
            "total_requests": self.stats.total_requests.load(Ordering::Relaxed),
            "errors": self.stats.errors.load(Ordering::Relaxed),
            "method_counts": method_counts,
        })
    }
}
