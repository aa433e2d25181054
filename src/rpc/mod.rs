//! JSON-RPC 2.0 front end for the contact graph.
//!
//! Clients send newline-delimited requests on stdin and receive responses on
//! stdout. The `identify` method is the main entry point; `contact`,
//! `health`, `stats`, `ping` and `methods/list` support operations.

/// Stdio server loop.
pub mod server;

/// Method definitions and dispatch.
pub mod methods;

/// JSON-RPC 2.0 message types.
pub mod transport;

pub use methods::{get_method_definitions, handle_method, method_action, MethodDefinition};
pub use server::RpcServer;
pub use transport::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
