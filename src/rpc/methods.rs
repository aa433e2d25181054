//! RPC method definitions and dispatch.
//!
//! Each method maps to a `ContactGraph` operation. Definitions carry a JSON
//! Schema for their params so clients can discover them via `methods/list`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::contactgraph::ContactGraph;
use crate::errors::{ContactGraphError, Result};
use crate::types::{IdentifyRequest, IdentifyResponse};

/// A method exposed by the RPC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "paramsSchema")]
    pub params_schema: Value,
}

/// Returns every method the server answers.
pub fn get_method_definitions() -> Vec<MethodDefinition> {
    vec![
        MethodDefinition {
            name: "identify".to_string(),
            description: "Reconcile an email and/or phone number into the identity graph and return the consolidated contact.".to_string(),
            params_schema: json!({
                "type": "object",
                "properties": {
                    "email": {
                        "type": ["string", "null"],
                        "description": "Email address of the customer"
                    },
                    "phoneNumber": {
                        "type": ["string", "number", "null"],
                        "description": "Phone number of the customer"
                    }
                }
            }),
        },
        MethodDefinition {
            name: "contact".to_string(),
            description: "Return a stored contact row together with the consolidated view of its cluster.".to_string(),
            params_schema: json!({
                "type": "object",
                "properties": {
                    "id": {
                        "type": "number",
                        "description": "Contact id"
                    }
                },
                "required": ["id"]
            }),
        },
        MethodDefinition {
            name: "health".to_string(),
            description: "Liveness check.".to_string(),
            params_schema: json!({ "type": "object", "properties": {} }),
        },
        MethodDefinition {
            name: "stats".to_string(),
            description: "Contact counts, database size and server counters.".to_string(),
            params_schema: json!({ "type": "object", "properties": {} }),
        },
        MethodDefinition {
            name: "ping".to_string(),
            description: "Returns an empty object.".to_string(),
            params_schema: json!({ "type": "object", "properties": {} }),
        },
        MethodDefinition {
            name: "methods/list".to_string(),
            description: "List the methods this server answers.".to_string(),
            params_schema: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// Returns `true` if `name` is one of the served methods.
pub fn is_known_method(name: &str) -> bool {
    get_method_definitions().iter().any(|m| m.name == name)
}

/// Describes what `method` does, for "failed to ..." error messages.
pub fn method_action(method: &str) -> &'static str {
    match method {
        "identify" => "identify contact",
        "contact" => "look up contact",
        "health" => "check health",
        "stats" => "collect stats",
        "ping" => "answer ping",
        "methods/list" => "list methods",
        _ => "handle request",
    }
}

/// Dispatches a method call.
///
/// `server_stats` is merged into the `stats` result when provided.
pub fn handle_method(
    cg: &ContactGraph,
    method: &str,
    params: Value,
    server_stats: Option<Value>,
) -> Result<Value> {
    match method {
        "identify" => handle_identify(cg, params),
        "contact" => handle_contact(cg, params),
        "health" => Ok(handle_health(cg)),
        "stats" => handle_stats(cg, server_stats),
        "ping" => Ok(json!({})),
        "methods/list" => Ok(json!({ "methods": get_method_definitions() })),
        _ => Err(ContactGraphError::Config {
            message: format!("unknown method: {}", method),
        }),
    }
}

/// Handles `identify` calls.
fn handle_identify(cg: &ContactGraph, params: Value) -> Result<Value> {
    let request: IdentifyRequest = serde_json::from_value(params)
        .map_err(|e| ContactGraphError::validation(format!("invalid identify params: {e}")))?;

    let contact = cg.identify(&request)?;
    Ok(serde_json::to_value(IdentifyResponse { contact })?)
}

/// Handles `contact` calls.
fn handle_contact(cg: &ContactGraph, params: Value) -> Result<Value> {
    let id = params
        .get("id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ContactGraphError::validation("missing required parameter: id"))?;

    let contact = cg
        .get_contact(id)?
        .ok_or(ContactGraphError::NotFound { id })?;
    let cluster = cg.lookup(id)?;

    Ok(json!({
        "contact": contact,
        "cluster": cluster,
    }))
}

/// Handles `health` calls.
fn handle_health(cg: &ContactGraph) -> Value {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    json!({
        "status": "OK",
        "timestamp": timestamp,
        "service": cg.get_config().service_name,
    })
}

/// Handles `stats` calls.
fn handle_stats(cg: &ContactGraph, server_stats: Option<Value>) -> Result<Value> {
    let mut output = serde_json::to_value(cg.get_stats()?)?;
    if let (Some(obj), Some(server)) = (output.as_object_mut(), server_stats) {
        obj.insert("server".to_string(), server);
    }
    Ok(output)
}
