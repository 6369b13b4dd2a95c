//! MCP (JSON-RPC 2.0 over streamable HTTP) surface of the relay.
//!
//! Each MCP session is one relay caller: the `Mcp-Session-Id` issued at
//! `initialize` keys the session jar. Every other request must carry a live
//! session id; ids the relay did not issue are answered with 404.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{CallerId, JsonObject, Relay};

pub const MCP_SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION: &str = "2025-03-26";

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;

/// Request ID (string or number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(super) enum RequestId {
    String(String),
    Number(i64),
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    #[serde(rename = "inputSchema")]
    input_schema: Value,
}

fn tools() -> Vec<Tool> {
    let no_arguments = json!({ "type": "object", "properties": {} });
    vec![
        Tool {
            name: "sso_login",
            description: "Start SSO login. Returns the identity provider URL the user must open.",
            input_schema: no_arguments.clone(),
        },
        Tool {
            name: "sso_callback",
            description: "Complete SSO login with the authorization code (and state) from the redirect.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Authorization code" },
                    "state": { "type": "string", "description": "State returned with the code" }
                },
                "required": ["code"]
            }),
        },
        Tool {
            name: "sso_me",
            description: "Return the signed-in user for this session.",
            input_schema: no_arguments.clone(),
        },
        Tool {
            name: "sso_logout",
            description: "Sign out and clear this session.",
            input_schema: no_arguments,
        },
    ]
}

pub(super) fn routes() -> Router<Arc<Relay>> {
    Router::new().route("/mcp", post(handle).delete(terminate))
}

fn presented_session(headers: &HeaderMap) -> Option<CallerId> {
    headers
        .get(MCP_SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(CallerId::new)
}

async fn handle(State(relay): State<Arc<Relay>>, headers: HeaderMap, body: Bytes) -> Response {
    let presented = presented_session(&headers);

    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            warn!(error = %err, "Unparseable MCP request");
            let rpc = JsonRpcResponse::error(None, PARSE_ERROR, "Parse error");
            return (StatusCode::BAD_REQUEST, Json(rpc)).into_response();
        }
    };

    let (id, method, params) = match parse_request(&request) {
        Ok(parsed) => parsed,
        Err(rpc) => return (StatusCode::BAD_REQUEST, Json(rpc)).into_response(),
    };

    let session_id = if method == "initialize" {
        match presented.filter(|session| relay.knows(session)) {
            Some(session) => session,
            None => relay.open_session(),
        }
    } else {
        match presented {
            Some(session) if relay.knows(&session) => session,
            Some(session) => {
                debug!(session_id = %session, "Session not found");
                let rpc = JsonRpcResponse::error(id, INVALID_REQUEST, "Session not found");
                return (StatusCode::NOT_FOUND, Json(rpc)).into_response();
            }
            None => {
                let rpc =
                    JsonRpcResponse::error(id, INVALID_REQUEST, "Missing Mcp-Session-Id header");
                return (StatusCode::BAD_REQUEST, Json(rpc)).into_response();
            }
        }
    };
    debug!(method = %method, session_id = %session_id, "MCP request");

    if method.starts_with("notifications/") {
        return with_session(StatusCode::ACCEPTED.into_response(), &session_id);
    }
    let Some(id) = id else {
        let rpc = JsonRpcResponse::error(None, INVALID_REQUEST, "Missing id");
        return build_response(rpc, &session_id, StatusCode::BAD_REQUEST);
    };

    let rpc = match method.as_str() {
        "initialize" => {
            info!(session_id = %session_id, "MCP session initialized");
            JsonRpcResponse::success(id, initialize_result(params.as_ref()))
        }
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tools() })),
        "tools/call" => call_tool(&relay, &session_id, id, params.as_ref()).await,
        other => JsonRpcResponse::error(
            Some(id),
            METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    };
    build_response(rpc, &session_id, StatusCode::OK)
}

/// DELETE /mcp: the client ends its session and the relay drops its jar.
async fn terminate(State(relay): State<Arc<Relay>>, headers: HeaderMap) -> StatusCode {
    match presented_session(&headers) {
        Some(session) if relay.knows(&session) => {
            relay.close_session(&session);
            StatusCode::NO_CONTENT
        }
        Some(session) => {
            debug!(session_id = %session, "Session not found for DELETE");
            StatusCode::NOT_FOUND
        }
        None => StatusCode::BAD_REQUEST,
    }
}

fn initialize_result(params: Option<&Value>) -> Value {
    let version = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

async fn call_tool(
    relay: &Relay,
    caller: &CallerId,
    id: RequestId,
    params: Option<&Value>,
) -> JsonRpcResponse {
    let name = params
        .and_then(|p| p.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let argument = |key: &str| {
        params
            .and_then(|p| p.get("arguments"))
            .and_then(|args| args.get(key))
            .and_then(Value::as_str)
    };

    info!(tool = %name, session_id = %caller, "MCP tool call");
    let outcome = match name {
        "sso_login" => relay.login().await,
        "sso_callback" => {
            relay
                .callback(caller, argument("code"), argument("state"))
                .await
        }
        "sso_me" => relay.whoami(caller).await,
        "sso_logout" => relay.logout(caller).await,
        other => {
            return JsonRpcResponse::error(
                Some(id),
                INVALID_PARAMS,
                format!("Unknown tool: {other}"),
            );
        }
    };
    JsonRpcResponse::success(id, tool_result(outcome))
}

fn tool_result(outcome: JsonObject) -> Value {
    let is_error = outcome.contains_key("error");
    let structured = Value::Object(outcome);
    json!({
        "content": [{ "type": "text", "text": structured.to_string() }],
        "structuredContent": structured,
        "isError": is_error,
    })
}

/// Returns (id, method, params); id is `None` for notifications.
fn parse_request(
    value: &Value,
) -> Result<(Option<RequestId>, String, Option<Value>), JsonRpcResponse> {
    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcResponse::error(
            None,
            INVALID_REQUEST,
            "Invalid JSON-RPC version",
        ));
    }

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| JsonRpcResponse::error(id.clone(), INVALID_REQUEST, "Missing method"))?;

    Ok((id, method.to_string(), value.get("params").cloned()))
}

fn build_response(rpc: JsonRpcResponse, session_id: &CallerId, status: StatusCode) -> Response {
    with_session((status, Json(rpc)).into_response(), session_id)
}

fn with_session(mut response: Response, session_id: &CallerId) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(MCP_SESSION_HEADER), value);
    }
    response
}
