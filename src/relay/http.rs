use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{CallerId, JsonObject, Relay, mcp};

/// Request/response header carrying the caller's relay session id.
pub const RELAY_SESSION_HEADER: &str = "x-relay-session";
/// Cookie fallback for browsers that cannot set custom headers.
pub const RELAY_SESSION_COOKIE: &str = "relay_session";

/// Relay routes: `/sso_{login,callback,me,logout}`, `/health` and the MCP
/// endpoint at `/mcp`.
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sso_login", post(login))
        .route("/sso_callback", post(callback))
        .route("/sso_me", post(me))
        .route("/sso_logout", post(logout))
        .merge(mcp::routes())
        .with_state(relay)
}

struct Caller {
    id: CallerId,
    minted: bool,
}

impl Caller {
    /// The id the request carries, if the relay issued it.
    fn presented(relay: &Relay, headers: &HeaderMap, jar: &CookieJar) -> Option<CallerId> {
        let id = headers
            .get(RELAY_SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                jar.get(RELAY_SESSION_COOKIE)
                    .map(|cookie| cookie.value().to_string())
            })
            .filter(|id| !id.is_empty())
            .map(CallerId::new)?;

        if relay.knows(&id) {
            Some(id)
        } else {
            debug!(caller = %id, "Ignoring unknown relay session");
            None
        }
    }

    /// The presented caller, or a freshly issued one handed back in the reply.
    fn resolve(relay: &Relay, headers: &HeaderMap, jar: &CookieJar) -> Self {
        match Self::presented(relay, headers, jar) {
            Some(id) => Self { id, minted: false },
            None => Self::minted(relay.open_session()),
        }
    }

    fn minted(id: CallerId) -> Self {
        Self { id, minted: true }
    }

    /// Callers without a live session only ever see an empty jar.
    fn anonymous(relay: &Relay, headers: &HeaderMap, jar: &CookieJar) -> Self {
        Self {
            id: Self::presented(relay, headers, jar).unwrap_or_else(CallerId::generate),
            minted: false,
        }
    }

    fn respond(&self, jar: CookieJar, status: StatusCode, body: JsonObject) -> Response {
        let mut response = (status, Json(Value::Object(body))).into_response();
        if !self.minted {
            return response;
        }

        if let Ok(value) = HeaderValue::from_str(self.id.as_str()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(RELAY_SESSION_HEADER), value);
        }
        let cookie = Cookie::build((RELAY_SESSION_COOKIE, self.id.to_string()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .build();
        (jar.add(cookie), response).into_response()
    }
}

fn has_error(body: &JsonObject) -> bool {
    body.contains_key("error")
}

fn status_is(body: &JsonObject, expected: &str) -> bool {
    body.get("status").and_then(Value::as_str) == Some(expected)
}

async fn health(State(relay): State<Arc<Relay>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sso_relay",
        "backend_url": relay.backend_url(),
        "active_sessions": relay.active_sessions(),
    }))
}

async fn login(State(relay): State<Arc<Relay>>, headers: HeaderMap, jar: CookieJar) -> Response {
    info!("HTTP /sso_login called");
    let caller = Caller::resolve(&relay, &headers, &jar);
    let body = relay.login().await;
    let status = if has_error(&body) {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    caller.respond(jar, status, body)
}

async fn callback(
    State(relay): State<Arc<Relay>>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Response {
    info!("HTTP /sso_callback called");
    let request = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(request)) => request,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid JSON body" })),
            )
                .into_response();
        }
    };

    let code = request
        .get("code")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty());
    let Some(code) = code else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing code" })),
        )
            .into_response();
    };
    let state = request.get("state").and_then(Value::as_str);

    let caller = Caller::resolve(&relay, &headers, &jar);
    let (body, rotated) = relay
        .callback_rotating(&caller.id, Some(code), state)
        .await;
    let status = if status_is(&body, "OK") && !has_error(&body) {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    rotated
        .map(Caller::minted)
        .unwrap_or(caller)
        .respond(jar, status, body)
}

async fn me(State(relay): State<Arc<Relay>>, headers: HeaderMap, jar: CookieJar) -> Response {
    info!("HTTP /sso_me called");
    let caller = Caller::anonymous(&relay, &headers, &jar);
    let body = relay.whoami(&caller.id).await;

    let connection_failed = body
        .get("error")
        .and_then(Value::as_str)
        .is_some_and(|error| error.starts_with("connection_error"));
    let status = if body.contains_key("user") {
        StatusCode::OK
    } else if connection_failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::UNAUTHORIZED
    };
    caller.respond(jar, status, body)
}

async fn logout(State(relay): State<Arc<Relay>>, headers: HeaderMap, jar: CookieJar) -> Response {
    info!("HTTP /sso_logout called");
    let caller = Caller::anonymous(&relay, &headers, &jar);
    let body = relay.logout(&caller.id).await;
    let status = if status_is(&body, "ok") {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    caller.respond(jar, status, body)
}
