use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde_json::json;

use super::AuthBackend;
use crate::{BrokerError, CallbackParams};

/// Routes of the auth backend: `/auth/{login,callback,me,logout}` and `/health`.
pub fn router(backend: Arc<AuthBackend>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/login", get(login))
        .route("/auth/callback", get(callback))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .with_state(backend)
}

/// 302 with a `Location` header. axum's `Redirect::to` answers 303.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn login(State(backend): State<Arc<AuthBackend>>) -> Result<Response, BrokerError> {
    let url = backend.start_login()?;
    Ok(found(&url))
}

async fn callback(
    State(backend): State<Arc<AuthBackend>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Response), BrokerError> {
    let id_token = backend.handle_callback(&params).await?;
    let jar = jar.add(backend.session_cookie(&id_token));
    Ok((jar, found(&backend.settings().post_login_path)))
}

async fn me(
    State(backend): State<Arc<AuthBackend>>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, BrokerError> {
    let session = jar
        .get(&backend.settings().cookie_name)
        .map(|cookie| cookie.value().to_string());
    let user = backend.whoami(session.as_deref()).await?;
    Ok(Json(json!({ "user": user })))
}

async fn logout(
    State(backend): State<Arc<AuthBackend>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let jar = jar.add(backend.logout());
    (jar, Json(json!({ "status": "ok" })))
}
