//! The relay: forwards login/callback/me/logout to the auth backend on
//! behalf of callers that cannot hold cookies, replaying the backend's
//! session cookie from a per-caller jar.

mod http;
mod jar;
mod link;
mod mcp;

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{debug, error, info, warn};

use crate::BrokerError;

pub use http::{RELAY_SESSION_COOKIE, RELAY_SESSION_HEADER, router};
pub use jar::{CallerId, DEFAULT_JAR_IDLE_TTL, JarScope, JarStore, MemoryJarStore, SessionJar};
pub use link::{BackendLink, BackendReply, DEFAULT_BACKEND_URL, DEFAULT_LINK_TIMEOUT};
pub use mcp::MCP_SESSION_HEADER;

pub type JsonObject = Map<String, Value>;

/// One relay component; the HTTP and MCP surfaces both drive it.
///
/// Operations never fail: every outcome, including an unreachable backend,
/// is folded into a JSON object with either a result or an `error` key.
pub struct Relay {
    link: BackendLink,
    jars: Arc<dyn JarStore>,
    scope: JarScope,
}

impl Relay {
    pub fn new(link: BackendLink, jars: Arc<dyn JarStore>, scope: JarScope) -> Self {
        Self { link, jars, scope }
    }

    pub fn backend_url(&self) -> &str {
        self.link.base_url()
    }

    pub fn active_sessions(&self) -> usize {
        self.jars.active_sessions()
    }

    /// Issues a caller id for a new relay or MCP session.
    pub fn open_session(&self) -> CallerId {
        let caller = self.jars.issue();
        debug!(caller = %caller, "Opened relay session");
        caller
    }

    /// Whether `caller` was issued by this relay and is still live.
    pub fn knows(&self, caller: &CallerId) -> bool {
        self.jars.contains(caller)
    }

    pub fn close_session(&self, caller: &CallerId) {
        self.jars.remove(caller);
        info!(caller = %caller, "Relay session closed");
    }

    fn jar_key(&self, caller: &CallerId) -> CallerId {
        match self.scope {
            JarScope::PerCaller => caller.clone(),
            JarScope::Shared => CallerId::shared(),
        }
    }

    pub async fn login(&self) -> JsonObject {
        info!(backend = %self.link.base_url(), "Relaying login");
        let reply = match self.link.login().await {
            Ok(reply) => reply,
            Err(err) => return link_failure(err, ""),
        };
        debug!(status = %reply.status, "Backend login replied");

        if reply.is_redirect() {
            let auth_url = reply.location.unwrap_or_default();
            info!("SSO login initiated");
            return object(json!({ "auth_url": auth_url }));
        }

        error!(status = %reply.status, "Backend login did not redirect");
        reply
            .json_object()
            .unwrap_or_else(|| error_object(format!("backend_error: {}", reply.body)))
    }

    /// Completes a login for `caller`; the captured jar replaces the one
    /// held under the caller's own id.
    pub async fn callback(
        &self,
        caller: &CallerId,
        code: Option<&str>,
        state: Option<&str>,
    ) -> JsonObject {
        match self.exchange(caller, code, state).await {
            Ok(jar) => {
                info!(caller = %caller, cookies = jar.len(), "Session established");
                self.jars.replace(&self.jar_key(caller), jar);
                callback_ok()
            }
            Err(body) => body,
        }
    }

    /// Completes a login and moves the session to a freshly issued caller id,
    /// returned alongside the reply. The id presented with the callback is
    /// forgotten and never reaches the new jar.
    pub async fn callback_rotating(
        &self,
        caller: &CallerId,
        code: Option<&str>,
        state: Option<&str>,
    ) -> (JsonObject, Option<CallerId>) {
        let jar = match self.exchange(caller, code, state).await {
            Ok(jar) => jar,
            Err(body) => return (body, None),
        };

        let cookies = jar.len();
        let rotated = match self.scope {
            JarScope::PerCaller => self.jars.rotate(caller, jar),
            JarScope::Shared => {
                self.jars.replace(&CallerId::shared(), jar);
                self.jars.remove(caller);
                self.jars.issue()
            }
        };
        info!(caller = %rotated, cookies, "Session established");
        (callback_ok(), Some(rotated))
    }

    /// Forwards the callback; `Ok` carries the cookies of a redirecting reply.
    async fn exchange(
        &self,
        caller: &CallerId,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<SessionJar, JsonObject> {
        let Some(code) = code.filter(|code| !code.is_empty()) else {
            warn!(caller = %caller, "Callback without code");
            return Err(error_object("missing code".to_string()));
        };

        let reply = match self.link.callback(code, state).await {
            Ok(reply) => reply,
            Err(err) => return Err(link_failure(err, "")),
        };
        debug!(status = %reply.status, cookies = reply.set_cookies.len(), "Backend callback replied");

        if reply.is_redirect() {
            return Ok(SessionJar::from_set_cookie(
                reply.set_cookies.iter().map(String::as_str),
            ));
        }

        match reply.json_object() {
            Some(body) => {
                warn!(status = %reply.status, "Callback did not redirect");
                Err(body)
            }
            None => {
                error!(status = %reply.status, "Callback failed");
                Err(error_object(format!("callback failed: {}", reply.body)))
            }
        }
    }

    pub async fn whoami(&self, caller: &CallerId) -> JsonObject {
        let jar = self.jars.get(&self.jar_key(caller));
        debug!(caller = %caller, cookies = jar.len(), "Relaying me");

        let reply = match self.link.me(&jar).await {
            Ok(reply) => reply,
            Err(err) => return link_failure(err, ""),
        };

        match reply.json_object() {
            Some(body) => {
                if reply.status.is_success() {
                    info!(caller = %caller, "User info retrieved");
                } else {
                    debug!(status = %reply.status, "Not authenticated");
                }
                body
            }
            None => error_object(format!("me failed: {}", reply.body)),
        }
    }

    /// Forwards logout, then clears the caller's jar whatever the backend said.
    pub async fn logout(&self, caller: &CallerId) -> JsonObject {
        let key = self.jar_key(caller);
        let jar = self.jars.get(&key);
        let outcome = self.link.logout(&jar).await;
        self.jars.clear(&key);
        info!(caller = %caller, "Relay session cleared");

        match outcome {
            Ok(reply) => reply.json_object().unwrap_or_else(|| {
                debug!(status = %reply.status, "Unparseable logout reply");
                object(json!({ "status": "ok" }))
            }),
            Err(err) => link_failure(err, " (session cleared locally)"),
        }
    }
}

fn link_failure(err: BrokerError, suffix: &str) -> JsonObject {
    error!(error = %err, "Backend call failed");
    let detail = match err {
        BrokerError::Connection(detail) => detail,
        other => other.to_string(),
    };
    error_object(format!("connection_error: {detail}{suffix}"))
}

fn callback_ok() -> JsonObject {
    object(json!({ "status": "OK" }))
}

fn error_object(message: String) -> JsonObject {
    object(json!({ "error": message }))
}

fn object(value: Value) -> JsonObject {
    match value {
        Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    pub(crate) fn relay_for(base_url: &str, scope: JarScope) -> Relay {
        let link = BackendLink::new(base_url, DEFAULT_LINK_TIMEOUT, false).unwrap();
        Relay::new(link, Arc::new(MemoryJarStore::new()), scope)
    }

    async fn backend_issuing(token: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "https://provider.example/authorize?state=S"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/callback"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", "/post-login")
                    .insert_header("set-cookie", format!("sso_session={token}; HttpOnly; Path=/")),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn login_returns_auth_url_from_redirect() {
        let server = backend_issuing("tok").await;
        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        assert_eq!(
            Value::Object(relay.login().await),
            json!({"auth_url": "https://provider.example/authorize?state=S"})
        );
    }

    #[tokio::test]
    async fn login_without_redirect_reports_backend_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;
        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        assert_eq!(
            Value::Object(relay.login().await),
            json!({"error": "backend_error: boom"})
        );
    }

    #[tokio::test]
    async fn callback_captures_cookie_and_me_replays_it() {
        let server = backend_issuing("tok-1").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("cookie", "sso_session=tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"user": {"subject": "u1"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        let caller = CallerId::new("c1");
        let result = relay.callback(&caller, Some("code"), Some("S")).await;
        assert_eq!(Value::Object(result), json!({"status": "OK"}));
        assert_eq!(relay.active_sessions(), 1);

        let me = relay.whoami(&caller).await;
        assert_eq!(Value::Object(me), json!({"user": {"subject": "u1"}}));
    }

    #[tokio::test]
    async fn callers_do_not_share_jars() {
        let server = backend_issuing("tok-a").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthenticated"})))
            .mount(&server)
            .await;

        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        relay.callback(&CallerId::new("alice"), Some("code"), None).await;

        let me = relay.whoami(&CallerId::new("bob")).await;
        assert_eq!(Value::Object(me), json!({"error": "unauthenticated"}));
        let requests = server.received_requests().await.unwrap();
        let me_request = requests.iter().find(|r| r.url.path() == "/auth/me").unwrap();
        assert!(!me_request.headers.contains_key("cookie"));
    }

    #[tokio::test]
    async fn shared_scope_uses_one_jar() {
        let server = backend_issuing("tok-a").await;
        let relay = relay_for(&server.uri(), JarScope::Shared);
        relay.callback(&CallerId::new("alice"), Some("code"), None).await;
        relay.callback(&CallerId::new("bob"), Some("code"), None).await;
        assert_eq!(relay.active_sessions(), 1);
    }

    #[tokio::test]
    async fn rotating_callback_moves_session_to_a_fresh_caller() {
        let server = backend_issuing("tok-1").await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .and(header("cookie", "sso_session=tok-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"user": {"subject": "u1"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthenticated"})))
            .mount(&server)
            .await;

        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        let presented = relay.open_session();
        let (body, rotated) = relay
            .callback_rotating(&presented, Some("code"), Some("S"))
            .await;
        assert_eq!(Value::Object(body), json!({"status": "OK"}));

        let rotated = rotated.unwrap();
        assert_ne!(rotated, presented);
        assert!(!relay.knows(&presented));
        assert!(relay.knows(&rotated));
        assert_eq!(
            Value::Object(relay.whoami(&presented).await),
            json!({"error": "unauthenticated"})
        );
        assert_eq!(
            Value::Object(relay.whoami(&rotated).await),
            json!({"user": {"subject": "u1"}})
        );
        assert_eq!(relay.active_sessions(), 1);
    }

    #[tokio::test]
    async fn failed_rotating_callback_keeps_the_presented_caller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/callback"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_state"})))
            .mount(&server)
            .await;

        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        let presented = relay.open_session();
        let (body, rotated) = relay.callback_rotating(&presented, Some("code"), None).await;
        assert_eq!(Value::Object(body), json!({"error": "invalid_state"}));
        assert_eq!(rotated, None);
        assert!(relay.knows(&presented));
        assert_eq!(relay.active_sessions(), 0);
    }

    #[tokio::test]
    async fn shared_scope_rotation_keeps_one_jar() {
        let server = backend_issuing("tok-a").await;
        let relay = relay_for(&server.uri(), JarScope::Shared);
        let presented = relay.open_session();
        let (_, rotated) = relay.callback_rotating(&presented, Some("code"), None).await;

        let rotated = rotated.unwrap();
        assert!(relay.knows(&rotated));
        assert!(!relay.knows(&presented));
        assert_eq!(relay.jars.get(&CallerId::shared()).get("sso_session"), Some("tok-a"));
        assert_eq!(relay.active_sessions(), 1);
    }

    #[tokio::test]
    async fn missing_code_never_reaches_backend() {
        let server = MockServer::start().await;
        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        let caller = CallerId::new("c1");
        for code in [None, Some("")] {
            let result = relay.callback(&caller, code, Some("S")).await;
            assert_eq!(Value::Object(result), json!({"error": "missing code"}));
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_yields_connection_errors() {
        let relay = relay_for("http://127.0.0.1:9", JarScope::PerCaller);
        let caller = CallerId::new("c1");
        relay
            .jars
            .replace(&caller, SessionJar::from_set_cookie(["sso_session=tok"]));

        for result in [
            relay.login().await,
            relay.callback(&caller, Some("code"), None).await,
            relay.whoami(&caller).await,
        ] {
            let error = result["error"].as_str().unwrap();
            assert!(error.starts_with("connection_error: "), "{error}");
        }

        let logout = relay.logout(&caller).await;
        let error = logout["error"].as_str().unwrap();
        assert!(error.ends_with("(session cleared locally)"), "{error}");
        assert_eq!(relay.active_sessions(), 0);
    }

    #[tokio::test]
    async fn logout_with_unparseable_body_still_reports_ok() {
        let server = backend_issuing("tok").await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("cookie", "sso_session=tok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("bye"))
            .expect(1)
            .mount(&server)
            .await;

        let relay = relay_for(&server.uri(), JarScope::PerCaller);
        let caller = CallerId::new("c1");
        relay.callback(&caller, Some("code"), None).await;

        let result = relay.logout(&caller).await;
        assert_eq!(Value::Object(result), json!({"status": "ok"}));
        assert_eq!(relay.active_sessions(), 0);
    }
}
