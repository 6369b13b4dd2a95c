use std::time::Duration;

use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{COOKIE, LOCATION, SET_COOKIE},
    redirect::Policy,
};
use serde_json::{Map, Value};
use url::Url;

use super::SessionJar;
use crate::{BrokerError, ConfigError};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(30);

/// What the backend answered, captured before anything is interpreted.
#[derive(Debug, Clone)]
pub struct BackendReply {
    pub status: StatusCode,
    pub location: Option<String>,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl BackendReply {
    /// 3xx carrying a `Location` header.
    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection() && self.location.is_some()
    }

    /// Body as a JSON object, if it is one.
    pub fn json_object(&self) -> Option<Map<String, Value>> {
        match serde_json::from_str(&self.body) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

/// HTTP link from the relay to the auth backend. Never follows redirects:
/// the relay needs to see them.
#[derive(Debug, Clone)]
pub struct BackendLink {
    http: Client,
    base_url: String,
}

impl BackendLink {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            name: "BACKEND_BASE_URL".to_string(),
            value: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https".to_string()));
        }

        let http = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|err| invalid(err.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn login(&self) -> Result<BackendReply, BrokerError> {
        self.send(self.http.get(self.url("/auth/login"))).await
    }

    pub async fn callback(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<BackendReply, BrokerError> {
        let mut params = vec![("code", code)];
        if let Some(state) = state.filter(|state| !state.is_empty()) {
            params.push(("state", state));
        }
        self.send(self.http.get(self.url("/auth/callback")).query(&params))
            .await
    }

    pub async fn me(&self, jar: &SessionJar) -> Result<BackendReply, BrokerError> {
        self.send(with_cookies(self.http.get(self.url("/auth/me")), jar))
            .await
    }

    pub async fn logout(&self, jar: &SessionJar) -> Result<BackendReply, BrokerError> {
        self.send(with_cookies(self.http.post(self.url("/auth/logout")), jar))
            .await
    }

    async fn send(&self, request: RequestBuilder) -> Result<BackendReply, BrokerError> {
        let response = request.send().await.map_err(link_error)?;

        let status = response.status();
        let headers = response.headers();
        let location = headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let set_cookies = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();

        let body = response.text().await.map_err(link_error)?;
        Ok(BackendReply {
            status,
            location,
            set_cookies,
            body,
        })
    }
}

fn with_cookies(request: RequestBuilder, jar: &SessionJar) -> RequestBuilder {
    match jar.to_header() {
        Some(header) => request.header(COOKIE, header),
        None => request,
    }
}

fn link_error(err: reqwest::Error) -> BrokerError {
    if err.is_connect() {
        BrokerError::Connection("Cannot reach backend".to_string())
    } else if err.is_timeout() {
        BrokerError::Connection("Backend timeout".to_string())
    } else {
        BrokerError::Connection(err.to_string())
    }
}
