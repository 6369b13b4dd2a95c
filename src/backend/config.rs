use std::str::FromStr;

pub const DEFAULT_COOKIE_NAME: &str = "sso_session";
pub const DEFAULT_POST_LOGIN_PATH: &str = "/post-login";

/// What to do when a callback arrives with a missing, unknown or replayed
/// state nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatePolicy {
    /// Reject the callback before the code is exchanged.
    #[default]
    Strict,
    /// Log a warning and exchange the code anyway.
    Lenient,
}

impl FromStr for StatePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            other => Err(format!("expected `strict` or `lenient`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub post_login_path: String,
    pub state_policy: StatePolicy,
}

impl BackendSettings {
    pub fn new(redirect_uri: impl Into<String>) -> Self {
        Self {
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            cookie_secure: false,
            post_login_path: DEFAULT_POST_LOGIN_PATH.to_string(),
            state_policy: StatePolicy::default(),
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn with_post_login_path(mut self, path: impl Into<String>) -> Self {
        self.post_login_path = normalize_path(path.into());
        self
    }

    pub fn with_state_policy(mut self, policy: StatePolicy) -> Self {
        self.state_policy = policy;
        self
    }
}

fn normalize_path(path: String) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('/') || path.contains("://") {
        path
    } else {
        format!("/{path}")
    }
}
