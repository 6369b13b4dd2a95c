use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const UNKNOWN_USER: &str = "Unknown User";

/// Inputs for building a provider authorization URL.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub state: String,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// OAuth error envelope returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ProviderErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Projection of session-token claims answered by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub name: String,
}

impl UserIdentity {
    /// Subject from `sub` else `oid`; email from `email`, `preferred_username`,
    /// then `upn`; name from `name` else a fixed placeholder.
    pub fn from_claims(claims: &Map<String, Value>) -> Self {
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| claims.get(*key).and_then(Value::as_str))
                .map(str::to_string)
        };

        Self {
            subject: first(&["sub", "oid"]),
            email: first(&["email", "preferred_username", "upn"]),
            name: first(&["name"]).unwrap_or_else(|| UNKNOWN_USER.to_string()),
        }
    }
}
