use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the auth backend and the relay.
///
/// Every variant maps to a stable wire code and an HTTP status; the backend
/// renders them as `status + {"error": code}` and never lets one escape its
/// handlers.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("authorization code missing from callback")]
    MissingCode,

    #[error("state nonce missing, unknown or already consumed")]
    InvalidState,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("connection error: {0}")]
    Connection(String),
}

impl BrokerError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCode => "missing_code",
            Self::InvalidState => "invalid_state",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidToken(_) => "invalid_token",
            Self::Internal(_) => "internal_error",
            Self::Connection(_) => "connection_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCode | Self::InvalidState => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed(_) | Self::Unauthenticated | Self::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Connection(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.code() }))).into_response()
    }
}

impl From<ProviderError> for BrokerError {
    fn from(err: ProviderError) -> Self {
        if err.is_connection() {
            Self::Connection(err.to_string())
        } else {
            Self::AuthenticationFailed(err.to_string())
        }
    }
}

/// Failures while talking to the identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("provider rejected request: {error}: {description}")]
    Rejected { error: String, description: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },
}

impl ProviderError {
    /// True when the provider could not be reached at all (refused, DNS,
    /// timeout), as opposed to answering with a failure.
    pub fn is_connection(&self) -> bool {
        match self {
            Self::Http(err) => err.is_connect() || err.is_timeout(),
            _ => false,
        }
    }
}

/// Startup-time misconfiguration. Fatal: the process must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {name} ({value}): {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_wire_codes_and_statuses() {
        let cases = [
            (BrokerError::MissingCode, "missing_code", 400),
            (BrokerError::InvalidState, "invalid_state", 400),
            (
                BrokerError::AuthenticationFailed("nope".into()),
                "authentication_failed",
                401,
            ),
            (BrokerError::Unauthenticated, "unauthenticated", 401),
            (BrokerError::InvalidToken("x".into()), "invalid_token", 401),
            (BrokerError::Internal("x".into()), "internal_error", 500),
            (BrokerError::Connection("x".into()), "connection_error", 502),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status().as_u16(), status);
        }
    }

    #[test]
    fn provider_rejection_is_an_authentication_failure() {
        let err: BrokerError = ProviderError::Rejected {
            error: "invalid_grant".into(),
            description: "expired".into(),
        }
        .into();
        assert!(matches!(err, BrokerError::AuthenticationFailed(_)));
    }

    #[test]
    fn missing_settings_are_listed_together() {
        let err = ConfigError::Missing(vec!["TENANT_ID".into(), "CLIENT_SECRET".into()]);
        assert_eq!(
            err.to_string(),
            "missing required settings: TENANT_ID, CLIENT_SECRET"
        );
    }
}
