//! Session-token decoding.
//!
//! The session cookie carries the provider's raw ID token. Two modes read it:
//!
//! - [`SessionVerifier::Verified`] checks the signature against the
//!   provider's JWKS plus `exp`, `aud` and (when known) `iss`.
//! - [`SessionVerifier::Trusted`] reads the payload without any
//!   verification, treating the cookie as backend-issued. This exists for
//!   local testing only and must not face untrusted clients.

use std::str::FromStr;
use std::time::{Duration, Instant};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, JwkSet},
};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{BrokerError, UserIdentity};

const JWKS_TTL: Duration = Duration::from_secs(3600);
/// Unknown key ids do not trigger another fetch within this window.
pub const JWKS_MIN_REFRESH: Duration = Duration::from_secs(30);
const CLOCK_LEEWAY_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    #[default]
    Verified,
    Trusted,
}

impl FromStr for TokenMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "verified" => Ok(Self::Verified),
            "trusted" => Ok(Self::Trusted),
            other => Err(format!("expected `verified` or `trusted`, got `{other}`")),
        }
    }
}

pub enum SessionVerifier {
    Verified(JwksVerifier),
    Trusted,
}

impl SessionVerifier {
    pub async fn identity(&self, token: &str) -> Result<UserIdentity, BrokerError> {
        let claims = match self {
            Self::Verified(verifier) => verifier.verify(token).await?,
            Self::Trusted => decode_unverified(token)?,
        };
        Ok(UserIdentity::from_claims(&claims))
    }

    pub fn mode(&self) -> TokenMode {
        match self {
            Self::Verified(_) => TokenMode::Verified,
            Self::Trusted => TokenMode::Trusted,
        }
    }
}

/// Reads a compact JWS payload without checking its signature or claims.
pub fn decode_unverified(token: &str) -> Result<Map<String, Value>, BrokerError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = segments.as_slice() else {
        return Err(BrokerError::InvalidToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    decode_segment(header, "header")?;
    decode_segment(payload, "payload")
}

fn decode_segment(segment: &str, part: &str) -> Result<Map<String, Value>, BrokerError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|err| BrokerError::InvalidToken(format!("{part} is not base64url: {err}")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BrokerError::InvalidToken(format!(
            "{part} is not a JSON object"
        ))),
        Err(err) => Err(BrokerError::InvalidToken(format!(
            "{part} is not JSON: {err}"
        ))),
    }
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

/// Verifies ID tokens against one provider's signing keys.
pub struct JwksVerifier {
    http: reqwest::Client,
    jwks_url: String,
    audience: String,
    issuer: Option<String>,
    min_refresh: Duration,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksVerifier {
    pub fn new(
        http: reqwest::Client,
        jwks_url: impl Into<String>,
        audience: impl Into<String>,
        issuer: Option<String>,
    ) -> Self {
        Self {
            http,
            jwks_url: jwks_url.into(),
            audience: audience.into(),
            issuer,
            min_refresh: JWKS_MIN_REFRESH,
            cache: RwLock::new(None),
        }
    }

    pub fn with_min_refresh(mut self, interval: Duration) -> Self {
        self.min_refresh = interval;
        self
    }

    pub async fn verify(&self, token: &str) -> Result<Map<String, Value>, BrokerError> {
        let header = decode_header(token).map_err(jwt_error)?;
        if !is_asymmetric(header.alg) {
            return Err(BrokerError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| BrokerError::InvalidToken("missing kid".to_string()))?;

        let jwk = self.find_key(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(jwt_error)?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = CLOCK_LEEWAY_SECS;
        validation.set_audience(&[self.audience.as_str()]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }

        let data = decode::<Map<String, Value>>(token, &key, &validation).map_err(jwt_error)?;
        Ok(data.claims)
    }

    async fn find_key(&self, kid: &str) -> Result<Jwk, BrokerError> {
        let keys = self.keys(false).await?;
        if let Some(jwk) = keys.find(kid) {
            return Ok(jwk.clone());
        }

        let unknown = || BrokerError::InvalidToken(format!("unknown key id {kid}"));
        if self.fetched_within(self.min_refresh).await {
            debug!(kid = %kid, "Key not found, JWKS fetched too recently to refresh");
            return Err(unknown());
        }

        debug!(kid = %kid, "Key not found in cached JWKS, refreshing");
        let keys = self.keys(true).await?;
        keys.find(kid).cloned().ok_or_else(unknown)
    }

    async fn fetched_within(&self, window: Duration) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| cached.fetched_at.elapsed() < window)
    }

    async fn keys(&self, force_refresh: bool) -> Result<JwkSet, BrokerError> {
        if !force_refresh {
            if let Some(cached) = self.cache.read().await.as_ref() {
                if cached.fetched_at.elapsed() < JWKS_TTL {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(url = %self.jwks_url, "Fetching JWKS");
        let keys: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| BrokerError::Internal(format!("jwks fetch failed: {err}")))?
            .json()
            .await
            .map_err(|err| BrokerError::Internal(format!("jwks decode failed: {err}")))?;

        *self.cache.write().await = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
    )
}

fn jwt_error(err: jsonwebtoken::errors::Error) -> BrokerError {
    match err.kind() {
        ErrorKind::ExpiredSignature => BrokerError::Unauthenticated,
        _ => BrokerError::InvalidToken(err.to_string()),
    }
}
