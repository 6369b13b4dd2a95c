use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::ACCEPT};
use tracing::debug;
use url::Url;

use crate::types::ProviderErrorBody;
use crate::{AuthorizationRequest, IdentityProvider, ProviderEndpoints, ProviderError, TokenResponse};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OidcClientConfig {
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl OidcClientConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skips TLS certificate verification. Local development only.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

/// Confidential OIDC client for the authorization-code grant.
#[derive(Debug, Clone)]
pub struct OidcClient<E: ProviderEndpoints> {
    endpoints: E,
    config: OidcClientConfig,
    http: Client,
}

impl<E: ProviderEndpoints> OidcClient<E> {
    pub fn new(endpoints: E, config: OidcClientConfig) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self {
            endpoints,
            config,
            http,
        })
    }

    pub fn with_http_client(endpoints: E, config: OidcClientConfig, http: Client) -> Self {
        Self {
            endpoints,
            config,
            http,
        }
    }

    pub fn endpoints(&self) -> &E {
        &self.endpoints
    }

    /// The underlying HTTP client, for callers that share its TLS settings.
    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn config(&self) -> &OidcClientConfig {
        &self.config
    }

    fn scope(&self, scopes: &[String]) -> String {
        if scopes.is_empty() {
            self.endpoints.default_scope().to_string()
        } else {
            scopes.join(" ")
        }
    }
}

#[async_trait]
impl<E: ProviderEndpoints> IdentityProvider for OidcClient<E> {
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.endpoints.authorize_url())?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in self.endpoints.authorize_params() {
                pairs.append_pair(&key, &value);
            }
            pairs
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("scope", &self.scope(&request.scopes))
                .append_pair("state", &request.state);
        }
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<TokenResponse, ProviderError> {
        let scope = self.scope(scopes);
        debug!(provider = self.endpoints.id(), scope = %scope, "Redeeming authorization code");
        let payload = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url())
            .header(ACCEPT, "application/json")
            .form(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(provider = self.endpoints.id(), status = status.as_u16(), "Token endpoint refused");
            return Err(match serde_json::from_str::<ProviderErrorBody>(&body) {
                Ok(envelope) => ProviderError::Rejected {
                    error: envelope.error,
                    description: envelope.error_description.unwrap_or_default(),
                },
                Err(_) => ProviderError::HttpStatus {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        serde_json::from_str(&body).map_err(|err| ProviderError::InvalidResponse {
            message: err.to_string(),
            body,
        })
    }

    fn client_id(&self) -> &str {
        &self.config.client_id
    }

    fn jwks_url(&self) -> Option<String> {
        self.endpoints.jwks_url()
    }

    fn issuer(&self) -> Option<String> {
        self.endpoints.issuer()
    }
}
