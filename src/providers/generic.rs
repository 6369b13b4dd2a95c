use crate::ProviderEndpoints;

const DEFAULT_SCOPE: &str = "openid profile email";

/// Any OIDC provider described by explicit endpoint URLs.
#[derive(Debug, Clone)]
pub struct GenericOidcProvider {
    authorize_url: String,
    token_url: String,
    jwks_url: Option<String>,
    issuer: Option<String>,
    authorize_params: Vec<(String, String)>,
}

impl GenericOidcProvider {
    pub fn new(authorize_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            jwks_url: None,
            issuer: None,
            authorize_params: Vec::new(),
        }
    }

    pub fn with_jwks_url(mut self, jwks_url: impl Into<String>) -> Self {
        self.jwks_url = Some(jwks_url.into());
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_authorize_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.authorize_params.push((key.into(), value.into()));
        self
    }
}

impl ProviderEndpoints for GenericOidcProvider {
    fn id(&self) -> &'static str {
        "oidc"
    }

    fn authorize_url(&self) -> String {
        self.authorize_url.clone()
    }

    fn token_url(&self) -> String {
        self.token_url.clone()
    }

    fn default_scope(&self) -> &'static str {
        DEFAULT_SCOPE
    }

    fn jwks_url(&self) -> Option<String> {
        self.jwks_url.clone()
    }

    fn issuer(&self) -> Option<String> {
        self.issuer.clone()
    }

    fn authorize_params(&self) -> Vec<(String, String)> {
        self.authorize_params.clone()
    }
}
