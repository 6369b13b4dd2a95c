use crate::ProviderEndpoints;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_SCOPE: &str = "openid profile offline_access User.Read";

// Multi-tenant aliases; tokens carry the real tenant's issuer, not these.
const TENANT_ALIASES: &[&str] = &["common", "organizations", "consumers"];

/// Microsoft identity platform (v2.0 endpoints) for one tenant.
#[derive(Debug, Clone)]
pub struct EntraProvider {
    authority_host: String,
    tenant_id: String,
}

impl EntraProvider {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self::with_authority_host(DEFAULT_AUTHORITY_HOST, tenant_id)
    }

    pub fn with_authority_host(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
        }
    }

    pub fn authority(&self) -> String {
        format!("{}/{}", self.authority_host, self.tenant_id)
    }
}

impl ProviderEndpoints for EntraProvider {
    fn id(&self) -> &'static str {
        "entra"
    }

    fn authorize_url(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority())
    }

    fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }

    fn default_scope(&self) -> &'static str {
        DEFAULT_SCOPE
    }

    fn jwks_url(&self) -> Option<String> {
        Some(format!("{}/discovery/v2.0/keys", self.authority()))
    }

    fn issuer(&self) -> Option<String> {
        if TENANT_ALIASES.contains(&self.tenant_id.as_str()) {
            return None;
        }
        Some(format!("{}/v2.0", self.authority()))
    }
}
