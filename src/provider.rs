use async_trait::async_trait;

use crate::{AuthorizationRequest, ProviderError, TokenResponse};

/// The identity-provider capability the auth backend depends on.
///
/// Implemented over HTTP by [`crate::OidcClient`]; tests substitute their own.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, request: &AuthorizationRequest) -> Result<String, ProviderError>;

    /// Redeems an authorization code. `redirect_uri` must be the value used
    /// when the code was issued or the provider rejects the exchange.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> Result<TokenResponse, ProviderError>;

    fn client_id(&self) -> &str;

    fn jwks_url(&self) -> Option<String> {
        None
    }

    fn issuer(&self) -> Option<String> {
        None
    }
}
