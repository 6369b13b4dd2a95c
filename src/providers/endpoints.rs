/// Static description of an OIDC provider: where to send the user, where to
/// redeem codes, and where its signing keys live.
pub trait ProviderEndpoints: Send + Sync {
    fn id(&self) -> &'static str;
    fn authorize_url(&self) -> String;
    fn token_url(&self) -> String;
    fn default_scope(&self) -> &'static str;

    fn jwks_url(&self) -> Option<String> {
        None
    }

    fn issuer(&self) -> Option<String> {
        None
    }

    fn authorize_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}
