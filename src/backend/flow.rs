use std::sync::Arc;

use axum_extra::extract::cookie::Cookie;
use tracing::{debug, error, info, warn};

use super::config::{BackendSettings, StatePolicy};
use super::cookies;
use crate::nonce::{StateNonce, redact};
use crate::{
    AuthorizationRequest, BrokerError, CallbackParams, IdentityProvider, SessionVerifier,
    StateStore, UserIdentity,
};

/// Owns the authorization-code flow: state issuance, code exchange, session
/// minting and identity lookup.
///
/// Per-session lifecycle: anonymous, pending (nonce issued), authenticated
/// (cookie holds the ID token), then anonymous again after logout.
pub struct AuthBackend {
    provider: Arc<dyn IdentityProvider>,
    states: Arc<dyn StateStore>,
    verifier: SessionVerifier,
    settings: BackendSettings,
}

impl AuthBackend {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        states: Arc<dyn StateStore>,
        verifier: SessionVerifier,
        settings: BackendSettings,
    ) -> Self {
        Self {
            provider,
            states,
            verifier,
            settings,
        }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    pub fn pending_states(&self) -> usize {
        self.states.pending()
    }

    /// Issues a state nonce and returns the provider authorization URL to
    /// redirect the browser to.
    pub fn start_login(&self) -> Result<String, BrokerError> {
        let nonce = StateNonce::generate().map_err(|err| BrokerError::Internal(err.to_string()))?;
        let request = AuthorizationRequest {
            redirect_uri: self.settings.redirect_uri.clone(),
            scopes: self.settings.scopes.clone(),
            state: nonce.as_str().to_string(),
        };
        let url = self.provider.authorization_url(&request).map_err(|err| {
            error!(error = %err, "Failed to build authorization url");
            BrokerError::Internal(err.to_string())
        })?;

        self.states.insert(nonce.as_str());
        info!(state = %redact(nonce.as_str()), "Login initiated");
        Ok(url)
    }

    /// Validates the callback and exchanges the code; returns the ID token to
    /// store in the session cookie.
    pub async fn handle_callback(&self, params: &CallbackParams) -> Result<String, BrokerError> {
        let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) else {
            if let Some(err) = &params.error {
                warn!(
                    error = %err,
                    description = params.error_description.as_deref().unwrap_or(""),
                    "Provider returned an error instead of a code"
                );
            }
            return Err(BrokerError::MissingCode);
        };

        self.validate_state(params.state.as_deref())?;

        let tokens = self
            .provider
            .exchange_code(code, &self.settings.redirect_uri, &self.settings.scopes)
            .await
            .map_err(|err| {
                error!(error = %err, "Token acquisition failed");
                BrokerError::from(err)
            })?;

        let Some(id_token) = tokens.id_token.filter(|token| !token.is_empty()) else {
            error!("Token response carried no id_token");
            return Err(BrokerError::AuthenticationFailed(
                "token response carried no id_token".to_string(),
            ));
        };

        info!("Token acquired successfully");
        Ok(id_token)
    }

    fn validate_state(&self, state: Option<&str>) -> Result<(), BrokerError> {
        if let Some(state) = state {
            if self.states.consume(state) {
                info!(state = %redact(state), "State validated");
                return Ok(());
            }
        }

        let shown = state.map(redact);
        match self.settings.state_policy {
            StatePolicy::Strict => {
                warn!(state = ?shown, "Rejecting callback with invalid or missing state");
                Err(BrokerError::InvalidState)
            }
            StatePolicy::Lenient => {
                warn!(state = ?shown, "Invalid or missing state; continuing (lenient policy)");
                Ok(())
            }
        }
    }

    pub async fn whoami(&self, session: Option<&str>) -> Result<UserIdentity, BrokerError> {
        let Some(token) = session.filter(|token| !token.is_empty()) else {
            debug!("No session cookie found");
            return Err(BrokerError::Unauthenticated);
        };

        let identity = self.verifier.identity(token).await.map_err(|err| {
            error!(error = %err, mode = ?self.verifier.mode(), "Session token rejected");
            err
        })?;

        info!(
            email = identity.email.as_deref().unwrap_or("unknown"),
            "User authenticated"
        );
        Ok(identity)
    }

    pub fn session_cookie(&self, id_token: &str) -> Cookie<'static> {
        cookies::session_cookie(
            &self.settings.cookie_name,
            id_token,
            self.settings.cookie_secure,
        )
    }

    /// Logout never fails: it only expires the browser's session cookie.
    pub fn logout(&self) -> Cookie<'static> {
        info!("User logged out");
        cookies::clear_session_cookie(&self.settings.cookie_name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::token::tests::token;
    use crate::{MemoryStateStore, ProviderError, TokenResponse};

    /// Canned provider: echoes the state into the URL and returns a fixed
    /// token response for every code.
    pub(crate) struct FakeProvider {
        pub(crate) id_token: Option<String>,
        pub(crate) exchanges: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        pub(crate) fn issuing(id_token: Option<String>) -> Self {
            Self {
                id_token,
                exchanges: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn exchange_count(&self) -> usize {
            self.exchanges.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        fn authorization_url(
            &self,
            request: &AuthorizationRequest,
        ) -> Result<String, ProviderError> {
            Ok(format!(
                "https://provider.example/authorize?client_id=client-id&state={}",
                request.state
            ))
        }

        async fn exchange_code(
            &self,
            code: &str,
            _redirect_uri: &str,
            _scopes: &[String],
        ) -> Result<TokenResponse, ProviderError> {
            self.exchanges.lock().unwrap().push(code.to_string());
            Ok(TokenResponse {
                access_token: Some("access".to_string()),
                id_token: self.id_token.clone(),
                refresh_token: None,
                token_type: Some("Bearer".to_string()),
                scope: None,
                expires_in: Some(3600),
                extra: Default::default(),
            })
        }

        fn client_id(&self) -> &str {
            "client-id"
        }
    }

    pub(crate) fn id_token() -> String {
        token(json!({
            "sub": "user-1",
            "email": "ada@example.com",
            "name": "Ada Lovelace",
        }))
    }

    pub(crate) fn backend_with(provider: Arc<FakeProvider>, policy: StatePolicy) -> AuthBackend {
        AuthBackend::new(
            provider,
            Arc::new(MemoryStateStore::new()),
            SessionVerifier::Trusted,
            BackendSettings::new("http://localhost:5500/index.html").with_state_policy(policy),
        )
    }

    fn state_of(url: &str) -> String {
        url.split("state=").nth(1).unwrap().to_string()
    }

    fn callback(code: Option<&str>, state: Option<&str>) -> CallbackParams {
        CallbackParams {
            code: code.map(str::to_string),
            state: state.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn issued_state_validates_once() {
        let provider = Arc::new(FakeProvider::issuing(Some(id_token())));
        let backend = backend_with(provider.clone(), StatePolicy::Strict);

        let state = state_of(&backend.start_login().unwrap());
        assert_eq!(backend.pending_states(), 1);

        let token = backend
            .handle_callback(&callback(Some("code-1"), Some(&state)))
            .await
            .unwrap();
        assert_eq!(token, id_token());
        assert_eq!(backend.pending_states(), 0);

        let replay = backend
            .handle_callback(&callback(Some("code-2"), Some(&state)))
            .await;
        assert!(matches!(replay, Err(BrokerError::InvalidState)));
        assert_eq!(provider.exchange_count(), 1, "replay must not reach the provider");
    }

    #[tokio::test]
    async fn lenient_policy_exchanges_without_valid_state() {
        let provider = Arc::new(FakeProvider::issuing(Some(id_token())));
        let backend = backend_with(provider.clone(), StatePolicy::Lenient);

        let token = backend
            .handle_callback(&callback(Some("code-1"), None))
            .await
            .unwrap();
        assert_eq!(token, id_token());

        backend
            .handle_callback(&callback(Some("code-2"), Some("never-issued")))
            .await
            .unwrap();
        assert_eq!(provider.exchange_count(), 2);
    }

    #[tokio::test]
    async fn missing_code_is_rejected_before_exchange() {
        let provider = Arc::new(FakeProvider::issuing(Some(id_token())));
        let backend = backend_with(provider.clone(), StatePolicy::Lenient);

        for params in [callback(None, Some("s")), callback(Some(""), None)] {
            let err = backend.handle_callback(&params).await.unwrap_err();
            assert!(matches!(err, BrokerError::MissingCode));
        }
        assert_eq!(provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn exchange_without_id_token_fails_authentication() {
        let provider = Arc::new(FakeProvider::issuing(None));
        let backend = backend_with(provider, StatePolicy::Strict);
        let state = state_of(&backend.start_login().unwrap());

        let err = backend
            .handle_callback(&callback(Some("code"), Some(&state)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn whoami_requires_a_session() {
        let backend = backend_with(
            Arc::new(FakeProvider::issuing(None)),
            StatePolicy::Strict,
        );
        assert!(matches!(
            backend.whoami(None).await,
            Err(BrokerError::Unauthenticated)
        ));
        assert!(matches!(
            backend.whoami(Some("")).await,
            Err(BrokerError::Unauthenticated)
        ));
        assert!(matches!(
            backend.whoami(Some("garbage")).await,
            Err(BrokerError::InvalidToken(_))
        ));

        let identity = backend.whoami(Some(&id_token())).await.unwrap();
        assert_eq!(identity.subject.as_deref(), Some("user-1"));
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
    }
}
