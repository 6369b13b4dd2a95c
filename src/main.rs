mod cli;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sso_broker::backend::{self, AuthBackend, BackendSettings};
use sso_broker::config::{IdentitySettings, parse_scopes};
use sso_broker::relay::{self, BackendLink, DEFAULT_LINK_TIMEOUT, JarScope, MemoryJarStore, Relay};
use sso_broker::server::{self, parse_origins};
use sso_broker::{
    ConfigError, EntraProvider, IdentityProvider, JwksVerifier, MemoryStateStore, OidcClient,
    OidcClientConfig, SessionVerifier, TokenMode,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::cli::{BackendArgs, Cli, Command, RelayArgs, StartupError};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the environment may already be set.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(err) = cli::setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("failed to initialise logging: {err}");
        return ExitCode::FAILURE;
    }

    let origins = parse_origins(&cli.cors_allowed_origins);
    let result = match cli.command {
        Command::Backend(args) => run_backend(args, &origins, cli.disable_ssl_verify).await,
        Command::Relay(args) => run_relay(args, &origins, cli.disable_ssl_verify).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Startup failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run_backend(
    args: BackendArgs,
    origins: &[String],
    disable_ssl_verify: bool,
) -> Result<(), StartupError> {
    let identity = IdentitySettings::resolve(
        args.tenant_id,
        args.client_id,
        args.client_secret,
        args.redirect_uri,
    )?;
    if disable_ssl_verify {
        warn!("TLS certificate verification is disabled for provider calls");
    }

    let endpoints = EntraProvider::with_authority_host(args.authority_host, &identity.tenant_id);
    let config = OidcClientConfig::new(&identity.client_id, &identity.client_secret)
        .with_accept_invalid_certs(disable_ssl_verify);
    let client = OidcClient::new(endpoints, config)?;

    let verifier = match args.session_token_mode {
        TokenMode::Verified => {
            let jwks_url = client.jwks_url().ok_or_else(|| ConfigError::Invalid {
                name: "SESSION_TOKEN_MODE".to_string(),
                value: "verified".to_string(),
                reason: "provider publishes no signing keys".to_string(),
            })?;
            SessionVerifier::Verified(JwksVerifier::new(
                client.http().clone(),
                jwks_url,
                identity.client_id.clone(),
                client.issuer(),
            ))
        }
        TokenMode::Trusted => {
            warn!("Session tokens are trusted without signature verification");
            SessionVerifier::Trusted
        }
    };

    let settings = BackendSettings::new(identity.redirect_uri)
        .with_scopes(parse_scopes(&args.scopes))
        .with_cookie_name(args.cookie_name)
        .with_cookie_secure(args.cookie_secure)
        .with_post_login_path(args.post_login_path)
        .with_state_policy(args.state_policy);

    info!(
        tenant = %identity.tenant_id,
        redirect_uri = %settings.redirect_uri,
        state_policy = ?settings.state_policy,
        token_mode = ?verifier.mode(),
        "Starting auth backend"
    );

    let backend = AuthBackend::new(
        Arc::new(client),
        Arc::new(MemoryStateStore::new()),
        verifier,
        settings,
    );
    let app = server::with_http_layers(backend::router(Arc::new(backend)), origins);

    let listener = TcpListener::bind(args.bind_addr).await?;
    server::serve(listener, app).await?;
    Ok(())
}

async fn run_relay(
    args: RelayArgs,
    origins: &[String],
    disable_ssl_verify: bool,
) -> Result<(), StartupError> {
    let link = BackendLink::new(&args.backend_base_url, DEFAULT_LINK_TIMEOUT, disable_ssl_verify)?;
    if args.jar_scope == JarScope::Shared {
        warn!("Shared session jar: every caller acts as the same user");
    }

    info!(
        backend = %link.base_url(),
        jar_scope = ?args.jar_scope,
        jar_idle_ttl_secs = args.jar_idle_ttl_secs,
        "Starting relay"
    );

    let jars = MemoryJarStore::with_idle_ttl(Duration::from_secs(args.jar_idle_ttl_secs));
    let relay = Relay::new(link, Arc::new(jars), args.jar_scope);
    let app = server::with_http_layers(relay::router(Arc::new(relay)), origins);

    let listener = TcpListener::bind(args.bind_addr).await?;
    server::serve(listener, app).await?;
    Ok(())
}
