//! Command-line interface

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};
use sso_broker::backend::{DEFAULT_COOKIE_NAME, DEFAULT_POST_LOGIN_PATH, StatePolicy};
use sso_broker::config::DEFAULT_SCOPES;
use sso_broker::relay::{DEFAULT_BACKEND_URL, DEFAULT_JAR_IDLE_TTL, JarScope};
use sso_broker::{ConfigError, DEFAULT_AUTHORITY_HOST, ProviderError, TokenMode};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// SSO broker: OIDC auth backend and cookie-forwarding relay
#[derive(Parser, Debug)]
#[command(name = "sso-broker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", env = "LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Allowed CORS origins, comma separated; `*` allows any
    #[arg(long, default_value = "*", env = "CORS_ALLOWED_ORIGINS", global = true)]
    pub cors_allowed_origins: String,

    /// Skip TLS certificate verification on outgoing calls (local testing only)
    #[arg(long, env = "DISABLE_SSL_VERIFY", global = true)]
    pub disable_ssl_verify: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the auth backend
    Backend(BackendArgs),

    /// Run the relay
    Relay(RelayArgs),
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8000", env = "BIND_ADDR")]
    pub bind_addr: SocketAddr,

    /// Directory (tenant) id
    #[arg(long, env = "TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    #[arg(long, env = "REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Identity provider authority host
    #[arg(long, default_value = DEFAULT_AUTHORITY_HOST, env = "AUTHORITY_HOST")]
    pub authority_host: String,

    /// Scopes to request, space or comma separated
    #[arg(long, default_value = DEFAULT_SCOPES, env = "SCOPES")]
    pub scopes: String,

    /// Session cookie name
    #[arg(long, default_value = DEFAULT_COOKIE_NAME, env = "COOKIE_NAME")]
    pub cookie_name: String,

    /// Mark the session cookie `Secure`
    #[arg(long, env = "COOKIE_SECURE")]
    pub cookie_secure: bool,

    /// Where the browser lands after a successful callback
    #[arg(long, default_value = DEFAULT_POST_LOGIN_PATH, env = "POST_LOGIN_PATH")]
    pub post_login_path: String,

    /// Callback state checking (strict, lenient)
    #[arg(long, default_value = "strict", env = "STATE_POLICY")]
    pub state_policy: StatePolicy,

    /// Session token checking (verified, trusted)
    #[arg(long, default_value = "verified", env = "SESSION_TOKEN_MODE")]
    pub session_token_mode: TokenMode,
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8090", env = "BIND_ADDR")]
    pub bind_addr: SocketAddr,

    /// Auth backend base URL
    #[arg(long, default_value = DEFAULT_BACKEND_URL, env = "BACKEND_BASE_URL")]
    pub backend_base_url: String,

    /// Session jar keying (per-caller, shared)
    #[arg(long, default_value = "per-caller", env = "JAR_SCOPE")]
    pub jar_scope: JarScope,

    /// Seconds a relay session may sit unused before it is dropped
    #[arg(long, default_value_t = DEFAULT_JAR_IDLE_TTL.as_secs(), env = "JAR_IDLE_TTL_SECS")]
    pub jar_idle_ttl_secs: u64,
}

/// Anything that stops a service from starting or keeps it from serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("provider client: {0}")]
    Provider(#[from] ProviderError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn setup_tracing(
    level: &str,
    format: Option<&str>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backend_defaults() {
        let cli = Cli::try_parse_from(["sso-broker", "backend", "--tenant-id", "t"]).unwrap();
        let Command::Backend(args) = cli.command else {
            panic!("expected backend subcommand");
        };
        assert_eq!(args.tenant_id.as_deref(), Some("t"));
        assert_eq!(args.state_policy, StatePolicy::Strict);
        assert_eq!(args.session_token_mode, TokenMode::Verified);
    }

    #[test]
    fn relay_parses_jar_scope() {
        let cli = Cli::try_parse_from(["sso-broker", "relay", "--jar-scope", "shared"]).unwrap();
        let Command::Relay(args) = cli.command else {
            panic!("expected relay subcommand");
        };
        assert_eq!(args.jar_scope, JarScope::Shared);
        assert_eq!(args.jar_idle_ttl_secs, DEFAULT_JAR_IDLE_TTL.as_secs());
        assert!(
            Cli::try_parse_from(["sso-broker", "relay", "--jar-scope", "global"]).is_err()
        );
    }
}
