use url::Url;

use crate::ConfigError;

/// Scopes requested when none are configured.
pub const DEFAULT_SCOPES: &str = "openid profile offline_access User.Read";

/// Identity-provider credentials the backend cannot start without.
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl IdentitySettings {
    /// Reports every absent (or blank) setting at once, by its environment
    /// variable name.
    pub fn resolve(
        tenant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
        redirect_uri: Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut require = |name: &str, value: Option<String>| {
            let value = value.filter(|value| !value.trim().is_empty());
            if value.is_none() {
                missing.push(name.to_string());
            }
            value.unwrap_or_default()
        };

        let tenant_id = require("TENANT_ID", tenant_id);
        let client_id = require("CLIENT_ID", client_id);
        let client_secret = require("CLIENT_SECRET", client_secret);
        let redirect_uri = require("REDIRECT_URI", redirect_uri);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        validate_redirect_uri(&redirect_uri)?;
        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
            redirect_uri,
        })
    }
}

/// The redirect URI must be an absolute http(s) URL with a host.
pub fn validate_redirect_uri(redirect_uri: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        name: "REDIRECT_URI".to_string(),
        value: redirect_uri.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(redirect_uri).map_err(|err| invalid(&err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("redirect uri must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("redirect uri is missing host"));
    }
    Ok(())
}

/// Splits a scope list on spaces or commas.
pub fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|scope| !scope.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn lists_every_missing_setting() {
        let err = IdentitySettings::resolve(None, some("client"), some("  "), None).unwrap_err();
        match &err {
            ConfigError::Missing(names) => {
                assert_eq!(names, &["TENANT_ID", "CLIENT_SECRET", "REDIRECT_URI"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.to_string(),
            "missing required settings: TENANT_ID, CLIENT_SECRET, REDIRECT_URI"
        );
    }

    #[test]
    fn resolves_complete_settings() {
        let settings = IdentitySettings::resolve(
            some("tenant"),
            some("client"),
            some("secret"),
            some("http://localhost:5500/index.html"),
        )
        .unwrap();
        assert_eq!(settings.tenant_id, "tenant");
        assert_eq!(settings.redirect_uri, "http://localhost:5500/index.html");
    }

    #[test]
    fn rejects_unusable_redirect_uris() {
        assert!(validate_redirect_uri("https://app.example/callback").is_ok());
        assert!(validate_redirect_uri("/relative/path").is_err());
        assert!(validate_redirect_uri("ftp://files.example/cb").is_err());
        assert!(validate_redirect_uri("mailto:someone@example.com").is_err());
    }

    #[test]
    fn scopes_split_on_space_or_comma() {
        assert_eq!(
            parse_scopes(DEFAULT_SCOPES),
            ["openid", "profile", "offline_access", "User.Read"]
        );
        assert_eq!(parse_scopes("openid, email"), ["openid", "email"]);
        assert!(parse_scopes("  ").is_empty());
    }
}
