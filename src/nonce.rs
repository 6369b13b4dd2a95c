use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

use crate::ProviderError;

const NONCE_BYTES: usize = 32;
const LOG_PREFIX_CHARS: usize = 10;

/// Opaque single-use value binding an authorization request to its callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StateNonce(String);

impl StateNonce {
    pub fn generate() -> Result<Self, ProviderError> {
        let mut bytes = [0u8; NONCE_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| ProviderError::OsRng {
                message: err.to_string(),
            })?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Shortened form of a nonce or token, safe to put in a log line.
pub(crate) fn redact(value: &str) -> String {
    let prefix: String = value.chars().take(LOG_PREFIX_CHARS).collect();
    format!("{prefix}...")
}
