//! Credentials that must never live in source.
//!
//! A [`SecretSource`] names up to three places a secret can come from. The
//! first one that is set wins: the inline value (local development), then a
//! file such as a mounted `/run/secrets/gemini_api_key`, then an
//! environment variable.

use std::fs;

use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source configured (set an inline value, a file, or an env var)")]
    NotConfigured,

    #[error("Failed to read secret file '{path}': {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{0}' is not set")]
    EnvMissing(String),

    #[error("Environment variable '{0}' is not valid UTF-8")]
    EnvNotUnicode(String),

    #[error("Secret is empty")]
    Empty,
}

/// Where a secret can be read from. Empty strings count as unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretSource<'a> {
    pub inline: Option<&'a str>,
    pub file: Option<&'a str>,
    pub env_var: Option<&'a str>,
}

impl<'a> SecretSource<'a> {
    pub fn env(name: &'a str) -> Self {
        Self {
            env_var: Some(name),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        [self.inline, self.file, self.env_var]
            .into_iter()
            .any(|s| set(s).is_some())
    }

    /// Reads the secret. File contents and env values are trimmed.
    pub fn resolve(&self) -> Result<SecretString, SecretError> {
        let raw = if let Some(value) = set(self.inline) {
            value.to_string()
        } else if let Some(path) = set(self.file) {
            let path = expand_home(path);
            fs::read_to_string(&path)
                .map_err(|source| SecretError::File { path, source })?
                .trim()
                .to_string()
        } else if let Some(name) = set(self.env_var) {
            match std::env::var(name) {
                Ok(value) => value.trim().to_string(),
                Err(std::env::VarError::NotPresent) => {
                    return Err(SecretError::EnvMissing(name.to_string()))
                }
                Err(std::env::VarError::NotUnicode(_)) => {
                    return Err(SecretError::EnvNotUnicode(name.to_string()))
                }
            }
        } else {
            return Err(SecretError::NotConfigured);
        };

        if raw.is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(SecretString::from(raw))
    }

    /// Like [`SecretSource::resolve`], but "nothing configured" and "env var
    /// unset" are `Ok(None)`. Unreadable files are still errors.
    pub fn resolve_optional(&self) -> Result<Option<SecretString>, SecretError> {
        match self.resolve() {
            Ok(secret) => Ok(Some(secret)),
            Err(SecretError::NotConfigured | SecretError::EnvMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn set(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Compares a presented token against a stored secret in time that depends
/// only on the length.
pub fn token_matches(secret: &SecretString, presented: &str) -> bool {
    let expected = secret.expose_secret().as_bytes();
    let presented = presented.as_bytes();
    expected.len() == presented.len()
        && expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// `~` and `~/...` expand to the home directory; `~user/...` does not.
pub(crate) fn expand_home(path: &str) -> String {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return path.to_string(),
    };
    match dirs::home_dir() {
        Some(home) => format!("{}{}", home.to_string_lossy(), rest),
        None => path.to_string(),
    }
}
