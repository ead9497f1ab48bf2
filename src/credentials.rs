//! API token validation.
//!
//! Two independent gates live here. [`ApiToken::parse`] is the cheap sanity check
//! every client runs at construction. [`check_token_format`] is the strict
//! pre-flight check used by tooling that wants to reject a token before any
//! client exists.

use std::fmt;

use crate::error::ConfigurationError;

/// Minimum length accepted at client construction.
pub const MIN_TOKEN_LENGTH: usize = 10;

/// Prefix required by the strict format check.
pub const STRICT_TOKEN_PREFIX: &str = "api-";

/// Minimum length required by the strict format check.
pub const STRICT_MIN_TOKEN_LENGTH: usize = 40;

/// A validated API token. `Debug` and `Display` never print the full secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    /// Validates a raw token.
    ///
    /// Rejection order: missing or blank, then embedded whitespace or control
    /// characters, then length.
    pub fn parse(raw: Option<&str>) -> Result<Self, ConfigurationError> {
        let token = match raw {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(ConfigurationError::MissingToken),
        };

        if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigurationError::InvalidTokenCharacters);
        }

        if token.chars().count() < MIN_TOKEN_LENGTH {
            return Err(ConfigurationError::TokenTooShort {
                min: MIN_TOKEN_LENGTH,
            });
        }

        Ok(Self(token.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Masked form for logs: first and last four characters.
    pub fn masked(&self) -> String {
        mask_token(&self.0)
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiToken").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() < 12 {
        return "*********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}*********{}", head, tail)
}

/// Strict format check: `api-` prefix, at least 40 characters, and only ASCII
/// alphanumerics or `-`.
pub fn check_token_format(token: &str) -> Result<(), ConfigurationError> {
    if !token.starts_with(STRICT_TOKEN_PREFIX) {
        return Err(ConfigurationError::MalformedToken(format!(
            "expected the '{}' prefix",
            STRICT_TOKEN_PREFIX
        )));
    }
    if token.len() < STRICT_MIN_TOKEN_LENGTH {
        return Err(ConfigurationError::MalformedToken(format!(
            "expected at least {} characters, got {}",
            STRICT_MIN_TOKEN_LENGTH,
            token.len()
        )));
    }
    if let Some(bad) = token
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(ConfigurationError::MalformedToken(format!(
            "unexpected character {:?}",
            bad
        )));
    }
    Ok(())
}
