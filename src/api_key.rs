use std::fmt;

use crate::{
    errors::{Error, Result, ValidationError},
    DEFAULT_BASE_URL,
};

/// Environment variable read by [`Credentials::from_env`] for the API key.
pub const API_KEY_ENV: &str = "AGENCII_API_KEY";
/// Environment variable read by [`Credentials::from_env`] for the base URL.
pub const BASE_URL_ENV: &str = "AGENCII_BASE_URL";

/// Agencii API key. Sent as `Authorization: Bearer <key>`.
///
/// `Debug` output is redacted so keys do not end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    /// Parse a raw key. A leading `Bearer ` prefix is stripped.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let value = raw.as_ref().trim();
        let value = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value)
            .trim();
        if value.is_empty() {
            return Err(Error::Validation(
                ValidationError::new("api key is required").with_field("apiKey"),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        write!(f, "ApiKey(***{tail})")
    }
}

/// Stored connection credentials: API key plus base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: ApiKey,
    pub base_url: String,
}

impl Credentials {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim().to_string();
        }
        self
    }

    /// Load credentials from `AGENCII_API_KEY` and (optionally) `AGENCII_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::Config(format!("{API_KEY_ENV} is not set")))?;
        let creds = Self::new(ApiKey::parse(raw)?);
        Ok(match std::env::var(BASE_URL_ENV) {
            Ok(url) => creds.with_base_url(url),
            Err(_) => creds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_bearer_prefix() {
        let key = ApiKey::parse("  Bearer ak_live_1234 ").unwrap();
        assert_eq!(key.as_str(), "ak_live_1234");
        assert_eq!(key.bearer(), "Bearer ak_live_1234");
    }

    #[test]
    fn parse_rejects_blank_key() {
        let err = ApiKey::parse("   ").unwrap_err();
        assert_eq!(err.field(), Some("apiKey"));
    }

    #[test]
    fn debug_redacts_key() {
        let key = ApiKey::parse("ak_secret_abcd").unwrap();
        assert_eq!(format!("{key:?}"), "ApiKey(***abcd)");
    }

    #[test]
    fn credentials_default_base_url_and_override() {
        let key = ApiKey::parse("ak_1").unwrap();
        let creds = Credentials::new(key.clone());
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);

        let creds = Credentials::new(key.clone()).with_base_url("  ");
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);

        let creds = Credentials::new(key).with_base_url("http://localhost:8080");
        assert_eq!(creds.base_url, "http://localhost:8080");
    }
}
