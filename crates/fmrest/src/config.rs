use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "fmrest_timeout";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide request timeout: `fmrest_timeout` seconds if set and valid, else 10 seconds.
pub fn default_timeout() -> Duration {
    std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map_or(DEFAULT_TIMEOUT, Duration::from_secs)
}

/// Certificate verification policy for HTTPS connections.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsVerification {
    #[default]
    Enabled,
    Disabled,
    /// Verify against an additional root certificate (PEM file), e.g. a private CA.
    CustomCa(PathBuf),
}

/// Credentials for an additional database file the session must be authenticated to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSource {
    pub database: String,
    pub username: String,
    pub password: String,
}

impl DataSource {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection settings for a [`crate::Server`].
#[derive(Clone, PartialEq)]
pub struct ServerConfig {
    /// Server address; must be `https`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Layout used for record operations; can be changed on the server between calls.
    pub layout: String,
    pub data_sources: Vec<DataSource>,
    pub verify_ssl: TlsVerification,
    /// Sniff string values into numbers, timestamps and durations.
    pub type_conversion: bool,
    /// Re-login and retry once when the session token has expired.
    pub auto_relogin: bool,
    /// Proxy per URL scheme, e.g. `"https" -> "http://127.0.0.1:8080"`.
    pub proxies: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        layout: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            layout: layout.into(),
            data_sources: Vec::new(),
            verify_ssl: TlsVerification::default(),
            type_conversion: false,
            auto_relogin: false,
            proxies: BTreeMap::new(),
            timeout: default_timeout(),
        }
    }

    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_sources.push(data_source);
        self
    }

    pub fn with_verify_ssl(mut self, verify_ssl: TlsVerification) -> Self {
        self.verify_ssl = verify_ssl;
        self
    }

    pub fn with_type_conversion(mut self, enabled: bool) -> Self {
        self.type_conversion = enabled;
        self
    }

    pub fn with_auto_relogin(mut self, enabled: bool) -> Self {
        self.auto_relogin = enabled;
        self
    }

    pub fn with_proxy(mut self, scheme: impl Into<String>, proxy_url: impl Into<String>) -> Self {
        self.proxies.insert(scheme.into(), proxy_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The Data API only works over https; anything else is rejected before any I/O.
    pub fn validate(&self) -> Result<()> {
        let scheme_ok = self
            .url
            .get(..8)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("https://"));
        if !scheme_ok {
            return Err(Error::InvalidConfiguration(format!(
                "please make sure to use https, otherwise calls to the Data API will not work: {}",
                self.url
            )));
        }
        if self.database.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "database must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL without a trailing slash, ready to be joined with an API path.
    pub(crate) fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("layout", &self.layout)
            .field("data_sources", &self.data_sources)
            .field("verify_ssl", &self.verify_ssl)
            .field("type_conversion", &self.type_conversion)
            .field("auto_relogin", &self.auto_relogin)
            .field("proxies", &self.proxies)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ServerConfig {
        ServerConfig::new(url, "demo", "secret", "Demo", "Demo")
    }

    #[test]
    fn validate_plain_http_expected_invalid_configuration() {
        let error = config("http://127.0.0.1")
            .validate()
            .expect_err("http must be rejected");
        assert!(matches!(error, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn validate_https_expected_ok() {
        config("https://111.111.111.111")
            .validate()
            .expect("https is accepted");
        config("HTTPS://fms.example.com/")
            .validate()
            .expect("scheme is case-insensitive");
    }

    #[test]
    fn base_url_expected_trailing_slash_trimmed() {
        assert_eq!(
            config("https://fms.example.com/").base_url(),
            "https://fms.example.com"
        );
    }

    #[test]
    fn debug_expected_password_redacted() {
        let rendered = format!(
            "{:?}",
            config("https://fms.example.com").with_data_source(DataSource::new("Other", "u", "p4ss"))
        );
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("p4ss"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn defaults_expected_verification_on_and_features_off() {
        let config = config("https://fms.example.com");
        assert_eq!(config.verify_ssl, TlsVerification::Enabled);
        assert!(!config.type_conversion);
        assert!(!config.auto_relogin);
        assert!(config.data_sources.is_empty());
    }
}
