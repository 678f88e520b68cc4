// Shared transport configuration for building reqwest::Client instances.
//
// The gateway client and the authenticator share timeout and user-agent
// settings through this module.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default gateway root.
pub const DEFAULT_API_URL: &str = "https://homesolutions.systemair.com/gateway/api";

/// Default token endpoint.
pub const DEFAULT_AUTH_URL: &str =
    "https://sso.systemair.com/auth/realms/iot/protocol/openid-connect/token";

/// Default push endpoint.
pub const DEFAULT_PUSH_URL: &str = "wss://homesolutions.systemair.com/streaming/";

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub api_url: Url,
    pub auth_url: Url,
    pub push_url: Url,
    pub timeout: Duration,
}

impl TransportConfig {
    /// Build a config pointing at the given endpoints.
    pub fn new(api_url: &str, auth_url: &str, push_url: &str) -> Result<Self, Error> {
        Ok(Self {
            api_url: api_url.parse()?,
            auth_url: auth_url.parse()?,
            push_url: push_url.parse()?,
            timeout: Duration::from_secs(30),
        })
    }

    /// Config for the vendor's production endpoints.
    pub fn production() -> Result<Self, Error> {
        Self::new(DEFAULT_API_URL, DEFAULT_AUTH_URL, DEFAULT_PUSH_URL)
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("airly/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}
