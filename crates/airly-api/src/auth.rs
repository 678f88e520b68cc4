// Token-based authentication against the vendor's OpenID endpoint.
//
// The authenticator owns the credentials and the current token set.
// Clients ask it for the live access token; the coordinator decides when
// to refresh.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::Error;

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_SKEW_SECS: i64 = 60;

const DEFAULT_CLIENT_ID: &str = "iot-application";

/// Username/password pair for the vendor account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// A bearer token with its expiry.
#[derive(Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    /// The raw bearer value, for request headers.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token should be considered expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    300
}

struct TokenSet {
    access: AccessToken,
    refresh: Option<SecretString>,
}

/// Produces and refreshes access tokens for one account.
pub struct Authenticator {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    credentials: Credentials,
    session: RwLock<Option<TokenSet>>,
}

impl Authenticator {
    pub fn new(http: reqwest::Client, token_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            token_url,
            client_id: DEFAULT_CLIENT_ID.into(),
            credentials,
            session: RwLock::new(None),
        }
    }

    /// The account name, for logging.
    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Exchange the stored credentials for a fresh token set.
    pub async fn authenticate(&self) -> Result<AccessToken, Error> {
        debug!(user = %self.credentials.username, "requesting access token");

        let form = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.password.expose_secret()),
        ];

        let resp = self.http.post(self.token_url.clone()).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Authentication {
                message: format!("login failed (HTTP {status}): {body}"),
            });
        }

        let tokens = parse_token_response(resp).await?;
        debug!("authentication successful");
        Ok(self.store(tokens))
    }

    /// Use the refresh token to obtain a new access token.
    pub async fn refresh(&self) -> Result<AccessToken, Error> {
        let refresh = {
            let guard = self.session.read().expect("token lock poisoned");
            guard
                .as_ref()
                .and_then(|s| s.refresh.clone())
                .ok_or_else(|| Error::TokenRefresh {
                    message: "no refresh token available".into(),
                })?
        };

        debug!("refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh.expose_secret()),
        ];

        let resp = self.http.post(self.token_url.clone()).form(&form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::TokenRefresh {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let tokens = parse_token_response(resp).await?;
        Ok(self.store(tokens))
    }

    /// Whether a token exists and has not expired.
    pub fn is_token_valid(&self) -> bool {
        let guard = self.session.read().expect("token lock poisoned");
        guard
            .as_ref()
            .is_some_and(|s| !s.access.is_expired_at(Utc::now()))
    }

    /// The current access token, if any.
    pub fn access_token(&self) -> Option<AccessToken> {
        let guard = self.session.read().expect("token lock poisoned");
        guard.as_ref().map(|s| s.access.clone())
    }

    fn store(&self, tokens: TokenResponse) -> AccessToken {
        let access = AccessToken::new(
            SecretString::from(tokens.access_token),
            Utc::now() + Duration::seconds(tokens.expires_in),
        );
        let mut guard = self.session.write().expect("token lock poisoned");
        let refresh = tokens
            .refresh_token
            .map(SecretString::from)
            .or_else(|| guard.as_ref().and_then(|s| s.refresh.clone()));
        *guard = Some(TokenSet {
            access: access.clone(),
            refresh,
        });
        access
    }
}

async fn parse_token_response(resp: reqwest::Response) -> Result<TokenResponse, Error> {
    let body = resp.text().await?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiry_respects_skew() {
        let now = Utc::now();
        let token = AccessToken::new(
            SecretString::from("abc".to_string()),
            now + Duration::seconds(30),
        );
        assert!(token.is_expired_at(now));

        let token = AccessToken::new(
            SecretString::from("abc".to_string()),
            now + Duration::seconds(600),
        );
        assert!(!token.is_expired_at(now));
    }

    #[test]
    fn debug_redacts_token() {
        let token = AccessToken::new(SecretString::from("hunter2".to_string()), Utc::now());
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("hunter2"));
    }
}
