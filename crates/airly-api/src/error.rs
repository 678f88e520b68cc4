use thiserror::Error;

/// Top-level error type for the `airly-api` crate.
///
/// Covers authentication, transport, the GraphQL gateway and the push
/// channel. `airly-core` maps these into its own taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login rejected (wrong credentials, account locked, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The access token expired and no refresh was attempted.
    #[error("Access token expired")]
    TokenExpired,

    /// Exchanging the refresh token for a new access token failed.
    #[error("Token refresh failed: {message}")]
    TokenRefresh { message: String },

    /// An operation needed a token but none has been issued yet.
    #[error("Not authenticated -- call authenticate() first")]
    NotAuthenticated,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS or client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status from the gateway.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Gateway ─────────────────────────────────────────────────────
    /// The gateway answered 200 but carried an `errors` member.
    #[error("API error: {message}")]
    Api { message: String },

    // ── Push channel ────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Fragments that mark an error message as an auth/authz failure.
const AUTH_MARKERS: &[&str] = &["auth", "unauthor", "forbidden", "token", "credential"];

impl Error {
    /// Returns `true` if this error is an authentication or authorization
    /// failure. These are never retried.
    ///
    /// Classifies by variant first, then by HTTP status, and finally by the
    /// message text, since the gateway reports some auth failures only as
    /// free-form strings.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Authentication { .. }
            | Self::TokenExpired
            | Self::TokenRefresh { .. }
            | Self::NotAuthenticated => true,
            Self::Http { status: 401 | 403, .. } => true,
            Self::Transport(e) => matches!(
                e.status().map(|s| s.as_u16()),
                Some(401 | 403)
            ),
            Self::Http { message, .. }
            | Self::Api { message }
            | Self::WebSocketConnect(message)
            | Self::WebSocketClosed {
                reason: message, ..
            } => message_indicates_auth(message),
            _ => false,
        }
    }

    /// Returns `true` if the session token is no longer accepted.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::TokenExpired)
            || matches!(self, Self::Http { status: 401, .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Timeout { .. } | Self::WebSocketConnect(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

fn message_indicates_auth(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    AUTH_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_variants_are_auth_failures() {
        assert!(
            Error::Authentication {
                message: "bad password".into()
            }
            .is_auth_failure()
        );
        assert!(Error::TokenExpired.is_auth_failure());
        assert!(Error::NotAuthenticated.is_auth_failure());
    }

    #[test]
    fn status_codes_classify() {
        let unauthorized = Error::Http {
            status: 401,
            message: String::new(),
        };
        let busy = Error::Http {
            status: 503,
            message: "busy".into(),
        };
        assert!(unauthorized.is_auth_failure());
        assert!(!busy.is_auth_failure());
        assert!(busy.is_transient());
    }

    #[test]
    fn message_text_classifies_auth() {
        let err = Error::Api {
            message: "Unauthorized: invalid session".into(),
        };
        assert!(err.is_auth_failure());

        let err = Error::Api {
            message: "device offline".into(),
        };
        assert!(!err.is_auth_failure());
    }
}
