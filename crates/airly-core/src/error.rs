// ── Core error types ──
//
// Errors from airly-core. Consumers never see HTTP status codes or JSON
// parse failures directly; the `From<airly_api::Error>` impl sorts
// transport-layer errors into the coordinator's taxonomy.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session errors ───────────────────────────────────────────────
    /// Fatal: never retried, fails the refresh cycle.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Device discovery failed: {message}")]
    DiscoveryFailed { message: String },

    #[error("Coordinator is shut down")]
    Terminated,

    #[error("Operation cancelled")]
    Cancelled,

    // ── Remote errors ────────────────────────────────────────────────
    /// Busy, 5xx, timeouts, dropped connections. Retried with backoff.
    #[error("Remote call failed: {message}")]
    Transient { message: String },

    #[error("Push channel failed: {message}")]
    PushFailed { message: String },

    /// The device answered but refused the write.
    #[error("Command rejected by device: {message}")]
    Rejected { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unit not found: {id}")]
    UnitNotFound { id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Persistence ──────────────────────────────────────────────────
    #[error("Duration store error: {message}")]
    Persistence { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether retrying cannot help.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<airly_api::Error> for CoreError {
    fn from(err: airly_api::Error) -> Self {
        if err.is_auth_failure() {
            return CoreError::AuthenticationFailed {
                message: err.to_string(),
            };
        }
        match err {
            airly_api::Error::WebSocketConnect(reason) => CoreError::PushFailed { message: reason },
            airly_api::Error::WebSocketClosed { code, reason } => CoreError::PushFailed {
                message: format!("closed (code {code}): {reason}"),
            },
            airly_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            airly_api::Error::Tls(message) => CoreError::Config { message },
            other => CoreError::Transient {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Persistence {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Persistence {
            message: err.to_string(),
        }
    }
}
