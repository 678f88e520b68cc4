//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use airly_config::ConfigError;
use airly_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the SystemAIR cloud: {message}")]
    #[diagnostic(
        code(airly::connection_failed),
        help("Check your network connection and try again. Use -vv for details.")
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(airly::auth_failed),
        help(
            "Verify your account e-mail and password.\n\
             Run: airly config set-password"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(airly::no_credentials),
        help(
            "Configure credentials with: airly config init\n\
             Or set AIRLY_USERNAME and AIRLY_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Units ────────────────────────────────────────────────────────
    #[error("Unit '{identifier}' not found")]
    #[diagnostic(
        code(airly::not_found),
        help("Run: airly units list to see available units")
    )]
    NotFound { identifier: String },

    #[error("The unit refused the command: {message}")]
    #[diagnostic(code(airly::rejected))]
    Rejected { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(airly::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(airly::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: airly config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(airly::config))]
    Config(ConfigError),

    #[error("{0}")]
    #[diagnostic(code(airly::internal))]
    Internal(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::DiscoveryFailed { message }
            | CoreError::Transient { message }
            | CoreError::PushFailed { message } => CliError::ConnectionFailed { message },
            CoreError::Rejected { message } => CliError::Rejected { message },
            CoreError::UnitNotFound { id } => CliError::NotFound { identifier: id },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Internal(other.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_exit_codes() {
        let cases = [
            (
                CoreError::AuthenticationFailed {
                    message: "bad password".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::UnitNotFound { id: "dev9".into() },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::Rejected {
                    message: "no".into(),
                },
                exit_code::REJECTED,
            ),
            (
                CoreError::ValidationFailed {
                    message: "out of range".into(),
                },
                exit_code::USAGE,
            ),
            (
                CoreError::Transient {
                    message: "busy".into(),
                },
                exit_code::CONNECTION,
            ),
            (CoreError::Terminated, exit_code::GENERAL),
        ];
        for (err, code) in cases {
            assert_eq!(CliError::from(err).exit_code(), code);
        }
    }
}
