//! Shared configuration for the airly CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `airly_core::CoordinatorConfig` plus the transport
//! settings the API client needs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use airly_api::transport::{DEFAULT_API_URL, DEFAULT_AUTH_URL, DEFAULT_PUSH_URL};
use airly_api::{Credentials, TransportConfig};
use airly_core::{BaseOperation, CoordinatorConfig, ModeDurationDefaults};

const KEYRING_SERVICE: &str = "airly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named account profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, falling back to the default profile name.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());
        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::ProfileNotFound { name })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Request timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Poll interval for `airly run`, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    30
}

/// A named SystemAIR account profile.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// Account e-mail.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or `AIRLY_PASSWORD`).
    pub password: Option<String>,

    /// Names the persisted duration record. Defaults to the profile name.
    pub instance_id: Option<String>,

    /// Endpoint overrides.
    pub api_url: Option<String>,
    pub auth_url: Option<String>,
    pub push_url: Option<String>,

    /// Override timeout, seconds.
    pub timeout: Option<u64>,

    /// Override poll interval, seconds.
    pub poll_interval: Option<u64>,

    /// Subscribe to push updates in `airly run`.
    pub push: Option<bool>,

    /// Where durations are stored. Defaults to the platform data dir.
    pub storage_dir: Option<PathBuf>,

    #[serde(default)]
    pub durations: ModeDurationDefaults,

    #[serde(default)]
    pub base: BaseOperation,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "airly", "airly")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default directory for persisted durations.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn home_fallback(sub: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(sub);
    p.push("airly");
    p
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from file + environment.
///
/// Environment keys nest with a double underscore:
/// `AIRLY_DEFAULTS__OUTPUT=json`.
pub fn load_config() -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(config_path()))
        .merge(Env::prefixed("AIRLY_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if loading fails.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve the account credentials.
///
/// Username: profile, then `AIRLY_USERNAME`. Password: `AIRLY_PASSWORD`,
/// then the system keyring, then plaintext in the profile.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Credentials, ConfigError> {
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("AIRLY_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    let password = std::env::var("AIRLY_PASSWORD")
        .ok()
        .or_else(|| {
            keyring_entry(profile_name)
                .ok()
                .and_then(|entry| entry.get_password().ok())
        })
        .or_else(|| profile.password.clone())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;

    Ok(Credentials {
        username,
        password: SecretString::from(password),
    })
}

/// Store a password in the system keyring for `profile_name`.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?
        .set_password(password)
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation ─────────────────────────────────────────────────────

/// Endpoints and timeout for the API client and push channel.
pub fn transport_config(profile: &Profile, defaults: &Defaults) -> Result<TransportConfig, ConfigError> {
    let api = profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
    let auth = profile.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL);
    let push = profile.push_url.as_deref().unwrap_or(DEFAULT_PUSH_URL);

    let transport = TransportConfig::new(api, auth, push).map_err(|e| ConfigError::Validation {
        field: "endpoint".into(),
        reason: e.to_string(),
    })?;
    let timeout = profile.timeout.unwrap_or(defaults.timeout);
    Ok(transport.with_timeout(Duration::from_secs(timeout)))
}

/// Build a validated `CoordinatorConfig` from a profile.
pub fn profile_to_coordinator_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<CoordinatorConfig, ConfigError> {
    let config = CoordinatorConfig {
        instance_id: profile
            .instance_id
            .clone()
            .unwrap_or_else(|| profile_name.to_owned()),
        durations: profile.durations.clone(),
        base: profile.base,
        poll_interval: Duration::from_secs(profile.poll_interval.unwrap_or(defaults.poll_interval)),
        push_enabled: profile.push.unwrap_or(true),
        storage_dir: Some(profile.storage_dir.clone().unwrap_or_else(data_dir)),
        ..CoordinatorConfig::default()
    };

    config.validate().map_err(|e| ConfigError::Validation {
        field: format!("profiles.{profile_name}"),
        reason: e.to_string(),
    })?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use airly_core::{AirflowLevel, UserMode};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
default_profile = "home"

[defaults]
output = "json"

[profiles.home]
username = "me@example.com"
password = "hunter2"
poll_interval = 60

[profiles.home.durations]
away_hours = 4

[profiles.home.base]
mode = "auto"
"#;

    #[test]
    fn parses_profile_with_partial_tables() {
        let cfg: Config = toml::from_str(SAMPLE).expect("parse");
        let (name, profile) = cfg.profile(None).expect("profile");

        assert_eq!(name, "home");
        assert_eq!(cfg.defaults.output, "json");
        assert_eq!(cfg.defaults.timeout, 30);
        assert_eq!(profile.durations.away_hours, 4);
        assert_eq!(profile.durations.holiday_days, 1);
        assert_eq!(profile.base.mode, UserMode::Auto);
        assert_eq!(profile.base.airflow, None);
    }

    #[test]
    fn missing_profile_is_an_error() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.profile(Some("nope")),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn coordinator_config_from_profile() {
        let cfg: Config = toml::from_str(SAMPLE).expect("parse");
        let (name, profile) = cfg.profile(None).expect("profile");
        let coordinator = profile_to_coordinator_config(profile, &name, &cfg.defaults).expect("valid");

        assert_eq!(coordinator.instance_id, "home");
        assert_eq!(coordinator.poll_interval, Duration::from_secs(60));
        assert!(coordinator.push_enabled);
        assert!(coordinator.storage_dir.is_some());
    }

    #[test]
    fn invalid_durations_rejected() {
        let profile = Profile {
            durations: ModeDurationDefaults {
                fireplace_minutes: 500,
                ..ModeDurationDefaults::default()
            },
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_coordinator_config(&profile, "p", &Defaults::default()),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn manual_base_without_airflow_rejected() {
        let profile = Profile {
            base: BaseOperation {
                mode: UserMode::Manual,
                airflow: None,
            },
            ..Profile::default()
        };
        assert!(profile_to_coordinator_config(&profile, "p", &Defaults::default()).is_err());

        let profile = Profile {
            base: BaseOperation {
                mode: UserMode::Manual,
                airflow: Some(AirflowLevel::HIGH),
            },
            ..Profile::default()
        };
        assert!(profile_to_coordinator_config(&profile, "p", &Defaults::default()).is_ok());
    }

    #[test]
    fn transport_overrides_endpoints() {
        let profile = Profile {
            api_url: Some("http://localhost:9000/gateway/api".into()),
            timeout: Some(5),
            ..Profile::default()
        };
        let transport = transport_config(&profile, &Defaults::default()).expect("valid");
        assert_eq!(transport.api_url.as_str(), "http://localhost:9000/gateway/api");
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.auth_url.as_str(), DEFAULT_AUTH_URL);
    }

    #[test]
    fn bad_endpoint_rejected() {
        let profile = Profile {
            push_url: Some("not a url".into()),
            ..Profile::default()
        };
        assert!(transport_config(&profile, &Defaults::default()).is_err());
    }
}
