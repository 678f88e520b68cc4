//! Bridges `airly-config` profiles to a ready-to-start coordinator.

use airly_api::{ReconnectConfig, SystemairClient, WebSocketPush};
use airly_config::{Config, Profile};
use airly_core::{Coordinator, CoordinatorConfig, CoreError};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub type Airly = Coordinator<SystemairClient, WebSocketPush>;

/// Everything needed to build a coordinator for the active profile.
pub struct Session {
    pub profile_name: String,
    pub api: SystemairClient,
    pub push: WebSocketPush,
    pub config: CoordinatorConfig,
}

impl Session {
    pub fn into_coordinator(self) -> Result<Airly, CliError> {
        Ok(Coordinator::new(self.api, self.push, self.config)?)
    }
}

/// Profile name from `--profile`, then the config's default, then "default".
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Load config, pick the profile and build the API client and push channel.
///
/// Without a matching profile, credentials may still come from
/// `AIRLY_USERNAME` / `AIRLY_PASSWORD` alone.
pub fn build_session(global: &GlobalOpts) -> Result<Session, CliError> {
    let cfg = airly_config::load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let env_only = Profile::default();
    let profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile,
        None if std::env::var("AIRLY_USERNAME").is_ok() => &env_only,
        None if global.profile.is_some() => {
            let mut available: Vec<_> = cfg.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        None => {
            return Err(CliError::NoCredentials {
                profile: profile_name,
            });
        }
    };

    let credentials = airly_config::resolve_credentials(profile, &profile_name)?;
    let transport = airly_config::transport_config(profile, &cfg.defaults)?;
    let config = airly_config::profile_to_coordinator_config(profile, &profile_name, &cfg.defaults)?;

    let api = SystemairClient::new(credentials, &transport).map_err(CoreError::from)?;
    let push = WebSocketPush::new(transport.push_url.clone(), ReconnectConfig::default());

    tracing::debug!(profile = %profile_name, api = %transport.api_url, "session configured");
    Ok(Session {
        profile_name,
        api,
        push,
        config,
    })
}
