//! The contract the coordinator consumes.
//!
//! [`VentilationApi`] covers token handling, discovery, status reads and
//! register writes. [`PushChannel`] opens the asynchronous status stream.
//! Both use return-position `impl Future + Send` so implementations can be
//! plain `async fn`s while the coordinator stays spawnable.

use std::fmt;
use std::future::Future;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::AccessToken;
use crate::error::Error;

// ── Parameters ───────────────────────────────────────────────────────

/// Timed-mode time registers, in the device's own units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeTimer {
    /// Days.
    Holiday,
    /// Hours.
    Away,
    /// Minutes.
    Fireplace,
    /// Minutes.
    Refresh,
    /// Hours.
    Crowded,
}

impl ModeTimer {
    /// Register that holds the timer value.
    pub fn register(self) -> u16 {
        match self {
            Self::Holiday => 251,
            Self::Away => 252,
            Self::Fireplace => 253,
            Self::Refresh => 254,
            Self::Crowded => 255,
        }
    }
}

/// A writable device parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Requested user mode code (0..=6).
    UserMode,
    /// Manual-mode supply airflow level (1..=5).
    ManualAirflowLevel,
    /// Room temperature setpoint, in tenths of a degree.
    TemperatureSetpoint,
    /// Duration of a timed mode, in the timer's own unit.
    ModeTime(ModeTimer),
}

impl Parameter {
    /// Register id used by the gateway's write mutation.
    pub fn register(self) -> u16 {
        match self {
            Self::UserMode => 30,
            Self::ManualAirflowLevel => 1131,
            Self::TemperatureSetpoint => 2000,
            Self::ModeTime(timer) => timer.register(),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserMode => f.write_str("user_mode"),
            Self::ManualAirflowLevel => f.write_str("manual_airflow_level"),
            Self::TemperatureSetpoint => f.write_str("temperature_setpoint"),
            Self::ModeTime(timer) => write!(f, "{}_time", format!("{timer:?}").to_lowercase()),
        }
    }
}

// ── VentilationApi ───────────────────────────────────────────────────

/// Remote operations against the vendor cloud.
pub trait VentilationApi: Send + Sync + 'static {
    /// Log in with the stored credentials.
    fn authenticate(&self) -> impl Future<Output = Result<AccessToken, Error>> + Send;

    /// Whether the current token is still usable.
    fn is_token_valid(&self) -> bool;

    /// Obtain a new token from the refresh grant.
    fn refresh_token(&self) -> impl Future<Output = Result<AccessToken, Error>> + Send;

    /// Use `token` for subsequent requests.
    fn set_access_token(&self, token: &AccessToken);

    /// Raw account-devices response. Envelope shape varies.
    fn list_devices(&self) -> impl Future<Output = Result<Value, Error>> + Send;

    /// Raw status blob for one device.
    fn fetch_status(&self, device_id: &str) -> impl Future<Output = Result<Value, Error>> + Send;

    /// Write one parameter. `Ok(false)` means the device refused the write.
    fn send_command(
        &self,
        device_id: &str,
        parameter: Parameter,
        value: i64,
    ) -> impl Future<Output = Result<bool, Error>> + Send;
}

// ── PushChannel ──────────────────────────────────────────────────────

/// Opens the asynchronous status stream.
pub trait PushChannel: Send + Sync + 'static {
    /// Connect with `token` and forward every inbound JSON message to `sink`.
    ///
    /// Resolves once the first connection is established, so connect
    /// failures are reported to the caller. The returned subscription drops
    /// `sink` when it stops, which is how the receiver learns that the
    /// channel gave up.
    fn subscribe(
        &self,
        token: &AccessToken,
        sink: mpsc::Sender<Value>,
    ) -> impl Future<Output = Result<PushSubscription, Error>> + Send;
}

/// Handle to a running push subscription.
#[derive(Debug)]
pub struct PushSubscription {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PushSubscription {
    pub fn new(cancel: CancellationToken, handle: Option<JoinHandle<()>>) -> Self {
        Self { cancel, handle }
    }

    /// Whether the background reader has stopped.
    pub fn is_finished(&self) -> bool {
        self.cancel.is_cancelled() || self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Stop the reader and wait for it to exit.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_registers_are_contiguous() {
        let regs: Vec<u16> = [
            ModeTimer::Holiday,
            ModeTimer::Away,
            ModeTimer::Fireplace,
            ModeTimer::Refresh,
            ModeTimer::Crowded,
        ]
        .into_iter()
        .map(ModeTimer::register)
        .collect();
        assert_eq!(regs, vec![251, 252, 253, 254, 255]);
    }

    #[test]
    fn parameter_display() {
        assert_eq!(Parameter::UserMode.to_string(), "user_mode");
        assert_eq!(
            Parameter::ModeTime(ModeTimer::Holiday).to_string(),
            "holiday_time"
        );
    }

    #[tokio::test]
    async fn unsubscribe_cancels_reader() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let handle = tokio::spawn(async move { child.cancelled().await });
        let sub = PushSubscription::new(cancel.clone(), Some(handle));
        assert!(!sub.is_finished());
        sub.unsubscribe().await;
        assert!(cancel.is_cancelled());
    }
}
