// ── Sync coordinator ──
//
// Full lifecycle management for one account session: authentication,
// discovery, periodic polling, push ingestion, command dispatch with
// optimistic updates, and duration persistence. All unit mutation goes
// through a single writer task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, Semaphore, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use airly_api::{AccessToken, Parameter, PushChannel, PushSubscription, VentilationApi};

use crate::command::{
    Command, CommandEnvelope, CommandResult, snap_temperature, temperature_tenths,
    validate_duration, validate_local_duration,
};
use crate::config::CoordinatorConfig;
use crate::discovery::extract_devices;
use crate::error::CoreError;
use crate::model::{AirflowLevel, StatusUpdate, TimedMode, UnitState, UserMode};
use crate::persistence::DurationStore;
use crate::push::{PushRoute, route_push};
use crate::retry::{RetryPolicy, with_retry};
use crate::store::{DurationMap, UnitStore};
use crate::stream::UnitStream;

const COMMAND_CHANNEL_SIZE: usize = 64;
const WRITE_CHANNEL_SIZE: usize = 256;
const EVENT_CHANNEL_SIZE: usize = 256;
const PUSH_CHANNEL_SIZE: usize = 256;

// ── Session state ────────────────────────────────────────────────────

/// Why a running session is not fully healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    /// Push could not be (re)opened; polling continues.
    PushFailed,
    /// The token expired and is being refreshed.
    TokenExpired,
}

/// Session state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    /// Logged in, no units discovered yet.
    Authenticated,
    Discovering,
    Active,
    Degraded(DegradedReason),
    Terminated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::Authenticated => f.write_str("authenticated"),
            Self::Discovering => f.write_str("discovering"),
            Self::Active => f.write_str("active"),
            Self::Degraded(DegradedReason::PushFailed) => f.write_str("degraded (push failed)"),
            Self::Degraded(DegradedReason::TokenExpired) => f.write_str("degraded (token expired)"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// Where a unit change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Poll,
    Push,
    Command,
}

/// Broadcast to every subscriber of [`Coordinator::events`].
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    UnitsDiscovered { count: usize },
    UnitUpdated { unit_id: String, source: UpdateSource },
    Refreshed,
    RefreshFailed { message: String },
    StateChanged(SessionState),
}

// ── Store writes ─────────────────────────────────────────────────────

/// Fields a successful command changes immediately.
#[derive(Debug, Clone, Default)]
struct UnitPatch {
    mode: Option<UserMode>,
    airflow: Option<AirflowLevel>,
    setpoint: Option<f64>,
    /// Duration the activated timed mode will run, in minutes, rounded
    /// up to whole native units.
    duration: Option<(TimedMode, u32)>,
}

impl UnitPatch {
    fn apply(&self, unit: &mut UnitState) {
        if let Some(mode) = self.mode {
            unit.mode = mode;
            if mode.timed().is_none() {
                unit.mode_remaining_time = None;
            }
        }
        if let Some(level) = self.airflow {
            unit.airflow_level = level;
        }
        if let Some(setpoint) = self.setpoint {
            unit.temperature_setpoint = Some(setpoint);
        }
        if let Some((mode, minutes)) = self.duration {
            unit.mode_durations.insert(mode, minutes);
            unit.mode_remaining_time = Some(u64::from(minutes) * 60);
        }
    }
}

/// A mutation request for the writer task.
#[derive(Debug)]
enum StoreUpdate {
    Register(Vec<UnitState>),
    Status {
        unit_id: String,
        update: StatusUpdate,
        source: UpdateSource,
    },
    Optimistic {
        unit_id: String,
        patch: UnitPatch,
    },
    SetDuration {
        unit_id: String,
        mode: TimedMode,
        minutes: u32,
    },
    ClearDuration {
        unit_id: String,
        mode: TimedMode,
    },
    RestoreDurations(DurationMap),
}

struct WriteRequest {
    update: StoreUpdate,
    done: oneshot::Sender<Option<Arc<UnitState>>>,
}

// ── Coordinator ──────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable. Generic over the remote API and the push channel so
/// tests can run it against in-memory fakes.
pub struct Coordinator<A, P> {
    inner: Arc<Inner<A, P>>,
}

impl<A, P> Clone for Coordinator<A, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<A, P> {
    api: A,
    push: P,
    config: CoordinatorConfig,
    store: Arc<UnitStore>,
    durations: Option<DurationStore>,
    state: watch::Sender<SessionState>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    write_tx: mpsc::Sender<WriteRequest>,
    command_tx: mpsc::Sender<CommandEnvelope>,
    receivers: Mutex<Option<Receivers>>,
    persist_tx: watch::Sender<u64>,
    session: Mutex<Session>,
    refresh_now: Notify,
    started: AtomicBool,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

struct Receivers {
    writes: mpsc::Receiver<WriteRequest>,
    commands: mpsc::Receiver<CommandEnvelope>,
}

/// Per-session remote state, guarded so refresh cycles never overlap.
#[derive(Default)]
struct Session {
    token: Option<AccessToken>,
    discovered: bool,
    push: Option<ActivePush>,
}

struct ActivePush {
    subscription: PushSubscription,
    bridge_cancel: CancellationToken,
    bridge: JoinHandle<()>,
}

impl ActivePush {
    fn is_healthy(&self) -> bool {
        !self.subscription.is_finished() && !self.bridge.is_finished()
    }
}

impl<A: VentilationApi, P: PushChannel> Coordinator<A, P> {
    /// Build a coordinator. Does not touch the network; call
    /// [`start()`](Self::start) to authenticate and spawn background tasks.
    pub fn new(api: A, push: P, config: CoordinatorConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let durations = config
            .storage_dir
            .as_ref()
            .map(|dir| DurationStore::new(dir, &config.instance_id));
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (write_tx, writes) = mpsc::channel(WRITE_CHANNEL_SIZE);
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (persist_tx, _) = watch::channel(0);

        Ok(Self {
            inner: Arc::new(Inner {
                api,
                push,
                config,
                store: Arc::new(UnitStore::new()),
                durations,
                state,
                event_tx,
                write_tx,
                command_tx,
                receivers: Mutex::new(Some(Receivers { writes, commands })),
                persist_tx,
                session: Mutex::new(Session::default()),
                refresh_now: Notify::new(),
                started: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn api(&self) -> &A {
        &self.inner.api
    }

    pub fn store(&self) -> &Arc<UnitStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the background tasks and run the first refresh cycle.
    ///
    /// The periodic poller keeps running even if the first cycle fails,
    /// so a transient outage at startup heals on its own.
    pub async fn start(&self) -> Result<(), CoreError> {
        let Some(receivers) = self.inner.receivers.lock().await.take() else {
            return Err(CoreError::Internal("coordinator already started".into()));
        };

        {
            let mut handles = self.inner.task_handles.lock().await;
            handles.push(tokio::spawn(writer_task(self.clone(), receivers.writes)));
            handles.push(tokio::spawn(command_processor_task(
                self.clone(),
                receivers.commands,
            )));
            if self.inner.durations.is_some() {
                let rx = self.inner.persist_tx.subscribe();
                handles.push(tokio::spawn(persist_task(self.clone(), rx)));
            }
        }
        self.inner.started.store(true, Ordering::Release);

        let first = self.refresh().await;

        let ctrl = self.clone();
        let cancel = self.inner.cancel.clone();
        self.inner
            .task_handles
            .lock()
            .await
            .push(tokio::spawn(refresh_task(ctrl, cancel)));

        info!(units = self.inner.store.unit_count(), "coordinator started");
        first
    }

    /// Stop everything: cancel background work, close the push channel,
    /// save durations one last time.
    pub async fn shutdown(&self) {
        if *self.inner.state.borrow() == SessionState::Terminated {
            return;
        }
        self.inner.cancel.cancel();

        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        {
            let mut session = self.inner.session.lock().await;
            close_push(&mut session).await;
            session.token = None;
        }

        self.save_durations().await;
        self.set_state(SessionState::Terminated);
        debug!("coordinator shut down");
    }

    /// One-shot: start without background polling or push, run `f`, shut down.
    pub async fn oneshot<F, Fut, T>(
        api: A,
        push: P,
        mut config: CoordinatorConfig,
        f: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce(Self) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        config.poll_interval = Duration::ZERO;
        config.push_enabled = false;

        let coordinator = Self::new(api, push, config)?;
        if let Err(e) = coordinator.start().await {
            coordinator.shutdown().await;
            return Err(e);
        }
        let result = f(coordinator.clone()).await;
        coordinator.shutdown().await;
        result
    }

    // ── Refresh cycle ────────────────────────────────────────────────

    /// Run one refresh cycle now.
    ///
    /// Authentication, token refresh and discovery failures fail the
    /// cycle, as does a poll the server rejects as unauthorized. Other
    /// per-unit poll failures and push failures do not.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        self.ensure_running()?;
        let result = self.refresh_cycle().await;
        match &result {
            Ok(()) => self.emit(CoordinatorEvent::Refreshed),
            Err(CoreError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "refresh cycle failed");
                self.emit(CoordinatorEvent::RefreshFailed {
                    message: e.to_string(),
                });
            }
        }
        result
    }

    /// Ask the background poller for an immediate out-of-band cycle.
    pub fn request_refresh(&self) {
        self.inner.refresh_now.notify_one();
    }

    async fn refresh_cycle(&self) -> Result<(), CoreError> {
        let mut session = self.inner.session.lock().await;

        if session.token.is_none() {
            let token = match self.call("authenticate", self.discovery_policy(), || {
                self.inner.api.authenticate()
            })
            .await
            {
                Ok(token) => token,
                Err(e) => {
                    self.set_state(SessionState::Unauthenticated);
                    return Err(e);
                }
            };
            self.inner.api.set_access_token(&token);
            session.token = Some(token);
            debug!("authenticated");

            if session.discovered {
                // Re-authenticated after a failed token refresh.
                self.reopen_push(&mut session).await;
            } else {
                self.set_state(SessionState::Authenticated);
            }
        } else if !self.inner.api.is_token_valid() {
            self.set_state(SessionState::Degraded(DegradedReason::TokenExpired));
            debug!("access token expired, refreshing");
            match self
                .call("refresh token", self.discovery_policy(), || {
                    self.inner.api.refresh_token()
                })
                .await
            {
                Ok(token) => {
                    self.inner.api.set_access_token(&token);
                    session.token = Some(token);
                    self.reopen_push(&mut session).await;
                }
                Err(e) => {
                    session.token = None;
                    return Err(e);
                }
            }
        }

        if session.discovered {
            if let Err(e) = self.poll_units().await {
                if e.is_auth_failure() {
                    // Server rejected the token; authenticate from scratch next cycle.
                    session.token = None;
                    self.set_state(SessionState::Unauthenticated);
                }
                return Err(e);
            }
            if self.inner.config.push_enabled
                && !session.push.as_ref().is_some_and(ActivePush::is_healthy)
            {
                close_push(&mut session).await;
                self.open_push(&mut session).await;
            }
        } else {
            self.set_state(SessionState::Discovering);
            if let Err(e) = self.discover().await {
                self.set_state(SessionState::Authenticated);
                return Err(e);
            }
            session.discovered = true;
            self.restore_durations().await;
            if self.inner.config.push_enabled {
                self.open_push(&mut session).await;
            }
        }

        self.settle_state(&session);
        Ok(())
    }

    /// Enumerate devices and register each with an initial status.
    async fn discover(&self) -> Result<(), CoreError> {
        let response = self
            .call("list devices", self.discovery_policy(), || {
                self.inner.api.list_devices()
            })
            .await
            .map_err(|e| match e {
                CoreError::AuthenticationFailed { .. } | CoreError::Cancelled => e,
                other => CoreError::DiscoveryFailed {
                    message: other.to_string(),
                },
            })?;

        let devices = extract_devices(&response);
        let mut units = Vec::with_capacity(devices.len());

        for (i, device) in devices.into_iter().enumerate() {
            if i > 0 {
                self.pause().await?;
            }
            let mut unit = UnitState::new(device.id, device.name);
            let id = unit.id.clone();
            match self
                .call("initial status", self.discovery_policy(), || {
                    self.inner.api.fetch_status(&id)
                })
                .await
            {
                Ok(blob) => StatusUpdate::from_json(&blob).apply_to(&mut unit),
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => {
                    warn!(unit = %unit.id, error = %e, "initial status fetch failed, registering with defaults");
                }
            }
            units.push(unit);
        }

        let count = units.len();
        self.write(StoreUpdate::Register(units)).await?;
        info!(count, "units discovered");
        self.emit(CoordinatorEvent::UnitsDiscovered { count });
        Ok(())
    }

    async fn poll_units(&self) -> Result<(), CoreError> {
        for (i, id) in self.inner.store.unit_ids().into_iter().enumerate() {
            if i > 0 {
                self.pause().await?;
            }
            match self
                .call("poll status", &self.inner.config.poll_retry, || {
                    self.inner.api.fetch_status(&id)
                })
                .await
            {
                Ok(blob) => {
                    let update = StatusUpdate::from_json(&blob);
                    self.write(StoreUpdate::Status {
                        unit_id: id,
                        update,
                        source: UpdateSource::Poll,
                    })
                    .await?;
                }
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => warn!(unit = %id, error = %e, "status poll failed, skipping unit"),
            }
        }
        self.inner.store.mark_polled();
        Ok(())
    }

    async fn restore_durations(&self) {
        let Some(store) = &self.inner.durations else {
            return;
        };
        match store.load().await {
            Ok(map) if map.is_empty() => {}
            Ok(map) => {
                debug!(units = map.len(), "restoring stored durations");
                if let Err(e) = self.write(StoreUpdate::RestoreDurations(map)).await {
                    warn!(error = %e, "failed to restore durations");
                }
            }
            Err(e) => warn!(error = %e, "failed to load stored durations, using defaults"),
        }
    }

    // ── Push channel ─────────────────────────────────────────────────

    async fn open_push(&self, session: &mut Session) {
        let Some(token) = session.token.clone() else {
            return;
        };
        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_SIZE);
        let push = &self.inner.push;

        let result = with_retry(
            &self.inner.config.push_retry,
            &self.inner.cancel,
            "push subscribe",
            || {
                let tx = tx.clone();
                let token = &token;
                async move { push.subscribe(token, tx).await.map_err(CoreError::from) }
            },
        )
        .await;
        drop(tx);

        match result {
            Ok(subscription) => {
                let bridge_cancel = self.inner.cancel.child_token();
                let bridge = tokio::spawn(push_bridge_task(
                    self.clone(),
                    rx,
                    bridge_cancel.clone(),
                ));
                session.push = Some(ActivePush {
                    subscription,
                    bridge_cancel,
                    bridge,
                });
                info!("push channel subscribed");
            }
            Err(CoreError::Cancelled) => {}
            Err(e) => {
                warn!(error = %e, "push channel unavailable, continuing with polling only");
                self.set_state(SessionState::Degraded(DegradedReason::PushFailed));
            }
        }
    }

    /// Tear down any existing channel and open a fresh one with the
    /// session's current token.
    async fn reopen_push(&self, session: &mut Session) {
        close_push(session).await;
        if self.inner.config.push_enabled {
            self.open_push(session).await;
        }
    }

    async fn ingest_push(&self, message: &serde_json::Value) {
        let store = &self.inner.store;
        match route_push(message, |id| store.contains(id)) {
            PushRoute::Unit { id, update } => {
                store.mark_push();
                if update.is_empty() {
                    trace!(unit = %id, "push message without known fields");
                    return;
                }
                debug!(unit = %id, "push update");
                let write = StoreUpdate::Status {
                    unit_id: id,
                    update,
                    source: UpdateSource::Push,
                };
                if let Err(e) = self.write(write).await {
                    debug!(error = %e, "dropping push update");
                }
            }
            PushRoute::Unknown { id } => debug!(unit = %id, "push update for unknown unit"),
            PushRoute::Ignored => trace!(%message, "ignoring push message"),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Execute a command and return the updated unit.
    pub async fn execute(&self, command: Command) -> Result<CommandResult, CoreError> {
        self.ensure_running()?;
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(CommandEnvelope {
                command,
                response_tx: tx,
            })
            .await
            .map_err(|_| CoreError::Terminated)?;
        rx.await.map_err(|_| CoreError::Terminated)?
    }

    pub async fn set_mode(&self, unit_id: &str, mode: UserMode) -> bool {
        self.execute_logged(Command::SetMode {
            unit_id: unit_id.into(),
            mode,
        })
        .await
    }

    pub async fn set_mode_with_duration(
        &self,
        unit_id: &str,
        mode: TimedMode,
        minutes: Option<u32>,
    ) -> bool {
        self.execute_logged(Command::SetModeWithDuration {
            unit_id: unit_id.into(),
            mode,
            minutes,
        })
        .await
    }

    pub async fn set_fan_speed(&self, unit_id: &str, level: i64) -> bool {
        self.execute_logged(Command::SetFanSpeed {
            unit_id: unit_id.into(),
            level,
        })
        .await
    }

    pub async fn select_airflow(&self, unit_id: &str, level: AirflowLevel) -> bool {
        self.execute_logged(Command::SelectAirflow {
            unit_id: unit_id.into(),
            level,
        })
        .await
    }

    pub async fn set_temperature(&self, unit_id: &str, celsius: f64) -> bool {
        self.execute_logged(Command::SetTemperature {
            unit_id: unit_id.into(),
            celsius,
        })
        .await
    }

    pub async fn set_mode_duration(&self, unit_id: &str, mode: TimedMode, minutes: u32) -> bool {
        self.execute_logged(Command::SetModeDuration {
            unit_id: unit_id.into(),
            mode,
            minutes,
        })
        .await
    }

    pub async fn clear_mode_duration(&self, unit_id: &str, mode: TimedMode) -> bool {
        self.execute_logged(Command::ClearModeDuration {
            unit_id: unit_id.into(),
            mode,
        })
        .await
    }

    pub async fn apply_base_operation(&self, unit_id: &str) -> bool {
        self.execute_logged(Command::ApplyBaseOperation {
            unit_id: unit_id.into(),
        })
        .await
    }

    async fn execute_logged(&self, command: Command) -> bool {
        let unit_id = command.unit_id().to_owned();
        match self.execute(command).await {
            Ok(_) => true,
            Err(e) => {
                warn!(unit = %unit_id, error = %e, "command failed");
                false
            }
        }
    }

    async fn route_command(&self, command: Command) -> Result<CommandResult, CoreError> {
        let unit = self
            .inner
            .store
            .unit(command.unit_id())
            .ok_or_else(|| CoreError::UnitNotFound {
                id: command.unit_id().to_owned(),
            })?;
        let id = unit.id.as_str();

        match command {
            Command::SetMode { mode, .. } => self.switch_mode(&unit, mode).await,

            Command::SetModeWithDuration { mode, minutes, .. } => {
                let minutes = minutes.map(|m| validate_duration(mode, m)).transpose()?;
                self.activate_timed(&unit, mode, minutes, UnitPatch::default())
                    .await
            }

            Command::SetFanSpeed { level, .. } => {
                let level = AirflowLevel::clamp(level);
                self.send(id, Parameter::ManualAirflowLevel, i64::from(level.value()))
                    .await?;
                self.apply(
                    id,
                    UnitPatch {
                        airflow: Some(level),
                        ..UnitPatch::default()
                    },
                )
                .await
            }

            Command::SelectAirflow { level, .. } => self.select_airflow_level(&unit, level).await,

            Command::SetTemperature { celsius, .. } => {
                let celsius = snap_temperature(celsius)?;
                self.send(id, Parameter::TemperatureSetpoint, temperature_tenths(celsius))
                    .await?;
                self.apply(
                    id,
                    UnitPatch {
                        setpoint: Some(celsius),
                        ..UnitPatch::default()
                    },
                )
                .await
            }

            Command::SetModeDuration { mode, minutes, .. } => {
                let minutes = validate_local_duration(mode, minutes)?;
                self.write_unit(StoreUpdate::SetDuration {
                    unit_id: id.to_owned(),
                    mode,
                    minutes,
                })
                .await
            }

            Command::ClearModeDuration { mode, .. } => {
                self.write_unit(StoreUpdate::ClearDuration {
                    unit_id: id.to_owned(),
                    mode,
                })
                .await
            }

            Command::ApplyBaseOperation { .. } => {
                let base = self.inner.config.base;
                let result = self.switch_mode(&unit, base.mode).await?;
                match (base.mode, base.airflow) {
                    (UserMode::Manual, Some(level)) => {
                        self.send(id, Parameter::ManualAirflowLevel, i64::from(level.value()))
                            .await?;
                        self.apply(
                            id,
                            UnitPatch {
                                airflow: Some(level),
                                ..UnitPatch::default()
                            },
                        )
                        .await
                    }
                    _ => Ok(result),
                }
            }
        }
    }

    /// Plain modes are one write; timed modes resolve and send a duration.
    async fn switch_mode(
        &self,
        unit: &UnitState,
        mode: UserMode,
    ) -> Result<CommandResult, CoreError> {
        if let Some(timed) = mode.timed() {
            return self
                .activate_timed(unit, timed, None, UnitPatch::default())
                .await;
        }
        self.send(&unit.id, Parameter::UserMode, i64::from(mode.code()))
            .await?;
        self.apply(
            &unit.id,
            UnitPatch {
                mode: Some(mode),
                ..UnitPatch::default()
            },
        )
        .await
    }

    async fn select_airflow_level(
        &self,
        unit: &UnitState,
        level: AirflowLevel,
    ) -> Result<CommandResult, CoreError> {
        match level.value() {
            1 => Err(CoreError::validation("airflow level off is not selectable")),
            5 => {
                let extra = UnitPatch {
                    airflow: Some(AirflowLevel::REFRESH),
                    ..UnitPatch::default()
                };
                self.activate_timed(unit, TimedMode::Refresh, None, extra)
                    .await
            }
            _ => {
                if unit.mode != UserMode::Manual {
                    self.switch_mode(unit, UserMode::Manual).await?;
                }
                self.send(&unit.id, Parameter::ManualAirflowLevel, i64::from(level.value()))
                    .await?;
                self.apply(
                    &unit.id,
                    UnitPatch {
                        airflow: Some(level),
                        ..UnitPatch::default()
                    },
                )
                .await
            }
        }
    }

    /// Write the mode's timer (when a duration resolves), then the mode.
    async fn activate_timed(
        &self,
        unit: &UnitState,
        mode: TimedMode,
        explicit: Option<u32>,
        mut patch: UnitPatch,
    ) -> Result<CommandResult, CoreError> {
        let minutes = self.resolve_duration(unit, mode, explicit);

        if let Some(minutes) = minutes {
            let native = mode.to_native(minutes);
            debug!(unit = %unit.id, %mode, minutes, native, "setting mode timer");
            self.send(&unit.id, Parameter::ModeTime(mode.timer()), i64::from(native))
                .await?;
        }
        self.send(&unit.id, Parameter::UserMode, i64::from(mode.user_mode().code()))
            .await?;

        patch.mode = Some(mode.user_mode());
        // Record what the unit will actually run, in whole native units.
        patch.duration = minutes.map(|m| {
            let applied = mode.to_native(m).saturating_mul(mode.native_unit().minutes());
            (mode, applied)
        });
        self.apply(&unit.id, patch).await
    }

    /// Explicit, else stored on the unit, else the configured default.
    fn resolve_duration(&self, unit: &UnitState, mode: TimedMode, explicit: Option<u32>) -> Option<u32> {
        explicit
            .or_else(|| unit.mode_duration(mode))
            .or_else(|| Some(self.inner.config.durations.minutes(mode)).filter(|m| *m > 0))
    }

    async fn send(&self, unit_id: &str, parameter: Parameter, value: i64) -> Result<(), CoreError> {
        let accepted = self
            .call("send command", &self.inner.config.command_retry, || {
                self.inner.api.send_command(unit_id, parameter, value)
            })
            .await?;
        if accepted {
            debug!(unit = %unit_id, %parameter, value, "command accepted");
            Ok(())
        } else {
            Err(CoreError::Rejected {
                message: format!("{parameter} = {value}"),
            })
        }
    }

    async fn apply(&self, unit_id: &str, patch: UnitPatch) -> Result<CommandResult, CoreError> {
        self.write_unit(StoreUpdate::Optimistic {
            unit_id: unit_id.to_owned(),
            patch,
        })
        .await
    }

    async fn write_unit(&self, update: StoreUpdate) -> Result<CommandResult, CoreError> {
        let id = match &update {
            StoreUpdate::Optimistic { unit_id, .. }
            | StoreUpdate::SetDuration { unit_id, .. }
            | StoreUpdate::ClearDuration { unit_id, .. }
            | StoreUpdate::Status { unit_id, .. } => unit_id.clone(),
            StoreUpdate::Register(_) | StoreUpdate::RestoreDurations(_) => String::new(),
        };
        self.write(update)
            .await?
            .map(|unit| CommandResult { unit })
            .ok_or(CoreError::UnitNotFound { id })
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn session_state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn units_snapshot(&self) -> Arc<Vec<Arc<UnitState>>> {
        self.inner.store.units_snapshot()
    }

    pub fn unit(&self, id: &str) -> Option<Arc<UnitState>> {
        self.inner.store.unit(id)
    }

    pub fn units(&self) -> UnitStream {
        self.inner.store.subscribe_units()
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn discovery_policy(&self) -> &RetryPolicy {
        &self.inner.config.discovery_retry
    }

    /// Run one remote call under `policy`, mapping API errors.
    async fn call<T, F, Fut>(&self, label: &str, policy: &RetryPolicy, mut op: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, airly_api::Error>>,
    {
        with_retry(policy, &self.inner.cancel, label, || {
            let fut = op();
            async move { fut.await.map_err(CoreError::from) }
        })
        .await
    }

    /// Inter-request delay, abandoned on shutdown.
    async fn pause(&self) -> Result<(), CoreError> {
        let delay = self.inner.config.request_delay;
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => Err(CoreError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Terminated);
        }
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(CoreError::Internal("coordinator not started".into()));
        }
        Ok(())
    }

    async fn write(&self, update: StoreUpdate) -> Result<Option<Arc<UnitState>>, CoreError> {
        let (done, rx) = oneshot::channel();
        self.inner
            .write_tx
            .send(WriteRequest { update, done })
            .await
            .map_err(|_| CoreError::Terminated)?;
        rx.await.map_err(|_| CoreError::Terminated)
    }

    fn emit(&self, event: CoordinatorEvent) {
        let _ = self.inner.event_tx.send(event);
    }

    fn set_state(&self, next: SessionState) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == next || *current == SessionState::Terminated {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "session state changed");
            self.emit(CoordinatorEvent::StateChanged(next));
        }
    }

    /// Active when push is up (or not wanted), otherwise degraded.
    fn settle_state(&self, session: &Session) {
        let push_ok = !self.inner.config.push_enabled
            || session.push.as_ref().is_some_and(ActivePush::is_healthy);
        if push_ok {
            self.set_state(SessionState::Active);
        } else {
            self.set_state(SessionState::Degraded(DegradedReason::PushFailed));
        }
    }

    async fn save_durations(&self) {
        let Some(store) = &self.inner.durations else {
            return;
        };
        if let Err(e) = store.save(&self.inner.store.durations()).await {
            warn!(error = %e, "failed to save durations");
        }
    }

    /// Apply one mutation. Runs only on the writer task.
    fn apply_update(&self, update: StoreUpdate) -> Option<Arc<UnitState>> {
        let store = &self.inner.store;
        match update {
            StoreUpdate::Register(units) => {
                let added = units
                    .into_iter()
                    .map(|unit| store.register(unit))
                    .filter(|is_new| *is_new)
                    .count();
                debug!(added, "units registered");
                None
            }
            StoreUpdate::Status {
                unit_id,
                update,
                source,
            } => {
                let unit = store.modify(&unit_id, |u| update.apply_to(u))?;
                self.emit(CoordinatorEvent::UnitUpdated { unit_id, source });
                Some(unit)
            }
            StoreUpdate::Optimistic { unit_id, patch } => {
                let unit = store.modify(&unit_id, |u| patch.apply(u))?;
                if patch.duration.is_some() {
                    self.schedule_save();
                }
                self.emit(CoordinatorEvent::UnitUpdated {
                    unit_id,
                    source: UpdateSource::Command,
                });
                Some(unit)
            }
            StoreUpdate::SetDuration {
                unit_id,
                mode,
                minutes,
            } => {
                let unit = store.modify(&unit_id, |u| {
                    u.mode_durations.insert(mode, minutes);
                })?;
                self.schedule_save();
                Some(unit)
            }
            StoreUpdate::ClearDuration { unit_id, mode } => {
                let unit = store.modify(&unit_id, |u| {
                    u.mode_durations.remove(&mode);
                })?;
                self.schedule_save();
                Some(unit)
            }
            StoreUpdate::RestoreDurations(map) => {
                for unit_id in store.restore_durations(map) {
                    debug!(unit = %unit_id, "stored durations for unknown unit");
                }
                None
            }
        }
    }

    fn schedule_save(&self) {
        self.inner.persist_tx.send_modify(|generation| *generation += 1);
    }
}

async fn close_push(session: &mut Session) {
    if let Some(active) = session.push.take() {
        active.bridge_cancel.cancel();
        active.subscription.unsubscribe().await;
        let _ = active.bridge.await;
        debug!("push channel closed");
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Sole owner of unit mutation.
async fn writer_task<A: VentilationApi, P: PushChannel>(
    coordinator: Coordinator<A, P>,
    mut rx: mpsc::Receiver<WriteRequest>,
) {
    let cancel = coordinator.inner.cancel.clone();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = rx.recv() => {
                let Some(request) = request else { break };
                let unit = coordinator.apply_update(request.update);
                let _ = request.done.send(unit);
            }
        }
    }
}

/// Dispatch commands concurrently. Commands that reach the remote API are
/// bounded by the worker semaphore; local-only ones never wait on it.
async fn command_processor_task<A: VentilationApi, P: PushChannel>(
    coordinator: Coordinator<A, P>,
    mut rx: mpsc::Receiver<CommandEnvelope>,
) {
    let cancel = coordinator.inner.cancel.clone();
    let workers = Arc::new(Semaphore::new(coordinator.inner.config.command_workers));

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            envelope = rx.recv() => {
                let Some(envelope) = envelope else { break };
                let permit = if envelope.command.is_local() {
                    None
                } else {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        permit = Arc::clone(&workers).acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                    }
                };
                let ctrl = coordinator.clone();
                tokio::spawn(async move {
                    let result = ctrl.route_command(envelope.command).await;
                    drop(permit);
                    let _ = envelope.response_tx.send(result);
                });
            }
        }
    }
}

/// Periodic poll plus on-demand cycles from `request_refresh()`.
async fn refresh_task<A: VentilationApi, P: PushChannel>(
    coordinator: Coordinator<A, P>,
    cancel: CancellationToken,
) {
    let period = coordinator.inner.config.poll_interval;
    let mut interval = (!period.is_zero()).then(|| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = coordinator.inner.refresh_now.notified() => debug!("out-of-band refresh"),
            () = tick(&mut interval) => {}
        }
        // Failures are logged and broadcast inside `refresh`.
        let _ = coordinator.refresh().await;
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Moves push messages from the transport into the writer.
async fn push_bridge_task<A: VentilationApi, P: PushChannel>(
    coordinator: Coordinator<A, P>,
    mut rx: mpsc::Receiver<serde_json::Value>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else {
                    warn!("push channel closed, continuing with polling only");
                    coordinator.set_state(SessionState::Degraded(DegradedReason::PushFailed));
                    break;
                };
                coordinator.ingest_push(&message).await;
            }
        }
    }
}

/// Flush durations whenever the writer bumps the generation.
async fn persist_task<A: VentilationApi, P: PushChannel>(
    coordinator: Coordinator<A, P>,
    mut rx: watch::Receiver<u64>,
) {
    let cancel = coordinator.inner.cancel.clone();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                coordinator.save_durations().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_patch_records_duration_and_countdown() {
        let mut unit = UnitState::new("dev1", "Hall");
        UnitPatch {
            mode: Some(UserMode::Away),
            duration: Some((TimedMode::Away, 120)),
            ..UnitPatch::default()
        }
        .apply(&mut unit);

        assert_eq!(unit.mode, UserMode::Away);
        assert_eq!(unit.mode_duration(TimedMode::Away), Some(120));
        assert_eq!(unit.mode_remaining_time, Some(7200));
    }

    #[test]
    fn plain_mode_patch_clears_countdown() {
        let mut unit = UnitState::new("dev1", "Hall");
        unit.mode_remaining_time = Some(600);
        UnitPatch {
            mode: Some(UserMode::Manual),
            ..UnitPatch::default()
        }
        .apply(&mut unit);
        assert_eq!(unit.mode_remaining_time, None);
    }

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::Active.to_string(), "active");
        assert_eq!(
            SessionState::Degraded(DegradedReason::PushFailed).to_string(),
            "degraded (push failed)"
        );
    }
}
