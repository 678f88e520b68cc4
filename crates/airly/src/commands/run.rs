//! `airly run`: a long-lived session printing updates until Ctrl-C.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use airly_core::{CoordinatorEvent, CoreError};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

pub async fn handle(mut session: Session, args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if let Some(secs) = args.interval {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "interval".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        session.config.poll_interval = Duration::from_secs(secs);
    }
    if args.no_push {
        session.config.push_enabled = false;
    }

    let profile = session.profile_name.clone();
    let coordinator = session.into_coordinator()?;
    let mut events = coordinator.events();

    match coordinator.start().await {
        Ok(()) => {}
        Err(e @ CoreError::AuthenticationFailed { .. }) => {
            coordinator.shutdown().await;
            return Err(e.into());
        }
        Err(e) => warn!(error = %e, "first refresh failed; will keep retrying"),
    }
    info!(%profile, units = coordinator.units_snapshot().len(), "session running");

    for unit in coordinator.units_snapshot().iter() {
        print_update(unit, global)?;
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            event = events.recv() => match event {
                Ok(CoordinatorEvent::UnitUpdated { unit_id, source }) => {
                    tracing::debug!(unit = %unit_id, ?source, "unit updated");
                    if let Some(unit) = coordinator.unit(&unit_id) {
                        print_update(&unit, global)?;
                    }
                }
                Ok(CoordinatorEvent::StateChanged(state)) => info!(%state, "session state"),
                Ok(CoordinatorEvent::RefreshFailed { message }) => warn!(%message, "refresh failed"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

fn print_update(unit: &airly_core::UnitState, global: &GlobalOpts) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(unit)?,
        OutputFormat::Table | OutputFormat::Plain => format!(
            "{} {}",
            chrono::Local::now().format("%H:%M:%S"),
            output::unit_line(unit)
        ),
    };
    output::print_output(&line, global.quiet);
    Ok(())
}
