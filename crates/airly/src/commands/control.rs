//! Mode, fan, airflow, temperature and base-operation handlers.

use airly_core::Command as CoreCommand;

use crate::cli::{Command, GlobalOpts};
use crate::config::Airly;
use crate::error::CliError;

use super::util;

pub async fn handle(coordinator: &Airly, cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let command = match cmd {
        Command::Mode(args) => {
            let unit_id = util::resolve_unit(coordinator, &args.unit)?.id.clone();
            match (args.mode.timed(), args.minutes) {
                (Some(mode), minutes) => CoreCommand::SetModeWithDuration {
                    unit_id,
                    mode,
                    minutes,
                },
                (None, None) => CoreCommand::SetMode {
                    unit_id,
                    mode: args.mode,
                },
                (None, Some(_)) => {
                    return Err(CliError::Validation {
                        field: "minutes".into(),
                        reason: format!("{} mode does not take a duration", args.mode),
                    });
                }
            }
        }
        Command::Fan(args) => CoreCommand::SetFanSpeed {
            unit_id: util::resolve_unit(coordinator, &args.unit)?.id.clone(),
            level: args.level,
        },
        Command::Airflow(args) => CoreCommand::SelectAirflow {
            unit_id: util::resolve_unit(coordinator, &args.unit)?.id.clone(),
            level: args.level,
        },
        Command::Temp(args) => CoreCommand::SetTemperature {
            unit_id: util::resolve_unit(coordinator, &args.unit)?.id.clone(),
            celsius: args.celsius,
        },
        Command::Base(arg) => CoreCommand::ApplyBaseOperation {
            unit_id: util::resolve_unit(coordinator, &arg.unit)?.id.clone(),
        },
        other => {
            return Err(CliError::Internal(format!(
                "not a control command: {other:?}"
            )));
        }
    };

    tracing::debug!(?command, "executing");
    let result = coordinator.execute(command).await?;
    util::print_unit(&result.unit, global)
}
