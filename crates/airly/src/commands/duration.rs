//! Stored timed-mode durations.

use airly_core::{Command as CoreCommand, TimedMode};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::{DurationArgs, DurationCommand, GlobalOpts};
use crate::config::Airly;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Serialize)]
struct DurationEntry {
    unit_id: String,
    unit: String,
    mode: TimedMode,
    minutes: u32,
}

#[derive(Tabled)]
struct DurationRow {
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Minutes")]
    minutes: u32,
}

pub async fn handle(coordinator: &Airly, args: DurationArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DurationCommand::List => {
            let entries: Vec<DurationEntry> = coordinator
                .units_snapshot()
                .iter()
                .flat_map(|unit| {
                    unit.mode_durations.iter().map(move |(mode, minutes)| DurationEntry {
                        unit_id: unit.id.clone(),
                        unit: unit.name.clone(),
                        mode: *mode,
                        minutes: *minutes,
                    })
                })
                .collect();
            let out = output::render_list(
                global.output,
                &entries,
                |e| DurationRow {
                    unit: e.unit.clone(),
                    mode: e.mode.to_string(),
                    minutes: e.minutes,
                },
                |e| format!("{} {} {}", e.unit_id, e.mode, e.minutes),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        DurationCommand::Set {
            unit,
            mode,
            minutes,
        } => {
            let unit_id = util::resolve_unit(coordinator, &unit)?.id.clone();
            coordinator
                .execute(CoreCommand::SetModeDuration {
                    unit_id,
                    mode,
                    minutes,
                })
                .await?;
            if !global.quiet {
                eprintln!("Stored {mode} duration of {minutes} min for {unit}");
            }
            Ok(())
        }
        DurationCommand::Clear { unit, mode } => {
            let unit_id = util::resolve_unit(coordinator, &unit)?.id.clone();
            coordinator
                .execute(CoreCommand::ClearModeDuration { unit_id, mode })
                .await?;
            if !global.quiet {
                eprintln!("Cleared stored {mode} duration for {unit}");
            }
            Ok(())
        }
    }
}
