//! Command dispatch: bridges CLI args -> core Commands -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod duration;
pub mod run;
pub mod units;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Airly;
use crate::error::CliError;

/// Dispatch a one-shot command against a started coordinator.
pub async fn dispatch(cmd: Command, coordinator: &Airly, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Units(args) => units::handle(coordinator, args, global),
        Command::Duration(args) => duration::handle(coordinator, args, global).await,
        Command::Mode(_)
        | Command::Fan(_)
        | Command::Airflow(_)
        | Command::Temp(_)
        | Command::Base(_) => control::handle(coordinator, cmd, global).await,
        Command::Run(_) | Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command must be handled before connecting".into(),
        )),
    }
}
