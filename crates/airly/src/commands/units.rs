//! Unit listing and inspection.

use crate::cli::{GlobalOpts, UnitsArgs, UnitsCommand};
use crate::config::Airly;
use crate::error::CliError;
use crate::output::{self, UnitRow};

use super::util;

pub fn handle(coordinator: &Airly, args: UnitsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        UnitsCommand::List => {
            let units = coordinator.units_snapshot();
            let out = output::render_list(
                global.output,
                units.as_slice(),
                |u| UnitRow::from(u.as_ref()),
                |u| u.id.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
        UnitsCommand::Get(arg) => {
            let unit = util::resolve_unit(coordinator, &arg.unit)?;
            util::print_unit(&unit, global)
        }
    }
}
