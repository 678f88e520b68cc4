//! Shared helpers for command handlers.

use std::sync::Arc;

use airly_core::UnitState;

use crate::cli::GlobalOpts;
use crate::config::Airly;
use crate::error::CliError;
use crate::output;

/// Resolve a unit by identifier, then by case-insensitive name.
pub fn resolve_unit(coordinator: &Airly, identifier: &str) -> Result<Arc<UnitState>, CliError> {
    if let Some(unit) = coordinator.unit(identifier) {
        return Ok(unit);
    }
    coordinator
        .units_snapshot()
        .iter()
        .find(|unit| unit.name.eq_ignore_ascii_case(identifier))
        .cloned()
        .ok_or_else(|| CliError::NotFound {
            identifier: identifier.into(),
        })
}

/// Print one unit in the selected output format.
pub fn print_unit(unit: &UnitState, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        unit,
        |u| output::unit_detail(u, color),
        |u| u.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
