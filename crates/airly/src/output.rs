//! Output formatting: table, JSON, plain.
//!
//! Table uses `tabled`, structured formats use serde, plain emits one
//! identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use airly_core::UnitState;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item. Table format uses `detail_fn` instead of a table.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize + ?Sized,
{
    Ok(match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => id_fn(data),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Units ────────────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct UnitRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Mode")]
    pub mode: String,
    #[tabled(rename = "Airflow")]
    pub airflow: String,
    #[tabled(rename = "Temp")]
    pub temperature: String,
    #[tabled(rename = "Setpoint")]
    pub setpoint: String,
    #[tabled(rename = "RH")]
    pub humidity: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Alarms")]
    pub alarms: String,
}

impl From<&UnitState> for UnitRow {
    fn from(unit: &UnitState) -> Self {
        Self {
            id: unit.id.clone(),
            name: unit.name.clone(),
            mode: unit.mode.to_string(),
            airflow: unit.airflow_level.label().into(),
            temperature: celsius(unit.temperature_current),
            setpoint: celsius(unit.temperature_setpoint),
            humidity: unit
                .humidity
                .map_or_else(|| "-".into(), |h| format!("{h:.0}%")),
            remaining: remaining(unit.mode_remaining_time),
            alarms: alarm_list(unit),
        }
    }
}

/// Multi-line detail view for one unit.
pub fn unit_detail(unit: &UnitState, color: bool) -> String {
    let heading = if color {
        unit.name.bold().cyan().to_string()
    } else {
        unit.name.clone()
    };
    let alarms = alarm_list(unit);
    let alarms = if color && alarms != "-" {
        alarms.red().to_string()
    } else {
        alarms
    };
    let functions = unit.active_functions.active();

    let mut lines = vec![
        heading,
        format!("  ID:          {}", unit.id),
        format!("  Model:       {}", unit.model.as_deref().unwrap_or("-")),
        format!("  Mode:        {}", unit.mode),
        format!("  Remaining:   {}", remaining(unit.mode_remaining_time)),
        format!("  Airflow:     {}", unit.airflow_level),
        format!("  Temperature: {}", celsius(unit.temperature_current)),
        format!("  Setpoint:    {}", celsius(unit.temperature_setpoint)),
        format!("  Outdoor:     {}", celsius(unit.temperature_outdoor)),
        format!("  Supply:      {}", celsius(unit.temperature_supply)),
        format!(
            "  Humidity:    {}",
            unit.humidity.map_or_else(|| "-".into(), |h| format!("{h:.0}%"))
        ),
        format!(
            "  Air quality: {}",
            unit.air_quality.map_or_else(|| "-".into(), |q| q.to_string())
        ),
        format!(
            "  Functions:   {}",
            if functions.is_empty() {
                "-".into()
            } else {
                functions.join(", ")
            }
        ),
        format!("  Alarms:      {alarms}"),
    ];
    if !unit.mode_durations.is_empty() {
        lines.push("  Durations:".into());
        for (mode, minutes) in &unit.mode_durations {
            lines.push(format!("    {mode:<10} {minutes} min"));
        }
    }
    lines.join("\n")
}

/// One-line summary used by `airly run`.
pub fn unit_line(unit: &UnitState) -> String {
    format!(
        "{} [{}] mode={} airflow={} temp={} setpoint={}",
        unit.name,
        unit.id,
        unit.mode,
        unit.airflow_level.label(),
        celsius(unit.temperature_current),
        celsius(unit.temperature_setpoint),
    )
}

fn celsius(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |t| format!("{t:.1} °C"))
}

fn remaining(seconds: Option<u64>) -> String {
    match seconds {
        None | Some(0) => "-".into(),
        Some(s) if s >= 3600 => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
        Some(s) => format!("{}m {:02}s", s / 60, s % 60),
    }
}

fn alarm_list(unit: &UnitState) -> String {
    let raised: Vec<_> = unit.alarms.raised().collect();
    if raised.is_empty() {
        "-".into()
    } else {
        raised.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airly_core::{AirflowLevel, UserMode};

    fn unit() -> UnitState {
        let mut unit = UnitState::new("dev1", "Kitchen");
        unit.mode = UserMode::Away;
        unit.airflow_level = AirflowLevel::LOW;
        unit.temperature_current = Some(21.46);
        unit.mode_remaining_time = Some(5400);
        unit
    }

    #[test]
    fn row_formats_values() {
        let row = UnitRow::from(&unit());
        assert_eq!(row.mode, "away");
        assert_eq!(row.airflow, "low");
        assert_eq!(row.temperature, "21.5 °C");
        assert_eq!(row.setpoint, "-");
        assert_eq!(row.remaining, "1h 30m");
        assert_eq!(row.alarms, "-");
    }

    #[test]
    fn plain_output_lists_ids() {
        let units = vec![unit(), UnitState::new("dev2", "Attic")];
        let out = render_list(OutputFormat::Plain, &units, |u| UnitRow::from(u), |u| u.id.clone())
            .expect("render");
        assert_eq!(out, "dev1\ndev2");
    }

    #[test]
    fn detail_without_color_has_no_escapes() {
        let out = unit_detail(&unit(), false);
        assert!(out.starts_with("Kitchen\n"));
        assert!(!out.contains('\u{1b}'));
    }
}
