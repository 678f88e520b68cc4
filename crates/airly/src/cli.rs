//! Clap derive structures for the `airly` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use airly_core::{AirflowLevel, TimedMode, UserMode};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// airly -- control SystemAIR ventilation units from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "airly",
    version,
    about = "Control SystemAIR ventilation units from the command line",
    long_about = "Talks to the SystemAIR Home Solutions cloud.\n\n\
        One-shot commands log in, discover units, act and exit.\n\
        `airly run` keeps a session open and prints updates as they arrive.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Account profile to use
    #[arg(long, short = 'p', env = "AIRLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "AIRLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Keep a session open and print unit updates until Ctrl-C
    Run(RunArgs),

    /// List or inspect ventilation units
    #[command(alias = "u")]
    Units(UnitsArgs),

    /// Switch a unit's operating mode
    Mode(ModeArgs),

    /// Set the raw fan level (1-5, clamped)
    Fan(FanArgs),

    /// Pick an airflow level (low, normal, high, refresh)
    Airflow(AirflowArgs),

    /// Set the temperature setpoint (12-28 °C, 0.5 steps)
    #[command(alias = "temperature")]
    Temp(TempArgs),

    /// Manage stored timed-mode durations
    #[command(alias = "dur")]
    Duration(DurationArgs),

    /// Restore the configured base mode and airflow
    Base(UnitArg),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// A unit, by identifier or name.
#[derive(Debug, Args)]
pub struct UnitArg {
    /// Unit identifier or name
    pub unit: String,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Poll interval in seconds (overrides profile)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Disable push updates; poll only
    #[arg(long)]
    pub no_push: bool,
}

#[derive(Debug, Args)]
pub struct UnitsArgs {
    #[command(subcommand)]
    pub command: UnitsCommand,
}

#[derive(Debug, Subcommand)]
pub enum UnitsCommand {
    /// List discovered units
    #[command(alias = "ls")]
    List,

    /// Show one unit in detail
    Get(UnitArg),
}

#[derive(Debug, Args)]
pub struct ModeArgs {
    /// Unit identifier or name
    pub unit: String,

    /// auto, manual, crowded, refresh, fireplace, away, holiday
    pub mode: UserMode,

    /// Duration in minutes (timed modes only)
    #[arg(long, short = 'm')]
    pub minutes: Option<u32>,
}

#[derive(Debug, Args)]
pub struct FanArgs {
    /// Unit identifier or name
    pub unit: String,

    /// Fan level; values outside 1-5 are clamped
    #[arg(allow_negative_numbers = true)]
    pub level: i64,
}

#[derive(Debug, Args)]
pub struct AirflowArgs {
    /// Unit identifier or name
    pub unit: String,

    /// low, normal, high, refresh (or 2-5)
    #[arg(value_parser = parse_airflow)]
    pub level: AirflowLevel,
}

#[derive(Debug, Args)]
pub struct TempArgs {
    /// Unit identifier or name
    pub unit: String,

    /// Setpoint in °C
    pub celsius: f64,
}

#[derive(Debug, Args)]
pub struct DurationArgs {
    #[command(subcommand)]
    pub command: DurationCommand,
}

#[derive(Debug, Subcommand)]
pub enum DurationCommand {
    /// Show stored durations for every unit
    #[command(alias = "ls")]
    List,

    /// Store a duration used when the mode is activated without one
    Set {
        /// Unit identifier or name
        unit: String,
        /// holiday, away, fireplace, refresh, crowded
        mode: TimedMode,
        /// Minutes (1-1440, and within the mode's limit)
        minutes: u32,
    },

    /// Forget a stored duration
    #[command(alias = "rm")]
    Clear {
        /// Unit identifier or name
        unit: String,
        mode: TimedMode,
    },
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Interactive setup wizard
    Init,

    /// Show the resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Store the account password in the system keyring
    SetPassword,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: Shell,
}

fn parse_airflow(s: &str) -> Result<AirflowLevel, String> {
    AirflowLevel::parse(s).ok_or_else(|| format!("unknown airflow level '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_timed_mode_with_minutes() {
        let cli = Cli::try_parse_from(["airly", "mode", "kitchen", "Away", "-m", "90"])
            .expect("parse");
        let Command::Mode(args) = cli.command else {
            panic!("expected mode command");
        };
        assert_eq!(args.mode, UserMode::Away);
        assert_eq!(args.minutes, Some(90));
    }

    #[test]
    fn parses_airflow_labels() {
        let cli = Cli::try_parse_from(["airly", "airflow", "dev1", "high"]).expect("parse");
        let Command::Airflow(args) = cli.command else {
            panic!("expected airflow command");
        };
        assert_eq!(args.level, AirflowLevel::HIGH);
        assert!(Cli::try_parse_from(["airly", "airflow", "dev1", "turbo"]).is_err());
    }
}
