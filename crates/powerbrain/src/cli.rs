//! Clap derive structures for the `powerbrain` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// powerbrain -- command-line bridge for cFos Powerbrain charging controllers
#[derive(Debug, Parser)]
#[command(
    name = "powerbrain",
    version,
    about = "Monitor and control cFos Powerbrain charging controllers",
    long_about = "Polls a cFos Powerbrain appliance, renders its meters and wallboxes as\n\
        sensors, switches and numeric controls, and forwards actions back to it.",
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
    /// Appliance profile to use
    #[arg(long, short = 'p', env = "POWERBRAIN_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Appliance address (overrides profile)
    #[arg(long, short = 'H', env = "POWERBRAIN_HOST", global = true)]
    pub host: Option<String>,

    /// Appliance user
    #[arg(long, short = 'u', env = "POWERBRAIN_USERNAME", global = true)]
    pub username: Option<String>,

    /// Appliance password
    #[arg(long, env = "POWERBRAIN_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "POWERBRAIN_OUTPUT",
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

    /// Accept invalid TLS certificates (HTTPS proxies)
    #[arg(long, short = 'k', env = "POWERBRAIN_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "POWERBRAIN_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices and their entities
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Poll the appliance and print entity updates until interrupted
    Watch(WatchArgs),

    /// Control a wallbox
    Evse(EvseArgs),

    /// Enter an RFID code or PIN
    Rfid(RfidArgs),

    /// Set a charging-manager variable
    SetVariable(SetVariableArgs),

    /// Push readings into an HTTP-input meter
    Meter(MeterArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List enabled devices
    #[command(alias = "ls")]
    List,

    /// Show one device with its sensors, switches and controls
    Show {
        /// Device ID as reported by the appliance
        dev_id: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  WATCH
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval in seconds (overrides profile)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,

    /// Only print entities of this device
    #[arg(long)]
    pub dev_id: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  EVSE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct EvseArgs {
    #[command(subcommand)]
    pub command: EvseCommand,
}

#[derive(Debug, Subcommand)]
pub enum EvseCommand {
    /// Override the charging current limit
    Current {
        dev_id: String,
        /// Limit in amperes
        amps: f64,
    },

    /// Enable or disable charging
    Charging { dev_id: String, state: Toggle },

    /// Enable or disable charging rules
    Rules { dev_id: String, state: Toggle },

    /// Enable or disable user-defined charging rules
    UserRules { dev_id: String, state: Toggle },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ACTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct RfidArgs {
    /// RFID code or PIN
    pub code: String,

    /// Wallbox the code applies to
    #[arg(long)]
    pub dev_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct SetVariableArgs {
    /// Variable name
    pub name: String,

    /// Value, passed through verbatim
    pub value: String,
}

#[derive(Debug, Args)]
pub struct MeterArgs {
    #[command(subcommand)]
    pub command: MeterCommand,
}

#[derive(Debug, Subcommand)]
pub enum MeterCommand {
    /// Send a reading to an HTTP-input meter
    Push(MeterPushArgs),
}

#[derive(Debug, Args)]
pub struct MeterPushArgs {
    pub dev_id: String,

    /// Power in W (VA with --is-va)
    #[arg(long, allow_negative_numbers = true)]
    pub power: Option<f64>,

    /// Power is apparent power
    #[arg(long)]
    pub is_va: bool,

    /// Phase voltages in V
    #[arg(long)]
    pub voltage_l1: Option<f64>,
    #[arg(long)]
    pub voltage_l2: Option<f64>,
    #[arg(long)]
    pub voltage_l3: Option<f64>,

    /// Phase currents in A
    #[arg(long, allow_negative_numbers = true)]
    pub current_l1: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub current_l2: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pub current_l3: Option<f64>,

    /// Imported energy total in kWh
    #[arg(long)]
    pub import_energy: Option<f64>,

    /// Exported energy total in kWh
    #[arg(long)]
    pub export_energy: Option<f64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create a profile with guided setup
    Init,

    /// Print the config file location
    Path,

    /// Display current resolved configuration
    Show,

    /// Set a profile value
    Set {
        /// Key: host, username, password_env, scan_interval, insecure, timeout
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store the appliance password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
