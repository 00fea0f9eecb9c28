//! Clap derive structures for the `lidarctl` CLI.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// lidarctl -- bring up and drive a LiDAR appliance
#[derive(Debug, Parser)]
#[command(
    name = "lidarctl",
    version,
    about = "Set up and operate a LiDAR appliance from the terminal",
    long_about = "Prepares the host link and container for a LiDAR appliance, then\n\
        starts and stops its subsystems (power, streaming, recording, playback)\n\
        while keeping their dependencies consistent.",
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
    /// Profile to use instead of the default one
    #[arg(long, short = 'p', env = "LIDARCTL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Configuration directory (profiles, config.toml, state)
    #[arg(long, env = "LIDARCTL_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Log file for interactive sessions
    #[arg(long, env = "LIDARCTL_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LIDARCTL_OUTPUT",
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

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prepare the host: image, interface, link, then run the client
    Setup,

    /// Drive the appliance subsystems (runs inside the container)
    Client(ClientArgs),

    /// Show device, environment and available actions
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Manage profiles and settings
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Client ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ClientArgs {
    /// Network interface the appliance is cabled to
    #[arg(long)]
    pub lidar_network_interface: String,

    /// Container name (defaults to the profile's)
    #[arg(long)]
    pub container_name: Option<String>,

    /// Appliance IP address (defaults to the profile's)
    #[arg(long)]
    pub lidar_ip: Option<Ipv4Addr>,
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Show the setup menu instead of the client menu
    #[arg(long)]
    pub setup: bool,

    /// Probe the container image and device link before reporting
    #[arg(long)]
    pub probe: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the resolved settings and active profile
    Show,

    /// List saved profiles
    #[command(alias = "ls")]
    Profiles,

    /// Save a profile, starting from the active one
    Save {
        /// Profile name
        name: String,

        /// Network interface the appliance is cabled to
        #[arg(long)]
        interface: Option<String>,

        /// Container name
        #[arg(long)]
        container: Option<String>,

        /// Appliance IP address
        #[arg(long)]
        lidar_ip: Option<Ipv4Addr>,
    },

    /// Make a saved profile the default
    Use {
        /// Profile name
        name: String,
    },

    /// Set a field of the active profile
    Set {
        /// One of: container_name, network_interface, lidar_ip_address
        key: String,

        /// Value to set
        value: String,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
