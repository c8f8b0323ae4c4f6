//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "vm2dhcp",
    version,
    author = "neur0map",
    about = "Keep DHCP host reservations in sync with virtual machines",
    long_about = "vm2dhcp follows the event stream of a virtualization platform, filters the VMs worth \
                  a reservation and registers every network adapter of those VMs in a DHCP lease \
                  registry, with options taken from the VM's custom attributes."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/vm2dhcp/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(
        short,
        long,
        global = true,
        value_parser = ["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG"],
        default_value = "INFO"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow the event feed and keep reservations in sync until stopped
    Run {
        /// JSON-lines event feed
        #[arg(short, long, value_name = "FILE")]
        feed: PathBuf,
    },

    /// Process every event currently in the feed once and print the reservations
    Replay {
        /// JSON-lines event feed
        #[arg(short, long, value_name = "FILE")]
        feed: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
