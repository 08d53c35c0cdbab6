//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the modlink tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// modlink - messaging fabric for networked robot control modules
///
/// Discovers peer modules over multicast, maintains reliable and
/// best-effort links to them, and exchanges tagged messages and remote
/// calls on their behalf.
#[derive(Parser, Debug)]
#[command(name = "modlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "MODLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan for modules and print what answered
    Scan {
        /// Scan window in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// Scan, then print messages arriving on a tag
    Listen {
        /// Tag to receive on
        #[arg(short, long)]
        tag: u8,

        /// Stop after this many messages (0 = run until interrupted)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,

        /// Scan window before listening, in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },

    /// Scan, then send one message
    Send {
        /// Destination module id
        #[arg(short = 'd', long)]
        destination: u8,

        /// Tag to send under
        #[arg(short, long)]
        tag: u8,

        /// Payload, sent as UTF-8 bytes
        payload: String,

        /// Use the best-effort (lossy) route instead of the reliable one
        #[arg(long)]
        best_effort: bool,

        /// Scan window before sending, in seconds
        #[arg(long, default_value = "5")]
        duration: u64,
    },

    /// Scan, then invoke a remote function and print its result
    Call {
        /// Destination module id
        #[arg(short = 'd', long)]
        destination: u8,

        /// Function tag to invoke
        #[arg(short, long)]
        function: u8,

        /// Parameters, sent as UTF-8 bytes
        #[arg(default_value = "")]
        params: String,

        /// Scan window before calling, in seconds
        #[arg(long, default_value = "5")]
        duration: u64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate,
}
