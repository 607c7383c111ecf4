//! Command-line interface for parlo
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Live duplex voice conversation engine
#[derive(Parser, Debug)]
#[command(
    name = "parlo",
    version,
    about = "Live duplex voice conversation engine"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: session events, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// List supported languages, accents, and voices
    Languages,

    /// Check audio devices and configuration
    Check,

    /// Run a live session against the offline loopback transport
    Run {
        /// Language-accent pair (e.g. english-us)
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Prebuilt voice name (default: the accent's voice)
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,

        /// Audio input device
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Session length in seconds
        #[arg(long, short = 'd', value_name = "SECONDS", default_value = "10")]
        duration: u64,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
