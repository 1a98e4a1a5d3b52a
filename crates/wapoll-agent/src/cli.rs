//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Pair a device, listen for messages, and send polls.
#[derive(Debug, Parser)]
#[command(name = "wapoll", version)]
pub struct Cli {
    /// Settings file (default: ~/.wapoll/settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// Identity store URL, overriding settings and environment
    #[arg(long, global = true, value_name = "URL")]
    pub database_url: Option<String>,

    /// Messaging backend to run against
    #[arg(long, global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Print the raw pairing code instead of drawing a QR code
    #[arg(long, global = true)]
    pub plain: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Messaging backends this build can run against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// In-process simulator: codes, devices and sends are local only
    Loopback,
}

/// Subcommands.
#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Pair this device by scanning a QR code
    Login,
    /// Forget every paired device
    Logout,
    /// Stay connected and log incoming messages (Ctrl-C stops early)
    Listen {
        /// How long to listen (default: session.listenSeconds)
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Send a poll to the configured chat
    Poll {
        /// Poll question (default: poll.question)
        #[arg(long)]
        question: Option<String>,
        /// Poll option, repeatable (default: poll.options)
        #[arg(long = "option", value_name = "OPTION")]
        options: Vec<String>,
        /// How many options a voter may pick (default: poll.selectableCount)
        #[arg(long)]
        selectable: Option<u32>,
        /// Destination chat, overriding poll.destination
        #[arg(long, value_name = "JID")]
        to: Option<String>,
    },
    /// List stored device identities
    Devices {
        /// Print JSON instead of one line per device
        #[arg(long)]
        json: bool,
    },
}
