// Command-line interface definitions for paivoice
//
// This module is separate so it can be used by both the binary (main.rs)
// and build.rs for generating man pages.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "paivoice")]
#[command(author, version, about = "Local notification relay with ElevenLabs voice")]
#[command(long_about = "
paivoice is a local notification relay. It accepts notifications over HTTP,
optionally speaks them through ElevenLabs, pushes them to connected web
clients over a WebSocket and shows a desktop notification.

SETUP:
  1. Add ELEVENLABS_API_KEY=your_key_here to ~/.env (optional, enables voice)
  2. Install libnotify (notify-send) for desktop notifications
  3. Run: paivoice (to start the server on port 8888)

USAGE:
  curl -X POST http://localhost:8888/notify \\
       -H 'Content-Type: application/json' \\
       -d '{\"title\": \"Build\", \"message\": \"Tests passed\"}'
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<std::path::PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override listen port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Override listen address (e.g., 127.0.0.1)
    #[arg(long, value_name = "ADDR")]
    pub host: Option<String>,

    /// Directory containing index.html for the web client
    #[arg(long, value_name = "DIR")]
    pub public_dir: Option<std::path::PathBuf>,

    /// Also play synthesized audio on this machine (mpg123/ffplay)
    #[arg(long)]
    pub play_locally: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay server (default if no command specified)
    Serve,

    /// Show current configuration
    Config {
        /// Write a default config file first if none exists
        #[arg(long)]
        init: bool,
    },
}
