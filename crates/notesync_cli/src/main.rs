//! notesync CLI
//!
//! Command-line tools for notesync operators and developers.
//!
//! # Commands
//!
//! - `inspect` - Display per-collection record counts of a local snapshot
//! - `pending` - Print the change set the next push would send
//! - `token` - Mint a bearer token for a development server

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// notesync command-line tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display record counts by collection and status
    Inspect {
        /// Path to the local store snapshot
        snapshot: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the pending change set as JSON
    Pending {
        /// Path to the local store snapshot
        snapshot: PathBuf,
    },

    /// Mint a signed bearer token
    Token {
        /// Server secret
        #[arg(short, long)]
        secret: String,

        /// User the token is issued to
        #[arg(short, long)]
        user: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { snapshot, format } => {
            commands::inspect::run(&snapshot, &format)?;
        }
        Commands::Pending { snapshot } => {
            commands::pending::run(&snapshot)?;
        }
        Commands::Token { secret, user } => {
            commands::token::run(&secret, &user)?;
        }
        Commands::Version => {
            println!("notesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
