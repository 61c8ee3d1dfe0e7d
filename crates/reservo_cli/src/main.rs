//! Reservo CLI
//!
//! Command-line tools for exercising the reservation engine.
//!
//! # Commands
//!
//! - `simulate` - Run concurrent clients against one or more resources
//! - `batch-demo` - Show auto-commit versus explicit-transaction behavior
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Reservo command-line tools.
#[derive(Parser)]
#[command(name = "reservo")]
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
    /// Run concurrent reservations against an in-memory store
    Simulate {
        /// Units per resource
        #[arg(short, long, default_value = "10")]
        units: u32,

        /// Number of concurrent clients
        #[arg(short, long, default_value = "50")]
        clients: usize,

        /// Number of resources clients are spread over
        #[arg(short, long, default_value = "1")]
        resources: usize,

        /// Time each client spends holding the lock, in milliseconds
        #[arg(long, default_value = "0")]
        hold_ms: u64,

        /// Lock timeout in milliseconds (omit to wait forever)
        #[arg(short, long)]
        timeout_ms: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run two statements, the second invalid, with and without a transaction
    BatchDemo {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            units,
            clients,
            resources,
            hold_ms,
            timeout_ms,
            format,
        } => {
            let options = commands::simulate::Options {
                units,
                clients,
                resources,
                hold_ms,
                timeout_ms,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::BatchDemo { format } => {
            commands::batch_demo::run(&format)?;
        }
        Commands::Version => {
            println!("Reservo CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Reservo Core v{}", reservo_core::VERSION);
        }
    }

    Ok(())
}
