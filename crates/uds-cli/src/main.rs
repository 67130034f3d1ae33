//! UDS CLI - Command-line tool for UDS diagnostics over J1939
//!
//! Monitors ISO-TP traffic on PGN 0xDA00, records traces for the scripted
//! responder and sends ReadDataByIdentifier queries.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "uds-cli")]
#[command(author, version, about = "UDS over J1939 diagnostics CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "UDS_CONFIG")]
    config: Option<PathBuf>,

    /// CAN interface name, selects SocketCAN
    #[arg(short, long, env = "UDS_INTERFACE")]
    interface: Option<String>,

    /// Own source address (decimal or 0x hex)
    #[arg(long, value_parser = parse_address)]
    tester: Option<u8>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Passively decode UDS traffic
    Monitor {
        /// Save the decoded messages as a recorded trace
        #[arg(long)]
        record: Option<PathBuf>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Read a data identifier
    ReadDid {
        /// Data identifier (hex, e.g. F190)
        #[arg(value_parser = parse_did)]
        did: u16,

        /// Destination address (decimal or 0x hex)
        #[arg(long, default_value = "0", value_parser = parse_address)]
        dest: u8,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Number of attempts
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Request a default diagnostic session
    Session {
        /// Destination address (decimal or 0x hex)
        #[arg(long, default_value = "0", value_parser = parse_address)]
        dest: u8,
    },

    /// Decode a UDS payload (hex) without touching the bus
    Decode {
        /// Payload bytes, SID first (e.g. "62 F1 90 31 58")
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("uds_cli=debug,j1939_uds=debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    if let Commands::Decode { payload } = &cli.command {
        return commands::decode(payload, &ctx);
    }

    let config = config::merge_with_args(
        config::load(cli.config.as_deref())?,
        cli.interface.as_deref(),
        cli.tester,
    );

    match &cli.command {
        Commands::Monitor { record, duration } => {
            commands::monitor(&config, record.as_deref(), *duration, &ctx).await?;
        }

        Commands::ReadDid {
            did,
            dest,
            timeout,
            retries,
        } => {
            commands::read_did(&config, *did, *dest, *timeout, *retries, &ctx).await?;
        }

        Commands::Session { dest } => {
            commands::session(&config, *dest, &ctx).await?;
        }

        Commands::Decode { .. } => {}
    }

    Ok(())
}

fn parse_address(s: &str) -> Result<u8, String> {
    j1939_uds::config::parse_address(s).ok_or_else(|| format!("invalid address: {}", s))
}

fn parse_did(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(s, 16).map_err(|e| format!("invalid DID {}: {}", s, e))
}
