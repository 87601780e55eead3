//! Afterlife CLI
//!
//! Command-line interface for:
//! - Resolving the latest head of a Self and listing every discoverable Self
//! - Fetching documents through the gateway fallback chain
//! - Verifying a full Head -> Snapshot -> Ideas chain, or a single transaction
//! - Publishing Ideas, a Snapshot and a Head into a local ledger file
//! - Managing the preferred gateway

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "afterlife")]
#[command(author, version, about = "Afterlife: resolve, verify and publish Selves on the ledger")]
struct Cli {
    /// Run against a JSON ledger file instead of the network.
    #[arg(long, global = true, value_name = "PATH")]
    ledger_file: Option<PathBuf>,

    /// Debug logging on stderr (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the latest head of a Self.
    Head {
        self_id: String,
        #[arg(long)]
        json: bool,
    },

    /// List the latest head of every discoverable Self.
    Selves {
        #[arg(long)]
        json: bool,
    },

    /// List every head version of a Self, newest first.
    History {
        self_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Follow `parent_snapshot_tx` links back from a snapshot.
    Lineage {
        snapshot_tx: String,
        #[arg(long, default_value_t = afterlife_chain::history::DEFAULT_LINEAGE_DEPTH)]
        depth: usize,
        #[arg(long)]
        json: bool,
    },

    /// Fetch a transaction payload and print it to stdout.
    Fetch {
        tx_id: String,
        /// Expected SHA-256 of the decoded payload (hex).
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Verify a chain or a single transaction.
    Verify {
        #[command(subcommand)]
        command: VerifyCommands,
    },

    /// Publish ideas, a snapshot and a head described by a request file.
    ///
    /// Requires `--ledger-file`: no network uploader is bundled.
    Publish {
        request: PathBuf,
        /// Poll up to N times until the new head is the latest.
        #[arg(long, default_value_t = 0)]
        wait: u32,
        #[arg(long, default_value_t = 2000)]
        wait_delay_ms: u64,
        #[arg(long)]
        json: bool,
    },

    /// Show or change client configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum VerifyCommands {
    /// Walk Head -> Snapshot -> Ideas for one Self.
    #[command(name = "self")]
    SelfChain {
        self_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Check one transaction, dispatching on its Entity tag.
    Tx {
        tx_id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved endpoints and gateways.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Prefer a gateway (and its /graphql endpoint) over the defaults.
    SetGateway { url: String },
    /// Remove the preferred gateway.
    ClearGateway,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let ledger_file = cli.ledger_file.as_deref();
    let backend = || commands::Backend::open(ledger_file);

    match cli.command {
        Commands::Head { self_id, json } => commands::resolve::head(&backend()?, &self_id, json).await,
        Commands::Selves { json } => commands::resolve::selves(&backend()?, json).await,
        Commands::History { self_id, json } => {
            commands::resolve::history(&backend()?, &self_id, json).await
        }
        Commands::Lineage {
            snapshot_tx,
            depth,
            json,
        } => commands::resolve::lineage(&backend()?, &snapshot_tx, depth, json).await,
        Commands::Fetch { tx_id, sha256 } => {
            commands::resolve::fetch(&backend()?, &tx_id, sha256.as_deref()).await
        }
        Commands::Verify { command } => match command {
            VerifyCommands::SelfChain { self_id, json } => {
                commands::verify::verify_self(&backend()?, &self_id, json).await
            }
            VerifyCommands::Tx { tx_id, json } => {
                commands::verify::verify_tx(&backend()?, &tx_id, json).await
            }
        },
        Commands::Publish {
            request,
            wait,
            wait_delay_ms,
            json,
        } => {
            commands::publish::publish(&backend()?, &request, wait, wait_delay_ms, json).await
        }
        // Config commands never touch the ledger.
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => commands::config::show(json),
            ConfigCommands::SetGateway { url } => commands::config::set_gateway(&url),
            ConfigCommands::ClearGateway => commands::config::clear_gateway(),
        },
    }
}
