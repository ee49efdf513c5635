//! Parivaha CLI
//!
//! Keeps Notion databases and Obsidian vaults in sync.
//!
//! # Commands
//!
//! - `init` - Write the configuration templates
//! - `sync` - Run a sync pass for configured vaults
//! - `status` - Show linked pairs and pending conflicts
//! - `resolve` - Pick the winning side of a deferred conflict

mod commands;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use parivaha_model::Side;
use parivaha_sync_engine::SyncDirection;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Notion and Obsidian sync.
#[derive(Parser)]
#[command(name = "parivaha")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory (default: $PARIVAHA_HOME or ~/.parivaha)
    #[arg(global = true, short, long)]
    config_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the .env and sync_config.json templates
    Init {
        /// Replace existing files
        #[arg(long)]
        overwrite: bool,
    },

    /// Run a sync pass
    Sync {
        /// Only sync this vault
        #[arg(long)]
        vault: Option<String>,

        /// Override the configured direction
        #[arg(short, long, value_enum)]
        direction: Option<DirectionArg>,
    },

    /// Show sync state and pending conflicts
    Status {
        /// Only show this vault
        #[arg(long)]
        vault: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Choose the winner of a deferred conflict
    Resolve {
        /// Notion page id or vault note path
        id: String,

        /// Side the id belongs to (default: try both)
        #[arg(short, long, value_enum)]
        side: Option<SideArg>,

        /// Side whose version wins
        #[arg(short, long, value_enum)]
        keep: SideArg,

        /// Vault holding the pair
        #[arg(long)]
        vault: Option<String>,
    },

    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Bidirectional,
    Pull,
    Push,
}

impl From<DirectionArg> for SyncDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Bidirectional => SyncDirection::Bidirectional,
            DirectionArg::Pull => SyncDirection::Pull,
            DirectionArg::Push => SyncDirection::Push,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Notion,
    Vault,
}

impl From<SideArg> for Side {
    fn from(arg: SideArg) -> Self {
        match arg {
            SideArg::Notion => Side::Notion,
            SideArg::Vault => Side::Vault,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => config::default_config_dir()?,
    };

    match cli.command {
        Commands::Init { overwrite } => commands::init::run(&config_dir, overwrite)?,
        Commands::Sync { vault, direction } => {
            commands::sync::run(&config_dir, vault.as_deref(), direction.map(Into::into))?
        }
        Commands::Status { vault, format } => {
            commands::status::run(&config_dir, vault.as_deref(), &format)?
        }
        Commands::Resolve {
            id,
            side,
            keep,
            vault,
        } => commands::resolve::run(
            &config_dir,
            vault.as_deref(),
            &id,
            side.map(Into::into),
            keep.into(),
        )?,
        Commands::Version => {
            println!("Parivaha CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Snapshot format v{}", parivaha_model::SNAPSHOT_VERSION);
        }
    }

    Ok(())
}
