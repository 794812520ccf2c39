//! Command-line front-end over the `Orchestrator` facade (§4.1).

pub mod commands;
pub mod output;

use clap::Parser;

pub use commands::Commands;

/// `vidforge` — batch video-generation orchestrator.
#[derive(Parser, Debug)]
#[command(name = "vidforge", version, about = "Batch video-generation orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,
}
