use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level parser for the `signalwatch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "signalwatch",
    version,
    about = "SignalWatch - company registry mismatch scanner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ~/.config/signalwatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkpoint file, overriding the config
    #[arg(long, global = true)]
    pub checkpoint: Option<PathBuf>,

    /// SQLite results database to record scan jobs and findings in
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a new scan
    Start(StartArgs),
    /// Resume the scan held in the checkpoint
    Resume,
    /// Show progress recorded in the checkpoint
    Status,
    /// Delete the checkpoint
    Reset,
}

#[derive(Debug, Default, clap::Args)]
pub struct StartArgs {
    /// Seed company number; repeat for several (replaces configured seeds)
    #[arg(long = "company", value_name = "NUMBER")]
    pub companies: Vec<String>,

    /// Seed from a registry company search instead
    #[arg(long, conflicts_with = "companies")]
    pub query: Option<String>,

    /// Maximum director-network depth
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Maximum companies discovered
    #[arg(long)]
    pub max_companies: Option<usize>,

    /// Concurrent company fetches
    #[arg(long)]
    pub workers: Option<usize>,
}
