use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ogm", about = "Inspect and load OGM model stores", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Import a JSON-lines event stream into a graph store
    Import(ImportArgs),
    /// Show element and class counts of a store
    Stats(StatsArgs),
    /// Show one element, optionally one of its features
    Inspect(InspectArgs),
    /// Copy a graph store into another directory
    Copy(CopyArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    /// Event file, one JSON event per line
    pub events: PathBuf,
    /// Store directory
    #[arg(short, long)]
    pub store: PathBuf,
    /// Store options file (TOML)
    #[arg(long)]
    pub options: Option<PathBuf>,
    /// Lay out many-valued references as linked lists
    #[arg(long)]
    pub long_list: bool,
    /// Commit every N writes
    #[arg(long)]
    pub autocommit: Option<usize>,
}

#[derive(Args)]
pub struct StatsArgs {
    #[arg(short, long)]
    pub store: PathBuf,
}

#[derive(Args)]
pub struct InspectArgs {
    pub id: String,
    #[arg(short, long)]
    pub store: PathBuf,
    /// Feature to read
    #[arg(long)]
    pub feature: Option<String>,
    /// Feature kind: attribute or reference
    #[arg(long, default_value = "attribute")]
    pub kind: String,
    #[arg(long)]
    pub many: bool,
    #[arg(long)]
    pub containment: bool,
    /// The store uses the linked-list layout
    #[arg(long)]
    pub long_list: bool,
}

#[derive(Args)]
pub struct CopyArgs {
    #[arg(long)]
    pub from: PathBuf,
    #[arg(long)]
    pub to: PathBuf,
}
