mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackalign", about = "Serial-section image stack alignment")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project from an ordered list of section images
    Init(commands::init::InitArgs),
    /// Align one resolution level of a project
    Align(commands::align::AlignArgs),
    /// Worker entry point used by the subprocess executor
    #[command(name = "align-job", hide = true)]
    AlignJob(commands::align_job::AlignJobArgs),
    /// Recompose cumulative affines from stored pairwise results
    Compose(commands::compose::ComposeArgs),
    /// Regenerate aligned images from stored cumulative affines
    Apply(commands::apply::ApplyArgs),
    /// Register a single image pair and print the affine
    Swim(commands::swim::SwimArgs),
    /// Print a default run config as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    // stdout is reserved for command output and worker payloads.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Align(args) => commands::align::run(args),
        Commands::AlignJob(args) => commands::align_job::run(args),
        Commands::Compose(args) => commands::compose::run(args),
        Commands::Apply(args) => commands::apply::run(args),
        Commands::Swim(args) => commands::swim::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
