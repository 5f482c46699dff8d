use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use stackalign_core::compute::create_backend;
use stackalign_core::pipeline::config::{
    AlignmentOption, BorderMode, ExecutionMode, ExecutorKind, IoMode, RunConfig,
};
use stackalign_core::pipeline::run_alignment;

use crate::progress::BarReporter;
use crate::summary::{print_run_config, print_run_summary};

#[derive(Clone, Copy, ValueEnum)]
pub enum OptionArg {
    Init,
    Refine,
    Apply,
}

impl From<OptionArg> for AlignmentOption {
    fn from(arg: OptionArg) -> Self {
        match arg {
            OptionArg::Init => AlignmentOption::InitAffine,
            OptionArg::Refine => AlignmentOption::RefineAffine,
            OptionArg::Apply => AlignmentOption::ApplyAffine,
        }
    }
}

#[derive(Args)]
pub struct AlignArgs {
    /// Project file
    pub project: PathBuf,

    /// Run config file (TOML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Resolution level (defaults to the project's current scale)
    #[arg(long)]
    pub scale: Option<u32>,

    /// How pairwise affines are produced
    #[arg(long, value_enum)]
    pub option: Option<OptionArg>,

    /// First layer to align
    #[arg(long)]
    pub start: Option<usize>,

    /// Last layer to align (exclusive)
    #[arg(long)]
    pub end: Option<usize>,

    /// Remove polynomial drift from the cumulative affines
    #[arg(long, conflicts_with = "keep_biases")]
    pub null_biases: bool,

    /// Keep drift even if the stack asks for nulling
    #[arg(long)]
    pub keep_biases: bool,

    /// Skip writing aligned images
    #[arg(long)]
    pub no_images: bool,

    /// Run jobs one at a time in layer order
    #[arg(long)]
    pub serial: bool,

    /// Run each job in a child process
    #[arg(long)]
    pub subprocess: bool,

    /// Hand worker results back through files instead of stdout
    #[arg(long)]
    pub file_io: bool,

    /// Maximum number of workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Flag layers at or below this SNR for skipping next pass
    #[arg(long)]
    pub snr_skip: Option<f64>,

    /// Stop at the first layer at or below this SNR
    #[arg(long)]
    pub snr_halt: Option<f64>,

    /// Skip layers flagged low SNR by the previous pass
    #[arg(long)]
    pub apply_snr_skip: bool,

    /// Fill outside pixels with zero instead of the image mean
    #[arg(long)]
    pub zero_border: bool,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let mut config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid run config")?
    } else {
        RunConfig::new(args.project.clone())
    };
    apply_overrides(&mut config, args);

    let backend = create_backend();
    print_run_config(&config, backend.name());

    let reporter = BarReporter::new();
    let summary = run_alignment(&config, backend, &reporter)
        .with_context(|| format!("Alignment of {} failed", config.project.display()))?;

    print_run_summary(&summary);
    Ok(())
}

fn apply_overrides(config: &mut RunConfig, args: &AlignArgs) {
    config.project = args.project.clone();
    if args.scale.is_some() {
        config.scale = args.scale;
    }
    if let Some(option) = args.option {
        config.alignment_option = option.into();
    }
    if let Some(start) = args.start {
        config.start = start;
    }
    if args.end.is_some() {
        config.end = args.end;
    }
    if args.null_biases {
        config.null_biases = Some(true);
    } else if args.keep_biases {
        config.null_biases = Some(false);
    }
    if args.no_images {
        config.generate_images = false;
    }
    if args.serial {
        config.execution.mode = ExecutionMode::Serial;
    }
    if args.subprocess {
        config.execution.executor = ExecutorKind::Subprocess;
    }
    if args.file_io {
        config.execution.io_mode = IoMode::File;
    }
    if args.workers.is_some() {
        config.execution.max_workers = args.workers;
    }
    if args.snr_skip.is_some() {
        config.snr.skip = args.snr_skip;
    }
    if args.snr_halt.is_some() {
        config.snr.halt = args.snr_halt;
    }
    if args.apply_snr_skip {
        config.snr.apply_skip = true;
    }
    if args.zero_border {
        config.border = BorderMode::Zero;
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct AlignCli {
        #[command(flatten)]
        args: AlignArgs,
    }

    fn overridden(argv: &[&str]) -> RunConfig {
        let cli = AlignCli::parse_from(std::iter::once("align").chain(argv.iter().copied()));
        let mut config = RunConfig::new(PathBuf::from("from_file.json"));
        apply_overrides(&mut config, &cli.args);
        config
    }

    #[test]
    fn test_apply_snr_skip_flag() {
        let config = overridden(&["p.json", "--apply-snr-skip", "--snr-skip", "3.5"]);
        assert_eq!(config.project, PathBuf::from("p.json"));
        assert!(config.snr.apply_skip);
        assert_eq!(config.snr.skip, Some(3.5));
    }

    #[test]
    fn test_flags_left_out_keep_config() {
        let config = overridden(&["p.json"]);
        assert!(!config.snr.apply_skip);
        assert_eq!(config.snr.halt, None);
        assert_eq!(config.alignment_option, AlignmentOption::InitAffine);
    }
}
