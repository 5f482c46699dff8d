use std::path::PathBuf;

use stackalign_core::consts::{DEFAULT_WHITENING, DEFAULT_WIN_SCALE_FACTOR};
use stackalign_core::pipeline::config::{
    AlignmentOption, BorderMode, ExecutionMode, ExecutorKind, IoMode, RecipeConfig, RunConfig,
};
use stackalign_core::pipeline::RunStage;
use stackalign_core::project::MethodData;

// ---------------------------------------------------------------------------
// Option strings
// ---------------------------------------------------------------------------

#[test]
fn test_alignment_option_round_trip() {
    for option in [
        AlignmentOption::InitAffine,
        AlignmentOption::RefineAffine,
        AlignmentOption::ApplyAffine,
    ] {
        let parsed: AlignmentOption = option.to_string().parse().unwrap();
        assert_eq!(parsed, option);
    }
    assert!("bogus".parse::<AlignmentOption>().is_err());
}

#[test]
fn test_alignment_option_default_is_init() {
    assert_eq!(AlignmentOption::default(), AlignmentOption::InitAffine);
}

#[test]
fn test_execution_mode_parse() {
    assert_eq!("serial".parse::<ExecutionMode>().unwrap(), ExecutionMode::Serial);
    assert_eq!(ExecutionMode::default(), ExecutionMode::Parallel);
    assert!("threads".parse::<ExecutionMode>().is_err());
}

#[test]
fn test_io_mode_parse() {
    assert_eq!("file".parse::<IoMode>().unwrap(), IoMode::File);
    assert_eq!(IoMode::default().to_string(), "pipe");
}

#[test]
fn test_display_strings() {
    assert_eq!(ExecutorKind::Subprocess.to_string(), "subprocess");
    assert_eq!(BorderMode::default().to_string(), "mean");
    assert_eq!(RunStage::Resampling.to_string(), "Generating aligned images");
}

// ---------------------------------------------------------------------------
// RunConfig serialization
// ---------------------------------------------------------------------------

#[test]
fn test_run_config_toml_round_trip() {
    let mut config = RunConfig::new(PathBuf::from("/data/project.json"));
    config.scale = Some(2);
    config.alignment_option = AlignmentOption::RefineAffine;
    config.end = Some(10);
    config.execution.mode = ExecutionMode::Serial;
    config.execution.max_workers = Some(4);
    config.snr.halt = Some(2.5);
    config.recipe.whitening = -0.5;

    let text = toml::to_string_pretty(&config).unwrap();
    let back: RunConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_minimal_toml_uses_defaults() {
    let config: RunConfig = toml::from_str("project = \"p.json\"\n").unwrap();
    assert_eq!(config, RunConfig::new(PathBuf::from("p.json")));
    assert!(config.generate_images);
    assert_eq!(config.recipe.whitening, DEFAULT_WHITENING);
}

#[test]
fn test_partial_sections_fill_defaults() {
    let text = r#"
project = "p.json"
alignment_option = "apply_affine"

[execution]
executor = "subprocess"
io_mode = "file"

[recipe]
check_align = true
"#;
    let config: RunConfig = toml::from_str(text).unwrap();
    assert_eq!(config.alignment_option, AlignmentOption::ApplyAffine);
    assert_eq!(config.execution.executor, ExecutorKind::Subprocess);
    assert_eq!(config.execution.io_mode, IoMode::File);
    assert_eq!(config.execution.mode, ExecutionMode::Parallel);
    assert!(config.recipe.check_align);
    assert_eq!(config.recipe.win_scale_factor, DEFAULT_WIN_SCALE_FACTOR);
}

#[test]
fn test_run_config_json_round_trip() {
    let config = RunConfig::new(PathBuf::from("project.json"));
    let json = serde_json::to_string(&config).unwrap();
    let back: RunConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

// ---------------------------------------------------------------------------
// Per-layer recipe overrides
// ---------------------------------------------------------------------------

#[test]
fn test_for_layer_applies_overrides() {
    let base = RecipeConfig::default();
    let data = MethodData {
        whitening_factor: Some(-0.9),
        win_scale_factor: Some(0.5),
        ..MethodData::default()
    };
    let layer = base.for_layer(&data);
    assert_eq!(layer.whitening, -0.9);
    assert_eq!(layer.win_scale_factor, 0.5);
    assert_eq!(layer.swim_iterations, base.swim_iterations);
}

#[test]
fn test_for_layer_without_overrides_is_unchanged() {
    let base = RecipeConfig {
        whitening: -0.4,
        ..RecipeConfig::default()
    };
    assert_eq!(base.for_layer(&MethodData::default()), base);
}
