use console::Style;
use stackalign_core::pipeline::config::RunConfig;
use stackalign_core::pipeline::RunSummary;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    warn: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            warn: Style::new().red().bold(),
        }
    }
}

fn optional(s: &Styles, value: Option<f64>) -> String {
    match value {
        Some(v) => s.value.apply_to(format!("{v:.1}")).to_string(),
        None => s.disabled.apply_to("off").to_string(),
    }
}

pub fn print_run_config(config: &RunConfig, device_name: &str) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Stack Alignment"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Project"),
        s.path.apply_to(config.project.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Backend"),
        s.method.apply_to(device_name)
    );
    let scale = config
        .scale
        .map(|l| format!("scale_{l}"))
        .unwrap_or_else(|| "current".to_string());
    println!("  {:<14}{}", s.label.apply_to("Scale"), s.value.apply_to(scale));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Option"),
        s.method.apply_to(config.alignment_option)
    );
    println!();

    println!("  {}", s.header.apply_to("Execution"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Mode"),
        s.value.apply_to(config.execution.mode)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Executor"),
        s.value.apply_to(config.execution.executor)
    );
    if let Some(n) = config.execution.max_workers {
        println!("    {:<12}{}", s.label.apply_to("Workers"), s.value.apply_to(n));
    }
    println!();

    println!("  {}", s.header.apply_to("Recipe"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Whitening"),
        s.value.apply_to(config.recipe.whitening)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Window"),
        s.value.apply_to(config.recipe.win_scale_factor)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Iterations"),
        s.value.apply_to(config.recipe.swim_iterations)
    );
    println!();

    println!("  {}", s.header.apply_to("SNR Policy"));
    println!("    {:<12}{}", s.label.apply_to("Skip"), optional(&s, config.snr.skip));
    println!("    {:<12}{}", s.label.apply_to("Halt"), optional(&s, config.snr.halt));
    if config.snr.apply_skip {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Apply skip"),
            s.value.apply_to("yes")
        );
    }
    println!();
}

pub fn print_run_summary(summary: &RunSummary) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Result"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Aligned"),
        s.value
            .apply_to(format!("{} of {} layers", summary.aligned.len(), summary.layers))
    );
    if summary.failed.is_empty() {
        println!("    {:<12}{}", s.label.apply_to("Failed"), s.disabled.apply_to("none"));
    } else {
        println!("    {:<12}", s.label.apply_to("Failed"));
        for (index, reason) in &summary.failed {
            println!("      {} {}", s.warn.apply_to(index), reason);
        }
    }
    if !summary.snr_skipped.is_empty() {
        println!(
            "    {:<12}{:?}",
            s.label.apply_to("Low SNR"),
            summary.snr_skipped
        );
    }
    if !summary.degenerate.is_empty() {
        println!(
            "    {:<12}{:?}",
            s.label.apply_to("Degenerate"),
            summary.degenerate
        );
    }
    if let Some(index) = summary.halted_at {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Halted at"),
            s.warn.apply_to(index)
        );
    }
    if let Some(r) = summary.bounding_rect {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Canvas"),
            s.value
                .apply_to(format!("{}x{} at ({}, {})", r.width, r.height, r.x, r.y))
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(summary.images_written)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Elapsed"),
        s.value.apply_to(format!("{:.1}s", summary.elapsed_secs))
    );
    println!();
}
