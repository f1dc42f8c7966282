use std::path::Path;

use templar_core::run_experiment;

use super::ExperimentArgs;

pub fn run(args: &ExperimentArgs, output_path: Option<&str>, plot_path: Option<&str>) {
    let config = super::config_or_exit(args);

    println!("🔬 Building templates for {} keys...", config.num_hypotheses);
    super::print_config(&config);

    let report = run_experiment(config).unwrap_or_else(|e| super::fail(e));

    println!(
        "\n  profiled {} templates in {:.2}s, attacked in {}ms",
        report.num_templates,
        report.profiling_ms as f64 / 1000.0,
        report.attack_ms
    );

    println!("\n{}", "=".repeat(48));
    println!("{:<6} {:>8} {:>16}", "Rank", "Key", "Score");
    println!("{}", "-".repeat(48));
    for (i, g) in report.top.iter().enumerate() {
        let marker = if g.hypothesis == report.true_key {
            " ←"
        } else {
            ""
        };
        println!("{:<6} {:>8} {:>16.6}{marker}", i, g.hypothesis, g.score);
    }
    println!("{}", "=".repeat(48));

    let verdict = if report.success { "✓" } else { "✗" };
    println!(
        "\n{verdict} True key: {}, Guessed key: {} (score {:.6}, true key rank {})",
        report.true_key, report.guess.hypothesis, report.guess.score, report.key_rank
    );

    if let Some(path) = output_path {
        match report.write_json(Path::new(path)) {
            Ok(()) => println!("\n📄 Report saved to: {path}"),
            Err(e) => eprintln!("Failed to write report to {path}: {e}"),
        }
    }

    if let Some(path) = plot_path {
        match report.write_plot_csv(Path::new(path)) {
            Ok(()) => println!("📈 Plot data saved to: {path}"),
            Err(e) => eprintln!("Failed to write plot data to {path}: {e}"),
        }
    }
}
