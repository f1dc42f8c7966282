use std::path::Path;

use templar_core::run_bench;

use super::ExperimentArgs;

pub fn run(args: &ExperimentArgs, trials: usize, output_path: Option<&str>) {
    let config = super::config_or_exit(args);

    println!(
        "🎯 Profiling {} keys, then attacking {trials} random keys...",
        config.num_hypotheses
    );
    super::print_config(&config);

    let report = run_bench(config, trials).unwrap_or_else(|e| super::fail(e));

    let misses: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.guess != o.true_key)
        .collect();

    println!("\n{}", "=".repeat(48));
    println!(
        "  Success rate:   {:>6.1}% ({}/{})",
        report.success_rate * 100.0,
        report.successes,
        report.trials
    );
    println!("  Mean key rank:  {:>8.3}", report.mean_key_rank);
    println!(
        "  Timing:         profile {:.2}s, attacks {:.2}s",
        report.profiling_ms as f64 / 1000.0,
        report.attack_ms as f64 / 1000.0
    );
    println!("{}", "=".repeat(48));

    if !misses.is_empty() {
        println!("\n  Misses:");
        for o in misses.iter().take(10) {
            println!(
                "    key {:>5} → guessed {:>5} (rank {})",
                o.true_key, o.guess, o.key_rank
            );
        }
        if misses.len() > 10 {
            println!("    ... and {} more", misses.len() - 10);
        }
    }

    if let Some(path) = output_path {
        match report.write_json(Path::new(path)) {
            Ok(()) => println!("\n📄 Report saved to: {path}"),
            Err(e) => eprintln!("Failed to write report to {path}: {e}"),
        }
    }
}
