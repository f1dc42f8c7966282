use templar_core::{Experiment, Hypothesis, Template};

use super::ExperimentArgs;

pub fn run(args: &ExperimentArgs, output_path: Option<&str>) {
    let config = super::config_or_exit(args);

    println!("🔬 Building templates for {} keys...", config.num_hypotheses);
    super::print_config(&config);

    let exp = Experiment::profile(config).unwrap_or_else(|e| super::fail(e));
    let store = exp.store();

    println!(
        "\n  {} templates x {} samples",
        store.len(),
        store.num_samples()
    );
    println!("\n{}", "=".repeat(48));
    println!("{:>8} {:>16} {:>16}", "Key", "Mean level", "Mean variance");
    println!("{}", "-".repeat(48));

    let true_key = Hypothesis(exp.config().true_key);
    let last = store.len().saturating_sub(1);
    for (h, t) in store.iter() {
        // First few, the configured true key, and the last one.
        let idx = usize::from(h.value());
        if idx < 3 || h == true_key || idx == last {
            let (level, spread) = template_summary(t);
            println!("{:>8} {:>16.6} {:>16.8}", h, level, spread);
        }
    }
    println!("{}", "=".repeat(48));

    if let Some(path) = output_path {
        let written = serde_json::to_string_pretty(store)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        match written {
            Ok(()) => println!("\n📄 Template store saved to: {path}"),
            Err(e) => eprintln!("Failed to write template store to {path}: {e}"),
        }
    }
}

/// Average of the mean vector and of the variance vector.
fn template_summary(t: &Template) -> (f64, f64) {
    let n = t.num_samples().max(1) as f64;
    let level = t.mean().iter().sum::<f64>() / n;
    let spread = t.variance().iter().sum::<f64>() / n;
    (level, spread)
}
