pub mod attack;
pub mod bench;
pub mod profile;

use std::path::Path;

use clap::Args;
use templar_core::{ExperimentConfig, Scorer, TemplarError};

/// Experiment parameters shared by every subcommand. Flags override values
/// loaded from `--config`.
#[derive(Args, Debug, Default)]
pub struct ExperimentArgs {
    /// JSON experiment config; missing fields take defaults
    #[arg(long)]
    pub config: Option<String>,

    /// Profiling traces per key (default 100)
    #[arg(long)]
    pub traces_per_key: Option<usize>,

    /// Samples per trace (default 50)
    #[arg(long)]
    pub samples: Option<usize>,

    /// Number of profiled keys, 0..N (default 256)
    #[arg(long)]
    pub keys: Option<u16>,

    /// Secret key the attacked trace is generated under (default 225)
    #[arg(long)]
    pub true_key: Option<u16>,

    /// RNG seed for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Scorer: nearest_mean (default, squared distance) or gaussian (log-likelihood)
    #[arg(long, value_parser = ["nearest_mean", "gaussian"])]
    pub scorer: Option<String>,

    /// Simulated leakage per unit of key value (default 0.1)
    #[arg(long)]
    pub leakage_scale: Option<f64>,

    /// Simulated noise standard deviation (default 0.05)
    #[arg(long)]
    pub noise: Option<f64>,

    /// Ranked candidates shown in the summary (default 5)
    #[arg(long)]
    pub top: Option<usize>,
}

/// Merge the optional config file with command-line overrides.
pub fn resolve_config(args: &ExperimentArgs) -> Result<ExperimentConfig, TemplarError> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_json_file(Path::new(path))?,
        None => ExperimentConfig::default(),
    };
    if let Some(v) = args.traces_per_key {
        config.num_traces_per_key = v;
    }
    if let Some(v) = args.samples {
        config.num_samples = v;
    }
    if let Some(v) = args.keys {
        config.num_hypotheses = v;
    }
    if let Some(v) = args.true_key {
        config.true_key = v;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(s) = &args.scorer {
        config.scorer = s.parse::<Scorer>()?;
    }
    if let Some(v) = args.leakage_scale {
        config.leakage_scale = v;
    }
    if let Some(v) = args.noise {
        config.noise_std_dev = v;
    }
    if let Some(v) = args.top {
        config.top = v;
    }
    config.validate()?;
    log::debug!("resolved experiment config: {config:?}");
    Ok(config)
}

/// Resolve the config or exit with status 1.
pub fn config_or_exit(args: &ExperimentArgs) -> ExperimentConfig {
    resolve_config(args).unwrap_or_else(|e| fail(e))
}

/// Print an error and exit with status 1.
pub fn fail(e: TemplarError) -> ! {
    eprintln!("Error: {e}");
    std::process::exit(1);
}

pub fn print_config(config: &ExperimentConfig) {
    println!(
        "  keys: 0..{}   traces/key: {}   samples: {}   scorer: {}",
        config.num_hypotheses, config.num_traces_per_key, config.num_samples, config.scorer
    );
    println!(
        "  leakage: {} x key + N(0, {}²)   seed: {}",
        config.leakage_scale,
        config.noise_std_dev,
        config
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "os".to_string())
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let config = resolve_config(&ExperimentArgs::default()).unwrap();
        assert_eq!(config, ExperimentConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let args = ExperimentArgs {
            traces_per_key: Some(3),
            samples: Some(9),
            keys: Some(16),
            true_key: Some(4),
            seed: Some(1),
            scorer: Some("gaussian".to_string()),
            ..ExperimentArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.num_traces_per_key, 3);
        assert_eq!(config.num_samples, 9);
        assert_eq!(config.num_hypotheses, 16);
        assert_eq!(config.true_key, 4);
        assert_eq!(config.seed, Some(1));
        assert_eq!(config.scorer, Scorer::GaussianLogLikelihood);
    }

    #[test]
    fn flags_override_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("exp.json");
        std::fs::write(&path, r#"{"num_samples": 7, "true_key": 3, "seed": 11}"#).unwrap();
        let args = ExperimentArgs {
            config: Some(path.to_string_lossy().into_owned()),
            true_key: Some(5),
            ..ExperimentArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.num_samples, 7);
        assert_eq!(config.true_key, 5);
        assert_eq!(config.seed, Some(11));
    }

    #[test]
    fn zero_traces_is_invalid() {
        let args = ExperimentArgs {
            traces_per_key: Some(0),
            ..ExperimentArgs::default()
        };
        assert!(matches!(
            resolve_config(&args),
            Err(TemplarError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn true_key_must_be_profiled() {
        let args = ExperimentArgs {
            keys: Some(8),
            ..ExperimentArgs::default()
        };
        // Default true key 225 lies outside 0..8.
        assert!(resolve_config(&args).is_err());
    }
}
