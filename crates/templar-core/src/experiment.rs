//! Experiment driver: simulated profiling, attack and success-rate bench.
//!
//! An [`Experiment`] owns a seeded [`GaussianLeakageSource`] and the
//! [`TemplateStore`] profiled from it. The build phase runs entirely inside
//! [`Experiment::profile`]; every attack afterwards only reads the store.
//!
//! # Output files
//!
//! - report JSON: [`ExperimentReport`] / [`BenchReport`] via `serde_json`
//! - plot CSV: `sample,template_mean,test_trace`, one row per sample

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TemplarError};
use crate::matcher::{Guess, Ranking, Scorer, rank};
use crate::source::{DEFAULT_LEAKAGE_SCALE, DEFAULT_NOISE_STD_DEV, GaussianLeakageSource};
use crate::template::{
    DEFAULT_NUM_SAMPLES, DEFAULT_TRACES_PER_KEY, ProfilingConfig, TemplateStore, build_templates,
};
use crate::trace::{Hypothesis, HypothesisSpace, Trace};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything needed to reproduce one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub num_traces_per_key: usize,
    pub num_samples: usize,
    /// Profile hypotheses `0..num_hypotheses`.
    pub num_hypotheses: u16,
    /// The secret the attacked trace is generated under.
    pub true_key: u16,
    /// RNG seed. `None` seeds from the OS and the run is not reproducible.
    pub seed: Option<u64>,
    pub scorer: Scorer,
    pub leakage_scale: f64,
    pub noise_std_dev: f64,
    /// How many ranked hypotheses to keep in the report.
    pub top: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            num_traces_per_key: DEFAULT_TRACES_PER_KEY,
            num_samples: DEFAULT_NUM_SAMPLES,
            num_hypotheses: 256,
            true_key: 225,
            seed: None,
            scorer: Scorer::NearestMean,
            leakage_scale: DEFAULT_LEAKAGE_SCALE,
            noise_std_dev: DEFAULT_NOISE_STD_DEV,
            top: 5,
        }
    }
}

impl ExperimentConfig {
    /// Load a config from JSON. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn profiling(&self) -> ProfilingConfig {
        ProfilingConfig::new(self.num_traces_per_key, self.num_samples)
    }

    pub fn space(&self) -> HypothesisSpace {
        HypothesisSpace::range(self.num_hypotheses)
    }

    pub fn validate(&self) -> Result<()> {
        self.profiling().validate()?;
        if self.num_hypotheses == 0 {
            return Err(TemplarError::config("num_hypotheses must be >= 1"));
        }
        if self.true_key >= self.num_hypotheses {
            return Err(TemplarError::config(format!(
                "true_key {} is outside the hypothesis space 0..{}",
                self.true_key, self.num_hypotheses
            )));
        }
        Ok(())
    }

    fn source(&self) -> Result<GaussianLeakageSource<StdRng>> {
        let source = match self.seed {
            Some(seed) => GaussianLeakageSource::seeded(seed),
            None => GaussianLeakageSource::from_os_rng(),
        };
        source
            .with_leakage_scale(self.leakage_scale)?
            .with_noise_std_dev(self.noise_std_dev)
    }
}

// ---------------------------------------------------------------------------
// Experiment
// ---------------------------------------------------------------------------

/// Result of attacking one freshly generated trace.
#[derive(Debug, Clone)]
pub struct AttackOutcome {
    pub true_key: Hypothesis,
    pub trace: Trace,
    pub guess: Guess,
    pub ranking: Ranking,
}

impl AttackOutcome {
    pub fn success(&self) -> bool {
        self.guess.hypothesis == self.true_key
    }

    /// Position of the true key in the ranking (0 = recovered).
    pub fn key_rank(&self) -> usize {
        self.ranking
            .rank_of(self.true_key)
            .unwrap_or(self.ranking.len())
    }
}

/// A profiled simulated device, ready to be attacked.
pub struct Experiment {
    config: ExperimentConfig,
    space: HypothesisSpace,
    source: GaussianLeakageSource<StdRng>,
    store: TemplateStore,
    profiling_ms: u64,
}

impl Experiment {
    /// Validate `config` and run the build phase.
    pub fn profile(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;
        let space = config.space();
        let mut source = config.source()?;

        let t0 = Instant::now();
        let store = build_templates(&config.profiling(), &space, &mut source)?;
        let profiling_ms = t0.elapsed().as_millis() as u64;

        Ok(Self {
            config,
            space,
            source,
            store,
            profiling_ms,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Generate one unknown trace under `true_key` and attack it.
    pub fn attack(&mut self, true_key: Hypothesis) -> Result<AttackOutcome> {
        if !self.space.contains(true_key) {
            return Err(TemplarError::config(format!(
                "true key {true_key} is not a profiled hypothesis"
            )));
        }
        let trace = self.source.trace(true_key, self.config.num_samples);
        let ranking = rank(&self.store, &trace, self.config.scorer)?;
        let guess = ranking.best().ok_or(TemplarError::EmptyTemplateStore)?;
        log::debug!(
            "true key {true_key}: guessed {} (score {:.6})",
            guess.hypothesis,
            guess.score
        );
        Ok(AttackOutcome {
            true_key,
            trace,
            guess,
            ranking,
        })
    }

    /// Attack `trials` traces under keys drawn uniformly from the space.
    pub fn bench(&mut self, trials: usize) -> Result<BenchReport> {
        if trials == 0 {
            return Err(TemplarError::config("trials must be >= 1"));
        }
        let t0 = Instant::now();
        let mut outcomes = Vec::with_capacity(trials);
        for _ in 0..trials {
            let idx = self.source.rng_mut().random_range(0..self.space.len());
            let key = self.space.as_slice()[idx];
            let outcome = self.attack(key)?;
            outcomes.push(TrialOutcome {
                true_key: outcome.true_key,
                guess: outcome.guess.hypothesis,
                key_rank: outcome.key_rank(),
            });
        }

        let successes = outcomes.iter().filter(|o| o.true_key == o.guess).count();
        let mean_key_rank =
            outcomes.iter().map(|o| o.key_rank as f64).sum::<f64>() / trials as f64;
        log::info!("bench: {successes}/{trials} keys recovered");

        Ok(BenchReport {
            id: Uuid::new_v4().to_string(),
            config: self.config.clone(),
            trials,
            successes,
            success_rate: successes as f64 / trials as f64,
            mean_key_rank,
            profiling_ms: self.profiling_ms,
            attack_ms: t0.elapsed().as_millis() as u64,
            outcomes,
            templar_version: crate::VERSION.to_string(),
        })
    }

    /// Attack the configured true key and summarize the run.
    pub fn report(&mut self) -> Result<ExperimentReport> {
        let t0 = Instant::now();
        let outcome = self.attack(Hypothesis(self.config.true_key))?;
        let attack_ms = t0.elapsed().as_millis() as u64;

        let template_mean = self
            .store
            .get(outcome.true_key)
            .map(|t| t.mean().to_vec())
            .unwrap_or_default();

        Ok(ExperimentReport {
            id: Uuid::new_v4().to_string(),
            config: self.config.clone(),
            true_key: outcome.true_key,
            guess: outcome.guess,
            success: outcome.success(),
            key_rank: outcome.key_rank(),
            top: outcome.ranking.top(self.config.top).to_vec(),
            test_trace: outcome.trace.into_samples(),
            template_mean,
            num_templates: self.store.len(),
            profiling_ms: self.profiling_ms,
            attack_ms,
            templar_version: crate::VERSION.to_string(),
        })
    }
}

/// Profile, then attack the configured true key once.
pub fn run_experiment(config: ExperimentConfig) -> Result<ExperimentReport> {
    Experiment::profile(config)?.report()
}

/// Profile once, then attack `trials` random keys.
pub fn run_bench(config: ExperimentConfig, trials: usize) -> Result<BenchReport> {
    if trials == 0 {
        return Err(TemplarError::config("trials must be >= 1"));
    }
    Experiment::profile(config)?.bench(trials)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Summary of a single attack, including plot-ready vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub id: String,
    pub config: ExperimentConfig,
    pub true_key: Hypothesis,
    pub guess: Guess,
    pub success: bool,
    pub key_rank: usize,
    pub top: Vec<Guess>,
    pub test_trace: Vec<f64>,
    /// Template mean of the true key, for plotting against `test_trace`.
    pub template_mean: Vec<f64>,
    pub num_templates: usize,
    pub profiling_ms: u64,
    pub attack_ms: u64,
    pub templar_version: String,
}

impl ExperimentReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }

    /// Write `sample,template_mean,test_trace` rows.
    pub fn write_plot_csv(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        writeln!(w, "sample,template_mean,test_trace")?;
        for (i, (m, x)) in self.template_mean.iter().zip(&self.test_trace).enumerate() {
            writeln!(w, "{i},{m},{x}")?;
        }
        w.flush()?;
        Ok(())
    }
}

/// One bench trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub true_key: Hypothesis,
    pub guess: Hypothesis,
    pub key_rank: usize,
}

/// Success rate over repeated attacks against one template store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub id: String,
    pub config: ExperimentConfig,
    pub trials: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub mean_key_rank: f64,
    pub profiling_ms: u64,
    pub attack_ms: u64,
    pub outcomes: Vec<TrialOutcome>,
    pub templar_version: String,
}

impl BenchReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        write_json(self, path)
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
