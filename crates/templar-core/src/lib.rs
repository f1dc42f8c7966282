//! # templar-core
//!
//! **Profiling-based side-channel key recovery.**
//!
//! `templar-core` builds per-hypothesis statistical templates from labeled
//! leakage traces and classifies an unknown trace against them to recover a
//! secret value such as one key byte.
//!
//! ## Quick Start
//!
//! ```no_run
//! use templar_core::{
//!     GaussianLeakageSource, Hypothesis, HypothesisSpace, ProfilingConfig, attack,
//!     build_templates,
//! };
//!
//! let mut source = GaussianLeakageSource::seeded(1);
//! let store = build_templates(
//!     &ProfilingConfig::new(100, 50),
//!     &HypothesisSpace::byte(),
//!     &mut source,
//! )?;
//!
//! let unknown = source.trace(Hypothesis(225), 50);
//! let guess = attack(&store, &unknown)?;
//! println!("guessed key {}", guess.hypothesis);
//! # Ok::<(), templar_core::TemplarError>(())
//! ```
//!
//! ## Architecture
//!
//! Trace source → Template builder → Template store → Matcher → Guess
//!
//! Two scoring modes:
//! - **NearestMean** (default): squared distance to each template mean.
//! - **GaussianLogLikelihood**: per-sample normal likelihood using the
//!   template variance as well.
//!
//! Every source implements the [`TraceSource`] trait. The store is an
//! immutable value passed explicitly from the builder to the matcher.

pub mod error;
pub mod experiment;
pub mod matcher;
pub mod source;
pub mod template;
pub mod trace;

pub use error::{Result, TemplarError};
pub use experiment::{
    AttackOutcome, BenchReport, Experiment, ExperimentConfig, ExperimentReport, TrialOutcome,
    run_bench, run_experiment,
};
pub use matcher::{Guess, Ranking, Scorer, VARIANCE_FLOOR, attack, attack_with, rank};
pub use source::{GaussianLeakageSource, TraceSource};
pub use template::{ProfilingConfig, Template, TemplateStore, build_templates};
pub use trace::{Hypothesis, HypothesisSpace, Trace, TraceSet};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
