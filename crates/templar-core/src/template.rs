//! Profiling: reduce labeled trace sets to per-hypothesis templates.
//!
//! Pipeline per hypothesis:
//! 1. Ask the [`TraceSource`] for `num_traces_per_key` traces
//! 2. Reduce them to an elementwise mean and population variance
//! 3. Drop the traces and keep only the [`Template`]
//!
//! The result is a [`TemplateStore`] covering the whole hypothesis space. A
//! store is never modified after it has been built.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplarError};
use crate::source::TraceSource;
use crate::trace::{Hypothesis, HypothesisSpace, TraceSet};

/// Default number of profiling traces per hypothesis.
pub const DEFAULT_TRACES_PER_KEY: usize = 100;
/// Default trace length.
pub const DEFAULT_NUM_SAMPLES: usize = 50;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Shape of one profiling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    /// Traces captured per hypothesis. Must be at least 1.
    pub num_traces_per_key: usize,
    /// Samples per trace. Must be at least 1.
    pub num_samples: usize,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            num_traces_per_key: DEFAULT_TRACES_PER_KEY,
            num_samples: DEFAULT_NUM_SAMPLES,
        }
    }
}

impl ProfilingConfig {
    pub fn new(num_traces_per_key: usize, num_samples: usize) -> Self {
        Self {
            num_traces_per_key,
            num_samples,
        }
    }

    /// Reject zero trace counts and zero-length traces.
    pub fn validate(&self) -> Result<()> {
        if self.num_traces_per_key < 1 {
            return Err(TemplarError::config("num_traces_per_key must be >= 1"));
        }
        if self.num_samples < 1 {
            return Err(TemplarError::config("num_samples must be >= 1"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// Summary statistics of the traces captured under one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateFields")]
pub struct Template {
    mean: Vec<f64>,
    variance: Vec<f64>,
    num_traces: usize,
}

impl Template {
    /// Reduce a trace set to its elementwise mean and population variance.
    pub fn from_trace_set(set: &TraceSet) -> Self {
        let n = set.num_samples();
        let count = set.len() as f64;

        let mut mean = vec![0.0; n];
        for trace in set.traces() {
            for (m, &x) in mean.iter_mut().zip(trace.samples()) {
                *m += x;
            }
        }
        for m in &mut mean {
            *m /= count;
        }

        let mut variance = vec![0.0; n];
        for trace in set.traces() {
            for ((v, &m), &x) in variance.iter_mut().zip(&mean).zip(trace.samples()) {
                let d = x - m;
                *v += d * d;
            }
        }
        for v in &mut variance {
            *v /= count;
        }

        Self {
            mean,
            variance,
            num_traces: set.len(),
        }
    }

    /// Template from precomputed statistics.
    ///
    /// Fails with [`TemplarError::InvalidInput`] if the two vectors differ in
    /// length, and with [`TemplarError::InvalidConfiguration`] if they are
    /// empty.
    pub fn from_parts(mean: Vec<f64>, variance: Vec<f64>, num_traces: usize) -> Result<Self> {
        if mean.is_empty() {
            return Err(TemplarError::config("template mean must not be empty"));
        }
        if variance.len() != mean.len() {
            return Err(TemplarError::InvalidInput {
                what: "variance length",
                expected: mean.len(),
                actual: variance.len(),
            });
        }
        Ok(Self {
            mean,
            variance,
            num_traces,
        })
    }

    /// Template with the given mean and an all-zero variance.
    pub fn from_mean(mean: Vec<f64>) -> Result<Self> {
        let variance = vec![0.0; mean.len()];
        Self::from_parts(mean, variance, 1)
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    /// Number of traces the statistics were computed from.
    pub fn num_traces(&self) -> usize {
        self.num_traces
    }

    pub fn num_samples(&self) -> usize {
        self.mean.len()
    }
}

// Deserialized templates go through `from_parts`.
#[derive(Deserialize)]
struct TemplateFields {
    mean: Vec<f64>,
    variance: Vec<f64>,
    num_traces: usize,
}

impl TryFrom<TemplateFields> for Template {
    type Error = TemplarError;

    fn try_from(f: TemplateFields) -> Result<Self> {
        Self::from_parts(f.mean, f.variance, f.num_traces)
    }
}

// ---------------------------------------------------------------------------
// Template store
// ---------------------------------------------------------------------------

/// Complete mapping from hypothesis to template, iterated in ascending
/// hypothesis order. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateStoreFields")]
pub struct TemplateStore {
    num_samples: usize,
    templates: BTreeMap<Hypothesis, Template>,
}

impl TemplateStore {
    /// Assemble a store from explicit templates.
    ///
    /// All templates must share one length. Duplicate hypotheses are rejected.
    /// An empty iterator yields an empty store, which the matcher refuses.
    pub fn from_templates(
        templates: impl IntoIterator<Item = (Hypothesis, Template)>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        let mut num_samples = None;
        for (h, t) in templates {
            let expected = *num_samples.get_or_insert(t.num_samples());
            if t.num_samples() != expected {
                return Err(TemplarError::length(expected, t.num_samples()));
            }
            if map.insert(h, t).is_some() {
                return Err(TemplarError::config(format!(
                    "duplicate template for hypothesis {h}"
                )));
            }
        }
        Ok(Self {
            num_samples: num_samples.unwrap_or(0),
            templates: map,
        })
    }

    /// Length of every template (0 for an empty store).
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, h: Hypothesis) -> Option<&Template> {
        self.templates.get(&h)
    }

    /// Iterate in ascending hypothesis order.
    pub fn iter(&self) -> impl Iterator<Item = (Hypothesis, &Template)> {
        self.templates.iter().map(|(&h, t)| (h, t))
    }

    pub fn hypotheses(&self) -> impl Iterator<Item = Hypothesis> + '_ {
        self.templates.keys().copied()
    }
}

#[derive(Deserialize)]
struct TemplateStoreFields {
    num_samples: usize,
    templates: BTreeMap<Hypothesis, Template>,
}

impl TryFrom<TemplateStoreFields> for TemplateStore {
    type Error = TemplarError;

    fn try_from(f: TemplateStoreFields) -> Result<Self> {
        let store = Self::from_templates(f.templates)?;
        if !store.is_empty() && store.num_samples != f.num_samples {
            return Err(TemplarError::length(f.num_samples, store.num_samples));
        }
        Ok(store)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Profile every hypothesis in `space` and return the complete store.
///
/// The source is called exactly once per hypothesis, in ascending order.
/// Configuration is validated before the source is touched; on any error no
/// store is returned.
pub fn build_templates<S: TraceSource + ?Sized>(
    config: &ProfilingConfig,
    space: &HypothesisSpace,
    source: &mut S,
) -> Result<TemplateStore> {
    config.validate()?;
    if space.is_empty() {
        return Err(TemplarError::config("hypothesis space is empty"));
    }

    log::info!(
        "profiling {} hypotheses ({} traces x {} samples each)",
        space.len(),
        config.num_traces_per_key,
        config.num_samples
    );

    let templates = space
        .iter()
        .map(|h| -> Result<(Hypothesis, Template)> {
            let set = source.generate(h, config.num_traces_per_key, config.num_samples)?;
            check_trace_set(config, h, &set)?;
            log::debug!("hypothesis {h}: reduced {} traces", set.len());
            Ok((h, Template::from_trace_set(&set)))
        })
        .collect::<Result<Vec<_>>>()?;

    let store = TemplateStore::from_templates(templates)?;
    log::info!("built {} templates", store.len());
    Ok(store)
}

fn check_trace_set(config: &ProfilingConfig, h: Hypothesis, set: &TraceSet) -> Result<()> {
    if set.hypothesis() != h {
        return Err(TemplarError::config(format!(
            "source returned traces for hypothesis {} when asked for {h}",
            set.hypothesis()
        )));
    }
    if set.len() != config.num_traces_per_key {
        return Err(TemplarError::InvalidInput {
            what: "trace count",
            expected: config.num_traces_per_key,
            actual: set.len(),
        });
    }
    if set.num_samples() != config.num_samples {
        return Err(TemplarError::length(config.num_samples, set.num_samples()));
    }
    Ok(())
}
