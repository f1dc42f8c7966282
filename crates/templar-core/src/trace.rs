//! Trace data model.
//!
//! A [`Trace`] is one time series of leakage samples, a [`TraceSet`] is a batch
//! of equal-length traces captured under one [`Hypothesis`], and a
//! [`HypothesisSpace`] enumerates the candidate secret values to profile.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TemplarError};

/// A candidate value for the secret being recovered (e.g. one key byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hypothesis(pub u16);

impl Hypothesis {
    /// The hypothesis as a plain integer.
    pub fn value(self) -> u16 {
        self.0
    }
}

impl From<u8> for Hypothesis {
    fn from(v: u8) -> Self {
        Self(v as u16)
    }
}

impl From<u16> for Hypothesis {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Ordered, duplicate-free set of hypotheses to profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HypothesisSpaceFields")]
pub struct HypothesisSpace {
    values: Vec<Hypothesis>,
}

impl HypothesisSpace {
    /// All 256 values of one byte.
    pub fn byte() -> Self {
        Self::range(256)
    }

    /// Hypotheses `0..n`.
    pub fn range(n: u16) -> Self {
        Self {
            values: (0..n).map(Hypothesis).collect(),
        }
    }

    /// Arbitrary hypotheses, sorted ascending with duplicates removed.
    pub fn from_values(values: impl IntoIterator<Item = u16>) -> Self {
        let mut values: Vec<Hypothesis> = values.into_iter().map(Hypothesis).collect();
        values.sort_unstable();
        values.dedup();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, h: Hypothesis) -> bool {
        self.values.binary_search(&h).is_ok()
    }

    /// Iterate in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Hypothesis> + '_ {
        self.values.iter().copied()
    }

    pub fn as_slice(&self) -> &[Hypothesis] {
        &self.values
    }
}

impl Default for HypothesisSpace {
    fn default() -> Self {
        Self::byte()
    }
}

#[derive(Deserialize)]
struct HypothesisSpaceFields {
    values: Vec<u16>,
}

impl From<HypothesisSpaceFields> for HypothesisSpace {
    fn from(f: HypothesisSpaceFields) -> Self {
        Self::from_values(f.values)
    }
}

/// One measured (or simulated) leakage time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    samples: Vec<f64>,
}

impl Trace {
    pub fn new(samples: Vec<f64>) -> Self {
        Self { samples }
    }

    /// Number of samples (time points) in this trace.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f64> {
        self.samples
    }
}

impl From<Vec<f64>> for Trace {
    fn from(samples: Vec<f64>) -> Self {
        Self::new(samples)
    }
}

/// Traces captured under a single hypothesis, all of the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSet {
    hypothesis: Hypothesis,
    num_samples: usize,
    traces: Vec<Trace>,
}

impl TraceSet {
    /// Group traces for `hypothesis`.
    ///
    /// Fails with [`TemplarError::InvalidInput`] when the traces disagree on
    /// length, and with [`TemplarError::InvalidConfiguration`] when there are
    /// no traces or the traces have no samples.
    pub fn new(hypothesis: Hypothesis, traces: Vec<Trace>) -> Result<Self> {
        let num_samples = match traces.first() {
            Some(t) => t.len(),
            None => {
                return Err(TemplarError::config(format!(
                    "trace set for hypothesis {hypothesis} is empty"
                )));
            }
        };
        if num_samples == 0 {
            return Err(TemplarError::config(format!(
                "traces for hypothesis {hypothesis} have no samples"
            )));
        }
        if let Some(bad) = traces.iter().find(|t| t.len() != num_samples) {
            return Err(TemplarError::length(num_samples, bad.len()));
        }
        Ok(Self {
            hypothesis,
            num_samples,
            traces,
        })
    }

    pub fn hypothesis(&self) -> Hypothesis {
        self.hypothesis
    }

    /// Length shared by every trace in the set.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Number of traces.
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }
}
