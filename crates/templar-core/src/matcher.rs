//! Attack phase: score an unknown trace against every template.
//!
//! Two scorers are available, both "lower is better":
//! - [`Scorer::NearestMean`] (default): squared Euclidean distance between the
//!   trace and the template mean. Variance is ignored.
//! - [`Scorer::GaussianLogLikelihood`]: negated sum of per-sample univariate
//!   normal log-densities using the template mean and variance.
//!
//! The winner is found with a single scan in ascending hypothesis order using
//! strict `<`, so on a tie the lowest hypothesis keeps the win.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

use crate::error::{Result, TemplarError};
use crate::template::{Template, TemplateStore};
use crate::trace::{Hypothesis, Trace};

/// Smallest variance the Gaussian scorer will use. Templates built from a
/// single trace have zero variance everywhere.
pub const VARIANCE_FLOOR: f64 = 1e-12;

/// How a trace is scored against a template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// Squared distance to the template mean.
    #[default]
    NearestMean,
    /// Independent per-sample Gaussian log-likelihood, negated.
    #[serde(alias = "gaussian")]
    GaussianLogLikelihood,
}

impl Scorer {
    /// Score `trace` against `template`. Lengths must already match.
    pub fn score(self, template: &Template, trace: &[f64]) -> f64 {
        match self {
            Self::NearestMean => squared_distance(template.mean(), trace),
            Self::GaussianLogLikelihood => gaussian_nll(template, trace),
        }
    }
}

impl std::fmt::Display for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NearestMean => write!(f, "nearest_mean"),
            Self::GaussianLogLikelihood => write!(f, "gaussian"),
        }
    }
}

impl std::str::FromStr for Scorer {
    type Err = TemplarError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest_mean" | "nearest-mean" | "euclidean" => Ok(Self::NearestMean),
            "gaussian" | "gaussian_log_likelihood" | "likelihood" => {
                Ok(Self::GaussianLogLikelihood)
            }
            _ => Err(TemplarError::config(format!("unknown scorer '{s}'"))),
        }
    }
}

/// Sum of squared elementwise differences.
pub fn squared_distance(mean: &[f64], trace: &[f64]) -> f64 {
    mean.iter()
        .zip(trace)
        .map(|(&m, &x)| {
            let d = x - m;
            d * d
        })
        .sum()
}

fn gaussian_nll(template: &Template, trace: &[f64]) -> f64 {
    let mut log_likelihood = 0.0;
    for ((&x, &m), &v) in trace.iter().zip(template.mean()).zip(template.variance()) {
        match Normal::new(m, v.max(VARIANCE_FLOOR).sqrt()) {
            Ok(normal) => log_likelihood += normal.ln_pdf(x),
            Err(_) => return f64::NAN,
        }
    }
    -log_likelihood
}

// NaN sorts after everything, including +inf.
fn sort_key(score: f64) -> f64 {
    if score.is_nan() { f64::INFINITY } else { score }
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    sort_key(a)
        .partial_cmp(&sort_key(b))
        .unwrap_or(Ordering::Equal)
}

/// The hypothesis that best explains a trace, with its winning score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    pub hypothesis: Hypothesis,
    pub score: f64,
}

fn check_inputs(store: &TemplateStore, trace: &Trace) -> Result<()> {
    if store.is_empty() {
        return Err(TemplarError::EmptyTemplateStore);
    }
    if trace.len() != store.num_samples() {
        return Err(TemplarError::length(store.num_samples(), trace.len()));
    }
    Ok(())
}

/// Best hypothesis under the default nearest-mean scorer.
pub fn attack(store: &TemplateStore, trace: &Trace) -> Result<Guess> {
    attack_with(store, trace, Scorer::NearestMean)
}

/// Best hypothesis under `scorer`.
///
/// Fails with [`TemplarError::EmptyTemplateStore`] or
/// [`TemplarError::InvalidInput`] before any template is scored.
pub fn attack_with(store: &TemplateStore, trace: &Trace, scorer: Scorer) -> Result<Guess> {
    check_inputs(store, trace)?;

    let mut best: Option<Guess> = None;
    for (hypothesis, template) in store.iter() {
        let score = scorer.score(template, trace.samples());
        let wins = match best {
            None => true,
            Some(b) => compare_scores(score, b.score) == Ordering::Less,
        };
        if wins {
            best = Some(Guess { hypothesis, score });
        }
    }
    // check_inputs guarantees at least one template.
    best.ok_or(TemplarError::EmptyTemplateStore)
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Every hypothesis sorted by ascending score.
///
/// Ties keep ascending hypothesis order, so `entries()[0]` is always the
/// same hypothesis [`attack_with`] picks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub scorer: Scorer,
    entries: Vec<Guess>,
}

impl Ranking {
    pub fn entries(&self) -> &[Guess] {
        &self.entries
    }

    /// The winning hypothesis. `None` only for a ranking with no entries,
    /// which [`rank`] never produces.
    pub fn best(&self) -> Option<Guess> {
        self.entries.first().copied()
    }

    /// The `n` best-scoring hypotheses (fewer if the store is smaller).
    pub fn top(&self, n: usize) -> &[Guess] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// 0-based position of `hypothesis`, i.e. its key rank.
    pub fn rank_of(&self, hypothesis: Hypothesis) -> Option<usize> {
        self.entries.iter().position(|g| g.hypothesis == hypothesis)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Score every template and sort the hypotheses best-first.
pub fn rank(store: &TemplateStore, trace: &Trace, scorer: Scorer) -> Result<Ranking> {
    check_inputs(store, trace)?;

    let mut entries: Vec<Guess> = store
        .iter()
        .map(|(hypothesis, template)| Guess {
            hypothesis,
            score: scorer.score(template, trace.samples()),
        })
        .collect();
    // Stable: equal scores stay in ascending hypothesis order.
    entries.sort_by(|a, b| compare_scores(a.score, b.score));

    Ok(Ranking { scorer, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_store() -> TemplateStore {
        TemplateStore::from_templates((0..3u16).map(|h| {
            let v = f64::from(h);
            (Hypothesis(h), Template::from_mean(vec![v, v]).unwrap())
        }))
        .unwrap()
    }

    #[test]
    fn exact_match_wins_with_zero_distance() {
        let guess = attack(&diagonal_store(), &Trace::new(vec![1.0, 1.0])).unwrap();
        assert_eq!(guess.hypothesis, Hypothesis(1));
        assert_eq!(guess.score, 0.0);
    }

    #[test]
    fn nearest_mean_distances() {
        let store = diagonal_store();
        let trace = Trace::new(vec![0.4, 0.4]);
        let ranking = rank(&store, &trace, Scorer::NearestMean).unwrap();
        let score_of = |h| {
            ranking
                .entries()
                .iter()
                .find(|g| g.hypothesis == Hypothesis(h))
                .unwrap()
                .score
        };
        assert!((score_of(0) - 0.32).abs() < 1e-12);
        assert!((score_of(1) - 0.72).abs() < 1e-12);
        assert!((score_of(2) - 5.12).abs() < 1e-12);

        let guess = attack(&store, &trace).unwrap();
        assert_eq!(guess.hypothesis, Hypothesis(0));
        assert!((guess.score - 0.32).abs() < 1e-12);
    }

    #[test]
    fn ties_keep_lowest_hypothesis() {
        let store = TemplateStore::from_templates([
            (Hypothesis(9), Template::from_mean(vec![0.5, 0.5]).unwrap()),
            (Hypothesis(4), Template::from_mean(vec![0.5, 0.5]).unwrap()),
            (Hypothesis(7), Template::from_mean(vec![3.0, 3.0]).unwrap()),
        ])
        .unwrap();
        let trace = Trace::new(vec![0.5, 0.5]);
        assert_eq!(attack(&store, &trace).unwrap().hypothesis, Hypothesis(4));

        let ranking = rank(&store, &trace, Scorer::NearestMean).unwrap();
        let order: Vec<_> = ranking.entries().iter().map(|g| g.hypothesis).collect();
        assert_eq!(order, vec![Hypothesis(4), Hypothesis(9), Hypothesis(7)]);
    }

    #[test]
    fn repeated_attacks_agree() {
        let store = diagonal_store();
        let trace = Trace::new(vec![1.7, 0.2]);
        let first = attack(&store, &trace).unwrap();
        for _ in 0..10 {
            assert_eq!(attack(&store, &trace).unwrap(), first);
        }
    }

    #[test]
    fn length_mismatch_is_invalid_input() {
        let err = attack(&diagonal_store(), &Trace::new(vec![1.0, 1.0, 1.0])).unwrap_err();
        assert_eq!(err, TemplarError::length(2, 3));
        assert!(rank(&diagonal_store(), &Trace::new(vec![1.0]), Scorer::NearestMean).is_err());
    }

    #[test]
    fn empty_store_is_rejected() {
        let store = TemplateStore::from_templates(std::iter::empty()).unwrap();
        let err = attack(&store, &Trace::new(vec![1.0])).unwrap_err();
        assert_eq!(err, TemplarError::EmptyTemplateStore);
    }

    #[test]
    fn nan_scores_never_win() {
        let store = TemplateStore::from_templates([
            (Hypothesis(0), Template::from_mean(vec![f64::NAN]).unwrap()),
            (Hypothesis(1), Template::from_mean(vec![100.0]).unwrap()),
        ])
        .unwrap();
        let guess = attack(&store, &Trace::new(vec![0.0])).unwrap();
        assert_eq!(guess.hypothesis, Hypothesis(1));
    }

    #[test]
    fn gaussian_uses_variance() {
        // Trace sits 1.0 from both means; the wide template explains it better.
        let store = TemplateStore::from_templates([
            (
                Hypothesis(0),
                Template::from_parts(vec![0.0], vec![0.01], 10).unwrap(),
            ),
            (
                Hypothesis(1),
                Template::from_parts(vec![2.0], vec![1.0], 10).unwrap(),
            ),
        ])
        .unwrap();
        let trace = Trace::new(vec![1.0]);
        assert_eq!(
            attack(&store, &trace).unwrap().hypothesis,
            Hypothesis(0),
            "nearest-mean ties and keeps the lower hypothesis"
        );
        let guess = attack_with(&store, &trace, Scorer::GaussianLogLikelihood).unwrap();
        assert_eq!(guess.hypothesis, Hypothesis(1));
    }

    #[test]
    fn gaussian_handles_zero_variance() {
        let guess = attack_with(
            &diagonal_store(),
            &Trace::new(vec![2.0, 2.0]),
            Scorer::GaussianLogLikelihood,
        )
        .unwrap();
        assert_eq!(guess.hypothesis, Hypothesis(2));
        assert!(guess.score.is_finite());
    }

    #[test]
    fn ranking_agrees_with_attack() {
        let store = diagonal_store();
        let trace = Trace::new(vec![1.9, 2.2]);
        for scorer in [Scorer::NearestMean, Scorer::GaussianLogLikelihood] {
            let ranking = rank(&store, &trace, scorer).unwrap();
            assert_eq!(
                ranking.best(),
                Some(attack_with(&store, &trace, scorer).unwrap())
            );
            assert_eq!(ranking.rank_of(Hypothesis(2)), Some(0));
            assert_eq!(ranking.len(), 3);
            assert_eq!(ranking.top(10).len(), 3);
            assert!(
                ranking
                    .entries()
                    .windows(2)
                    .all(|w| w[0].score <= w[1].score)
            );
        }
    }

    #[test]
    fn scorer_parsing() {
        assert_eq!("nearest_mean".parse::<Scorer>().unwrap(), Scorer::NearestMean);
        assert_eq!(
            "gaussian".parse::<Scorer>().unwrap(),
            Scorer::GaussianLogLikelihood
        );
        assert!("bayes".parse::<Scorer>().is_err());
        assert_eq!(Scorer::default(), Scorer::NearestMean);
    }
}
