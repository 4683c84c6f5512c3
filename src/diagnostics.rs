/*!
Validators that turn posterior summaries into pass/fail reports.

- [`dist_validator`]: picks one run as the reference and checks, for every run, which fraction
  of parameters has a posterior mean within `±3` reference MCSEs of the reference mean.
- [`rhat_validator`]: checks every run's largest R-hat against a threshold.

Both reports implement [`Display`](std::fmt::Display) for printing.
*/

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::posterior::Posterior;
use crate::stats::{summarize, Summary};

/// Tolerance of the mean check, in reference MCSEs.
pub const MCSE_TOLERANCE: f64 = 3.0;
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.95;
pub const DEFAULT_RHAT_THRESHOLD: f64 = 1.05;

/// Outcome of [`dist_validator`].
#[derive(Debug, Clone)]
pub struct DistReport {
    /// Key of the run every other run was compared against.
    pub reference: String,
    pub pass_rates: BTreeMap<String, f64>,
    pub summaries: BTreeMap<String, Vec<Summary>>,
    pub pass_threshold: f64,
}

impl DistReport {
    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    /// Whether run `key` passed, if it exists.
    pub fn passed(&self, key: &str) -> Option<bool> {
        self.pass_rates
            .get(key)
            .map(|&rate| rate >= self.pass_threshold)
    }
}

impl fmt::Display for DistReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Posterior means vs reference `{}`", self.reference)?;
        for (key, rate) in &self.pass_rates {
            let mark = if *rate >= self.pass_threshold { "✅" } else { "❌" };
            writeln!(f, "  {key:<32} pass rate {rate:>5.2} {mark}")?;
        }
        Ok(())
    }
}

/// Fraction of reference parameters whose mean in `run` lies within
/// `ref.mean ± 3·ref.mcse_mean`. Parameters absent from `run` count as failures.
pub fn pass_rate(run: &[Summary], reference: &[Summary]) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let passed = reference
        .iter()
        .filter(|r| {
            run.iter().find(|s| s.name == r.name).is_some_and(|s| {
                (s.mean - r.mean).abs() <= MCSE_TOLERANCE * r.mcse_mean
            })
        })
        .count();
    passed as f64 / reference.len() as f64
}

/// Compares every run against a reference run chosen uniformly at random with `seed`.
///
/// # Errors
///
/// Fails when `posteriors` is empty.
pub fn dist_validator(posteriors: &BTreeMap<String, Posterior>, seed: u64) -> Result<DistReport> {
    if posteriors.is_empty() {
        return Err(Error::MissingReference(
            "no runs to choose a reference from".to_string(),
        ));
    }
    let idx = SmallRng::seed_from_u64(seed).gen_range(0..posteriors.len());
    let reference = posteriors
        .keys()
        .nth(idx)
        .cloned()
        .ok_or_else(|| Error::MissingReference(format!("index {idx}")))?;
    dist_validator_against(posteriors, &reference)
}

/// Like [`dist_validator`] with an explicit reference key.
pub fn dist_validator_against(
    posteriors: &BTreeMap<String, Posterior>,
    reference: &str,
) -> Result<DistReport> {
    let summaries: BTreeMap<String, Vec<Summary>> = posteriors
        .iter()
        .map(|(key, posterior)| (key.clone(), summarize(posterior)))
        .collect();
    let ref_summary = summaries
        .get(reference)
        .ok_or_else(|| Error::MissingReference(reference.to_string()))?;

    let pass_rates = summaries
        .iter()
        .map(|(key, summary)| (key.clone(), pass_rate(summary, ref_summary)))
        .collect();

    Ok(DistReport {
        reference: reference.to_string(),
        pass_rates,
        summaries,
        pass_threshold: DEFAULT_PASS_THRESHOLD,
    })
}

/// Outcome of [`rhat_validator`].
#[derive(Debug, Clone, PartialEq)]
pub struct RhatReport {
    pub threshold: f64,
    /// Largest R-hat of each run; NaN when none is defined.
    pub max_rhat: BTreeMap<String, f64>,
}

impl RhatReport {
    pub fn passed(&self, key: &str) -> Option<bool> {
        self.max_rhat.get(key).map(|&r| r < self.threshold)
    }

    pub fn all_passed(&self) -> bool {
        self.max_rhat.values().all(|&r| r < self.threshold)
    }
}

impl fmt::Display for RhatReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Max R-hat (threshold {:.2})", self.threshold)?;
        for (key, rhat) in &self.max_rhat {
            let mark = if *rhat < self.threshold { "✅" } else { "❌" };
            writeln!(f, "  {key:<32} {rhat:>7.4} {mark}")?;
        }
        Ok(())
    }
}

pub fn rhat_validator(summaries: &BTreeMap<String, Vec<Summary>>, threshold: f64) -> RhatReport {
    let max_rhat = summaries
        .iter()
        .map(|(key, rows)| {
            let max = rows.iter().map(|s| s.r_hat).fold(f64::NAN, f64::max);
            (key.clone(), max)
        })
        .collect();
    RhatReport {
        threshold,
        max_rhat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use rand::prelude::*;
    use rand_distr::StandardNormal;

    fn posterior(shift: f64, seed: u64) -> Posterior {
        let mut rng = SmallRng::seed_from_u64(seed);
        let draws = Array3::from_shape_simple_fn((2, 500, 2), || {
            shift + rng.sample::<f64, _>(StandardNormal)
        });
        Posterior::new(vec!["a".to_string(), "b".to_string()], draws).unwrap()
    }

    fn summary(name: &str, mean: f64, mcse: f64) -> Summary {
        Summary {
            name: name.to_string(),
            mean,
            sd: 1.0,
            mcse_mean: mcse,
            ess_mean: 100.0,
            ess_tail: 100.0,
            r_hat: 1.0,
        }
    }

    #[test]
    fn test_identical_means_pass_fully() {
        let runs: BTreeMap<String, Posterior> = [
            ("lib_a_10".to_string(), posterior(0.0, 1)),
            ("lib_b_10".to_string(), posterior(0.0, 1)),
        ]
        .into();
        let report = dist_validator(&runs, 3).unwrap();
        assert_eq!(report.pass_rates["lib_a_10"], 1.0);
        assert_eq!(report.pass_rates["lib_b_10"], 1.0);
        assert_eq!(report.passed("lib_a_10"), Some(true));
    }

    #[test]
    fn test_shifted_run_fails() {
        let runs: BTreeMap<String, Posterior> = [
            ("good".to_string(), posterior(0.0, 1)),
            ("shifted".to_string(), posterior(5.0, 2)),
        ]
        .into();
        let report = dist_validator_against(&runs, "good").unwrap();
        assert_eq!(report.pass_rates["good"], 1.0);
        assert_eq!(report.pass_rates["shifted"], 0.0);
        assert!(report.to_string().contains("❌"));
    }

    #[test]
    fn test_reference_choice_is_seeded() {
        let runs: BTreeMap<String, Posterior> = (0..5)
            .map(|i| (format!("run_{i}"), posterior(0.0, i)))
            .collect();
        let a = dist_validator(&runs, 11).unwrap().reference;
        let b = dist_validator(&runs, 11).unwrap().reference;
        assert_eq!(a, b);
        assert!(runs.contains_key(&a));
    }

    #[test]
    fn test_missing_parameter_fails() {
        let reference = vec![summary("a", 0.0, 0.1), summary("b", 0.0, 0.1)];
        let run = vec![summary("a", 0.05, 0.1)];
        assert_eq!(pass_rate(&run, &reference), 0.5);
    }

    #[test]
    fn test_empty_and_unknown_reference() {
        let empty = BTreeMap::new();
        assert!(matches!(
            dist_validator(&empty, 0),
            Err(Error::MissingReference(_))
        ));
        let runs: BTreeMap<String, Posterior> = [("x".to_string(), posterior(0.0, 1))].into();
        assert!(dist_validator_against(&runs, "y").is_err());
    }

    #[test]
    fn test_rhat_validator() {
        let mut bad = summary("a", 0.0, 0.1);
        bad.r_hat = 1.2;
        let summaries: BTreeMap<String, Vec<Summary>> = [
            ("ok".to_string(), vec![summary("a", 0.0, 0.1)]),
            ("bad".to_string(), vec![summary("b", 0.0, 0.1), bad]),
        ]
        .into();
        let report = rhat_validator(&summaries, DEFAULT_RHAT_THRESHOLD);
        assert_eq!(report.max_rhat["bad"], 1.2);
        assert_eq!(report.passed("ok"), Some(true));
        assert_eq!(report.passed("bad"), Some(false));
        assert!(!report.all_passed());
        assert!(report.to_string().contains("bad"));
    }
}
