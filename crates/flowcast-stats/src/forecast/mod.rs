//! Delivery forecasting.
//!
//! The snapshot builder depends on the [`Forecaster`] trait only, so tests can
//! swap the Monte-Carlo sampler for a stub with a fixed answer. The
//! distribution type is shared by every implementation.

mod monte_carlo;

pub use monte_carlo::{DEFAULT_MAX_WEEKS_PER_TRIAL, DEFAULT_TRIALS, MonteCarloForecaster};

use serde::{Deserialize, Serialize};

use crate::lead_time::{mean, percentile_sorted, population_std_dev};

/// Estimates how many weeks it takes to burn through `remaining_scope` items
/// given a weekly throughput history.
pub trait Forecaster: Send + Sync {
    /// Run `trials` simulations. `seed` makes the result reproducible;
    /// implementations without randomness ignore it.
    fn simulate(
        &self,
        throughput_samples: &[u32],
        remaining_scope: u32,
        trials: u32,
        seed: u64,
    ) -> WeeksDistribution;
}

/// Weeks-to-done across all trials of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeksDistribution {
    known: bool,
    /// Per-trial outcomes, sorted ascending. Trials that never finished sit
    /// at the tail with the week cap as their value.
    weeks: Vec<u32>,
    /// Trials that hit the week cap before covering the scope.
    #[serde(default)]
    unfinished: u32,
}

impl WeeksDistribution {
    /// No usable history: nothing can be forecast. Every summary is zero and
    /// [`Self::is_known`] is false; callers must read this as maximal
    /// uncertainty, not as "done".
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            known: false,
            weeks: Vec::new(),
            unfinished: 0,
        }
    }

    /// Nothing left to deliver: every trial finishes in zero weeks.
    #[must_use]
    pub fn done(trials: u32) -> Self {
        Self::from_trials(vec![0; trials.max(1) as usize])
    }

    /// Build from raw per-trial week counts in any order. An empty list is
    /// [`Self::unknown`].
    #[must_use]
    pub fn from_trials(mut weeks: Vec<u32>) -> Self {
        if weeks.is_empty() {
            return Self::unknown();
        }
        weeks.sort_unstable();
        Self {
            known: true,
            weeks,
            unfinished: 0,
        }
    }

    /// Build from per-trial results where `None` is a trial that ran out of
    /// weeks. Those count as misses for every deadline and are reported at
    /// `cap` in the summaries. An empty list is [`Self::unknown`].
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<Option<u32>>, cap: u32) -> Self {
        let mut unfinished = 0_u32;
        let weeks: Vec<u32> = outcomes
            .into_iter()
            .map(|outcome| {
                outcome.map_or_else(
                    || {
                        unfinished = unfinished.saturating_add(1);
                        cap
                    },
                    |weeks| weeks.min(cap),
                )
            })
            .collect();
        Self {
            unfinished,
            ..Self::from_trials(weeks)
        }
    }

    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.known
    }

    #[must_use]
    pub fn trials(&self) -> u32 {
        u32::try_from(self.weeks.len()).unwrap_or(u32::MAX)
    }

    /// Trials that never finished.
    #[must_use]
    pub const fn unfinished(&self) -> u32 {
        self.unfinished
    }

    /// True when the p80 falls on an unfinished trial, so the week
    /// summaries are a floor rather than an estimate.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.unfinished > 0 && self.p80() >= self.max()
    }

    #[must_use]
    pub fn min(&self) -> f64 {
        self.weeks.first().copied().map_or(0.0, f64::from)
    }

    #[must_use]
    pub fn max(&self) -> f64 {
        self.weeks.last().copied().map_or(0.0, f64::from)
    }

    #[must_use]
    pub fn mean(&self) -> f64 {
        mean(&self.as_f64())
    }

    #[must_use]
    pub fn std_dev(&self) -> f64 {
        population_std_dev(&self.as_f64())
    }

    #[must_use]
    pub fn percentile(&self, p: f64) -> f64 {
        percentile_sorted(&self.as_f64(), p)
    }

    #[must_use]
    pub fn p80(&self) -> f64 {
        self.percentile(80.0)
    }

    /// Fraction of trials that finished within `weeks`; `0` when unknown.
    /// Unfinished trials are misses whatever the deadline.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction_within(&self, weeks: u32) -> f64 {
        if self.weeks.is_empty() {
            return 0.0;
        }
        let finished = self.weeks.len().saturating_sub(self.unfinished as usize);
        let hits = self
            .weeks
            .partition_point(|&trial| trial <= weeks)
            .min(finished);
        hits as f64 / self.weeks.len() as f64
    }

    fn as_f64(&self) -> Vec<f64> {
        self.weeks.iter().copied().map(f64::from).collect()
    }
}

/// Probability of finishing by the deadline.
///
/// `0` when there is no deadline or the distribution is unknown.
#[must_use]
pub fn odds_to_deadline(distribution: &WeeksDistribution, weeks_until_deadline: Option<u32>) -> f64 {
    weeks_until_deadline.map_or(0.0, |weeks| distribution.fraction_within(weeks))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn unknown_is_all_zero() {
        let dist = WeeksDistribution::unknown();
        assert!(!dist.is_known());
        assert_eq!(dist.trials(), 0);
        for value in [dist.min(), dist.max(), dist.mean(), dist.std_dev(), dist.p80()] {
            assert!(approx(value, 0.0));
        }
        assert!(approx(odds_to_deadline(&dist, Some(10)), 0.0));
    }

    #[test]
    fn done_meets_any_deadline() {
        let dist = WeeksDistribution::done(100);
        assert!(dist.is_known());
        assert_eq!(dist.trials(), 100);
        assert!(approx(dist.max(), 0.0));
        assert!(approx(odds_to_deadline(&dist, Some(0)), 1.0));
        assert!(approx(odds_to_deadline(&dist, None), 0.0));
    }

    #[test]
    fn summaries_reuse_percentile_rules() {
        let dist = WeeksDistribution::from_trials(vec![5, 1, 3, 2, 4]);
        assert!(approx(dist.min(), 1.0));
        assert!(approx(dist.max(), 5.0));
        assert!(approx(dist.mean(), 3.0));
        // r = 0.8 * 4 = 3.2 -> 4 + 0.2
        assert!(approx(dist.p80(), 4.2));
        assert!(approx(dist.std_dev(), 2.0_f64.sqrt()));
    }

    #[test]
    fn odds_count_trials_at_or_under_deadline() {
        let dist = WeeksDistribution::from_trials(vec![1, 2, 2, 3, 6]);
        assert!(approx(odds_to_deadline(&dist, Some(2)), 0.6));
        assert!(approx(odds_to_deadline(&dist, Some(0)), 0.0));
        assert!(approx(odds_to_deadline(&dist, Some(6)), 1.0));
        assert!(approx(odds_to_deadline(&dist, None), 0.0));
    }

    #[test]
    fn unfinished_trials_never_meet_a_deadline() {
        let dist = WeeksDistribution::from_outcomes(vec![Some(2), None, Some(4), None, Some(10)], 10);
        assert_eq!(dist.trials(), 5);
        assert_eq!(dist.unfinished(), 2);
        assert!(approx(dist.max(), 10.0));
        assert!(approx(odds_to_deadline(&dist, Some(3)), 0.2));
        // a trial finishing exactly on the cap still counts
        assert!(approx(odds_to_deadline(&dist, Some(10)), 0.6));
        assert!(approx(odds_to_deadline(&dist, Some(500)), 0.6));
        assert!(dist.is_saturated());
    }

    #[test]
    fn a_few_unfinished_trials_do_not_saturate_p80() {
        let mut outcomes = vec![Some(3); 9];
        outcomes.push(None);
        let dist = WeeksDistribution::from_outcomes(outcomes, 52);
        assert_eq!(dist.unfinished(), 1);
        assert!(approx(dist.p80(), 3.0));
        assert!(!dist.is_saturated());
        assert!(approx(odds_to_deadline(&dist, Some(60)), 0.9));
    }

    #[test]
    fn empty_outcomes_are_unknown() {
        let dist = WeeksDistribution::from_outcomes(Vec::new(), 10);
        assert!(!dist.is_known());
        assert_eq!(dist.unfinished(), 0);
        assert!(!dist.is_saturated());
    }
}
