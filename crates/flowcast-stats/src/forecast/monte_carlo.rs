use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::{Forecaster, WeeksDistribution};

pub const DEFAULT_TRIALS: u32 = 5_000;
pub const DEFAULT_MAX_WEEKS_PER_TRIAL: u32 = 520;

/// Resamples weekly throughput with replacement until the remaining scope is
/// covered.
///
/// Each trial owns an RNG seeded with `seed + trial_index`, so the outcome
/// does not depend on whether the trials run on one thread or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonteCarloForecaster {
    max_weeks_per_trial: u32,
    parallel: bool,
}

impl Default for MonteCarloForecaster {
    fn default() -> Self {
        Self {
            max_weeks_per_trial: DEFAULT_MAX_WEEKS_PER_TRIAL,
            parallel: true,
        }
    }
}

impl MonteCarloForecaster {
    #[must_use]
    pub fn new(max_weeks_per_trial: u32, parallel: bool) -> Self {
        Self {
            max_weeks_per_trial: max_weeks_per_trial.max(1),
            parallel,
        }
    }

    #[must_use]
    pub const fn max_weeks_per_trial(&self) -> u32 {
        self.max_weeks_per_trial
    }

    /// Weeks needed to cover `remaining_scope`, or `None` when the cap runs
    /// out first.
    fn run_trial(&self, samples: &[u32], remaining_scope: u32, seed: u64) -> Option<u32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut delivered = 0_u32;
        let mut weeks = 0_u32;

        while delivered < remaining_scope && weeks < self.max_weeks_per_trial {
            delivered = delivered.saturating_add(samples[rng.gen_range(0..samples.len())]);
            weeks += 1;
        }
        (delivered >= remaining_scope).then_some(weeks)
    }
}

impl Forecaster for MonteCarloForecaster {
    fn simulate(
        &self,
        throughput_samples: &[u32],
        remaining_scope: u32,
        trials: u32,
        seed: u64,
    ) -> WeeksDistribution {
        let trials = trials.max(1);

        if remaining_scope == 0 {
            return WeeksDistribution::done(trials);
        }
        // An all-zero history never covers any scope.
        if throughput_samples.iter().all(|&count| count == 0) {
            tracing::debug!(
                weeks = throughput_samples.len(),
                "no deliveries in throughput history; forecast unknown"
            );
            return WeeksDistribution::unknown();
        }

        let trial = |index: u32| {
            self.run_trial(
                throughput_samples,
                remaining_scope,
                seed.wrapping_add(u64::from(index)),
            )
        };
        let outcomes: Vec<Option<u32>> = if self.parallel {
            (0..trials).into_par_iter().map(trial).collect()
        } else {
            (0..trials).map(trial).collect()
        };

        let distribution = WeeksDistribution::from_outcomes(outcomes, self.max_weeks_per_trial);
        if distribution.unfinished() > 0 {
            tracing::debug!(
                unfinished = distribution.unfinished(),
                trials,
                max_weeks = self.max_weeks_per_trial,
                "monte-carlo trials hit the week cap"
            );
        }
        distribution
    }
}
