//! Lead-time statistics.
//!
//! All functions accept unsorted input and return `0.0` on an empty sample
//! instead of NaN. The same primitives summarise Monte-Carlo trial results in
//! [`crate::forecast`].

use flowcast_core::model::LeadTimeFigures;

/// Percentile of `samples` using linear interpolation between closest ranks.
///
/// The rank is `r = p / 100 * (n - 1)`; the result blends
/// `sorted[floor(r)]` and `sorted[ceil(r)]` by the fractional part of `r`.
/// `p` is clamped to `[0, 100]`, so `percentile(s, 0)` is the minimum and
/// `percentile(s, 100)` the maximum.
#[must_use]
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// [`percentile`] over input that is already sorted ascending.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let Some(&first) = sorted.first() else {
        return 0.0;
    };
    if sorted.len() == 1 {
        return first;
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = (rank.ceil() as usize).min(sorted.len() - 1);
    let fraction = rank - rank.floor();

    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Population standard deviation (divides by `n`, not `n - 1`).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn population_std_dev(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let avg = mean(samples);
    let variance = samples
        .iter()
        .map(|value| (value - avg).powi(2))
        .sum::<f64>()
        / samples.len() as f64;
    variance.sqrt()
}

/// Histogram bounds `(bin_min, bin_max)`; `(0, 0)` for an empty sample.
#[must_use]
pub fn histogram_bins(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (min, max)
}

/// Per-bin counts over `[bin_min, bin_max]` split into `bins` equal-width
/// buckets. Every bucket is half-open except the last, which also takes
/// `bin_max`. A zero-width range puts everything in the first bucket.
///
/// Returns an empty vector when `samples` is empty or `bins` is zero.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn histogram(samples: &[f64], bins: usize) -> Vec<u32> {
    if samples.is_empty() || bins == 0 {
        return Vec::new();
    }

    let (min, max) = histogram_bins(samples);
    let width = (max - min) / bins as f64;
    let mut counts = vec![0_u32; bins];

    for &value in samples {
        let index = if width > 0.0 {
            (((value - min) / width).floor() as usize).min(bins - 1)
        } else {
            0
        };
        counts[index] = counts[index].saturating_add(1);
    }
    counts
}

/// Every lead-time field of a snapshot, computed from one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadTimeStats {
    figures: LeadTimeFigures,
}

impl LeadTimeStats {
    /// Summarise lead times given in seconds.
    #[must_use]
    pub fn from_samples(samples: &[f64], bins: usize) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let (histogram_bin_min, histogram_bin_max) = histogram_bins(&sorted);

        Self {
            figures: LeadTimeFigures {
                sample_size: u32::try_from(sorted.len()).unwrap_or(u32::MAX),
                min: sorted.first().copied().unwrap_or(0.0),
                max: sorted.last().copied().unwrap_or(0.0),
                p25: percentile_sorted(&sorted, 25.0),
                p75: percentile_sorted(&sorted, 75.0),
                p80: percentile_sorted(&sorted, 80.0),
                average: mean(&sorted),
                std_dev: population_std_dev(&sorted),
                histogram_bin_min,
                histogram_bin_max,
                histogram_counts: histogram(&sorted, bins),
            },
        }
    }

    /// Convenience for integer-second samples straight off
    /// [`flowcast_core::model::DemandView::lead_time_seconds`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_seconds(seconds: &[i64], bins: usize) -> Self {
        let samples: Vec<f64> = seconds.iter().map(|&s| s as f64).collect();
        Self::from_samples(&samples, bins)
    }

    #[must_use]
    pub const fn figures(&self) -> &LeadTimeFigures {
        &self.figures
    }

    #[must_use]
    pub fn into_figures(self) -> LeadTimeFigures {
        self.figures
    }
}
