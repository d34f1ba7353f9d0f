//! Outlier-resistant statistics
//!
//! Ticks are rare, large outliers in the envelope and corrupted cycles are
//! outliers in the timing data, so every central tendency and spread used by
//! the pipeline comes from here rather than a plain mean and deviation.

use crate::constants::MIN_ENVELOPE_THRESHOLD;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

fn median_in_place(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 1 {
        Some(upper)
    } else {
        let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(0.5 * (lower_max + upper))
    }
}

/// Median of the finite values, `None` if there are none
pub fn median(values: &[f64]) -> Option<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    median_in_place(&mut v)
}

/// Median absolute deviation from the median (unscaled)
pub fn median_absolute_deviation(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let mut deviations: Vec<f64> = values
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median_in_place(&mut deviations)
}

/// Mean after discarding `fraction` of the values from each tail
///
/// At least one value per tail is discarded whenever `fraction > 0` and at
/// least three values remain afterwards, so a single extreme value never
/// reaches the mean.
pub fn trimmed_mean(values: &[f64], fraction: f64) -> Option<f64> {
    let v = sorted(values);
    let n = v.len();
    if n == 0 {
        return None;
    }

    let cut = ((n as f64) * fraction.clamp(0.0, 0.5)).ceil() as usize;
    let cut = cut.min((n - 1) / 2);
    let kept = &v[cut..n - cut];

    Some(kept.iter().sum::<f64>() / kept.len() as f64)
}

/// Detection threshold derived from the trailing envelope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustThreshold {
    pub median: f32,
    pub mad: f32,
    pub threshold: f32,
}

impl RobustThreshold {
    /// `median + k × MAD`, floored so digital silence never triggers
    ///
    /// The MAD is used unscaled. For Gaussian envelope noise one MAD is
    /// about 0.67 standard deviations, so k = 4 sits near 2.7 σ.
    ///
    /// # Arguments
    /// * `samples` - Trailing envelope values
    /// * `k` - Number of MADs above the median
    ///
    /// # Returns
    /// `None` when there are no finite samples
    pub fn from_samples<I>(samples: I, k: f32) -> Option<Self>
    where
        I: IntoIterator<Item = f32>,
    {
        let values: Vec<f64> = samples.into_iter().map(f64::from).collect();
        let median = median(&values)? as f32;
        let mad = median_absolute_deviation(&values)? as f32;

        Some(Self {
            median,
            mad,
            threshold: (median + k * mad).max(MIN_ENVELOPE_THRESHOLD),
        })
    }
}
