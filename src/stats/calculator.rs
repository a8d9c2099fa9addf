//! Statistics Calculator Module
//! Percentile scale bounds, group sums, rankings and box-plot summaries.

use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::ops::AddAssign;
use thiserror::Error;

/// Percentile pair bounding map color scales.
pub const COLOR_SCALE_PERCENTILES: (f64, f64) = (5.0, 95.0);

/// Percentile pair bounding the delta box-plot y axis.
pub const DELTA_AXIS_PERCENTILES: (f64, f64) = (1.0, 99.0);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("No finite values to summarise")]
    Empty,
}

/// Low/high scale bounds. Values outside are clipped on the scale, not dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentileBounds {
    pub low: f64,
    pub high: f64,
}

impl PercentileBounds {
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.low, self.high)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.low..=self.high).contains(&value)
    }

    pub fn as_range(&self) -> [f64; 2] {
        [self.low, self.high]
    }
}

/// Box-plot statistics for one group.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSummary {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub mean: f64,
}

pub struct StatsCalculator;

impl StatsCalculator {
    /// Calculate percentile using linear interpolation (NumPy compatible).
    pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
        let n = sorted_values.len();
        if n == 0 {
            return f64::NAN;
        }
        if n == 1 {
            return sorted_values[0];
        }

        let rank = (p.clamp(0.0, 100.0) / 100.0) * (n - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (rank.ceil() as usize).min(n - 1);
        let frac = rank - lower as f64;

        if lower == upper {
            sorted_values[lower]
        } else {
            sorted_values[lower] * (1.0 - frac) + sorted_values[upper] * frac
        }
    }

    /// Ascending copy with NaN and infinities removed.
    pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }

    /// Scale bounds at the `low_p`/`high_p` percentiles.
    ///
    /// A single value yields the degenerate range `[v, v]`; no values is an error.
    pub fn percentile_bounds(
        values: &[f64],
        low_p: f64,
        high_p: f64,
    ) -> Result<PercentileBounds, StatsError> {
        let sorted = Self::sorted_finite(values);
        if sorted.is_empty() {
            return Err(StatsError::Empty);
        }

        let (low_p, high_p) = if low_p <= high_p {
            (low_p, high_p)
        } else {
            (high_p, low_p)
        };

        Ok(PercentileBounds {
            low: Self::percentile(&sorted, low_p),
            high: Self::percentile(&sorted, high_p),
        })
    }

    /// Sum `value` per `key`, ordered by key. Items where `value` is `None` are skipped.
    pub fn group_sum<T, K, V, FK, FV>(items: &[T], key: FK, value: FV) -> BTreeMap<K, V>
    where
        K: Ord,
        V: Default + AddAssign,
        FK: Fn(&T) -> K,
        FV: Fn(&T) -> Option<V>,
    {
        let mut sums: BTreeMap<K, V> = BTreeMap::new();
        for item in items {
            if let Some(v) = value(item) {
                *sums.entry(key(item)).or_default() += v;
            }
        }
        sums
    }

    /// The `n` items with the largest key, largest first.
    pub fn top_n<'a, T, F>(items: &'a [T], n: usize, key: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> f64,
    {
        let mut ranked: Vec<&T> = items.iter().collect();
        // Stable, so ties keep file order
        ranked.sort_by(|a, b| key(b).total_cmp(&key(a)));
        ranked.truncate(n);
        ranked
    }

    /// The `n` items with the smallest key, smallest first.
    pub fn bottom_n<'a, T, F>(items: &'a [T], n: usize, key: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> f64,
    {
        let mut ranked: Vec<&T> = items.iter().collect();
        ranked.sort_by(|a, b| key(a).total_cmp(&key(b)));
        ranked.truncate(n);
        ranked
    }

    /// Quartiles, 1.5 IQR whiskers and mean of a group of values.
    pub fn box_summary(values: &[f64]) -> Result<BoxSummary, StatsError> {
        let sorted = Self::sorted_finite(values);
        let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
            return Err(StatsError::Empty);
        };

        let q1 = Self::percentile(&sorted, 25.0);
        let median = Self::percentile(&sorted, 50.0);
        let q3 = Self::percentile(&sorted, 75.0);
        let iqr = q3 - q1;

        let lower_whisker = sorted
            .iter()
            .copied()
            .find(|&v| v >= q1 - 1.5 * iqr)
            .unwrap_or(q1);
        let upper_whisker = sorted
            .iter()
            .rev()
            .copied()
            .find(|&v| v <= q3 + 1.5 * iqr)
            .unwrap_or(q3);

        Ok(BoxSummary {
            count: sorted.len(),
            min,
            q1,
            median,
            q3,
            max,
            lower_whisker,
            upper_whisker,
            mean: sorted.iter().mean(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_matches_numpy_linear() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(StatsCalculator::percentile(&sorted, 0.0), 1.0);
        assert_eq!(StatsCalculator::percentile(&sorted, 50.0), 3.0);
        assert_eq!(StatsCalculator::percentile(&sorted, 100.0), 5.0);
        // np.percentile([1,2,3,4,5], 5) == 1.2
        assert!((StatsCalculator::percentile(&sorted, 5.0) - 1.2).abs() < 1e-12);
        // np.percentile([1,2,3,4,5], 95) == 4.8
        assert!((StatsCalculator::percentile(&sorted, 95.0) - 4.8).abs() < 1e-12);
    }

    #[test]
    fn test_bounds_are_monotonic() {
        let values = [300.0, 120.0, 5000.0, 250.0, 90.0, 410.0, 275.0, 1.0];
        let bounds = StatsCalculator::percentile_bounds(&values, 5.0, 95.0).unwrap();
        let median = StatsCalculator::percentile(&StatsCalculator::sorted_finite(&values), 50.0);
        assert!(bounds.low <= median);
        assert!(median <= bounds.high);
        assert!(bounds.low >= 1.0 && bounds.high <= 5000.0);
    }

    #[test]
    fn test_bounds_ignore_nan() {
        let values = [f64::NAN, 2.0, 4.0];
        let bounds = StatsCalculator::percentile_bounds(&values, 0.0, 100.0).unwrap();
        assert_eq!(bounds.as_range(), [2.0, 4.0]);
    }

    #[test]
    fn test_bounds_guard_small_inputs() {
        assert_eq!(
            StatsCalculator::percentile_bounds(&[], 5.0, 95.0),
            Err(StatsError::Empty)
        );
        let single = StatsCalculator::percentile_bounds(&[42.0], 5.0, 95.0).unwrap();
        assert_eq!(single.as_range(), [42.0, 42.0]);
    }

    #[test]
    fn test_bounds_clamp_but_keep_outliers() {
        let bounds = PercentileBounds { low: 10.0, high: 20.0 };
        assert_eq!(bounds.clamp(5.0), 10.0);
        assert_eq!(bounds.clamp(25.0), 20.0);
        assert_eq!(bounds.clamp(15.0), 15.0);
        assert!(!bounds.contains(25.0));
    }

    #[test]
    fn test_group_sum_by_year() {
        let rows = [(2021, Some(10u64)), (2020, Some(3)), (2021, Some(5)), (2020, None)];
        let sums = StatsCalculator::group_sum(&rows, |r| r.0, |r| r.1);
        let pairs: Vec<(i32, u64)> = sums.into_iter().collect();
        assert_eq!(pairs, vec![(2020, 3), (2021, 15)]);
    }

    #[test]
    fn test_top_and_bottom_n() {
        let values = [3.0, -1.0, 7.5, 0.0, 2.0];
        let top: Vec<f64> = StatsCalculator::top_n(&values, 2, |v| *v).into_iter().copied().collect();
        let bottom: Vec<f64> = StatsCalculator::bottom_n(&values, 2, |v| *v).into_iter().copied().collect();
        assert_eq!(top, vec![7.5, 3.0]);
        assert_eq!(bottom, vec![-1.0, 0.0]);
    }

    #[test]
    fn test_n_larger_than_rows_returns_all() {
        let values = [1.0, 2.0, 3.0];
        assert_eq!(StatsCalculator::top_n(&values, 10, |v| *v).len(), 3);
        assert_eq!(StatsCalculator::bottom_n(&values, 10, |v| *v).len(), 3);
        assert!(StatsCalculator::top_n(&values, 0, |v| *v).is_empty());
    }

    #[test]
    fn test_top_and_bottom_full_set_differ_in_order() {
        let values = [4.0, 1.0, 9.0, 6.0];
        let top: Vec<f64> = StatsCalculator::top_n(&values, 4, |v| *v).into_iter().copied().collect();
        let mut bottom: Vec<f64> = StatsCalculator::bottom_n(&values, 4, |v| *v).into_iter().copied().collect();
        assert_ne!(top, bottom);
        bottom.reverse();
        assert_eq!(top, bottom);
    }

    #[test]
    fn test_box_summary() {
        let values = [1.0, 2.0, 3.0, 4.0, 100.0];
        let summary = StatsCalculator::box_summary(&values).unwrap();
        assert_eq!(summary.count, 5);
        assert_eq!(summary.q1, 2.0);
        assert_eq!(summary.median, 3.0);
        assert_eq!(summary.q3, 4.0);
        assert_eq!(summary.lower_whisker, 1.0);
        // 100 lies beyond q3 + 1.5 * iqr
        assert_eq!(summary.upper_whisker, 4.0);
        assert_eq!(summary.max, 100.0);
        assert!((summary.mean - 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_box_summary_empty() {
        assert_eq!(StatsCalculator::box_summary(&[f64::NAN]), Err(StatsError::Empty));
    }
}
