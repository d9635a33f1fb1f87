// Statistics Pure Functions
// Summary statistics over sample columns. Nothing here allocates state or
// touches I/O; inputs are never mutated.

use crate::types::{MetricSummary, ResourceSample, ResourceSummary};

/// Arithmetic mean.
///
/// Returns `NaN` for an empty slice. Callers that build summaries must check
/// for emptiness first; see [`summarize_metric`].
pub fn average(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Nearest-rank percentile over an ascending-sorted copy of `xs`.
///
/// index = ceil(p / 100 * len) - 1, clamped to `[0, len - 1]`.
/// Returns `NaN` for an empty slice.
pub fn percentile(xs: &[f64], p: f64) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }

    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);

    let last = sorted.len() - 1;
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, last as i64) as usize;
    sorted[index]
}

/// Largest value, `NaN` for an empty slice
pub fn maximum(xs: &[f64]) -> f64 {
    xs.iter().copied().reduce(f64::max).unwrap_or(f64::NAN)
}

/// mean / max / p95 of one column, or `None` when there is nothing to summarize
pub fn summarize_metric(xs: &[f64]) -> Option<MetricSummary> {
    if xs.is_empty() {
        return None;
    }
    Some(MetricSummary {
        mean: average(xs),
        max: maximum(xs),
        p95: percentile(xs, 95.0),
    })
}

/// Summarize a complete sample stream; cpu and memory are independent columns
pub fn summarize_resources(samples: &[ResourceSample]) -> Option<ResourceSummary> {
    let cpu: Vec<f64> = samples.iter().map(|s| s.cpu).collect();
    let memory: Vec<f64> = samples.iter().map(|s| s.memory).collect();

    Some(ResourceSummary {
        cpu: summarize_metric(&cpu)?,
        memory: summarize_metric(&memory)?,
        samples: samples.len(),
    })
}

/// Each mean divided by the smallest mean; the fastest gets exactly 1.0.
///
/// A non-positive fastest mean makes ratios meaningless, so every entry is 1.0.
pub fn relative_ratios(means: &[f64]) -> Vec<f64> {
    let fastest = means.iter().copied().reduce(f64::min);
    match fastest {
        Some(fastest) if fastest > 0.0 && fastest.is_finite() => {
            means.iter().map(|mean| mean / fastest).collect()
        }
        _ => vec![1.0; means.len()],
    }
}

/// How much worse `other` is than `winner`, in percent.
///
/// Lower-is-better: (other - winner) / winner * 100.
/// Higher-is-better: (winner - other) / other * 100.
pub fn percent_worse(winner: f64, other: f64, higher_is_better: bool) -> f64 {
    if higher_is_better {
        (winner - other) / other * 100.0
    } else {
        (other - winner) / winner * 100.0
    }
}

/// Round to two decimals, as the sampler does for cpu and memory
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_reference_values() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 90.0), 5.0);
        assert_eq!(percentile(&[10.0, 20.0, 30.0, 40.0], 50.0), 20.0);
        assert_eq!(percentile(&[40.0, 10.0, 30.0, 20.0], 50.0), 20.0);
        assert_eq!(percentile(&[7.5], 0.0), 7.5);
        assert_eq!(percentile(&[7.5], 100.0), 7.5);
    }

    #[test]
    fn test_percentile_clamps_both_ends() {
        let xs = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&xs, 0.0), 1.0);
        assert_eq!(percentile(&xs, -10.0), 1.0);
        assert_eq!(percentile(&xs, 250.0), 3.0);
    }

    #[test]
    fn test_percentile_does_not_mutate_input() {
        let xs = vec![5.0, 1.0, 4.0];
        let _ = percentile(&xs, 50.0);
        assert_eq!(xs, vec![5.0, 1.0, 4.0]);
    }

    #[test]
    fn test_average_of_empty_is_nan() {
        assert!(average(&[]).is_nan());
        assert!(percentile(&[], 50.0).is_nan());
        assert!(maximum(&[]).is_nan());
        assert_eq!(average(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn test_empty_stream_has_no_summary() {
        assert!(summarize_metric(&[]).is_none());
        assert!(summarize_resources(&[]).is_none());
    }

    #[test]
    fn test_resource_summary_columns_are_independent() {
        let samples: Vec<ResourceSample> = (1..=10)
            .map(|i| ResourceSample {
                timestamp: i,
                cpu: i as f64,
                memory: 100.0 - i as f64,
                elapsed: i as u64 * 100,
            })
            .collect();
        let summary = summarize_resources(&samples).unwrap();
        assert_eq!(summary.samples, 10);
        assert_eq!(summary.cpu.mean, 5.5);
        assert_eq!(summary.cpu.max, 10.0);
        assert_eq!(summary.cpu.p95, 10.0);
        assert_eq!(summary.memory.mean, 94.5);
        assert_eq!(summary.memory.max, 99.0);
        assert_eq!(summary.memory.p95, 99.0);
    }

    #[test]
    fn test_relative_ratios() {
        let ratios = relative_ratios(&[2.0, 1.5, 3.0]);
        assert_eq!(format!("{:.2}", ratios[0]), "1.33");
        assert_eq!(ratios[1], 1.0);
        assert_eq!(ratios[2], 2.0);
        assert_eq!(relative_ratios(&[0.0, 1.0]), vec![1.0, 1.0]);
        assert!(relative_ratios(&[]).is_empty());
    }

    #[test]
    fn test_percent_worse() {
        assert_eq!(percent_worse(100.0, 150.0, false), 50.0);
        assert_eq!(percent_worse(200.0, 100.0, true), 100.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }
}
