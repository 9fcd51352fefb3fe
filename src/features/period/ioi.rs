//! Inter-onset-interval support for tempo candidates
//!
//! Measures how well a candidate period explains the intervals between
//! recently observed onsets. Each interval is matched to its nearest
//! small multiple of the period; the support is the fraction of
//! intervals that land within a period-relative tolerance. An IQR
//! fence removes outlier intervals (dropouts, double hits) before
//! counting.

/// Interval bounds in seconds: shorter than this is jitter, longer
/// carries no tempo information
const MIN_IOI_SEC: f64 = 0.02;
const MAX_IOI_SEC: f64 = 3.0;

/// Largest period multiple an interval may be matched to
const MAX_HARMONIC: f64 = 6.0;

/// Fraction of recent onset intervals consistent with `period_sec`.
///
/// Returns a value in [0, 1]; 0 when there are no usable intervals or
/// the period is degenerate.
pub fn ioi_support(onsets: &[f64], period_sec: f64) -> f64 {
    if period_sec <= 0.0 || onsets.len() < 2 {
        return 0.0;
    }

    let mut intervals = Vec::new();
    for i in 0..onsets.len() {
        for j in (i + 1)..onsets.len() {
            let d = onsets[j] - onsets[i];
            if d > MIN_IOI_SEC && d < MAX_IOI_SEC {
                intervals.push(d);
            }
        }
    }
    if intervals.is_empty() {
        return 0.0;
    }

    let intervals = iqr_fence(intervals);

    let tolerance = (0.12 * period_sec).clamp(0.012, 0.080);
    let hits = intervals
        .iter()
        .filter(|&&d| {
            let k = (d / period_sec).round().clamp(1.0, MAX_HARMONIC);
            (d - k * period_sec).abs() <= tolerance
        })
        .count();

    hits as f64 / intervals.len() as f64
}

/// Keep intervals within [Q1 - 1.5 IQR, Q3 + 1.5 IQR] when at least
/// three survive; otherwise return the input unchanged.
fn iqr_fence(mut intervals: Vec<f64>) -> Vec<f64> {
    if intervals.len() < 3 {
        return intervals;
    }
    intervals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q1 = intervals[intervals.len() / 4];
    let q3 = intervals[(intervals.len() * 3) / 4];
    let iqr = q3 - q1;
    let low = q1 - 1.5 * iqr;
    let high = q3 + 1.5 * iqr;

    let fenced: Vec<f64> = intervals
        .iter()
        .copied()
        .filter(|&d| d >= low && d <= high)
        .collect();

    if fenced.len() >= 3 {
        fenced
    } else {
        intervals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_click_train_has_full_support() {
        // Onsets exactly at 0.5 s period; every pair is a multiple
        let onsets: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        let support = ioi_support(&onsets, 0.5);
        assert!((support - 1.0).abs() < 1e-9, "support={}", support);
    }

    #[test]
    fn test_wrong_period_has_low_support() {
        let onsets: Vec<f64> = (0..8).map(|i| i as f64 * 0.5).collect();
        // 0.37 s shares few multiples with a 0.5 s grid
        let support = ioi_support(&onsets, 0.37);
        assert!(support < 0.5, "support={}", support);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(ioi_support(&[], 0.5), 0.0);
        assert_eq!(ioi_support(&[1.0], 0.5), 0.0);
        assert_eq!(ioi_support(&[1.0, 1.5], 0.0), 0.0);
        assert_eq!(ioi_support(&[1.0, 1.5], -1.0), 0.0);
    }

    #[test]
    fn test_jitter_and_long_gaps_excluded() {
        // 1 ms apart (below floor) and 10 s apart (above ceiling)
        let onsets = [1.0, 1.001, 11.0];
        assert_eq!(ioi_support(&onsets, 0.5), 0.0);
    }

    #[test]
    fn test_iqr_fence_drops_outlier() {
        let mut intervals = vec![0.5, 0.5, 0.5, 0.5, 0.5, 0.5];
        intervals.push(2.9); // outlier within the IOI ceiling
        let fenced = iqr_fence(intervals);
        assert!(!fenced.contains(&2.9));
        assert_eq!(fenced.len(), 6);
    }

    #[test]
    fn test_iqr_fence_keeps_small_sets() {
        let intervals = vec![0.5, 2.9];
        let fenced = iqr_fence(intervals.clone());
        assert_eq!(fenced, intervals);
    }

    #[test]
    fn test_half_time_onsets_support_fundamental() {
        // Onsets every 1.0 s; period 0.5 matches at k=2
        let onsets: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let support = ioi_support(&onsets, 0.5);
        assert!(support > 0.9, "support={}", support);
    }
}
