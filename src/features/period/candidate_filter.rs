//! Tempo candidate weighting and harmonic grouping
//!
//! Autocorrelation peaks routinely appear at metrical relatives of the
//! true tempo (half, double, 3:2, ...). Candidates whose BPM ratios
//! approximate small integer ratios are grouped, and the group whose
//! combined evidence is strongest wins; its best member becomes the
//! raw tempo for this update. Grouping is what keeps the estimator
//! from flapping between 80 and 160 BPM on half-time material.

use super::TempoCandidate;

/// Metrical ratio targets considered the "same" tempo family
const RATIO_TARGETS: [f64; 8] = [
    0.5,
    2.0 / 3.0,
    0.75,
    1.0,
    4.0 / 3.0,
    1.5,
    2.0,
    3.0,
];

/// Relative tolerance when matching a ratio to a target
const RATIO_TOLERANCE: f64 = 0.06;

/// Weight of follower totals inside a group's combined score
const FOLLOWER_WEIGHT: f64 = 0.75;

/// Candidate with its combined per-update evidence
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// Tempo in BPM
    pub bpm: f64,
    /// Prior-weighted autocorrelation score
    pub score: f64,
    /// IOI support in [0, 1] for this candidate's period
    pub support: f64,
    /// Combined total: score * (1 + ioi_weight * support) * continuity
    pub total: f64,
}

/// Combine raw peak scores with IOI support and tempo continuity.
///
/// Continuity is `exp(-4 |bpm - prev| / max(1, prev))`, or 1 when no
/// previous tempo exists, so an established tempo damps jumps without
/// forbidding them.
pub fn weigh_candidates(
    peaks: &[TempoCandidate],
    prev_bpm: Option<f64>,
    ioi_weight: f64,
    mut support_of: impl FnMut(f64) -> f64,
) -> Vec<ScoredCandidate> {
    peaks
        .iter()
        .map(|peak| {
            let support = support_of(peak.bpm);
            let continuity = match prev_bpm {
                Some(prev) => (-4.0 * (peak.bpm - prev).abs() / prev.max(1.0)).exp(),
                None => 1.0,
            };
            ScoredCandidate {
                bpm: peak.bpm,
                score: peak.score,
                support,
                total: peak.score * (1.0 + ioi_weight * support) * continuity,
            }
        })
        .collect()
}

/// True if `ratio` approximates any metrical target within tolerance.
fn is_metrical_ratio(ratio: f64) -> bool {
    RATIO_TARGETS
        .iter()
        .any(|&target| (ratio - target).abs() <= RATIO_TOLERANCE * target)
}

/// Group candidates by metrical ratio and pick the winning group's
/// representative.
///
/// Groups form greedily in descending total order: the strongest
/// ungrouped candidate becomes a representative and absorbs every
/// ungrouped candidate whose BPM ratio to it is metrical. A group
/// scores its representative's total plus a discounted sum of its
/// followers. Returns the representative of the best group.
pub fn select_by_harmonic_group(candidates: &[ScoredCandidate]) -> Option<ScoredCandidate> {
    if candidates.is_empty() {
        return None;
    }

    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .total
            .partial_cmp(&candidates[a].total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut grouped = vec![false; candidates.len()];
    let mut best: Option<(f64, usize)> = None;

    for &rep in &order {
        if grouped[rep] {
            continue;
        }
        grouped[rep] = true;
        let mut group_score = candidates[rep].total;

        for &follower in &order {
            if grouped[follower] {
                continue;
            }
            let ratio = candidates[follower].bpm / candidates[rep].bpm;
            if is_metrical_ratio(ratio) {
                grouped[follower] = true;
                group_score += FOLLOWER_WEIGHT * candidates[follower].total;
            }
        }

        if best.is_none_or(|(score, _)| group_score > score) {
            best = Some((group_score, rep));
        }
    }

    best.map(|(_, rep)| candidates[rep].clone())
}
