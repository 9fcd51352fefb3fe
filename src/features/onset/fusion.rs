//! Cross-band flux fusion and onset coincidence gating
//!
//! Two cooperating layers run at the emitter rate:
//!
//! - **Flux fusion** aligns the per-band flux streams frame by frame
//!   (combining only as many frames as every band has produced),
//!   re-normalizes each band with a slow EWMA, and sums them with
//!   activity-derived weights into a single activation function for
//!   the tempo estimator.
//! - **Onset gating** merges the raw onsets of all detectors, clusters
//!   coincident ones, deduplicates at the tempo scale, and keeps only
//!   onsets supported by several bands (or by enough weighted band
//!   activity).

use crate::preprocessing::NUM_BANDS;
use std::collections::VecDeque;

/// EWMA factor for the per-band fusion normalization
const FUSION_GAMMA: f32 = 0.03;

/// Sliding window over which per-band onset rates are measured
const ACTIVITY_WINDOW_SEC: f64 = 4.0;

/// Weighted-support level that passes the gate on its own
const SUPPORT_GATE: f64 = 0.6;

/// Per-band EWMA state plus pending flux frames awaiting alignment
pub struct FluxFusion {
    ewma_mean: [f32; NUM_BANDS],
    ewma_var: [f32; NUM_BANDS],
    ewma_init: [bool; NUM_BANDS],
    pending: [Vec<f32>; NUM_BANDS],
}

impl FluxFusion {
    /// Fresh fusion state with no pending frames.
    pub fn new() -> Self {
        Self {
            ewma_mean: [0.0; NUM_BANDS],
            ewma_var: [0.0; NUM_BANDS],
            ewma_init: [false; NUM_BANDS],
            pending: Default::default(),
        }
    }

    /// Append newly fetched flux frames for one band.
    pub fn append(&mut self, band: usize, frames: &[f32]) {
        self.pending[band].extend_from_slice(frames);
    }

    /// Combine as many frames as every band has pending, consuming
    /// them. Returns an empty vector when any band has nothing yet.
    ///
    /// `weights` are the raw per-band activity weights; they are
    /// normalized to sum 1 here.
    pub fn drain_combined(&mut self, weights: &[f64; NUM_BANDS]) -> Vec<f32> {
        let available = self.pending.iter().map(Vec::len).min().unwrap_or(0);
        if available == 0 {
            return Vec::new();
        }

        let mut total_w: f64 = weights.iter().sum();
        if total_w <= 1e-6 {
            total_w = 1.0;
        }

        let mut combined = vec![0.0f32; available];
        for band in 0..NUM_BANDS {
            let w_norm = (weights[band] / total_w) as f32;
            let mut mean = self.ewma_mean[band];
            let mut var = self.ewma_var[band];
            let mut init = self.ewma_init[band];

            for (i, &x) in self.pending[band][..available].iter().enumerate() {
                if !init {
                    mean = x;
                    var = 0.0;
                    init = true;
                } else {
                    let dm = x - mean;
                    mean += FUSION_GAMMA * dm;
                    var = (1.0 - FUSION_GAMMA) * (var + FUSION_GAMMA * dm * dm);
                }
                let stddev = var.max(1e-6).sqrt();
                combined[i] += (x - mean) / stddev * w_norm;
            }

            self.ewma_mean[band] = mean;
            self.ewma_var[band] = var;
            self.ewma_init[band] = init;
            self.pending[band].drain(..available);
        }
        combined
    }
}

impl Default for FluxFusion {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounded per-band history of recent onsets, used to derive band
/// activity weights
pub struct RecentBandOnsets {
    recent: [VecDeque<f64>; NUM_BANDS],
}

impl RecentBandOnsets {
    /// Empty history; every band starts at the idle weight.
    pub fn new() -> Self {
        Self {
            recent: Default::default(),
        }
    }

    /// Record a band's onsets, trimming everything older than the
    /// activity window behind `latest`.
    pub fn ingest(&mut self, band: usize, times: &[f64], latest: f64) {
        let queue = &mut self.recent[band];
        queue.extend(times.iter().copied());
        while queue
            .front()
            .is_some_and(|&t| latest - t > ACTIVITY_WINDOW_SEC)
        {
            queue.pop_front();
        }
    }

    /// Raw activity weights `0.5 + 0.5 * (1 - exp(-rate))` per band.
    /// Quiet bands get 0.5, busy bands approach 1.0.
    pub fn weights(&self) -> [f64; NUM_BANDS] {
        let mut weights = [0.0f64; NUM_BANDS];
        for (band, out) in weights.iter_mut().enumerate() {
            let rate = self.recent[band].len() as f64 / ACTIVITY_WINDOW_SEC.max(0.5);
            *out = 0.5 + 0.5 * (1.0 - (-rate).exp());
        }
        weights
    }
}

impl Default for RecentBandOnsets {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace each run of onsets within `window` of the run's first
/// member by the run's mean time. Input must be sorted.
pub fn cluster_onsets(sorted: &[f64], window: f64) -> Vec<f64> {
    let mut clustered = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let t0 = sorted[i];
        let mut sum = 0.0;
        let mut count = 0usize;
        let mut j = i;
        while j < sorted.len() && sorted[j] - t0 <= window {
            sum += sorted[j];
            count += 1;
            j += 1;
        }
        clustered.push(sum / count.max(1) as f64);
        i = j;
    }
    clustered
}

/// Greedy pass keeping only onsets further than the tempo-derived
/// merge window from the previously kept one.
pub fn dedupe_by_period(onsets: &[f64], period_sec: f64) -> Vec<f64> {
    let merge_window = (0.10 * period_sec).clamp(0.01, 0.06);
    let mut kept: Vec<f64> = Vec::new();
    for &t in onsets {
        if kept.last().is_none_or(|&last| (t - last).abs() > merge_window) {
            kept.push(t);
        }
    }
    kept
}

/// Keep each candidate onset only if enough distinct bands saw an
/// onset within `window` of it, or if the weighted band support is
/// high enough on its own.
///
/// `band_onsets` holds each band's sorted onset list (both resolutions
/// merged); `weights` are the raw activity weights.
pub fn coincidence_gate(
    candidates: &[f64],
    band_onsets: &[Vec<f64>; NUM_BANDS],
    window: f64,
    weights: &[f64; NUM_BANDS],
    min_bands: usize,
) -> Vec<f64> {
    let mut total_w: f64 = weights.iter().sum();
    if total_w <= 1e-6 {
        total_w = 1.0;
    }
    let min_bands = min_bands.max(1);

    let mut gated = Vec::new();
    for &t in candidates {
        let mut bands_hit = 0usize;
        let mut weight_sum = 0.0f64;
        for band in 0..NUM_BANDS {
            let list = &band_onsets[band];
            let idx = list.partition_point(|&x| x < t - window);
            if idx < list.len() && (list[idx] - t).abs() <= window {
                bands_hit += 1;
                weight_sum += weights[band];
            }
        }
        if bands_hit >= min_bands || weight_sum / total_w >= SUPPORT_GATE {
            gated.push(t);
        }
    }
    gated
}
