//! Running tempo estimation over the fused flux stream
//!
//! The estimator consumes fused flux frames appended at the emitter
//! rate plus the gated onset list, and maintains a slew-limited BPM
//! with a confidence score. Each flux append triggers one estimation
//! pass: autocorrelate the recent flux window, pick prior-weighted
//! peaks, weigh them with IOI support and tempo continuity, group
//! harmonics, and fold the winner into the running estimate.

use super::autocorrelation::{autocorrelation_fft, scan_peaks};
use super::candidate_filter::{select_by_harmonic_group, weigh_candidates};
use super::ioi::ioi_support;
use super::TempoCandidate;
use rustfft::FftPlanner;
use std::collections::VecDeque;

/// Flux memory when no tempo is known yet, in frames
const DEFAULT_MEMORY_FRAMES: usize = 2048;

/// Flux memory clamp range in frames
const MEMORY_RANGE: (usize, usize) = (512, 8192);

/// Minimum flux history before estimation is attempted
const MIN_FLUX_FRAMES: usize = 256;

/// Onset history bounds for IOI support
const MAX_ONSETS: usize = 64;
const ONSET_WINDOW_SEC: f64 = 6.0;

/// Degenerate-energy floor below which an update is skipped
const ENERGY_FLOOR: f32 = 1e-9;

/// Streaming BPM estimator
pub struct TempoEstimator {
    frames_per_second: f64,
    flux: VecDeque<f32>,
    onsets: VecDeque<f64>,
    bpm: Option<f64>,
    confidence: f64,
    candidates: Vec<TempoCandidate>,
    planner: FftPlanner<f32>,
    top_k: usize,
    ioi_weight: f64,
    slew_percent: f64,
}

impl TempoEstimator {
    /// Create an estimator for flux frames produced at
    /// `sample_rate / hop_size` frames per second.
    pub fn new(
        sample_rate: f64,
        hop_size: usize,
        top_k: usize,
        ioi_weight: f64,
        slew_percent: f64,
    ) -> Self {
        Self {
            frames_per_second: sample_rate / hop_size as f64,
            flux: VecDeque::new(),
            onsets: VecDeque::new(),
            bpm: None,
            confidence: 0.0,
            candidates: Vec::new(),
            planner: FftPlanner::new(),
            top_k,
            ioi_weight,
            slew_percent,
        }
    }

    /// Append fused flux frames and run one estimation pass.
    pub fn append_flux(&mut self, frames: &[f32]) {
        self.flux.extend(frames.iter().copied());
        let memory = self.memory_frames();
        while self.flux.len() > memory {
            self.flux.pop_front();
        }
        self.estimate();
    }

    /// Ingest gated onset times for IOI support, keeping a bounded
    /// recent window.
    pub fn ingest_onsets(&mut self, times: &[f64]) {
        self.onsets.extend(times.iter().copied());
        while self.onsets.len() > MAX_ONSETS {
            self.onsets.pop_front();
        }
        if let Some(&latest) = self.onsets.back() {
            while self
                .onsets
                .front()
                .is_some_and(|&t| latest - t > ONSET_WINDOW_SEC)
            {
                self.onsets.pop_front();
            }
        }
    }

    /// Current BPM, once an estimate exists.
    pub fn bpm(&self) -> Option<f64> {
        self.bpm
    }

    /// Confidence of the current estimate in [0, 1].
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Candidate list from the most recent estimation pass.
    pub fn last_candidates(&self) -> &[TempoCandidate] {
        &self.candidates
    }

    /// Flux memory: roughly ten beat periods once a tempo is known.
    fn memory_frames(&self) -> usize {
        match self.bpm {
            Some(bpm) if bpm > 0.0 => {
                let period = 60.0 / bpm;
                ((10.0 * period * self.frames_per_second).round() as usize)
                    .clamp(MEMORY_RANGE.0, MEMORY_RANGE.1)
            }
            _ => DEFAULT_MEMORY_FRAMES,
        }
    }

    fn estimate(&mut self) {
        if self.flux.len() < MIN_FLUX_FRAMES {
            return;
        }

        // Mean-removed copy of the window
        let mut x: Vec<f32> = self.flux.iter().copied().collect();
        let mean = x.iter().sum::<f32>() / x.len() as f32;
        for v in &mut x {
            *v -= mean;
        }

        let energy: f32 = x.iter().map(|&v| v * v).sum();
        if energy <= ENERGY_FLOOR {
            // Degenerate input: keep the previous estimate untouched
            return;
        }

        let acf = autocorrelation_fft(&x, &mut self.planner);
        let peaks = scan_peaks(&acf, self.frames_per_second, self.top_k);
        if peaks.is_empty() {
            return;
        }

        let onsets: Vec<f64> = self.onsets.iter().copied().collect();
        let scored = weigh_candidates(&peaks, self.bpm, self.ioi_weight, |bpm| {
            ioi_support(&onsets, 60.0 / bpm)
        });

        let Some(winner) = select_by_harmonic_group(&scored) else {
            return;
        };

        // Slew-limit the update against the previous estimate
        let new_bpm = match self.bpm {
            Some(prev) => {
                let step = self.slew_percent * prev.max(1.0);
                winner.bpm.clamp(prev - step, prev + step)
            }
            None => winner.bpm,
        };

        // Periodicity strength: the winning (unbiased) correlation
        // relative to the window's mean-square energy
        let mean_square = energy as f64 / x.len() as f64;
        self.confidence = (0.5 * (winner.score / mean_square)
            + 0.5 * ioi_support(&onsets, 60.0 / new_bpm))
        .clamp(0.0, 1.0);
        self.bpm = Some(new_bpm);

        self.candidates = peaks
            .into_iter()
            .map(|mut c| {
                c.selected = (c.bpm - winner.bpm).abs() < 1e-9;
                c
            })
            .collect();

        log::debug!(
            "tempo update: {:.2} BPM (raw {:.2}, conf {:.2}, {} candidates)",
            new_bpm,
            winner.bpm,
            self.confidence,
            self.candidates.len()
        );
    }
}
