//! Single-rate pipeline state and per-tick processing
//!
//! A `Pipeline` is built for one sample rate and dropped on rate
//! change. It owns the prefilter and band split, the ten onset
//! detectors (five bands at two resolutions), the fusion state, the
//! tempo estimator, and the beat tracker. The worker thread calls
//! [`Pipeline::process_chunk`]; the emitter calls [`Pipeline::tick`]
//! under the same mutex.

use crate::config::EngineConfig;
use crate::features::beat_tracking::BeatTracker;
use crate::features::onset::{
    cluster_onsets, coincidence_gate, dedupe_by_period, FluxFusion, OnsetDetector,
    RecentBandOnsets,
};
use crate::features::period::{TempoCandidate, TempoEstimator};
use crate::preprocessing::{BandSplitter, BAND_EDGES_HZ, NUM_BANDS};
use serde::Serialize;

/// High-resolution analysis: short window, ~5 ms hop
const FFT_HI: usize = 1024;
/// Low-resolution analysis: longer window, ~10 ms hop
const FFT_LO: usize = 2048;

/// Beat period assumed for onset merging before a tempo exists
const FALLBACK_PERIOD_SEC: f64 = 0.5;

/// Consecutive stable ticks required before a tempo reaches the beat
/// tracker
const STABLE_TICKS_REQUIRED: u32 = 3;

/// Relative BPM change still considered "stable" by the hysteresis
const STABLE_RELATIVE_CHANGE: f64 = 0.04;

/// What one emitter tick produced
#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    /// Current BPM estimate, once one exists
    pub bpm: Option<f64>,

    /// Confidence of the estimate in [0, 1]
    pub confidence: f64,

    /// Gated onsets that survived this tick (audio-time seconds)
    pub onsets: Vec<f64>,

    /// Predicted next beat instant, once phase-locked
    pub next_beat: Option<f64>,

    /// Tempo mapped onto a 0..=127 controller value, once a BPM exists
    pub tempo_cc: Option<u8>,

    /// Top tempo candidates, populated when candidate streaming is on
    pub candidates: Vec<TempoCandidate>,
}

/// All DSP state for one prepared sample rate
pub struct Pipeline {
    sample_rate: f64,
    block_hint: usize,
    config: EngineConfig,

    splitter: BandSplitter,
    detectors_hi: Vec<OnsetDetector>,
    detectors_lo: Vec<OnsetDetector>,
    fusion: FluxFusion,
    recent_onsets: RecentBandOnsets,
    tempo: TempoEstimator,
    tracker: BeatTracker,

    // Hysteresis gate between the estimator and the beat tracker
    stable_ticks: u32,
    last_applied_bpm: Option<f64>,

    // Reused tick scratch
    flux_scratch: Vec<f32>,
}

impl Pipeline {
    /// Build all state for `sample_rate`. `config` is clamped here.
    pub fn new(sample_rate: f64, block_hint: usize, config: &EngineConfig) -> Self {
        let config = config.clamped();
        let sr = sample_rate as f32;

        let hop_hi = ((sample_rate * 0.005).round() as usize).max(64);
        let hop_lo = ((sample_rate * 0.010).round() as usize).max(128);

        let mut detectors_hi = Vec::with_capacity(NUM_BANDS);
        let mut detectors_lo = Vec::with_capacity(NUM_BANDS);
        for (low, high) in BAND_EDGES_HZ {
            let mut hi = OnsetDetector::new(sr, FFT_HI, hop_hi, low, high);
            hi.set_threshold_window_seconds(0.75);
            detectors_hi.push(hi);
            let mut lo = OnsetDetector::new(sr, FFT_LO, hop_lo, low, high);
            lo.set_threshold_window_seconds(0.75);
            detectors_lo.push(lo);
        }

        log::info!(
            "pipeline prepared: SR={} Hz, block={}, hops {}/{}",
            sample_rate,
            block_hint,
            hop_hi,
            hop_lo
        );

        Self {
            sample_rate,
            block_hint,
            splitter: BandSplitter::new(sr, config.hpf_hz, config.lpf_hz),
            detectors_hi,
            detectors_lo,
            fusion: FluxFusion::new(),
            recent_onsets: RecentBandOnsets::new(),
            tempo: TempoEstimator::new(
                sample_rate,
                hop_hi,
                config.top_k_candidates,
                config.ioi_weight as f64,
                config.slew_percent,
            ),
            tracker: BeatTracker::new(),
            stable_ticks: 0,
            last_applied_bpm: None,
            flux_scratch: Vec::new(),
            config,
        }
    }

    /// Prepared sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Block size hint the pipeline was prepared with.
    pub fn block_hint(&self) -> usize {
        self.block_hint
    }

    /// Move the global prefilter edges; takes effect on the next chunk.
    pub fn set_prefilter_edges(&mut self, hpf_hz: f32, lpf_hz: f32) {
        let hpf = hpf_hz.clamp(10.0, 200.0);
        let lpf = lpf_hz.clamp(1000.0, 6000.0);
        self.config.hpf_hz = hpf;
        self.config.lpf_hz = lpf;
        self.splitter.set_prefilter_edges(hpf, lpf);
    }

    /// Worker entry: prefilter the chunk in place, band-split it, and
    /// feed every detector.
    pub fn process_chunk(&mut self, chunk: &mut [f32]) {
        self.splitter.prefilter(chunk);
        for band in 0..NUM_BANDS {
            let limited = self.splitter.band(band, chunk);
            self.detectors_hi[band].push_audio(limited);
            self.detectors_lo[band].push_audio(limited);
        }
    }

    /// Emitter entry: fuse flux, gate onsets, update tempo and beat
    /// state, and report what this tick produced. `now_sec` is the
    /// current audio-clock time.
    pub fn tick(&mut self, now_sec: f64) -> TickOutput {
        self.fuse_flux();
        let onsets = self.gate_onsets();

        if !onsets.is_empty() {
            self.tempo.ingest_onsets(&onsets);
            self.tracker.on_onsets(&onsets);
        }

        self.apply_tempo_hysteresis();

        let bpm = self.tempo.bpm();
        TickOutput {
            bpm,
            confidence: self.tempo.confidence(),
            onsets,
            next_beat: self.tracker.next_beat(now_sec),
            tempo_cc: bpm.map(crate::output::tempo_to_cc),
            candidates: if self.config.send_tempo_candidates {
                self.tempo.last_candidates().to_vec()
            } else {
                Vec::new()
            },
        }
    }

    /// Drain per-band flux, align, weight, and hand to the estimator.
    fn fuse_flux(&mut self) {
        for band in 0..NUM_BANDS {
            self.flux_scratch.clear();
            self.detectors_hi[band].fetch_new_flux(&mut self.flux_scratch);
            self.fusion.append(band, &self.flux_scratch);

            // The low-resolution flux stream feeds nothing downstream;
            // drain it so its queue stays bounded
            self.flux_scratch.clear();
            self.detectors_lo[band].fetch_new_flux(&mut self.flux_scratch);
        }

        let weights = self.recent_onsets.weights();
        let combined = self.fusion.drain_combined(&weights);
        if !combined.is_empty() {
            self.tempo.append_flux(&combined);
        }
    }

    /// Merge, cluster, dedupe, and coincidence-gate this tick's onsets.
    fn gate_onsets(&mut self) -> Vec<f64> {
        let mut band_onsets: [Vec<f64>; NUM_BANDS] = Default::default();
        let mut merged: Vec<f64> = Vec::new();
        for band in 0..NUM_BANDS {
            let list = &mut band_onsets[band];
            self.detectors_hi[band].fetch_onsets(list);
            self.detectors_lo[band].fetch_onsets(list);
            list.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            merged.extend_from_slice(list);
        }
        if merged.is_empty() {
            return Vec::new();
        }
        merged.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let window = self.config.coincidence_window_sec;
        let clustered = cluster_onsets(&merged, window);

        let period = self
            .tempo
            .bpm()
            .map(|bpm| 60.0 / bpm)
            .unwrap_or(FALLBACK_PERIOD_SEC);
        let deduped = dedupe_by_period(&clustered, period);

        let weights = self.recent_onsets.weights();
        let gated = coincidence_gate(
            &deduped,
            &band_onsets,
            window,
            &weights,
            self.config.min_bands_for_onset,
        );

        if let Some(&latest) = gated.last() {
            for (band, list) in band_onsets.iter().enumerate() {
                self.recent_onsets.ingest(band, list, latest);
            }
        }
        gated
    }

    /// Apply a confirmed-stable tempo to the beat tracker and refresh
    /// every detector's refractory from the beat period.
    fn apply_tempo_hysteresis(&mut self) {
        let Some(bpm) = self.tempo.bpm() else {
            return;
        };
        let conf = self.tempo.confidence();
        if conf < self.config.min_confidence_for_updates.max(0.25) {
            return;
        }

        let relative_change = match self.last_applied_bpm {
            Some(applied) => (bpm - applied).abs() / applied.max(1.0),
            None => 0.0,
        };
        if relative_change < STABLE_RELATIVE_CHANGE {
            self.stable_ticks += 1;
        } else {
            self.stable_ticks = 0;
        }

        if self.stable_ticks >= STABLE_TICKS_REQUIRED {
            self.tracker.update_bpm(bpm);
            let period = 60.0 / bpm;
            let refractory = (0.20 * period).clamp(0.04, 0.18);
            for band in 0..NUM_BANDS {
                self.detectors_hi[band].set_refractory_seconds(refractory);
                self.detectors_lo[band].set_refractory_seconds(refractory);
            }
            self.last_applied_bpm = Some(bpm);
            self.stable_ticks = 0;
            log::debug!(
                "applied tempo {:.2} BPM to beat tracker (refractory {:.3} s)",
                bpm,
                refractory
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48000.0;

    /// Broadband click train at the given BPM
    fn click_samples(bpm: f64, seconds: f64) -> Vec<f32> {
        let n = (seconds * SR) as usize;
        let period = (60.0 / bpm * SR) as usize;
        let click_len = (0.005 * SR) as usize;
        let mut samples = vec![0.0f32; n];
        let mut seed = 0xdead_beefu32;
        let mut pos = 0;
        while pos < n {
            for i in 0..click_len.min(n - pos) {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let noise = (seed as f32 / u32::MAX as f32) * 2.0 - 1.0;
                let env = (-(i as f32) / (click_len as f32 * 0.3)).exp();
                samples[pos + i] = noise * env * 0.9;
            }
            pos += period;
        }
        samples
    }

    /// Drive a pipeline the way the engine does: 512-sample chunks,
    /// a tick every ~33 ms of audio.
    fn run_pipeline(pipeline: &mut Pipeline, samples: &[f32]) -> Vec<TickOutput> {
        let mut outputs = Vec::new();
        let chunk_len = 512;
        let samples_per_tick = (SR / 30.0) as usize;
        let mut since_tick = 0usize;
        let mut consumed = 0usize;

        let mut buf = vec![0.0f32; chunk_len];
        while consumed < samples.len() {
            let n = chunk_len.min(samples.len() - consumed);
            buf[..n].copy_from_slice(&samples[consumed..consumed + n]);
            pipeline.process_chunk(&mut buf[..n]);
            consumed += n;
            since_tick += n;
            if since_tick >= samples_per_tick {
                since_tick = 0;
                outputs.push(pipeline.tick(consumed as f64 / SR));
            }
        }
        outputs.push(pipeline.tick(consumed as f64 / SR));
        outputs
    }

    #[test]
    fn test_pipeline_tracks_click_track() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let samples = click_samples(120.0, 10.0);
        let outputs = run_pipeline(&mut pipeline, &samples);

        let last = outputs.last().unwrap();
        let bpm = last.bpm.expect("BPM must settle");
        assert!((bpm - 120.0).abs() < 4.0, "expected ~120 BPM, got {:.2}", bpm);
        assert!(last.confidence >= 0.5, "confidence {}", last.confidence);

        let onset_count: usize = outputs.iter().map(|o| o.onsets.len()).sum();
        assert!(onset_count >= 12, "expected most clicks gated through, got {}", onset_count);
    }

    #[test]
    fn test_pipeline_next_beat_is_in_the_future() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let samples = click_samples(120.0, 10.0);
        let outputs = run_pipeline(&mut pipeline, &samples);

        let mut now = 0.0;
        let samples_per_tick = (SR / 30.0) as usize;
        for out in &outputs {
            now += samples_per_tick as f64 / SR;
            if let Some(next) = out.next_beat {
                assert!(next >= now - 0.05, "next beat {} far before now {}", next, now);
            }
        }
        assert!(
            outputs.last().unwrap().next_beat.is_some(),
            "phase lock expected by the end"
        );
    }

    #[test]
    fn test_pipeline_silence_produces_nothing() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let silence = vec![0.0f32; (5.0 * SR) as usize];
        let outputs = run_pipeline(&mut pipeline, &silence);

        for out in &outputs {
            assert!(out.onsets.is_empty(), "silence must not emit onsets");
            assert!(out.bpm.is_none(), "silence must not produce a BPM");
        }
    }

    #[test]
    fn test_pipeline_onsets_are_monotone_across_ticks() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let samples = click_samples(130.0, 8.0);
        let outputs = run_pipeline(&mut pipeline, &samples);

        let all: Vec<f64> = outputs.iter().flat_map(|o| o.onsets.iter().copied()).collect();
        assert!(!all.is_empty());
        for w in all.windows(2) {
            assert!(w[1] >= w[0] - 1e-9, "onset stream must be non-decreasing");
        }
    }

    #[test]
    fn test_pipeline_tempo_cc_mapping_present() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let samples = click_samples(120.0, 8.0);
        let outputs = run_pipeline(&mut pipeline, &samples);
        let last = outputs.last().unwrap();
        let cc = last.tempo_cc.expect("CC value expected once BPM exists");
        // 120 BPM -> (120-60)*127/180 = 42.33 -> 42
        assert!((40..=45).contains(&cc), "cc={}", cc);
    }

    #[test]
    fn test_pipeline_candidates_off_by_default() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        let samples = click_samples(120.0, 6.0);
        let outputs = run_pipeline(&mut pipeline, &samples);
        assert!(outputs.iter().all(|o| o.candidates.is_empty()));
    }

    #[test]
    fn test_pipeline_candidates_stream_when_enabled() {
        let config = EngineConfig {
            send_tempo_candidates: true,
            ..EngineConfig::default()
        };
        let mut pipeline = Pipeline::new(SR, 512, &config);
        let samples = click_samples(120.0, 8.0);
        let outputs = run_pipeline(&mut pipeline, &samples);
        assert!(
            outputs.iter().any(|o| !o.candidates.is_empty()),
            "candidates expected with streaming enabled"
        );
    }

    #[test]
    fn test_prefilter_edges_clamped() {
        let mut pipeline = Pipeline::new(SR, 512, &EngineConfig::default());
        pipeline.set_prefilter_edges(1.0, 50000.0);
        assert_eq!(pipeline.config.hpf_hz, 10.0);
        assert_eq!(pipeline.config.lpf_hz, 6000.0);
    }
}
