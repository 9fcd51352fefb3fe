//! Streaming spectral-flux onset detection
//!
//! One detector instance analyzes a single band-limited mono stream at
//! a fixed FFT size and hop. Per hop it produces a normalized flux
//! z-score, and whenever the z-score stream forms a thresholded local
//! peak it emits an onset timestamp in audio-time seconds, refined to
//! sub-hop precision by parabolic interpolation.
//!
//! # Algorithm, per hop
//!
//! 1. Hann-window the most recent `fft_size` samples from the overlap
//!    FIFO and take the real-to-complex spectrum.
//! 2. Over the bins inside the detector's band, accumulate
//!    complex-domain flux: `max(0, m - m_prev * cos(dtheta))`, where
//!    `cos(dtheta)` comes from the dot product of the current and
//!    previous bin vectors.
//! 3. Smooth with an EWMA (alpha = 0.2), then normalize to a z-score
//!    against EWMA mean/variance (gamma = 0.05).
//! 4. Threshold adaptively: median + 3 * 1.4826 * MAD over the recent
//!    z window (0.75 s), with a fixed bootstrap threshold until the
//!    window has enough history.
//! 5. Declare a peak on a 3-point local maximum above threshold,
//!    refine the peak position parabolically, and emit the timestamp
//!    unless it falls inside the refractory interval.
//!
//! # Reference
//!
//! Bello, J. P., Daudet, L., Abdallah, S., Duxbury, C., Davies, M., &
//! Sandler, M. B. (2005). A Tutorial on Onset Detection in Music
//! Signals. *IEEE Transactions on Speech and Audio Processing*, 13(5).
//!
//! McFee, B., & Ellis, D. P. W. (2014). Better Beat Tracking Through
//! Robust Onset Aggregation. *Proceedings of ISMIR*.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::sync::Arc;

/// Numerical stability epsilon
const EPSILON: f32 = 1e-12;

/// EWMA factor for flux smoothing
const SMOOTHING_ALPHA: f32 = 0.2;

/// EWMA factor for the normalization mean/variance
const NORM_GAMMA: f32 = 0.05;

/// MAD multiplier (3 sigma via the 1.4826 consistency constant)
const MAD_K: f32 = 3.0 * 1.4826;

/// Fixed threshold used until the z window has enough history
const BOOTSTRAP_THRESHOLD: f32 = 2.5;

/// Minimum z-window fill before the adaptive threshold takes over
const MIN_THRESHOLD_SAMPLES: usize = 9;

/// Refractory clamp range in seconds
const REFRACTORY_RANGE: (f64, f64) = (0.05, 0.15);

/// Streaming onset detector for one band at one resolution
pub struct OnsetDetector {
    sample_rate: f32,
    fft_size: usize,
    hop_size: usize,
    band_low_hz: f32,
    band_high_hz: f32,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_buf: Vec<Complex<f32>>,

    // Overlap FIFO holding at least the most recent fft_size samples
    fifo: Vec<f32>,
    fifo_write: usize,
    samples_since_hop: usize,

    // Previous frame spectrum for the complex-domain difference
    prev_mag: Vec<f32>,
    prev_re: Vec<f32>,
    prev_im: Vec<f32>,

    // Smoothing and normalization state
    smoothed: f32,
    has_smoothed: bool,
    ewma_mean: f32,
    ewma_var: f32,
    ewma_init: bool,

    // Adaptive threshold window of recent z-scores
    recent_z: VecDeque<f32>,
    threshold_window: usize,

    // Three-point peak state
    prev2: f32,
    prev1: f32,
    curr: f32,
    frames_processed: u64,

    // Refractory gate
    refractory_sec: f64,
    last_onset_sec: f64,

    // Pending outputs, drained by the consumer
    pending_flux: Vec<f32>,
    pending_onsets: Vec<f64>,
}

impl OnsetDetector {
    /// Create a detector for the given band.
    ///
    /// `fft_size` must be a power of two. The hop determines the frame
    /// rate `sample_rate / hop_size` of the flux stream.
    pub fn new(
        sample_rate: f32,
        fft_size: usize,
        hop_size: usize,
        band_low_hz: f32,
        band_high_hz: f32,
    ) -> Self {
        debug_assert!(fft_size.is_power_of_two());
        debug_assert!(hop_size > 0);

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();

        let bins = fft_size / 2 + 1;
        let frames_per_second = sample_rate / hop_size as f32;

        Self {
            sample_rate,
            fft_size,
            hop_size,
            band_low_hz,
            band_high_hz,
            fft,
            window,
            fft_buf: vec![Complex::new(0.0, 0.0); fft_size],
            fifo: vec![0.0; fft_size * 2],
            fifo_write: 0,
            samples_since_hop: 0,
            prev_mag: vec![0.0; bins],
            prev_re: vec![0.0; bins],
            prev_im: vec![0.0; bins],
            smoothed: 0.0,
            has_smoothed: false,
            ewma_mean: 0.0,
            ewma_var: 0.0,
            ewma_init: false,
            recent_z: VecDeque::new(),
            threshold_window: (0.75 * frames_per_second).round().max(1.0) as usize,
            prev2: 0.0,
            prev1: 0.0,
            curr: 0.0,
            frames_processed: 0,
            refractory_sec: REFRACTORY_RANGE.0,
            last_onset_sec: f64::NEG_INFINITY,
            pending_flux: Vec::new(),
            pending_onsets: Vec::new(),
        }
    }

    /// Set the adaptive-threshold window length in seconds.
    pub fn set_threshold_window_seconds(&mut self, seconds: f32) {
        let frames_per_second = self.sample_rate / self.hop_size as f32;
        self.threshold_window = (seconds * frames_per_second).round().max(1.0) as usize;
        while self.recent_z.len() > self.threshold_window {
            self.recent_z.pop_front();
        }
    }

    /// Set the minimum spacing between emitted onsets. The value is
    /// clamped to the detector's legal range.
    pub fn set_refractory_seconds(&mut self, seconds: f64) {
        self.refractory_sec = seconds.clamp(REFRACTORY_RANGE.0, REFRACTORY_RANGE.1);
    }

    /// Feed band-limited mono samples; frames are analyzed every
    /// `hop_size` input samples.
    pub fn push_audio(&mut self, mono: &[f32]) {
        for &sample in mono {
            self.fifo[self.fifo_write] = sample;
            self.fifo_write = (self.fifo_write + 1) % self.fifo.len();
            self.samples_since_hop += 1;
            if self.samples_since_hop >= self.hop_size {
                self.samples_since_hop = 0;
                self.compute_frame();
            }
        }
    }

    /// Drain pending flux z-scores into `out`.
    pub fn fetch_new_flux(&mut self, out: &mut Vec<f32>) {
        out.append(&mut self.pending_flux);
    }

    /// Drain pending onset timestamps (audio-time seconds) into `out`.
    pub fn fetch_onsets(&mut self, out: &mut Vec<f64>) {
        out.append(&mut self.pending_onsets);
    }

    /// Hop size in samples.
    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    fn compute_frame(&mut self) {
        // Window the most recent fft_size samples out of the FIFO
        let fifo_len = self.fifo.len();
        for i in 0..self.fft_size {
            let idx = (self.fifo_write + fifo_len - self.fft_size + i) % fifo_len;
            self.fft_buf[i] = Complex::new(self.fifo[idx] * self.window[i], 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        let bins = self.fft_size / 2 + 1;
        let hz_per_bin = self.sample_rate / self.fft_size as f32;
        let start_bin = ((self.band_low_hz / hz_per_bin).ceil() as usize).min(bins - 1);
        let end_bin = ((self.band_high_hz / hz_per_bin).floor() as usize).min(bins - 1);

        // Complex-domain flux over the in-band bins
        let mut flux = 0.0f32;
        for k in 0..bins {
            let re = self.fft_buf[k].re;
            let im = self.fft_buf[k].im;
            let mag = (re * re + im * im).sqrt();

            if k >= start_bin && k <= end_bin {
                let prev_mag = self.prev_mag[k];
                let denom = mag * prev_mag;
                let cos_dtheta = if denom > EPSILON {
                    ((re * self.prev_re[k] + im * self.prev_im[k]) / denom).clamp(-1.0, 1.0)
                } else {
                    1.0
                };
                flux += (mag - prev_mag * cos_dtheta).max(0.0);
            }

            self.prev_mag[k] = mag;
            self.prev_re[k] = re;
            self.prev_im[k] = im;
        }

        // Smoothing
        self.smoothed = if self.has_smoothed {
            SMOOTHING_ALPHA * flux + (1.0 - SMOOTHING_ALPHA) * self.smoothed
        } else {
            self.has_smoothed = true;
            flux
        };

        // Normalization to a z-score against the running baseline
        if self.ewma_init {
            let dm = self.smoothed - self.ewma_mean;
            self.ewma_mean += NORM_GAMMA * dm;
            self.ewma_var = (1.0 - NORM_GAMMA) * (self.ewma_var + NORM_GAMMA * dm * dm);
        } else {
            self.ewma_mean = self.smoothed;
            self.ewma_var = 0.0;
            self.ewma_init = true;
        }
        let z = (self.smoothed - self.ewma_mean) / self.ewma_var.max(EPSILON).sqrt();

        // Adaptive threshold over the recent z window
        self.recent_z.push_back(z);
        while self.recent_z.len() > self.threshold_window {
            self.recent_z.pop_front();
        }
        let threshold = self.adaptive_threshold();

        // Three-point peak on the z stream
        self.prev2 = self.prev1;
        self.prev1 = self.curr;
        self.curr = z;

        if self.frames_processed >= 2 {
            let is_peak =
                self.prev1 > self.prev2 && self.prev1 >= self.curr && self.prev1 > threshold;
            if is_peak {
                // Parabolic sub-hop refinement around the peak frame
                let denom = self.prev2 - 2.0 * self.prev1 + self.curr;
                let delta = if denom.abs() > EPSILON {
                    (0.5 * (self.prev2 - self.curr) / denom).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
                // Window-centered timestamp of the peak frame
                let time_sec = (((self.frames_processed - 1) as f64 + delta as f64)
                    * self.hop_size as f64
                    + (self.fft_size / 2) as f64)
                    / self.sample_rate as f64;

                if time_sec - self.last_onset_sec >= self.refractory_sec {
                    self.pending_onsets.push(time_sec);
                    self.last_onset_sec = time_sec;
                }
            }
        }

        self.pending_flux.push(z);
        self.frames_processed += 1;
    }

    fn adaptive_threshold(&self) -> f32 {
        if self.recent_z.len() < MIN_THRESHOLD_SAMPLES {
            return BOOTSTRAP_THRESHOLD;
        }

        let mut sorted: Vec<f32> = self.recent_z.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let median = median_of_sorted(&sorted);

        let mut deviations: Vec<f32> = sorted.iter().map(|&v| (v - median).abs()).collect();
        deviations.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mad = median_of_sorted(&deviations);

        median + MAD_K * (mad + 1e-6)
    }
}

fn median_of_sorted(sorted: &[f32]) -> f32 {
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) * 0.5
    } else {
        sorted[n / 2]
    }
}
