//! FFT-accelerated autocorrelation and prior-weighted peak picking
//!
//! The autocorrelation of the fused flux reveals the beat period as a
//! peak at the corresponding lag. Computation uses the FFT identity
//! `ACF = IFFT(|FFT(x)|^2)` with zero padding, followed by the
//! unbiased correction `acf[lag] /= (n - lag)` so longer lags are not
//! penalized by the shrinking overlap.
//!
//! # Reference
//!
//! Ellis, D. P. W., & Pikrakis, A. (2006). Real-time Beat Induction.
//! *Proceedings of the International Conference on Music Information
//! Retrieval*.

use super::TempoCandidate;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const EPSILON: f32 = 1e-12;

/// Lower edge of the BPM search range
pub const MIN_BPM: f64 = 40.0;

/// Upper edge of the BPM search range
pub const MAX_BPM: f64 = 240.0;

/// Compute the bias-corrected autocorrelation of `signal`.
///
/// The input is expected to be mean-removed. The result has the same
/// length as the input; `acf[0]` is the signal energy.
pub fn autocorrelation_fft(signal: &[f32], planner: &mut FftPlanner<f32>) -> Vec<f32> {
    let n = signal.len();
    if n == 0 {
        return Vec::new();
    }

    // Zero-pad to the next power of two >= 2n to make the circular
    // correlation linear
    let fft_size = (2 * n).next_power_of_two();
    let mut buf: Vec<Complex<f32>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buf.resize(fft_size, Complex::new(0.0, 0.0));

    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buf);

    for x in &mut buf {
        *x = *x * x.conj();
    }

    let ifft = planner.plan_fft_inverse(fft_size);
    ifft.process(&mut buf);

    let scale = 1.0 / fft_size as f32;
    let mut acf: Vec<f32> = buf[..n].iter().map(|x| x.re * scale).collect();

    // Unbiased estimate: divide by the overlap length per lag
    for (lag, value) in acf.iter_mut().enumerate().skip(1) {
        *value /= (n - lag) as f32;
    }
    acf
}

/// Metrical prior concentrating mass around 120 BPM, zero outside the
/// search range.
pub fn tempo_prior(bpm: f64) -> f64 {
    if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return 0.0;
    }
    0.7 + 0.3 * (-((bpm - 120.0) / 80.0).powi(2)).exp()
}

/// Scan the autocorrelation for local maxima inside the BPM range and
/// return the top `top_k` candidates by prior-weighted score.
///
/// `frames_per_second` is the flux frame rate `sample_rate / hop`.
pub fn scan_peaks(acf: &[f32], frames_per_second: f64, top_k: usize) -> Vec<TempoCandidate> {
    let min_lag = (frames_per_second * 60.0 / MAX_BPM).floor() as usize;
    let max_lag = (frames_per_second * 60.0 / MIN_BPM).ceil() as usize;
    if max_lag >= acf.len() {
        return Vec::new();
    }

    let mut peaks: Vec<TempoCandidate> = Vec::new();
    for lag in (min_lag + 1)..max_lag {
        let value = acf[lag];
        if value > acf[lag - 1] && value >= acf[lag + 1] && value > EPSILON {
            let bpm = 60.0 * frames_per_second / lag as f64;
            let weight = tempo_prior(bpm);
            if weight > 0.0 {
                peaks.push(TempoCandidate {
                    bpm,
                    score: value as f64 * weight,
                    selected: false,
                });
            }
        }
    }

    peaks.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    peaks.truncate(top_k);
    peaks
}
