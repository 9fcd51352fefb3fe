//! Global prefilter and fixed five-band split
//!
//! The prefilter is applied in place to each worker chunk; each band
//! then filters its own copy of the prefiltered chunk. Band edges are
//! fixed per preset; the prefilter edges are user-adjustable and take
//! effect on the next chunk.

use crate::preprocessing::biquad::BandFilter;

/// Number of analysis bands
pub const NUM_BANDS: usize = 5;

/// Fixed band edges in Hz: (low, high) per band
pub const BAND_EDGES_HZ: [(f32, f32); NUM_BANDS] = [
    (20.0, 150.0),
    (150.0, 400.0),
    (400.0, 800.0),
    (800.0, 2000.0),
    (2000.0, 6000.0),
];

/// Prefilter plus the per-band filter array for one prepared stream
#[derive(Debug)]
pub struct BandSplitter {
    sample_rate: f32,
    prefilter: BandFilter,
    bands: [BandFilter; NUM_BANDS],
    /// Scratch copy of the prefiltered chunk handed to each band
    scratch: Vec<f32>,
}

impl BandSplitter {
    /// Build filters for `sample_rate` with the given prefilter edges.
    pub fn new(sample_rate: f32, hpf_hz: f32, lpf_hz: f32) -> Self {
        let bands = BAND_EDGES_HZ
            .map(|(low, high)| BandFilter::new(sample_rate, low, high));
        Self {
            sample_rate,
            prefilter: BandFilter::new(sample_rate, hpf_hz, lpf_hz),
            bands,
            scratch: Vec::new(),
        }
    }

    /// Move the global prefilter edges; applied on the next chunk.
    pub fn set_prefilter_edges(&mut self, hpf_hz: f32, lpf_hz: f32) {
        self.prefilter.set_edges(self.sample_rate, hpf_hz, lpf_hz);
    }

    /// Apply the global prefilter in place.
    pub fn prefilter(&mut self, chunk: &mut [f32]) {
        self.prefilter.process(chunk);
    }

    /// Run `chunk` (already prefiltered) through one band's filters,
    /// returning the band-limited copy.
    pub fn band(&mut self, index: usize, chunk: &[f32]) -> &[f32] {
        self.scratch.clear();
        self.scratch.extend_from_slice(chunk);
        self.bands[index].process(&mut self.scratch);
        &self.scratch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|&x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_band_split_routes_tone_to_matching_band() {
        let sr = 48000.0;
        let mut splitter = BandSplitter::new(sr, 20.0, 6000.0);
        let mut chunk = sine(600.0, sr, 24000);
        splitter.prefilter(&mut chunk);

        let mut band_rms = [0.0f32; NUM_BANDS];
        for (b, out) in band_rms.iter_mut().enumerate() {
            let filtered = splitter.band(b, &chunk);
            *out = rms(&filtered[filtered.len() / 2..]);
        }

        // 600 Hz lies in band 2 (400-800 Hz)
        let loudest = band_rms
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, 2, "band energies: {:?}", band_rms);
    }

    #[test]
    fn test_prefilter_edge_change_applies() {
        let sr = 48000.0;
        let mut splitter = BandSplitter::new(sr, 20.0, 6000.0);

        let mut open = sine(100.0, sr, 24000);
        splitter.prefilter(&mut open);
        let open_rms = rms(&open[12000..]);

        // Raise the high-pass above the tone; next chunks are attenuated
        splitter.set_prefilter_edges(200.0, 6000.0);
        let mut closed = sine(100.0, sr, 24000);
        splitter.prefilter(&mut closed);
        let closed_rms = rms(&closed[12000..]);

        assert!(
            closed_rms < open_rms * 0.5,
            "expected attenuation after edge change: {} vs {}",
            closed_rms,
            open_rms
        );
    }
}
