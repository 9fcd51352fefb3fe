//! Configuration parameters for the live engine

use serde::{Deserialize, Serialize};

/// Engine configuration parameters
///
/// Every field has a sane default; out-of-range values are brought back
/// into range by [`EngineConfig::clamped`], which the engine applies on
/// construction. Ranges follow the control surface of the pipeline:
/// prefilter edges, onset gating, and tempo update behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // Prefilter
    /// Global high-pass edge in Hz (default: 20.0, range [10, 200])
    pub hpf_hz: f32,

    /// Global low-pass edge in Hz (default: 6000.0, range [1000, 6000])
    pub lpf_hz: f32,

    // Capture
    /// Substring used to match a render endpoint when enumerating
    /// loopback devices (default: empty, matches nothing special)
    pub preferred_output_name: String,

    // Onset gating
    /// Multi-band coincidence window in seconds
    /// (default: 0.015, range [0.008, 0.030])
    pub coincidence_window_sec: f64,

    /// Minimum number of distinct bands that must support a merged
    /// onset (default: 2, minimum 1)
    pub min_bands_for_onset: usize,

    // Tempo updates
    /// Confidence floor below which tempo updates are never applied to
    /// the beat tracker (default: 0.20)
    pub min_confidence_for_updates: f64,

    /// Number of autocorrelation peaks kept as tempo candidates
    /// (default: 5, range [1, 10])
    pub top_k_candidates: usize,

    /// Weight of inter-onset-interval support in candidate scoring
    /// (default: 1.0, range [0, 4])
    pub ioi_weight: f32,

    /// Maximum relative BPM change per estimator update
    /// (default: 0.03, range [0.01, 0.20])
    pub slew_percent: f64,

    // Diagnostics
    /// Stream the top tempo candidates over the event stream
    /// (default: off)
    pub send_tempo_candidates: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hpf_hz: 20.0,
            lpf_hz: 6000.0,
            preferred_output_name: String::new(),
            coincidence_window_sec: 0.015,
            min_bands_for_onset: 2,
            min_confidence_for_updates: 0.20,
            top_k_candidates: 5,
            ioi_weight: 1.0,
            slew_percent: 0.03,
            send_tempo_candidates: false,
        }
    }
}

impl EngineConfig {
    /// Return a copy with every field brought into its legal range.
    pub fn clamped(&self) -> Self {
        Self {
            hpf_hz: self.hpf_hz.clamp(10.0, 200.0),
            lpf_hz: self.lpf_hz.clamp(1000.0, 6000.0),
            preferred_output_name: self.preferred_output_name.clone(),
            coincidence_window_sec: self.coincidence_window_sec.clamp(0.008, 0.030),
            min_bands_for_onset: self.min_bands_for_onset.max(1),
            min_confidence_for_updates: self.min_confidence_for_updates.clamp(0.0, 1.0),
            top_k_candidates: self.top_k_candidates.clamp(1, 10),
            ioi_weight: self.ioi_weight.clamp(0.0, 4.0),
            slew_percent: self.slew_percent.clamp(0.01, 0.20),
            send_tempo_candidates: self.send_tempo_candidates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_already_clamped() {
        let config = EngineConfig::default();
        let clamped = config.clamped();
        assert_eq!(config.hpf_hz, clamped.hpf_hz);
        assert_eq!(config.lpf_hz, clamped.lpf_hz);
        assert_eq!(config.coincidence_window_sec, clamped.coincidence_window_sec);
        assert_eq!(config.min_bands_for_onset, clamped.min_bands_for_onset);
        assert_eq!(config.top_k_candidates, clamped.top_k_candidates);
        assert_eq!(config.ioi_weight, clamped.ioi_weight);
        assert_eq!(config.slew_percent, clamped.slew_percent);
    }

    #[test]
    fn test_clamping_out_of_range_values() {
        let config = EngineConfig {
            hpf_hz: 5.0,
            lpf_hz: 20000.0,
            coincidence_window_sec: 0.5,
            min_bands_for_onset: 0,
            top_k_candidates: 100,
            ioi_weight: -1.0,
            slew_percent: 0.5,
            ..EngineConfig::default()
        };

        let clamped = config.clamped();
        assert_eq!(clamped.hpf_hz, 10.0);
        assert_eq!(clamped.lpf_hz, 6000.0);
        assert_eq!(clamped.coincidence_window_sec, 0.030);
        assert_eq!(clamped.min_bands_for_onset, 1);
        assert_eq!(clamped.top_k_candidates, 10);
        assert_eq!(clamped.ioi_weight, 0.0);
        assert_eq!(clamped.slew_percent, 0.20);
    }

    #[test]
    fn test_preferred_output_name_survives_clamping() {
        let config = EngineConfig {
            preferred_output_name: "Speakers".to_string(),
            ..EngineConfig::default()
        };
        assert_eq!(config.clamped().preferred_output_name, "Speakers");
    }
}
