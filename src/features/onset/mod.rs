//! Onset detection modules
//!
//! Streaming conversion of band-limited audio into onset events:
//! - Per-band detectors (complex-domain spectral flux, adaptive
//!   median+MAD threshold, sub-hop refinement, refractory)
//! - Cross-band fusion of flux streams and coincidence gating of
//!   merged onsets

pub mod detector;
pub mod fusion;

pub use detector::OnsetDetector;
pub use fusion::{
    cluster_onsets, coincidence_gate, dedupe_by_period, FluxFusion, RecentBandOnsets,
};
