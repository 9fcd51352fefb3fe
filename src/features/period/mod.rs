//! Tempo (period) estimation modules
//!
//! Convert the fused flux activation into BPM candidates and a
//! slew-limited running tempo:
//! - FFT-accelerated autocorrelation with bias correction
//! - Prior-weighted peak picking
//! - Inter-onset-interval support
//! - Harmonic grouping and candidate selection

pub mod autocorrelation;
pub mod candidate_filter;
pub mod estimator;
pub mod ioi;

pub use estimator::TempoEstimator;

use serde::{Deserialize, Serialize};

/// One tempo candidate from an estimator update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoCandidate {
    /// Candidate tempo in BPM
    pub bpm: f64,

    /// Prior-weighted autocorrelation score
    pub score: f64,

    /// True if this candidate's harmonic group won the update
    pub selected: bool,
}
