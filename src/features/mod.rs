//! Feature extraction modules
//!
//! - `onset`: streaming per-band onset detection, fusion, and gating
//! - `period`: tempo (BPM) estimation from the fused flux
//! - `beat_tracking`: phase-locked next-beat prediction

pub mod beat_tracking;
pub mod onset;
pub mod period;
