//! Beat tracking module
//!
//! Maintains a phase-locked beat grid from the running tempo and the
//! gated onset stream, and predicts the next beat instant in audio
//! time.

pub mod tracker;

pub use tracker::BeatTracker;
