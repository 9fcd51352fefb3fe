//! # Beatline
//!
//! A live beat and tempo estimation engine for continuous mono audio
//! streams, providing onset events, a running BPM with confidence, and
//! phase-locked next-beat predictions.
//!
//! ## Features
//!
//! - **Onset detection**: five fixed bands, each analyzed at two
//!   resolutions with complex-domain spectral flux and adaptive
//!   median+MAD thresholding
//! - **Tempo estimation**: FFT autocorrelation over the fused flux
//!   with harmonic grouping, inter-onset-interval support, and
//!   slew-limited updates
//! - **Beat tracking**: phase-locked next-beat prediction driven by
//!   the gated onset stream
//! - **Emission**: OSC-over-UDP event stream and an optional MIDI
//!   control surface (feature `midi`)
//!
//! ## Quick Start
//!
//! ```no_run
//! use beatline::{CaptureBridge, Engine, EngineConfig, SamplePacket};
//!
//! let (mut engine, mut bridge) = Engine::new(EngineConfig::default());
//! engine.start_emitter(|tick| {
//!     if let Some(bpm) = tick.bpm {
//!         println!("BPM: {:.1} (confidence: {:.2})", bpm, tick.confidence);
//!     }
//! });
//!
//! // Inside the host's capture callback:
//! let packet: Vec<f32> = vec![0.0; 512 * 2]; // interleaved stereo
//! let _ = bridge.on_packet(SamplePacket::F32(&packet), 512, 2, 48000, 0.0);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Capture -> Ring -> Prefilter -> Band split -> Onset detectors
//!         -> Fusion/Gating -> Tempo estimator -> Beat tracker -> Emitters
//! ```
//!
//! Three threads cooperate: the host's capture thread (writes the
//! ring, never blocks), the worker (reads fixed chunks and feeds the
//! detectors), and the emitter (30 Hz fusion/tempo/beat updates and
//! publication). One coarse mutex guards the DSP state; the ring is
//! lock-free.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod io;
pub mod output;
pub mod preprocessing;

// Re-export main types
pub use config::EngineConfig;
pub use engine::{Engine, Pipeline, TickOutput};
pub use error::EngineError;
pub use features::beat_tracking::BeatTracker;
pub use features::onset::OnsetDetector;
pub use features::period::{TempoCandidate, TempoEstimator};
pub use io::{pick_preferred_endpoint, CaptureBridge, SamplePacket};
pub use output::{ControlSurface, EventStreamSender, Publisher};
