//! Pipeline assembly and runtime
//!
//! [`Pipeline`] owns every DSP state object for one prepared sample
//! rate and implements the per-chunk processing and the UI-rate tick.
//! [`Engine`] wraps a pipeline behind the coarse pipeline mutex and
//! runs the worker thread (ring to detectors) and the emitter thread
//! (tick to sinks).

pub mod pipeline;
pub mod runtime;

pub use pipeline::{Pipeline, TickOutput};
pub use runtime::Engine;
