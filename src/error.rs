//! Error types for the beat estimation engine

use std::fmt;

/// Errors that can occur while capturing or analyzing live audio
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Capture endpoint enumeration, activation, or start failed.
    /// The only fatal error: the worker is never started.
    CaptureSetup(String),

    /// An output sink (event stream, control surface) could not be
    /// opened
    OutputSetup(String),

    /// Invalid input parameters
    InvalidInput(String),

    /// Processing error inside the pipeline
    Processing(String),

    /// Numerical error (degenerate energy, non-finite values, etc.)
    Numerical(String),

    /// The handoff ring had insufficient free space; the packet was
    /// dropped and the loss counter incremented. Carries the number of
    /// dropped frames.
    Overrun(usize),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::CaptureSetup(msg) => write!(f, "capture setup failed: {}", msg),
            EngineError::OutputSetup(msg) => write!(f, "output setup failed: {}", msg),
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            EngineError::Processing(msg) => write!(f, "processing error: {}", msg),
            EngineError::Numerical(msg) => write!(f, "numerical error: {}", msg),
            EngineError::Overrun(frames) => write!(f, "ring overrun: dropped {} frames", frames),
        }
    }
}

impl std::error::Error for EngineError {}
