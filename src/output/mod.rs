//! Emission of results to external consumers
//!
//! Two independent sinks mirror the pipeline's outputs:
//! - an OSC-over-UDP event stream ("/beat", "/tempo", and optionally
//!   "/candidates"),
//! - a control surface carrying beat note pulses and a tempo
//!   controller value (MIDI when the `midi` feature is enabled).
//!
//! [`Publisher`] fans one [`TickOutput`] out to whichever sinks are
//! connected; the engine's emitter thread drives it once per tick.

pub mod osc;

#[cfg(feature = "midi")]
pub mod midi;

pub use osc::EventStreamSender;

use crate::engine::TickOutput;

/// Controller number carrying the tempo value
pub const TEMPO_CC: u8 = 20;

/// Channel used for all control-surface traffic (1-based)
pub const CONTROL_CHANNEL: u8 = 1;

/// Note used for beat pulses (C4)
pub const BEAT_NOTE: u8 = 60;

/// Velocity of beat pulses
pub const BEAT_VELOCITY: u8 = 100;

/// Gate length of a beat pulse in milliseconds
pub const BEAT_GATE_MS: u64 = 60;

/// Map a BPM onto the 0..=127 controller range (60..240 BPM).
pub fn tempo_to_cc(bpm: f64) -> u8 {
    ((bpm - 60.0) * 127.0 / 180.0).round().clamp(0.0, 127.0) as u8
}

/// A control surface that can pulse beats and report tempo
///
/// The engine only depends on this trait; the `midi` feature provides
/// the hardware-backed implementation.
pub trait ControlSurface: Send {
    /// Emit one beat pulse (note on; the implementation releases the
    /// gate later).
    fn beat_pulse(&mut self);

    /// Report the current tempo as a controller value.
    fn tempo_value(&mut self, value: u8);

    /// Housekeeping hook called once per tick (gate releases etc.).
    fn service(&mut self);
}

/// Fans a tick's results out to the connected sinks
pub struct Publisher {
    event_stream: Option<EventStreamSender>,
    control: Option<Box<dyn ControlSurface>>,
}

impl Publisher {
    /// Build a publisher over whichever sinks are available.
    pub fn new(
        event_stream: Option<EventStreamSender>,
        control: Option<Box<dyn ControlSurface>>,
    ) -> Self {
        Self {
            event_stream,
            control,
        }
    }

    /// Publish one tick: a "/beat" per surviving onset, one "/tempo"
    /// per tick, beat pulses and a tempo controller value.
    pub fn publish(&mut self, tick: &TickOutput) {
        if let Some(stream) = &mut self.event_stream {
            for &onset in &tick.onsets {
                stream.send_beat(onset);
            }
            if let Some(bpm) = tick.bpm {
                stream.send_tempo(bpm, tick.confidence);
            }
            if !tick.candidates.is_empty() {
                stream.send_candidates(&tick.candidates);
            }
        }

        if let Some(control) = &mut self.control {
            control.service();
            for _ in &tick.onsets {
                control.beat_pulse();
            }
            if let Some(value) = tick.tempo_cc {
                control.tempo_value(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_to_cc_endpoints() {
        assert_eq!(tempo_to_cc(60.0), 0);
        assert_eq!(tempo_to_cc(240.0), 127);
        // Below/above the range clamps
        assert_eq!(tempo_to_cc(40.0), 0);
        assert_eq!(tempo_to_cc(300.0), 127);
    }

    #[test]
    fn test_tempo_to_cc_midpoint() {
        // 120 BPM -> (120-60)*127/180 = 42.33 -> 42
        assert_eq!(tempo_to_cc(120.0), 42);
        // 150 BPM is the range midpoint -> 63 or 64
        let mid = tempo_to_cc(150.0);
        assert!((63..=64).contains(&mid));
    }
}
