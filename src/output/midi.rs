//! MIDI control surface (feature `midi`)
//!
//! Hardware-backed [`ControlSurface`] over a `midir` output
//! connection. Beat pulses are note-on messages whose note-offs are
//! released on a later `service()` call once the gate time has
//! elapsed; tempo updates go out as controller events.

use crate::error::EngineError;
use crate::output::{
    ControlSurface, BEAT_GATE_MS, BEAT_NOTE, BEAT_VELOCITY, CONTROL_CHANNEL, TEMPO_CC,
};
use midir::{MidiOutput, MidiOutputConnection};
use std::time::{Duration, Instant};

/// Status nibbles (channel applied as `status | (channel - 1)`)
const NOTE_ON: u8 = 0x90;
const NOTE_OFF: u8 = 0x80;
const CONTROL_CHANGE: u8 = 0xB0;

/// MIDI-backed control surface
pub struct MidiControlSurface {
    connection: MidiOutputConnection,
    pending_note_offs: Vec<Instant>,
}

impl MidiControlSurface {
    /// List the names of the available MIDI output ports.
    pub fn list_ports() -> Result<Vec<String>, EngineError> {
        let output = MidiOutput::new("beatline")
            .map_err(|e| EngineError::OutputSetup(format!("MIDI init failed: {}", e)))?;
        Ok(output
            .ports()
            .iter()
            .map(|p| output.port_name(p).unwrap_or_else(|_| "<unknown>".to_string()))
            .collect())
    }

    /// Open the first port whose name contains `keyword`
    /// (case-insensitive), or the first port when `keyword` is empty.
    pub fn connect(keyword: &str) -> Result<Self, EngineError> {
        let output = MidiOutput::new("beatline")
            .map_err(|e| EngineError::OutputSetup(format!("MIDI init failed: {}", e)))?;
        let ports = output.ports();
        if ports.is_empty() {
            return Err(EngineError::OutputSetup("no MIDI output ports".to_string()));
        }

        let needle = keyword.to_lowercase();
        let port = ports
            .iter()
            .find(|p| {
                needle.is_empty()
                    || output
                        .port_name(p)
                        .map(|n| n.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            })
            .unwrap_or(&ports[0]);

        let name = output.port_name(port).unwrap_or_default();
        let connection = output
            .connect(port, "beatline-out")
            .map_err(|e| EngineError::OutputSetup(format!("MIDI connect failed: {}", e)))?;
        log::info!("MIDI connected: {}", name);

        Ok(Self {
            connection,
            pending_note_offs: Vec::new(),
        })
    }

    fn send(&mut self, message: &[u8]) {
        if let Err(e) = self.connection.send(message) {
            log::warn!("MIDI send failed: {}", e);
        }
    }
}

impl ControlSurface for MidiControlSurface {
    fn beat_pulse(&mut self) {
        let status = NOTE_ON | (CONTROL_CHANNEL - 1);
        self.send(&[status, BEAT_NOTE, BEAT_VELOCITY]);
        self.pending_note_offs
            .push(Instant::now() + Duration::from_millis(BEAT_GATE_MS));
    }

    fn tempo_value(&mut self, value: u8) {
        let status = CONTROL_CHANGE | (CONTROL_CHANNEL - 1);
        self.send(&[status, TEMPO_CC, value.min(127)]);
    }

    fn service(&mut self) {
        let now = Instant::now();
        let due = self
            .pending_note_offs
            .iter()
            .filter(|&&deadline| deadline <= now)
            .count();
        if due > 0 {
            self.pending_note_offs.retain(|&deadline| deadline > now);
            let status = NOTE_OFF | (CONTROL_CHANNEL - 1);
            for _ in 0..due {
                self.send(&[status, BEAT_NOTE, 0]);
            }
        }
    }
}

impl Drop for MidiControlSurface {
    fn drop(&mut self) {
        // Leave no note hanging
        let status = NOTE_OFF | (CONTROL_CHANNEL - 1);
        for _ in 0..self.pending_note_offs.len() {
            let msg = [status, BEAT_NOTE, 0];
            let _ = self.connection.send(&msg);
        }
    }
}
