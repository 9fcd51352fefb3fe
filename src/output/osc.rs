//! OSC-over-UDP event stream
//!
//! Encodes the pipeline's events as OSC 1.0 messages and sends them as
//! UDP datagrams to a configured destination (default
//! `127.0.0.1:9000`). Only float arguments are needed:
//!
//! - `/beat <f32 t>` per surviving onset (audio-time seconds)
//! - `/tempo <f32 bpm> <f32 conf>` per emitter tick
//! - `/candidates <f32 bpm, f32 score> ...` per tick when candidate
//!   streaming is enabled
//!
//! Encoding is done locally: an OSC message is the padded address
//! string, a padded type tag string (","), then big-endian arguments,
//! everything aligned to 4 bytes.

use crate::error::EngineError;
use crate::features::period::TempoCandidate;
use std::net::UdpSocket;

/// Default event-stream destination
pub const DEFAULT_DESTINATION: &str = "127.0.0.1:9000";

/// Append an OSC-padded string (NUL-terminated, length a multiple
/// of 4).
fn push_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Encode one OSC message with float32 arguments.
fn encode_message(address: &str, args: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(address.len() + 8 + args.len() * 4);
    push_padded_str(&mut buf, address);

    let mut tags = String::with_capacity(1 + args.len());
    tags.push(',');
    for _ in args {
        tags.push('f');
    }
    push_padded_str(&mut buf, &tags);

    for &arg in args {
        buf.extend_from_slice(&arg.to_be_bytes());
    }
    buf
}

/// UDP sender for the beat/tempo event stream
pub struct EventStreamSender {
    socket: UdpSocket,
}

impl EventStreamSender {
    /// Bind an ephemeral local port and aim at `destination`
    /// (host:port).
    pub fn connect(destination: &str) -> Result<Self, EngineError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| EngineError::OutputSetup(format!("UDP bind failed: {}", e)))?;
        socket
            .connect(destination)
            .map_err(|e| EngineError::OutputSetup(format!("UDP connect failed: {}", e)))?;
        log::info!("event stream connected to {}", destination);
        Ok(Self { socket })
    }

    /// Connect to the default destination.
    pub fn connect_default() -> Result<Self, EngineError> {
        Self::connect(DEFAULT_DESTINATION)
    }

    /// Send one onset event.
    pub fn send_beat(&mut self, onset_time_sec: f64) {
        self.send("/beat", &[onset_time_sec as f32]);
    }

    /// Send the per-tick tempo message.
    pub fn send_tempo(&mut self, bpm: f64, confidence: f64) {
        self.send("/tempo", &[bpm as f32, confidence as f32]);
    }

    /// Send the candidate list as flattened (bpm, score) pairs.
    pub fn send_candidates(&mut self, candidates: &[TempoCandidate]) {
        let mut args = Vec::with_capacity(candidates.len() * 2);
        for candidate in candidates {
            args.push(candidate.bpm as f32);
            args.push(candidate.score as f32);
        }
        self.send("/candidates", &args);
    }

    fn send(&mut self, address: &str, args: &[f32]) {
        let datagram = encode_message(address, args);
        if let Err(e) = self.socket.send(&datagram) {
            log::warn!("event stream send failed: {}", e);
        }
    }
}
