//! Capture bridge: driver packets to mono ring samples
//!
//! The bridge sits between the host capture driver and the handoff
//! ring. It downmixes interleaved packets to mono, converts integer
//! formats to float in [-1, +1], lazily (re)prepares the pipeline when
//! the stream's sample rate changes, and commits each packet to the
//! ring in a single reservation. It runs entirely on the capture
//! thread and never blocks: a full ring drops the packet and counts
//! the loss.

use crate::error::EngineError;
use crate::io::ring::RingProducer;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One interleaved driver packet in whatever format the driver signals
#[derive(Debug, Clone, Copy)]
pub enum SamplePacket<'a> {
    /// 32-bit float, nominal [-1, +1] (not clamped)
    F32(&'a [f32]),
    /// Signed 16-bit PCM
    I16(&'a [i16]),
    /// Signed 32-bit PCM
    I32(&'a [i32]),
    /// Unsigned 16-bit PCM (midpoint 32768)
    U16(&'a [u16]),
}

impl SamplePacket<'_> {
    fn len(&self) -> usize {
        match self {
            SamplePacket::F32(s) => s.len(),
            SamplePacket::I16(s) => s.len(),
            SamplePacket::I32(s) => s.len(),
            SamplePacket::U16(s) => s.len(),
        }
    }

    #[inline]
    fn sample(&self, index: usize) -> f32 {
        match self {
            SamplePacket::F32(s) => s[index],
            SamplePacket::I16(s) => f32::from(s[index]) / 32768.0,
            SamplePacket::I32(s) => s[index] as f32 / 2147483648.0,
            SamplePacket::U16(s) => (f32::from(s[index]) - 32768.0) / 32768.0,
        }
    }
}

/// Driver-facing side of the pipeline
///
/// Owns the ring producer. The prepare callback is invoked (on the
/// capture thread) whenever a packet arrives at a rate differing from
/// the prepared one; it must rebuild the pipeline for the new rate and
/// update the shared rate cell before returning.
pub struct CaptureBridge {
    producer: RingProducer,
    prepared_rate: Arc<AtomicU32>,
    on_prepare: Box<dyn FnMut(u32) + Send>,
    /// Downmix scratch, reused across packets
    mono: Vec<f32>,
    last_arrival: f64,
}

impl CaptureBridge {
    /// Create a bridge feeding `producer`.
    ///
    /// `prepared_rate` is the shared cell holding the currently
    /// prepared sample rate (0 = unprepared); `on_prepare` is called
    /// with the new rate before the first sample at that rate is
    /// enqueued.
    pub fn new(
        producer: RingProducer,
        prepared_rate: Arc<AtomicU32>,
        on_prepare: Box<dyn FnMut(u32) + Send>,
    ) -> Self {
        Self {
            producer,
            prepared_rate,
            on_prepare,
            mono: Vec::new(),
            last_arrival: 0.0,
        }
    }

    /// Handle one driver packet.
    ///
    /// `frames * channels` must equal the packet length. Returns
    /// `EngineError::Overrun` when the ring had no room; the packet is
    /// dropped and the loss counter incremented, but the capture
    /// callback itself never blocks.
    pub fn on_packet(
        &mut self,
        packet: SamplePacket<'_>,
        frames: usize,
        channels: usize,
        sample_rate: u32,
        arrival_clock: f64,
    ) -> Result<(), EngineError> {
        if channels == 0 {
            return Err(EngineError::InvalidInput("zero channels".to_string()));
        }
        if packet.len() != frames * channels {
            return Err(EngineError::InvalidInput(format!(
                "packet length {} does not match {} frames x {} channels",
                packet.len(),
                frames,
                channels
            )));
        }

        self.prepare_if_needed(sample_rate);
        self.last_arrival = arrival_clock;

        self.mono.clear();
        self.mono.reserve(frames);
        let inv_channels = 1.0 / channels as f32;
        for frame in 0..frames {
            let base = frame * channels;
            let mut sum = 0.0f32;
            for ch in 0..channels {
                sum += packet.sample(base + ch);
            }
            self.mono.push(sum * inv_channels);
        }

        self.commit_mono(frames)
    }

    /// Handle a packet the driver flagged as silent: zero-fill, never
    /// drop for being quiet.
    pub fn on_silent_packet(
        &mut self,
        frames: usize,
        sample_rate: u32,
        arrival_clock: f64,
    ) -> Result<(), EngineError> {
        self.prepare_if_needed(sample_rate);
        self.last_arrival = arrival_clock;

        self.mono.clear();
        self.mono.resize(frames, 0.0);
        self.commit_mono(frames)
    }

    fn prepare_if_needed(&mut self, sample_rate: u32) {
        if self.prepared_rate.load(Ordering::Acquire) != sample_rate {
            log::info!("sample rate changed to {} Hz, re-preparing pipeline", sample_rate);
            (self.on_prepare)(sample_rate);
            self.prepared_rate.store(sample_rate, Ordering::Release);
            self.producer.reset_clock();
        }
    }

    fn commit_mono(&mut self, frames: usize) -> Result<(), EngineError> {
        if self.producer.commit(&self.mono) {
            Ok(())
        } else {
            log::warn!("handoff ring full, dropping {} frames", frames);
            Err(EngineError::Overrun(frames))
        }
    }

    /// Arrival clock of the most recent packet (driver wall seconds).
    pub fn last_arrival(&self) -> f64 {
        self.last_arrival
    }

    /// Number of packets dropped because the ring was full.
    pub fn overrun_count(&self) -> u64 {
        self.producer.overrun_count()
    }

    /// Monotonic count of committed capture samples.
    pub fn captured_samples(&self) -> u64 {
        self.producer.captured_samples()
    }
}

/// Pick a render endpoint from an enumerated name list.
///
/// Prefers the first case-insensitive substring match of `keyword`,
/// then any name containing "Speakers", then the first entry.
pub fn pick_preferred_endpoint(names: &[String], keyword: &str) -> Option<usize> {
    if names.is_empty() {
        return None;
    }
    if !keyword.is_empty() {
        let needle = keyword.to_lowercase();
        if let Some(idx) = names
            .iter()
            .position(|n| n.to_lowercase().contains(&needle))
        {
            return Some(idx);
        }
    }
    names
        .iter()
        .position(|n| n.to_lowercase().contains("speakers"))
        .or(Some(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ring::handoff_ring;
    use std::sync::atomic::AtomicUsize;

    fn test_bridge() -> (CaptureBridge, crate::io::ring::RingConsumer, Arc<AtomicUsize>) {
        let (prod, cons) = handoff_ring();
        let prepares = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&prepares);
        let bridge = CaptureBridge::new(
            prod,
            Arc::new(AtomicU32::new(0)),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (bridge, cons, prepares)
    }

    #[test]
    fn test_stereo_downmix_averages_channels() {
        let (mut bridge, mut cons, _) = test_bridge();
        // L = 0.5, R = -0.5 -> mono 0.0; L = 0.8, R = 0.4 -> mono 0.6
        let interleaved = [0.5f32, -0.5, 0.8, 0.4];
        bridge
            .on_packet(SamplePacket::F32(&interleaved), 2, 2, 48000, 0.0)
            .unwrap();

        let mut out = [0.0f32; 2];
        assert_eq!(cons.read(&mut out), 2);
        assert!(out[0].abs() < 1e-6);
        assert!((out[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_i16_conversion_range() {
        let (mut bridge, mut cons, _) = test_bridge();
        let interleaved = [i16::MIN, 0, i16::MAX];
        bridge
            .on_packet(SamplePacket::I16(&interleaved), 3, 1, 44100, 0.0)
            .unwrap();

        let mut out = [0.0f32; 3];
        assert_eq!(cons.read(&mut out), 3);
        assert!((out[0] + 1.0).abs() < 1e-4);
        assert!(out[1].abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_u16_midpoint_is_zero() {
        let (mut bridge, mut cons, _) = test_bridge();
        let interleaved = [32768u16];
        bridge
            .on_packet(SamplePacket::U16(&interleaved), 1, 1, 44100, 0.0)
            .unwrap();

        let mut out = [0.0f32; 1];
        cons.read(&mut out);
        assert!(out[0].abs() < 1e-6);
    }

    #[test]
    fn test_rate_change_triggers_prepare_and_clock_reset() {
        let (mut bridge, _cons, prepares) = test_bridge();
        let samples = [0.0f32; 64];

        bridge
            .on_packet(SamplePacket::F32(&samples), 64, 1, 44100, 0.0)
            .unwrap();
        assert_eq!(prepares.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.captured_samples(), 64);

        // Same rate: no re-prepare
        bridge
            .on_packet(SamplePacket::F32(&samples), 64, 1, 44100, 0.1)
            .unwrap();
        assert_eq!(prepares.load(Ordering::SeqCst), 1);

        // New rate: re-prepare and clock reset before the new packet
        bridge
            .on_packet(SamplePacket::F32(&samples), 64, 1, 48000, 0.2)
            .unwrap();
        assert_eq!(prepares.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.captured_samples(), 64);
    }

    #[test]
    fn test_silent_packet_zero_fills() {
        let (mut bridge, mut cons, _) = test_bridge();
        bridge.on_silent_packet(128, 48000, 0.0).unwrap();

        let mut out = [1.0f32; 128];
        assert_eq!(cons.read(&mut out), 128);
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_overrun_drops_packet_without_blocking() {
        let (mut bridge, _cons, _) = test_bridge();
        let big = vec![0.0f32; crate::io::ring::RING_CAPACITY];
        bridge
            .on_packet(SamplePacket::F32(&big), big.len(), 1, 48000, 0.0)
            .unwrap();

        let small = [0.0f32; 32];
        let err = bridge
            .on_packet(SamplePacket::F32(&small), 32, 1, 48000, 0.1)
            .unwrap_err();
        assert!(matches!(err, EngineError::Overrun(32)));
        assert_eq!(bridge.overrun_count(), 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let (mut bridge, _cons, _) = test_bridge();
        let samples = [0.0f32; 5];
        let err = bridge
            .on_packet(SamplePacket::F32(&samples), 2, 2, 48000, 0.0)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_pick_preferred_endpoint() {
        let names = vec![
            "HDMI Output".to_string(),
            "Speakers (Realtek)".to_string(),
            "Headphones".to_string(),
        ];
        assert_eq!(pick_preferred_endpoint(&names, "headph"), Some(2));
        assert_eq!(pick_preferred_endpoint(&names, "nope"), Some(1)); // falls back to Speakers
        assert_eq!(pick_preferred_endpoint(&names, ""), Some(1));
        assert_eq!(pick_preferred_endpoint(&[], "x"), None);
    }
}
