//! Callback-to-worker handoff ring
//!
//! A fixed-size SPSC ring of mono float samples. The capture callback
//! is the sole writer, the worker thread the sole reader; neither side
//! ever blocks. The producer half also owns the authoritative audio
//! clock: a monotonic count of committed capture samples, reset on
//! pipeline (re)prepare.

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Ring capacity in samples (power of two)
pub const RING_CAPACITY: usize = 16384;

/// Writer half: capture callback side
pub struct RingProducer {
    inner: ringbuf::HeapProd<f32>,
    captured_samples: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
}

/// Reader half: worker side
pub struct RingConsumer {
    inner: ringbuf::HeapCons<f32>,
    captured_samples: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
}

/// Create the handoff ring and split it into its two halves.
pub fn handoff_ring() -> (RingProducer, RingConsumer) {
    let (prod, cons) = HeapRb::<f32>::new(RING_CAPACITY).split();
    let captured_samples = Arc::new(AtomicU64::new(0));
    let overruns = Arc::new(AtomicU64::new(0));
    (
        RingProducer {
            inner: prod,
            captured_samples: Arc::clone(&captured_samples),
            overruns: Arc::clone(&overruns),
        },
        RingConsumer {
            inner: cons,
            captured_samples,
            overruns,
        },
    )
}

impl RingProducer {
    /// Commit a whole mono chunk in a single reservation and advance
    /// the audio clock by its length.
    ///
    /// Returns `false` without writing anything when the free space is
    /// insufficient; the caller drops the packet and counts the loss.
    pub fn commit(&mut self, mono: &[f32]) -> bool {
        if self.inner.vacant_len() < mono.len() {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let written = self.inner.push_slice(mono);
        debug_assert_eq!(written, mono.len());
        self.captured_samples
            .fetch_add(written as u64, Ordering::Relaxed);
        true
    }

    /// Monotonic count of committed capture samples.
    pub fn captured_samples(&self) -> u64 {
        self.captured_samples.load(Ordering::Relaxed)
    }

    /// Reset the audio clock (on pipeline re-prepare).
    pub fn reset_clock(&self) {
        self.captured_samples.store(0, Ordering::Relaxed);
    }

    /// Number of packets dropped because the ring was full.
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Shared handle to the audio clock for read-only observers.
    pub fn clock_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.captured_samples)
    }

    /// Shared handle to the overrun counter.
    pub fn overrun_handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.overruns)
    }
}

impl RingConsumer {
    /// Read up to `out.len()` samples. Returns the number of samples
    /// read; 0 means the ring is empty and the worker should sleep
    /// briefly.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        self.inner.pop_slice(out)
    }

    /// Monotonic count of committed capture samples.
    pub fn captured_samples(&self) -> u64 {
        self.captured_samples.load(Ordering::Relaxed)
    }

    /// Number of packets dropped because the ring was full.
    pub fn overrun_count(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}
