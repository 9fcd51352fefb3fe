//! Live capture I/O
//!
//! The capture side of the pipeline: a lock-free single-producer
//! single-consumer ring for the callback-to-worker handoff, and the
//! capture bridge that turns driver packets (interleaved, any common
//! sample format) into mono float samples tagged with the audio clock.

pub mod bridge;
pub mod ring;

pub use bridge::{pick_preferred_endpoint, CaptureBridge, SamplePacket};
pub use ring::{handoff_ring, RingConsumer, RingProducer, RING_CAPACITY};
