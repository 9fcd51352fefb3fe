//! Threaded engine runtime
//!
//! Owns the pipeline behind the coarse pipeline mutex and runs the
//! two engine-side threads:
//!
//! - the **worker** reads fixed 512-sample chunks from the handoff
//!   ring, prefilters and band-splits them, and feeds the detectors,
//!   sleeping briefly when the ring is empty or no rate is prepared;
//! - the **emitter** ticks at UI rate (30 Hz), runs fusion, gating,
//!   tempo and beat updates, and hands the result to the caller's
//!   publisher.
//!
//! The capture thread is owned by the host driver; it talks to the
//! engine only through the [`CaptureBridge`] returned at creation.

use crate::config::EngineConfig;
use crate::engine::pipeline::{Pipeline, TickOutput};
use crate::io::bridge::CaptureBridge;
use crate::io::ring::handoff_ring;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Fixed worker read size in samples
const WORKER_CHUNK: usize = 512;

/// Worker sleep when the ring is empty or no rate is prepared
const WORKER_IDLE_SLEEP: Duration = Duration::from_millis(2);

/// Emitter tick rate
const EMITTER_HZ: u32 = 30;

/// Block size hint used for lazily prepared pipelines
const DEFAULT_BLOCK_HINT: usize = 512;

struct Shared {
    pipeline: Mutex<Option<Pipeline>>,
    /// Template for newly prepared pipelines; tracks runtime prefilter
    /// edits
    config: Mutex<EngineConfig>,
    running: AtomicBool,
    prepared_rate: Arc<AtomicU32>,
    captured_samples: Arc<AtomicU64>,
    overruns: Arc<AtomicU64>,
    capture_failure: Mutex<Option<String>>,
}

impl Shared {
    fn prepare(&self, sample_rate: u32, block_hint: usize) {
        let config = self.config.lock().expect("config mutex poisoned").clone();
        let pipeline = Pipeline::new(sample_rate as f64, block_hint, &config);
        *self.pipeline.lock().expect("pipeline mutex poisoned") = Some(pipeline);
        self.prepared_rate.store(sample_rate, Ordering::Release);
    }
}

/// The live engine: pipeline, worker thread, and emitter thread
pub struct Engine {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    emitter: Option<JoinHandle<()>>,
}

impl Engine {
    /// Create the engine and its capture bridge.
    ///
    /// The worker thread starts immediately and idles until a sample
    /// rate is prepared (lazily by the bridge, or explicitly via
    /// [`Engine::prepare`]). The bridge is handed to the host's
    /// capture callback; it is the only object the capture thread
    /// touches.
    pub fn new(config: EngineConfig) -> (Self, CaptureBridge) {
        let (producer, mut consumer) = handoff_ring();
        let prepared_rate = Arc::new(AtomicU32::new(0));

        let shared = Arc::new(Shared {
            pipeline: Mutex::new(None),
            config: Mutex::new(config.clamped()),
            running: AtomicBool::new(true),
            prepared_rate: Arc::clone(&prepared_rate),
            captured_samples: producer.clock_handle(),
            overruns: producer.overrun_handle(),
            capture_failure: Mutex::new(None),
        });

        let bridge_shared = Arc::clone(&shared);
        let bridge = CaptureBridge::new(
            producer,
            prepared_rate,
            Box::new(move |rate| bridge_shared.prepare(rate, DEFAULT_BLOCK_HINT)),
        );

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("beatline-worker".to_string())
            .spawn(move || {
                let mut chunk = [0.0f32; WORKER_CHUNK];
                while worker_shared.running.load(Ordering::Acquire) {
                    if worker_shared.prepared_rate.load(Ordering::Acquire) == 0 {
                        thread::sleep(WORKER_IDLE_SLEEP);
                        continue;
                    }
                    let n = consumer.read(&mut chunk);
                    if n == 0 {
                        thread::sleep(WORKER_IDLE_SLEEP);
                        continue;
                    }
                    let mut guard = worker_shared
                        .pipeline
                        .lock()
                        .expect("pipeline mutex poisoned");
                    if let Some(pipeline) = guard.as_mut() {
                        pipeline.process_chunk(&mut chunk[..n]);
                    }
                }
            })
            .expect("failed to spawn worker thread");

        (
            Self {
                shared,
                worker: Some(worker),
                emitter: None,
            },
            bridge,
        )
    }

    /// Explicitly prepare for a known stream format. The bridge also
    /// does this lazily when the first packet (or a packet at a new
    /// rate) arrives.
    pub fn prepare(&self, sample_rate: u32, block_hint: usize) {
        self.shared.prepare(sample_rate, block_hint);
        self.shared.captured_samples.store(0, Ordering::Relaxed);
    }

    /// Start the UI-rate emitter thread; `publish` receives every tick
    /// result.
    pub fn start_emitter<F>(&mut self, mut publish: F)
    where
        F: FnMut(&TickOutput) + Send + 'static,
    {
        if self.emitter.is_some() {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let tick_interval = Duration::from_micros(1_000_000 / EMITTER_HZ as u64);

        let emitter = thread::Builder::new()
            .name("beatline-emitter".to_string())
            .spawn(move || {
                while shared.running.load(Ordering::Acquire) {
                    let started = Instant::now();
                    if let Some(output) = tick_shared(&shared) {
                        publish(&output);
                    }
                    let elapsed = started.elapsed();
                    if elapsed < tick_interval {
                        thread::sleep(tick_interval - elapsed);
                    }
                }
            })
            .expect("failed to spawn emitter thread");
        self.emitter = Some(emitter);
    }

    /// Run one emitter tick synchronously. Returns `None` while no
    /// pipeline is prepared.
    pub fn tick_now(&self) -> Option<TickOutput> {
        tick_shared(&self.shared)
    }

    /// Move the global prefilter edges; applied to the live pipeline
    /// and to any pipeline prepared later.
    pub fn set_prefilter_edges(&self, hpf_hz: f32, lpf_hz: f32) {
        let mut guard = self.shared.pipeline.lock().expect("pipeline mutex poisoned");
        if let Some(pipeline) = guard.as_mut() {
            pipeline.set_prefilter_edges(hpf_hz, lpf_hz);
        }
        drop(guard);
        let mut config = self.shared.config.lock().expect("config mutex poisoned");
        config.hpf_hz = hpf_hz.clamp(10.0, 200.0);
        config.lpf_hz = lpf_hz.clamp(1000.0, 6000.0);
    }

    /// Record a fatal capture-setup failure for the status surface.
    pub fn report_capture_failure(&self, reason: &str) {
        log::error!("capture setup failed: {}", reason);
        *self
            .shared
            .capture_failure
            .lock()
            .expect("status mutex poisoned") = Some(reason.to_string());
    }

    /// Human-readable engine status line.
    pub fn status(&self) -> String {
        if let Some(reason) = self
            .shared
            .capture_failure
            .lock()
            .expect("status mutex poisoned")
            .as_ref()
        {
            return format!("capture failed: {}", reason);
        }
        let rate = self.shared.prepared_rate.load(Ordering::Acquire);
        if rate == 0 {
            return "initializing".to_string();
        }
        let block = self
            .shared
            .pipeline
            .lock()
            .expect("pipeline mutex poisoned")
            .as_ref()
            .map(|p| p.block_hint())
            .unwrap_or(DEFAULT_BLOCK_HINT);
        format!("audio ready: SR={} Hz, block={}", rate, block)
    }

    /// Current audio-clock time in seconds (committed capture samples
    /// over the prepared rate).
    pub fn audio_time_sec(&self) -> f64 {
        let rate = self.shared.prepared_rate.load(Ordering::Acquire);
        if rate == 0 {
            return 0.0;
        }
        self.shared.captured_samples.load(Ordering::Relaxed) as f64 / rate as f64
    }

    /// Committed capture samples since the last prepare.
    pub fn captured_samples(&self) -> u64 {
        self.shared.captured_samples.load(Ordering::Relaxed)
    }

    /// Packets dropped at capture time because the ring was full.
    pub fn overrun_count(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }

    /// Prepared sample rate, 0 while unprepared.
    pub fn sample_rate(&self) -> u32 {
        self.shared.prepared_rate.load(Ordering::Acquire)
    }

    /// Stop both threads and join them. Capture must already have been
    /// stopped by the host.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        if let Some(emitter) = self.emitter.take() {
            let _ = emitter.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Human-readable endpoint enumeration status.
pub fn render_endpoints_status(count: usize) -> String {
    if count == 0 {
        "no render endpoints detected".to_string()
    } else {
        format!("render endpoints: {}", count)
    }
}

fn tick_shared(shared: &Shared) -> Option<TickOutput> {
    let rate = shared.prepared_rate.load(Ordering::Acquire);
    if rate == 0 {
        return None;
    }
    let now_sec = shared.captured_samples.load(Ordering::Relaxed) as f64 / rate as f64;
    let mut guard = shared.pipeline.lock().expect("pipeline mutex poisoned");
    guard.as_mut().map(|pipeline| pipeline.tick(now_sec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::bridge::SamplePacket;

    fn feed_packets(bridge: &mut CaptureBridge, rate: u32, packets: usize, frames: usize) {
        let samples = vec![0.1f32; frames];
        for i in 0..packets {
            let _ = bridge.on_packet(
                SamplePacket::F32(&samples),
                frames,
                1,
                rate,
                i as f64 * frames as f64 / rate as f64,
            );
        }
    }

    #[test]
    fn test_lazy_prepare_on_first_packet() {
        let (mut engine, mut bridge) = Engine::new(EngineConfig::default());
        assert_eq!(engine.sample_rate(), 0);
        assert_eq!(engine.status(), "initializing");

        feed_packets(&mut bridge, 48000, 4, 512);
        assert_eq!(engine.sample_rate(), 48000);
        assert!(engine.status().contains("SR=48000"));
        assert!(engine.tick_now().is_some());
        engine.stop();
    }

    #[test]
    fn test_rate_change_reprepares_and_resets_clock() {
        let (mut engine, mut bridge) = Engine::new(EngineConfig::default());
        feed_packets(&mut bridge, 44100, 8, 512);
        assert_eq!(engine.sample_rate(), 44100);
        assert!(engine.captured_samples() >= 512);

        feed_packets(&mut bridge, 48000, 1, 512);
        assert_eq!(engine.sample_rate(), 48000);
        assert_eq!(engine.captured_samples(), 512, "clock restarts in the new era");
        engine.stop();
    }

    #[test]
    fn test_overrun_burst_recovers_without_deadlock() {
        let (mut engine, mut bridge) = Engine::new(EngineConfig::default());

        // Flood far beyond ring capacity without giving the worker a
        // chance to keep up
        for _ in 0..64 {
            feed_packets(&mut bridge, 48000, 1, 2048);
        }
        assert!(engine.overrun_count() > 0, "burst must overrun the ring");

        // Engine still alive: worker drains, ticks run, new packets fit
        std::thread::sleep(Duration::from_millis(50));
        feed_packets(&mut bridge, 48000, 1, 512);
        assert!(engine.tick_now().is_some());
        engine.stop();
    }

    #[test]
    fn test_emitter_publishes_ticks() {
        let (mut engine, mut bridge) = Engine::new(EngineConfig::default());
        feed_packets(&mut bridge, 48000, 4, 512);

        let ticks = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&ticks);
        engine.start_emitter(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::sleep(Duration::from_millis(200));
        engine.stop();
        assert!(ticks.load(Ordering::SeqCst) >= 2, "emitter should have ticked");
    }

    #[test]
    fn test_stop_is_idempotent_and_joins() {
        let (mut engine, _bridge) = Engine::new(EngineConfig::default());
        engine.stop();
        engine.stop();
    }

    #[test]
    fn test_capture_failure_surfaces_in_status() {
        let (mut engine, _bridge) = Engine::new(EngineConfig::default());
        engine.report_capture_failure("endpoint activation failed");
        assert_eq!(engine.status(), "capture failed: endpoint activation failed");
        engine.stop();
    }

    #[test]
    fn test_render_endpoints_status() {
        assert_eq!(render_endpoints_status(0), "no render endpoints detected");
        assert_eq!(render_endpoints_status(3), "render endpoints: 3");
    }
}
