//! Demo: drive the full engine with a synthetic 120 BPM click track
//!
//! Simulates a capture driver delivering interleaved stereo packets in
//! real time and prints the tempo, confidence, and next-beat
//! predictions the emitter publishes.
//!
//! Run with `cargo run --example click_track`. Set `RUST_LOG=debug`
//! for pipeline internals. If something is listening on
//! 127.0.0.1:9000 it will also receive the OSC event stream.

use beatline::{Engine, EngineConfig, EventStreamSender, Publisher, SamplePacket};
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 48000;
const BPM: f64 = 120.0;
const PACKET_FRAMES: usize = 512;
const RUN_SECONDS: f64 = 12.0;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (mut engine, mut bridge) = Engine::new(EngineConfig::default());

    let mut publisher = Publisher::new(EventStreamSender::connect_default().ok(), None);
    engine.start_emitter(move |tick| {
        publisher.publish(tick);
        for &onset in &tick.onsets {
            println!("onset @ {:8.3} s", onset);
        }
        if let Some(bpm) = tick.bpm {
            println!(
                "tempo {:6.2} BPM  conf {:4.2}  next beat {}",
                bpm,
                tick.confidence,
                tick.next_beat
                    .map(|t| format!("{:8.3} s", t))
                    .unwrap_or_else(|| "   --".to_string()),
            );
        }
    });

    println!("engine: {}", engine.status());
    println!("feeding {:.0} s of a {} BPM click track...", RUN_SECONDS, BPM);

    // Synthesize and deliver interleaved stereo packets in real time
    let total_frames = (RUN_SECONDS * SAMPLE_RATE as f64) as usize;
    let period_frames = (60.0 / BPM * SAMPLE_RATE as f64) as usize;
    let click_frames = SAMPLE_RATE as usize / 200;
    let mut interleaved = vec![0.0f32; PACKET_FRAMES * 2];
    let mut seed = 0x5eed_c11cu32;

    let started = Instant::now();
    let mut sent = 0usize;
    while sent < total_frames {
        for frame in 0..PACKET_FRAMES {
            let absolute = sent + frame;
            let in_click = absolute % period_frames;
            let sample = if in_click < click_frames {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let noise = (seed as f32 / u32::MAX as f32) * 2.0 - 1.0;
                noise * (-(in_click as f32) / (click_frames as f32 * 0.3)).exp() * 0.9
            } else {
                0.0
            };
            interleaved[frame * 2] = sample;
            interleaved[frame * 2 + 1] = sample;
        }

        if let Err(e) = bridge.on_packet(
            SamplePacket::F32(&interleaved),
            PACKET_FRAMES,
            2,
            SAMPLE_RATE,
            started.elapsed().as_secs_f64(),
        ) {
            log::warn!("packet dropped: {}", e);
        }
        sent += PACKET_FRAMES;

        // Real-time pacing
        let due = Duration::from_secs_f64(sent as f64 / SAMPLE_RATE as f64);
        let elapsed = started.elapsed();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }

    println!("done: {} overruns, {}", engine.overrun_count(), engine.status());
    engine.stop();
    Ok(())
}
