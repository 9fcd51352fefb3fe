//! Demo: tempo step response
//!
//! Feeds a click track that jumps from 100 to 140 BPM halfway through
//! and prints how the slew-limited estimate walks up through the
//! intermediate tempos without octave errors.
//!
//! Run with `cargo run --example tempo_step`.

use beatline::{Engine, EngineConfig, SamplePacket};
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 48000;
const PACKET_FRAMES: usize = 512;
const SEGMENT_SECONDS: f64 = 12.0;

fn synth_clicks(bpm: f64, seconds: f64, seed: &mut u32) -> Vec<f32> {
    let total = (seconds * SAMPLE_RATE as f64) as usize;
    let period = (60.0 / bpm * SAMPLE_RATE as f64) as usize;
    let click_len = SAMPLE_RATE as usize / 200;
    let mut samples = vec![0.0f32; total];
    let mut pos = 0;
    while pos < total {
        for i in 0..click_len.min(total - pos) {
            *seed ^= *seed << 13;
            *seed ^= *seed >> 17;
            *seed ^= *seed << 5;
            let noise = (*seed as f32 / u32::MAX as f32) * 2.0 - 1.0;
            samples[pos + i] = noise * (-(i as f32) / (click_len as f32 * 0.3)).exp() * 0.9;
        }
        pos += period;
    }
    samples
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (mut engine, mut bridge) = Engine::new(EngineConfig::default());
    engine.start_emitter(|tick| {
        if let Some(bpm) = tick.bpm {
            println!("tempo {:6.2} BPM  conf {:4.2}", bpm, tick.confidence);
        }
    });

    let mut seed = 0x5eed_57e9u32;
    let mut samples = synth_clicks(100.0, SEGMENT_SECONDS, &mut seed);
    samples.extend(synth_clicks(140.0, SEGMENT_SECONDS, &mut seed));
    println!(
        "feeding {:.0} s at 100 BPM, then {:.0} s at 140 BPM...",
        SEGMENT_SECONDS, SEGMENT_SECONDS
    );

    let started = Instant::now();
    let mut sent = 0usize;
    for packet in samples.chunks(PACKET_FRAMES) {
        if let Err(e) = bridge.on_packet(
            SamplePacket::F32(packet),
            packet.len(),
            1,
            SAMPLE_RATE,
            started.elapsed().as_secs_f64(),
        ) {
            log::warn!("packet dropped: {}", e);
        }
        sent += packet.len();

        let due = Duration::from_secs_f64(sent as f64 / SAMPLE_RATE as f64);
        let elapsed = started.elapsed();
        if due > elapsed {
            std::thread::sleep(due - elapsed);
        }
    }

    engine.stop();
    Ok(())
}
