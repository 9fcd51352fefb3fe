//! Performance benchmarks for the live analysis hot path

use beatline::{EngineConfig, OnsetDetector, Pipeline, TempoEstimator};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// One second of a broadband 120 BPM click train at 48 kHz
fn click_second(seed: &mut u32) -> Vec<f32> {
    let sr = 48000usize;
    let mut samples = vec![0.0f32; sr];
    let period = sr / 2;
    let click_len = sr / 200;
    let mut pos = 0;
    while pos < sr {
        for i in 0..click_len.min(sr - pos) {
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

fn detector_benchmarks(c: &mut Criterion) {
    let mut seed = 0xbe7a_11fe;
    let audio = click_second(&mut seed);

    let mut group = c.benchmark_group("onset_detector");
    group.bench_function("push_1s_hi_res", |b| {
        b.iter(|| {
            let mut det = OnsetDetector::new(48000.0, 1024, 240, 20.0, 6000.0);
            det.push_audio(black_box(&audio));
            let mut flux = Vec::new();
            det.fetch_new_flux(&mut flux);
            flux
        });
    });
    group.bench_function("push_1s_lo_res", |b| {
        b.iter(|| {
            let mut det = OnsetDetector::new(48000.0, 2048, 480, 20.0, 6000.0);
            det.push_audio(black_box(&audio));
            let mut flux = Vec::new();
            det.fetch_new_flux(&mut flux);
            flux
        });
    });
    group.finish();
}

fn tempo_benchmarks(c: &mut Criterion) {
    // Fused-flux impulse train at 120 BPM, 200 frames per second
    let mut flux = vec![0.0f32; 2048];
    for i in (0..2048).step_by(100) {
        flux[i] = 3.0;
    }

    let mut group = c.benchmark_group("tempo_estimator");
    group.bench_function("append_and_estimate_2048", |b| {
        b.iter(|| {
            let mut est = TempoEstimator::new(48000.0, 240, 5, 1.0, 0.03);
            est.append_flux(black_box(&flux));
            est.bpm()
        });
    });
    group.finish();
}

fn pipeline_benchmarks(c: &mut Criterion) {
    let mut seed = 0xbe7a_22fe;
    let audio = click_second(&mut seed);

    let mut group = c.benchmark_group("pipeline");
    group.bench_function("process_1s_with_ticks", |b| {
        b.iter(|| {
            let mut pipeline = Pipeline::new(48000.0, 512, &EngineConfig::default());
            let mut buf = [0.0f32; 512];
            for (i, chunk) in audio.chunks(512).enumerate() {
                buf[..chunk.len()].copy_from_slice(chunk);
                pipeline.process_chunk(&mut buf[..chunk.len()]);
                if i % 3 == 2 {
                    black_box(pipeline.tick(i as f64 * 512.0 / 48000.0));
                }
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    detector_benchmarks,
    tempo_benchmarks,
    pipeline_benchmarks
);
criterion_main!(benches);
