// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance benchmarks for pedaltake
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Scheduler tick cost
//! - Mix graph rendering per audio block
//! - WAV encoding of finished takes

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pedaltake::audio::input::encode_wav;
use pedaltake::audio::{MixGraph, MixRoute};
use pedaltake::metronome::{BeatEvent, BeatScheduler, MetronomeSettings};
use pedaltake::timing::{Tempo, TimeSignature};

const SAMPLE_RATE: u32 = 48_000;

fn settings(bpm: f64) -> MetronomeSettings {
    MetronomeSettings::new(
        Tempo::clamped(bpm),
        TimeSignature::default(),
        true,
    )
}

/// One minute of 25 ms ticks
fn bench_scheduler_ticks(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_minute");

    for bpm in [60.0, 120.0, 220.0].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(bpm), bpm, |b, &bpm| {
            b.iter(|| {
                let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
                scheduler.start(0.0, settings(bpm));
                let mut count = 0;
                for n in 0..2400 {
                    count += scheduler.tick(black_box(n as f64 * 0.025)).len();
                }
                black_box(count)
            })
        });
    }

    group.finish();
}

/// Tempo changes while running
fn bench_reschedule(c: &mut Criterion) {
    c.bench_function("reschedule", |b| {
        let mut scheduler = BeatScheduler::new(Duration::from_millis(100));
        scheduler.start(0.0, settings(120.0));
        let mut now = 0.0;
        let mut bpm = 100.0;
        b.iter(|| {
            now += 0.025;
            bpm = if bpm > 200.0 { 60.0 } else { bpm + 1.0 };
            scheduler.tick(now);
            black_box(scheduler.reschedule(now, settings(bpm)))
        })
    });
}

fn clicks_every_half_second(graph: &mut MixGraph, seconds: usize) {
    for n in 0..seconds * 2 {
        graph.schedule_click(BeatEvent {
            beat_index: (n % 4) as u32,
            scheduled_time: n as f64 * 0.5,
            is_accent: n % 4 == 0,
        });
    }
}

/// Render cost per audio block
fn bench_mix_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("mix_render");

    for block in [64usize, 256, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("monitor", block), block, |b, &block| {
            let mut graph = MixGraph::new(SAMPLE_RATE);
            clicks_every_half_second(&mut graph, 3600);
            let mut out = vec![0.0f32; block];
            let mut start = 0.0;
            b.iter(|| {
                graph.render_monitor(start, &mut out);
                start += block as f64 / SAMPLE_RATE as f64;
                black_box(out[0])
            })
        });

        group.bench_with_input(BenchmarkId::new("record_with_click", block), block, |b, &block| {
            let mut graph = MixGraph::new(SAMPLE_RATE);
            graph.set_record_route(MixRoute::MonitorAndRecord);
            clicks_every_half_second(&mut graph, 3600);
            let mut rng = StdRng::seed_from_u64(7);
            let mic: Vec<f32> = (0..block).map(|_| rng.gen_range(-0.1..0.1)).collect();
            let mut out = vec![0.0f32; block];
            let mut start = 0.0;
            b.iter(|| {
                graph.render_record(start, &mic, &mut out);
                start += block as f64 / SAMPLE_RATE as f64;
                black_box(out[0])
            })
        });
    }

    group.finish();
}

/// Encoding a finished take
fn bench_wav_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("wav_encode");
    group.sample_size(20);

    for seconds in [1usize, 10].iter() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<f32> = (0..seconds * SAMPLE_RATE as usize)
            .map(|_| rng.gen_range(-1.0..1.0))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(seconds), &samples, |b, samples| {
            b.iter(|| black_box(encode_wav(samples, SAMPLE_RATE).map(|v| v.len())))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_scheduler_ticks,
    bench_reschedule,
    bench_mix_render,
    bench_wav_encoding,
);

criterion_main!(benches);
