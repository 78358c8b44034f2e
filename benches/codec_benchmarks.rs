//! Performance benchmarks for the audio codec and event parsing
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

use auraq_voice_relay::core::audio::{build_playable_container, decode_from_wire, encode_for_wire};
use auraq_voice_relay::core::realtime::{ServerEvent, event_type};

fn sine(samples: usize) -> Vec<f32> {
    (0..samples)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 24_000.0).sin() * 0.8)
        .collect()
}

/// Capture path: one microphone block to a wire string
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_for_wire");
    group.measurement_time(Duration::from_secs(5));

    // 100 ms, 200 ms and a long 10 s buffer that spans many encode blocks
    for samples in [2_400usize, 4_800, 240_000] {
        let input = sine(samples);
        group.throughput(Throughput::Bytes((samples * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &input, |b, input| {
            b.iter(|| encode_for_wire(black_box(input)));
        });
    }

    group.finish();
}

/// Playback path: wire delta to a playable container
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_to_container");

    for samples in [1_200usize, 4_800, 24_000] {
        let delta = encode_for_wire(&sine(samples));
        group.throughput(Throughput::Bytes((samples * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &delta, |b, delta| {
            b.iter(|| {
                let pcm = decode_from_wire(black_box(delta)).unwrap();
                build_playable_container(&pcm).unwrap()
            });
        });
    }

    group.finish();
}

/// The relay peeks at every upstream frame's type; the client parses all of it
fn bench_event_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_parsing");

    let delta = format!(
        r#"{{"type":"response.audio.delta","event_id":"event_1","response_id":"resp_1","item_id":"item_1","output_index":0,"content_index":0,"delta":"{}"}}"#,
        encode_for_wire(&sine(4_800))
    );

    group.throughput(Throughput::Bytes(delta.len() as u64));
    group.bench_function("event_type_peek", |b| {
        b.iter(|| event_type(black_box(&delta)));
    });
    group.bench_function("server_event_parse", |b| {
        b.iter(|| ServerEvent::parse(black_box(&delta)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_event_parsing);
criterion_main!(benches);
