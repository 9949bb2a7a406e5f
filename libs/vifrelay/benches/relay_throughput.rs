// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vifrelay::{FrameBuffer, InterfaceAdapter, Relay, RelayConfig};

struct CountingInterface {
    frames: AtomicU64,
}

impl InterfaceAdapter for CountingInterface {
    fn deliver(&self, frame: &[u8]) {
        black_box(frame);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

fn bench_frame_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_build");

    for segments in [1usize, 4, 16].iter() {
        let chain: Vec<Vec<u8>> = (0..*segments).map(|_| vec![0xa5u8; 1514 / segments]).collect();
        group.throughput(Throughput::Bytes(chain.iter().map(|s| s.len() as u64).sum()));
        group.bench_with_input(BenchmarkId::from_parameter(segments), &chain, |b, chain| {
            b.iter(|| FrameBuffer::build(black_box(chain)).map(|f| f.len()));
        });
    }
    group.finish();
}

fn bench_send_pull(c: &mut Criterion) {
    let relay = Relay::new();
    let device = relay
        .create_device(
            "bench",
            Arc::new(CountingInterface {
                frames: AtomicU64::new(0),
            }),
        )
        .expect("create bench device");
    let frame = vec![0u8; 1514];

    c.bench_function("send_pull_1514", |b| {
        b.iter(|| {
            device.send(&[black_box(&frame[..])]);
            relay.pull("virtbench").map(|f| f.map(|f| f.len()))
        });
    });
}

fn bench_push_delivery(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_delivery");
    group.throughput(Throughput::Elements(1024));

    for frames_per_schedule in [1usize, 32].iter() {
        let config = RelayConfig {
            frames_per_schedule: *frames_per_schedule,
            ..Default::default()
        };
        let relay = Relay::with_config(config).expect("valid config");
        let iface = Arc::new(CountingInterface {
            frames: AtomicU64::new(0),
        });
        relay
            .create_device("bench", iface.clone())
            .expect("create bench device");
        let frame = vec![0u8; 64];

        group.bench_with_input(
            BenchmarkId::from_parameter(frames_per_schedule),
            frames_per_schedule,
            |b, _| {
                b.iter(|| {
                    let target = iface.frames.load(Ordering::Relaxed) + 1024;
                    for _ in 0..1024 {
                        relay.push("virtbench", &frame).expect("push");
                    }
                    while iface.frames.load(Ordering::Relaxed) < target {
                        std::hint::spin_loop();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_frame_build,
    bench_send_pull,
    bench_push_delivery
);
criterion_main!(benches);
