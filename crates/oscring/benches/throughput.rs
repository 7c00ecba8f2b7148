use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use oscring::{EngineEndpoint, InWriter, LayoutConfig, SharedRegion};
use std::sync::Arc;

fn bench_write_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_ring");
    group.throughput(Throughput::Elements(1));

    group.bench_function("write_then_drain", |b| {
        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        let writer = InWriter::new(region.clone());
        let engine = EngineEndpoint::new(region);
        let payload = b"/synth/new\0\0,sonic-pi-beep\0";

        b.iter(|| {
            writer.try_write(black_box(payload), 0).unwrap();
            engine.drain_in(|p, _| {
                black_box(p);
            });
        });
    });

    group.bench_function("write_burst_64", |b| {
        let region = Arc::new(SharedRegion::new(LayoutConfig::default()));
        let writer = InWriter::new(region.clone());
        let engine = EngineEndpoint::new(region);
        let payload = b"/status\0";

        b.iter(|| {
            for _ in 0..64 {
                writer.try_write(black_box(payload), 0).unwrap();
            }
            let mut n = 0;
            while n < 64 {
                n += engine.drain_in(|p, _| {
                    black_box(p);
                });
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_write_drain);
criterion_main!(benches);
