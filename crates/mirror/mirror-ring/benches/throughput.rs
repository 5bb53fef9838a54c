use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use mirror_ring::MirroredRing;

const CAPACITY: usize = 1 << 16;

fn bench_write(c: &mut Criterion) {
    let mut rb = MirroredRing::<u64>::with_capacity(CAPACITY).expect("failed to create ring");

    let mut group = c.benchmark_group("mirrored_ring");
    for batch in [1usize, 64, 1024] {
        let data: Vec<u64> = (0..batch as u64).collect();
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(format!("write x{batch}"), |b| {
            b.iter(|| rb.write(black_box(&data)));
        });
    }
    group.finish();
}

fn bench_write_read(c: &mut Criterion) {
    let mut rb = MirroredRing::<u64>::with_capacity(CAPACITY).expect("failed to create ring");

    let mut group = c.benchmark_group("mirrored_ring");
    for batch in [64usize, 1024] {
        let data: Vec<u64> = (0..batch as u64).collect();
        let mut out = vec![0u64; batch];
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(format!("write+read x{batch}"), |b| {
            b.iter(|| {
                rb.write(black_box(&data));
                black_box(rb.read(&mut out))
            });
        });
    }
    group.finish();
}

fn bench_read_empty(c: &mut Criterion) {
    let mut rb = MirroredRing::<u64>::with_capacity(CAPACITY).expect("failed to create ring");
    let mut out = [0u64; 64];

    let mut group = c.benchmark_group("mirrored_ring");
    group.throughput(Throughput::Elements(1));
    group.bench_function("read (empty)", |b| {
        b.iter(|| black_box(rb.read(&mut out)));
    });
    group.finish();
}

criterion_group!(benches, bench_write, bench_write_read, bench_read_empty);
criterion_main!(benches);
