//! Benchmark for the update-time extent diff
//!
//! Extent lists are short in practice; the large case guards against
//! accidental quadratic behavior.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vmfs_datastore_operator::lifecycle::diff_extents;

fn disks(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}.{:04}", prefix, i)).collect()
}

fn bench_no_drift(c: &mut Criterion) {
    let mut group = c.benchmark_group("extent_diff");

    for size in [4usize, 32, 1024] {
        let observed = disks("naa", size);
        let mut desired = observed.clone();
        desired.reverse();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("no_drift", size), &size, |b, _| {
            b.iter(|| diff_extents(black_box(&observed), black_box(&desired)));
        });
    }

    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("extent_diff");

    for size in [4usize, 32, 1024] {
        let observed = disks("naa", size);
        let mut desired = observed.clone();
        desired.extend(disks("eui", size));

        group.throughput(Throughput::Elements(size as u64 * 2));
        group.bench_with_input(BenchmarkId::new("growth", size), &size, |b, _| {
            b.iter(|| diff_extents(black_box(&observed), black_box(&desired)));
        });
    }

    group.finish();
}

fn bench_shrink(c: &mut Criterion) {
    let mut group = c.benchmark_group("extent_diff");

    let observed = disks("naa", 1024);
    let desired: Vec<String> = observed.iter().step_by(2).cloned().collect();

    group.bench_function("shrink_1024", |b| {
        b.iter(|| diff_extents(black_box(&observed), black_box(&desired)));
    });

    group.finish();
}

criterion_group!(benches, bench_no_drift, bench_growth, bench_shrink);
criterion_main!(benches);
