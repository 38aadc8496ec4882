use compactor_engine::entropy::{sample_file, shannon_entropy};
use compactor_engine::{BatchPlanner, PlannerConfig};
use compactor_types::{AlgorithmChoice, FileEntry};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use tempfile::TempDir;

/// Generate test data of specified size
fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i * 31) % 251) as u8).collect()
}

fn bench_entropy_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("entropy_kernel");

    for (name, size) in [("16KB", 16 * 1024), ("64KB", 64 * 1024), ("1MB", 1024 * 1024)] {
        let data = generate_test_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| shannon_entropy(black_box(data)));
        });
    }

    group.finish();
}

fn bench_sample_file(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("sample.dat");
    fs::write(&path, generate_test_data(8 * 1024 * 1024)).unwrap();

    c.bench_function("sample_file_8MB", |b| {
        b.iter(|| sample_file(black_box(&path)).unwrap());
    });
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_planning");
    let algorithms = [
        AlgorithmChoice::Xpress4K,
        AlgorithmChoice::Xpress8K,
        AlgorithmChoice::Xpress16K,
        AlgorithmChoice::Lzx,
    ];

    for files in [1_000usize, 10_000, 100_000] {
        let assignments: Vec<_> = (0..files)
            .map(|i| {
                (
                    FileEntry::new(format!("C:\\data\\dir{}\\file{}.log", i % 97, i), 100_000),
                    algorithms[i % algorithms.len()],
                )
            })
            .collect();
        let planner = BatchPlanner::new(PlannerConfig::default());

        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(BenchmarkId::from_parameter(files), &assignments, |b, input| {
            b.iter(|| planner.plan(black_box(input)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_entropy_kernel, bench_sample_file, bench_planning);
criterion_main!(benches);
