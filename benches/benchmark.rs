// Benchmarks for the retrieval and work-order hot paths
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use routewise_core::{SimilarityIndex, Vector};
use routewise_engine::trimmed_mean;

fn generate_random_vector(rng: &mut impl Rng, dim: usize) -> Vector {
    let data: Vec<f32> = (0..dim).map(|_| rng.random_range(-1.0f32..1.0f32)).collect();
    Vector::new(data)
}

fn build_index(size: usize, dim: usize) -> SimilarityIndex {
    let mut rng = StdRng::seed_from_u64(42);
    let vectors: Vec<Vector> = (0..size).map(|_| generate_random_vector(&mut rng, dim)).collect();
    let codes: Vec<String> = (0..size).map(|i| format!("ITEM-{:06}", i)).collect();
    SimilarityIndex::build(vectors, codes).unwrap()
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    // The parallel scan kicks in at 4096 rows
    for size in [1_000, 10_000, 50_000].iter() {
        let index = build_index(*size, 16);
        let mut rng = StdRng::seed_from_u64(7);
        let query = generate_random_vector(&mut rng, 16);

        group.bench_with_input(BenchmarkId::new("top5", size), size, |b, _| {
            b.iter(|| index.search(black_box(&query), 5, 0.0).unwrap());
        });
    }

    group.finish();
}

fn benchmark_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for size in [1_000, 10_000].iter() {
        let mut rng = StdRng::seed_from_u64(42);
        let vectors: Vec<Vector> = (0..*size).map(|_| generate_random_vector(&mut rng, 16)).collect();
        let codes: Vec<String> = (0..*size).map(|i| format!("ITEM-{:06}", i)).collect();

        group.bench_with_input(BenchmarkId::new("exact", size), size, |b, _| {
            b.iter(|| SimilarityIndex::build(vectors.clone(), codes.clone()).unwrap());
        });
    }

    group.finish();
}

fn benchmark_trimmed_mean(c: &mut Criterion) {
    let mut group = c.benchmark_group("trimmed_mean");

    for size in [10, 1_000, 100_000].iter() {
        let mut rng = StdRng::seed_from_u64(3);
        let values: Vec<f64> = (0..*size).map(|_| rng.random_range(0.0..120.0)).collect();

        group.bench_with_input(BenchmarkId::new("ratio_0.1", size), size, |b, _| {
            b.iter(|| trimmed_mean(black_box(&values), 0.1));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_search, benchmark_build, benchmark_trimmed_mean);
criterion_main!(benches);
