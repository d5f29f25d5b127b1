//! Distance kernel micro-benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flashvec_core::{simd, Distance, Metric};

fn make_vectors(dim: usize) -> (Vec<f32>, Vec<f32>) {
    let a: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.37).sin()).collect();
    let b: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.73).cos()).collect();
    (a, b)
}

fn bench_distance_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance");

    for dim in [128usize, 768] {
        let (a, b) = make_vectors(dim);

        group.bench_function(format!("squared_l2/{dim}"), |bench| {
            bench.iter(|| simd::squared_l2(black_box(&a), black_box(&b)));
        });
        group.bench_function(format!("dot_product/{dim}"), |bench| {
            bench.iter(|| simd::dot_product(black_box(&a), black_box(&b)));
        });

        let l2 = Distance::<f32>::new(Metric::L2);
        group.bench_function(format!("dispatch_l2/{dim}"), |bench| {
            bench.iter(|| l2.compare(black_box(&a), black_box(&b)));
        });

        let ai: Vec<u8> = (0..dim).map(|i| (i % 251) as u8).collect();
        let bi: Vec<u8> = (0..dim).map(|i| (i % 127) as u8).collect();
        let l2_u8 = Distance::<u8>::new(Metric::L2);
        group.bench_function(format!("dispatch_l2_u8/{dim}"), |bench| {
            bench.iter(|| l2_u8.compare(black_box(&ai), black_box(&bi)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_distance_kernels);
criterion_main!(benches);
