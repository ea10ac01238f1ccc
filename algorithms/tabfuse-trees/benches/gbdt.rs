use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::SmallRng;
use tabfuse::prelude::*;
use tabfuse_trees::GradientBoostedTrees;

fn gbdt_bench(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);

    let sample_sizes = &[10_000, 100_000];
    let threads = &[1, 8];

    let mut group = c.benchmark_group("gbdt");
    group.sample_size(10);

    for n in sample_sizes.iter() {
        let records: Array2<f64> =
            Array2::random_using((*n, 1), Normal::new(0.0f64, 1.0).unwrap(), &mut rng);
        let targets = records.column(0).mapv(|x| (x * 7.0).sin() > 0.2);
        let dataset = Dataset::new(records, Array1::from(targets.to_vec()));

        for num_threads in threads.iter() {
            let params = GradientBoostedTrees::<f64>::params()
                .num_boost_round(100)
                .num_threads(*num_threads);
            let id = BenchmarkId::new(format!("fit-{}-threads", num_threads), n);
            group.bench_with_input(id, &dataset, |b, d| b.iter(|| params.fit(d).unwrap()));
        }
    }

    group.finish();
}

criterion_group!(benches, gbdt_bench);
criterion_main!(benches);
