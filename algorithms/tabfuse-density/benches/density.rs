use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand::rngs::SmallRng;
use tabfuse::prelude::*;
use tabfuse_density::Density;

fn density_bench(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(42);

    let sample_sizes = &[1000, 10000, 100000];
    let n_features = 10;
    let params = Density::params();

    let mut group = c.benchmark_group("density");
    group.sample_size(10);

    for n in sample_sizes.iter() {
        let records: Array2<f64> =
            Array2::random_using((*n, n_features), Normal::new(0.0f64, 3.0).unwrap(), &mut rng);
        let dataset = DatasetBase::from(records);

        group.bench_with_input(BenchmarkId::new("fit", n), &dataset, |b, d| {
            b.iter(|| params.fit(d).unwrap())
        });

        let fitted = params.fit(&dataset).unwrap();
        group.bench_with_input(BenchmarkId::new("transform", n), &dataset, |b, d| {
            b.iter(|| fitted.transform(d.records()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, density_bench);
criterion_main!(benches);
