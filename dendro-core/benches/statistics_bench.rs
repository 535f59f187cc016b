use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dendro_core::math::{iqr_outliers, median_absolute_deviation};
use rand::{thread_rng, Rng};

fn gen_random_values(count: usize) -> Vec<f64> {
    let mut rng = thread_rng();
    (0..count).map(|_| rng.gen()).collect()
}

fn bench(c: &mut Criterion) {
    let values = gen_random_values(4096);

    c.bench_function("iqr_outliers", |b| {
        b.iter(|| black_box(iqr_outliers(&values, 1.5)));
    });
    c.bench_function("median_absolute_deviation", |b| {
        b.iter(|| black_box(median_absolute_deviation(&values)));
    });
}

criterion_group! {
    name = statistics;
    config = Criterion::default().sample_size(40);
    targets = bench
}
criterion_main!(statistics);
