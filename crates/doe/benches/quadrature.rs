use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::aview1;
use uqbox_doe::{GaussProductExperiment, Lhs, LhsKind, SamplingMethod, WeightedExperiment};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

fn criterion_doe(c: &mut Criterion) {
    let mut group = c.benchmark_group("doe");
    group.sample_size(10);
    let unit = aview1(&[0., 1.]);
    for dim in [2, 4] {
        let xlimits = unit.broadcast((dim, 2)).unwrap().to_owned();
        group.bench_function(format!("gauss-product-{dim}-dim"), |b| {
            let experiment = GaussProductExperiment::new(&xlimits, &vec![8; dim]);
            b.iter(|| std::hint::black_box(experiment.generate_with_weights()));
        });
        for kind in [LhsKind::Classic, LhsKind::Maximin] {
            group.bench_function(format!("lhs-{kind:?}-{dim}-dim"), |b| {
                let lhs = Lhs::new(&xlimits)
                    .kind(kind)
                    .with_rng(Xoshiro256Plus::seed_from_u64(42));
                b.iter(|| std::hint::black_box(lhs.sample(200)));
            });
        }
    }
    group.finish();
}

criterion_group!(benches, criterion_doe);
criterion_main!(benches);
