use criterion::{criterion_group, criterion_main, Criterion};
use linfa::ParamGuard;
use ndarray::{array, Array1, Array2, Axis, Zip};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use uqbox_doe::{Lhs, SamplingMethod};
use uqbox_gp::{
    ConstantBasis, GeneralLinearModelAlgorithm, GlmOptions, LinearAlgebraMethod, Matern32,
};

fn sample(nt: usize) -> (Array2<f64>, Array2<f64>) {
    let xlimits = array![[-2., 2.], [-2., 2.]];
    let rng = Xoshiro256Plus::seed_from_u64(42);
    let xt = Lhs::new(&xlimits).with_rng(rng).sample(nt);
    let mut yt: Array1<f64> = Array1::zeros(nt);
    Zip::from(&mut yt).and(xt.rows()).par_for_each(|y, x| {
        *y = (3. * x[0]).sin() * (-x[1] * x[1]).exp() + 0.1 * x[1];
    });
    (xt, yt.insert_axis(Axis(1)))
}

fn criterion_likelihood(c: &mut Criterion) {
    let mut group = c.benchmark_group("reduced log-likelihood");
    group.sample_size(10);
    for nt in [200, 800] {
        let (xt, yt) = sample(nt);
        for method in [LinearAlgebraMethod::Dense, LinearAlgebraMethod::Hierarchical] {
            let covariance = Matern32::new(array![0.5, 0.5], array![1.])
                .unwrap()
                .with_nugget_factor(1e-6)
                .unwrap();
            let params = GeneralLinearModelAlgorithm::params(covariance, ConstantBasis())
                .options(GlmOptions {
                    method,
                    ..GlmOptions::default()
                })
                .check()
                .expect("valid parameters");
            let mut algo = GeneralLinearModelAlgorithm::new(&params, &xt, &yt).unwrap();
            group.bench_function(format!("{method} {nt}"), |b| {
                b.iter(|| {
                    std::hint::black_box(
                        algo.compute_reduced_log_likelihood(&array![0.5, 0.5])
                            .expect("likelihood"),
                    );
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, criterion_likelihood);
criterion_main!(benches);
