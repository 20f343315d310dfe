use linfa::ParamGuard;
use ndarray::{array, Array, ArrayView1, Axis};
use uqbox_doe::{GaussProductExperiment, MonteCarloExperiment};
use uqbox_gp::{LegendreBasis, Matern32};
use uqbox_kl::{BoxDomain, KarhunenLoeveQuadratureAlgorithm, LevelSetDomain};

fn main() {
    env_logger::init();

    let bounds = array![[-1., 1.]];
    let covariance = Matern32::new(array![0.5], array![1.]).expect("valid covariance model");
    let params = KarhunenLoeveQuadratureAlgorithm::params(
        BoxDomain::new(&bounds).expect("valid box"),
        covariance,
        GaussProductExperiment::new(&bounds, &[40]),
        LegendreBasis::new(15)
            .with_bounds(&bounds)
            .expect("valid basis"),
    )
    .threshold(1e-2)
    .check()
    .expect("valid parameters");
    let result = KarhunenLoeveQuadratureAlgorithm::new(params)
        .run()
        .expect("KL decomposition");
    println!("{result}");

    let x = Array::linspace(-1., 1., 11).insert_axis(Axis(1));
    println!("Variance of the truncated process (x, var(x))");
    println!(
        "{}",
        ndarray::concatenate![Axis(1), x, result.variance(&x)]
    );

    let square = array![[-1., 1.], [-1., 1.]];
    let disk = LevelSetDomain::new(|x: &ArrayView1<f64>| x.dot(x), 1., &square)
        .expect("valid level set");
    let params = KarhunenLoeveQuadratureAlgorithm::params(
        disk,
        Matern32::new(array![0.5, 0.5], array![1.]).expect("valid covariance model"),
        MonteCarloExperiment::new(&array![[0., 1.], [0., 1.]], 2000, 42),
        LegendreBasis::new(6)
            .with_bounds(&square)
            .expect("valid basis"),
    )
    .threshold(5e-2)
    .check()
    .expect("valid parameters");
    let result = KarhunenLoeveQuadratureAlgorithm::new(params)
        .run()
        .expect("KL decomposition");
    println!(
        "Disk: {} modes over {} nodes, eigenvalues {}",
        result.n_modes(),
        result.mesh().nrows(),
        result.eigenvalues()
    );
}
