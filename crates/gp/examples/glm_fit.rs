use linfa::prelude::*;
use ndarray::{concatenate, Array, Array2, Axis};
use uqbox_gp::{GeneralLinearModelAlgorithm, HyperOptimizer, LinearBasis, Matern52};

fn xsinx(x: &Array2<f64>) -> Array2<f64> {
    (x - 3.5) * ((x - 3.5) / std::f64::consts::PI).mapv(|v| v.sin())
}

fn main() {
    env_logger::init();

    let xt = Array::linspace(0., 25., 8).insert_axis(Axis(1));
    let yt = xsinx(&xt);

    println!("Fit general linear model of 'xsinx' at {}", xt.column(0));
    let covariance = Matern52::new(ndarray::array![1.0], ndarray::array![1.0])
        .expect("valid covariance model");
    let result = GeneralLinearModelAlgorithm::params(covariance, LinearBasis())
        .optimizer(HyperOptimizer::MultiStart {
            n_start: 4,
            cobyla: Default::default(),
            seed: 42,
        })
        .fit(&Dataset::new(xt, yt))
        .expect("GLM fitting");
    println!("{result}");

    let xtest = Array::linspace(0., 25., 26).insert_axis(Axis(1));
    let ytest = xsinx(&xtest);
    let ypred = result.predict(&xtest).expect("GLM prediction");

    println!("Compute prediction errors (x, err(x))");
    println!("{}", concatenate![Axis(1), xtest, ypred - ytest]);
}
