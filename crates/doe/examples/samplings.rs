use ndarray::arr2;
use uqbox_doe::{
    GaussProductExperiment, Lhs, LhsKind, MonteCarloExperiment, Random, SamplingMethod,
    WeightedExperiment,
};

fn main() {
    let xlimits = arr2(&[[0., 1.], [-10., 10.]]);
    let n = 6;

    println!("Take {n} samples in");
    println!("{xlimits}\n");

    println!("*** using random sampling");
    let samples = Random::new(&xlimits).sample(n);
    println!("{samples}\n");

    println!("*** using centered latin hypercube sampling");
    let samples = Lhs::new(&xlimits).kind(LhsKind::Centered).sample(n);
    println!("{samples}\n");

    println!("*** using a 3x2 Gauss-Legendre product");
    let (nodes, weights) = GaussProductExperiment::new(&xlimits, &[3, 2])
        .generate_with_weights()
        .expect("Gauss-Legendre rule");
    println!("{nodes}\n{weights}\n");

    println!("*** using Monte Carlo");
    let (nodes, weights) = MonteCarloExperiment::new(&xlimits, n, 42)
        .generate_with_weights()
        .expect("Monte Carlo draws");
    println!("{nodes}\n{weights}");
}
