//! Synthetic data sets for tests and benchmarks

use ndarray::Array1;
use rand::prelude::*;
use rand_distr::StandardNormal;

/// One-dimensional sample with known true parameters
#[derive(Clone, Debug)]
pub struct SyntheticData {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub sigma: Array1<f64>,
    pub truth: Vec<f64>,
}

/// Gaussian emission line over a constant continuum, parameters are
/// (amplitude, center, width, continuum)
pub fn gaussian_line(n: usize, noise: f64, seed: u64) -> SyntheticData {
    let truth = vec![10.0, 0.25, 0.8, 2.0];
    let x = Array1::linspace(-5.0, 5.0, n);
    let y = with_noise(&x, noise, seed, |x| {
        let z = (x - truth[1]) / truth[2];
        truth[0] * f64::exp(-0.5 * z * z) + truth[3]
    });
    SyntheticData {
        sigma: Array1::from_elem(n, noise),
        x,
        y,
        truth,
    }
}

/// Quadratic wavelength calibration curve over a normalized pixel coordinate, parameters are
/// polynomial coefficients starting from the constant term
pub fn calibration_curve(n: usize, noise: f64, seed: u64) -> SyntheticData {
    let truth = vec![4000.0, 25.0, -0.3];
    let x = Array1::linspace(0.0, 10.0, n);
    let y = with_noise(&x, noise, seed, |x| truth[0] + truth[1] * x + truth[2] * x * x);
    SyntheticData {
        sigma: Array1::from_elem(n, noise),
        x,
        y,
        truth,
    }
}

fn with_noise(x: &Array1<f64>, noise: f64, seed: u64, f: impl Fn(f64) -> f64) -> Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    x.mapv(|x| {
        let eps: f64 = rng.sample(StandardNormal);
        f(x) + noise * eps
    })
}
