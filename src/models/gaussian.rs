use crate::error::EvaluationFailure;
use crate::model::FitModel;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Polynomial continuum under a [GaussianProfile]
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Continuum {
    None,
    Constant,
    Linear,
    Quadratic,
}

impl Continuum {
    /// Number of continuum coefficients
    pub fn nterms(self) -> usize {
        match self {
            Self::None => 0,
            Self::Constant => 1,
            Self::Linear => 2,
            Self::Quadratic => 3,
        }
    }
}

/// Gaussian line profile on top of a polynomial continuum
///
/// $$
/// f(x) = A \exp\left(-\frac{(x - \mu)^2}{2 \sigma^2}\right) + c_0 + c_1 x + c_2 x^2,
/// $$
///
/// parameters are $(A, \mu, \sigma, c_0, c_1, c_2)$, where continuum coefficients are present up
/// to the order of [Continuum], so the model has from three to six parameters. Positions are
/// one-dimensional. Zero width is reported as an evaluation failure.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct GaussianProfile {
    continuum: Continuum,
}

impl GaussianProfile {
    pub fn new(continuum: Continuum) -> Self {
        Self { continuum }
    }

    #[inline]
    pub fn continuum(&self) -> Continuum {
        self.continuum
    }

    fn check<'a>(&self, x: &[f64], params: &'a [f64]) -> Result<(f64, &'a [f64]), EvaluationFailure> {
        if params.len() != 3 + self.continuum.nterms() {
            return Err(EvaluationFailure);
        }
        let &[x] = x else {
            return Err(EvaluationFailure);
        };
        if params[2] == 0.0 {
            return Err(EvaluationFailure);
        }
        Ok((x, params))
    }
}

impl Default for GaussianProfile {
    fn default() -> Self {
        Self::new(Continuum::Constant)
    }
}

impl FitModel for GaussianProfile {
    fn value(&self, x: &[f64], params: &[f64]) -> Result<f64, EvaluationFailure> {
        let (x, params) = self.check(x, params)?;
        let z = (x - params[1]) / params[2];
        let continuum = params[3..]
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * x + c);
        Ok(params[0] * f64::exp(-0.5 * z * z) + continuum)
    }

    fn derivatives(
        &self,
        x: &[f64],
        params: &[f64],
        derivatives: &mut [f64],
    ) -> Result<(), EvaluationFailure> {
        let (x, params) = self.check(x, params)?;
        if derivatives.len() != params.len() {
            return Err(EvaluationFailure);
        }
        let sigma = params[2];
        let z = (x - params[1]) / sigma;
        let exp = f64::exp(-0.5 * z * z);
        derivatives[0] = exp;
        derivatives[1] = params[0] * exp * z / sigma;
        derivatives[2] = params[0] * exp * z * z / sigma;
        let mut power = 1.0;
        for d in derivatives[3..].iter_mut() {
            *d = power;
            power *= x;
        }
        Ok(())
    }

    fn nparams(&self) -> Option<usize> {
        Some(3 + self.continuum.nterms())
    }

    fn ndim(&self) -> Option<usize> {
        Some(1)
    }
}
