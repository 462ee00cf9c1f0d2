use crate::error::EvaluationFailure;
use crate::model::FitModel;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One-dimensional polynomial $f(x) = \sum_{i=0}^{n} a_i x^i$
///
/// Linear in its parameters, so a fit converges in a couple of iterations. Used for dispersion
/// relations and calibration curves.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Polynomial {
    degree: usize,
}

impl Polynomial {
    pub fn new(degree: usize) -> Self {
        Self { degree }
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl FitModel for Polynomial {
    fn value(&self, x: &[f64], params: &[f64]) -> Result<f64, EvaluationFailure> {
        let &[x] = x else {
            return Err(EvaluationFailure);
        };
        if params.len() != self.degree + 1 {
            return Err(EvaluationFailure);
        }
        Ok(params.iter().rev().fold(0.0, |acc, &a| acc * x + a))
    }

    fn derivatives(
        &self,
        x: &[f64],
        params: &[f64],
        derivatives: &mut [f64],
    ) -> Result<(), EvaluationFailure> {
        let &[x] = x else {
            return Err(EvaluationFailure);
        };
        if params.len() != self.degree + 1 || derivatives.len() != params.len() {
            return Err(EvaluationFailure);
        }
        let mut power = 1.0;
        for d in derivatives.iter_mut() {
            *d = power;
            power *= x;
        }
        Ok(())
    }

    fn nparams(&self) -> Option<usize> {
        Some(self.degree + 1)
    }

    fn ndim(&self) -> Option<usize> {
        Some(1)
    }
}
