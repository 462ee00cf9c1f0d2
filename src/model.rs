use crate::error::EvaluationFailure;
use crate::models::{GaussianProfile, Polynomial};

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parametric model with analytic partial derivatives
///
/// `x` is a single position of length `D`, `params` is the full parameter vector of length `M`,
/// including the parameters held constant by the fit. Both methods must be deterministic; any
/// `Err` aborts the current fit with [FitError::ModelEvaluation](crate::FitError::ModelEvaluation).
#[enum_dispatch]
pub trait FitModel {
    /// Model value at `x`
    fn value(&self, x: &[f64], params: &[f64]) -> Result<f64, EvaluationFailure>;

    /// Write partial derivatives of the model value with respect to every parameter into
    /// `derivatives`, which has the same length as `params`
    fn derivatives(
        &self,
        x: &[f64],
        params: &[f64],
        derivatives: &mut [f64],
    ) -> Result<(), EvaluationFailure>;

    /// Number of parameters the model expects, if it is fixed
    fn nparams(&self) -> Option<usize> {
        None
    }

    /// Dimension of positions the model expects, if it is fixed
    fn ndim(&self) -> Option<usize> {
        None
    }
}

impl<T> FitModel for &T
where
    T: FitModel + ?Sized,
{
    fn value(&self, x: &[f64], params: &[f64]) -> Result<f64, EvaluationFailure> {
        (**self).value(x, params)
    }

    fn derivatives(
        &self,
        x: &[f64],
        params: &[f64],
        derivatives: &mut [f64],
    ) -> Result<(), EvaluationFailure> {
        (**self).derivatives(x, params, derivatives)
    }

    fn nparams(&self) -> Option<usize> {
        (**self).nparams()
    }

    fn ndim(&self) -> Option<usize> {
        (**self).ndim()
    }
}

/// [FitModel] made of a pair of closures
///
/// ```
/// use damped_lsq::{EvaluationFailure, FnModel};
///
/// let line = FnModel::new(
///     |x: &[f64], a: &[f64]| Ok::<_, EvaluationFailure>(a[0] + a[1] * x[0]),
///     |x: &[f64], _a: &[f64], d: &mut [f64]| {
///         d[0] = 1.0;
///         d[1] = x[0];
///         Ok(())
///     },
/// );
/// # let _ = line;
/// ```
#[derive(Clone, Copy)]
pub struct FnModel<F, DF> {
    model: F,
    derivatives: DF,
}

impl<F, DF> FnModel<F, DF>
where
    F: Fn(&[f64], &[f64]) -> Result<f64, EvaluationFailure>,
    DF: Fn(&[f64], &[f64], &mut [f64]) -> Result<(), EvaluationFailure>,
{
    pub fn new(model: F, derivatives: DF) -> Self {
        Self { model, derivatives }
    }
}

impl<F, DF> fmt::Debug for FnModel<F, DF> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel").finish_non_exhaustive()
    }
}

impl<F, DF> FitModel for FnModel<F, DF>
where
    F: Fn(&[f64], &[f64]) -> Result<f64, EvaluationFailure>,
    DF: Fn(&[f64], &[f64], &mut [f64]) -> Result<(), EvaluationFailure>,
{
    #[inline]
    fn value(&self, x: &[f64], params: &[f64]) -> Result<f64, EvaluationFailure> {
        (self.model)(x, params)
    }

    #[inline]
    fn derivatives(
        &self,
        x: &[f64],
        params: &[f64],
        derivatives: &mut [f64],
    ) -> Result<(), EvaluationFailure> {
        (self.derivatives)(x, params, derivatives)
    }
}

/// All built-in models are available as variants of this enum
#[enum_dispatch(FitModel)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProfileModel {
    GaussianProfile,
    Polynomial,
}
