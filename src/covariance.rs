use crate::error::FitError;
use crate::linalg::{invert, try_zeros2};
use crate::model::FitModel;
use crate::problem::ParameterMap;
use crate::residual::ResidualEvaluator;
use crate::step::{CandidateStepBuilder, StepError};

use ndarray::{Array2, ArrayView2};

/// Covariance matrix of the best-fit parameters
///
/// The undamped curvature matrix is built at `params` and inverted. Returns an `M x M` matrix,
/// rows and columns of fixed parameters are zero.
pub fn covariance_matrix<M>(
    evaluator: &ResidualEvaluator<M>,
    map: &ParameterMap,
    params: &[f64],
) -> Result<Array2<f64>, FitError>
where
    M: FitModel,
{
    let mut builder = CandidateStepBuilder::new(evaluator, map)?;
    builder.accumulate(params, 0.0).map_err(|err| match err {
        StepError::ModelEvaluation { sample } => FitError::ModelEvaluation { sample },
        StepError::Singular => FitError::SingularCovariance,
    })?;
    let inverse = invert(builder.alpha()).map_err(|_| FitError::SingularCovariance)?;
    expand(inverse.view(), map)
}

/// Scatter the `Mfit x Mfit` inverse into the full parameter space
///
/// Every free variance must be positive, the result is exactly symmetric.
fn expand(inverse: ArrayView2<f64>, map: &ParameterMap) -> Result<Array2<f64>, FitError> {
    if inverse
        .diag()
        .iter()
        .any(|&variance| !(variance > 0.0 && variance.is_finite()))
    {
        return Err(FitError::SingularCovariance);
    }

    let free = map.free();
    let mut covariance = try_zeros2(map.nparams())?;
    for (i_fit, &i) in free.iter().enumerate() {
        covariance[[i, i]] = inverse[[i_fit, i_fit]];
        for (j_fit, &j) in free[..i_fit].iter().enumerate() {
            let value = 0.5 * (inverse[[i_fit, j_fit]] + inverse[[j_fit, i_fit]]);
            covariance[[i, j]] = value;
            covariance[[j, i]] = value;
        }
    }
    Ok(covariance)
}
