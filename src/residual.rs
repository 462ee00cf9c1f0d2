use crate::error::FitError;
use crate::model::FitModel;
use crate::problem::FitProblem;

use itertools::izip;
use ndarray::Array1;

/// Failure of a residual evaluation over the whole data set
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ResidualError {
    #[error("model evaluation failed for sample {sample}")]
    ModelEvaluation { sample: usize },

    #[error("chi-square is not finite")]
    NonFinite,
}

/// Evaluates a model over every sample of a [FitProblem]
#[derive(Debug)]
pub struct ResidualEvaluator<'p, 'a, M> {
    problem: &'p FitProblem<'a>,
    model: &'p M,
    inverse_variance: Array1<f64>,
}

impl<'p, 'a, M> ResidualEvaluator<'p, 'a, M>
where
    M: FitModel,
{
    /// Fails if the problem does not pass [FitProblem::validate]
    pub fn new(problem: &'p FitProblem<'a>, model: &'p M) -> Result<Self, FitError> {
        problem.validate()?;
        let inverse_variance = problem.inverse_variance()?;
        Ok(Self {
            problem,
            model,
            inverse_variance,
        })
    }

    #[inline]
    pub fn problem(&self) -> &'p FitProblem<'a> {
        self.problem
    }

    #[inline]
    pub fn model(&self) -> &'p M {
        self.model
    }

    /// `1 / sigma_k^2` per sample
    #[inline]
    pub fn inverse_variance(&self) -> &Array1<f64> {
        &self.inverse_variance
    }

    /// $\chi^2 = \sum_k (y_k - f(x_k))^2 / \sigma_k^2$
    ///
    /// Fails if the model fails for any sample or if the sum is not finite.
    pub fn chi2(&self, params: &[f64]) -> Result<f64, ResidualError> {
        let mut chi2 = 0.0;
        for (sample, (x, &y, &w)) in izip!(
            self.problem.positions(),
            self.problem.y(),
            &self.inverse_variance
        )
        .enumerate()
        {
            let f = self
                .model
                .value(x, params)
                .map_err(|_| ResidualError::ModelEvaluation { sample })?;
            let residual = y - f;
            chi2 += w * residual * residual;
        }
        if chi2.is_finite() {
            Ok(chi2)
        } else {
            Err(ResidualError::NonFinite)
        }
    }

    /// Unweighted mean squared residual
    ///
    /// Reported as is, an overflowing sum gives infinity.
    pub fn mse(&self, params: &[f64]) -> Result<f64, FitError> {
        let mut sum = 0.0;
        for (sample, (x, &y)) in self.problem.positions().zip(self.problem.y()).enumerate() {
            let f = self
                .model
                .value(x, params)
                .map_err(|_| FitError::ModelEvaluation { sample })?;
            sum += (y - f).powi(2);
        }
        Ok(sum / self.problem.nsamples() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Polynomial;

    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn chi2_unweighted() {
        let x = arr1(&[0.0, 1.0, 2.0]);
        let y = arr1(&[1.0, 2.0, 4.0]);
        let problem = FitProblem::new_1d(x.view(), y.view(), None);
        let model = Polynomial::new(1);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        // f = 1 + x, residuals 0, 0, 1
        assert_relative_eq!(evaluator.chi2(&[1.0, 1.0]).unwrap(), 1.0);
        assert_relative_eq!(evaluator.mse(&[1.0, 1.0]).unwrap(), 1.0 / 3.0);
    }

    #[test]
    fn chi2_weighted() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[1.0, 4.0]);
        let sigma = arr1(&[0.5, 2.0]);
        let problem = FitProblem::new_1d(x.view(), y.view(), Some(sigma.view()));
        let model = Polynomial::new(0);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        // residuals 1 and 4 in units of 0.5 and 2
        assert_relative_eq!(evaluator.chi2(&[0.0]).unwrap(), 4.0 + 4.0);
        assert_relative_eq!(evaluator.mse(&[0.0]).unwrap(), (1.0 + 16.0) / 2.0);
    }

    #[test]
    fn nan_model_is_failure() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[1.0, 4.0]);
        let problem = FitProblem::new_1d(x.view(), y.view(), None);
        let model = Polynomial::new(0);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        assert_eq!(evaluator.chi2(&[f64::NAN]), Err(ResidualError::NonFinite));
    }

    #[test]
    fn overflowing_mse_is_reported() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[1e200, -1e200]);
        let sigma = arr1(&[1e150, 1e150]);
        let problem = FitProblem::new_1d(x.view(), y.view(), Some(sigma.view()));
        let model = Polynomial::new(0);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        assert_relative_eq!(evaluator.chi2(&[0.0]).unwrap(), 2e100);
        assert_eq!(evaluator.mse(&[0.0]), Ok(f64::INFINITY));
    }

    #[test]
    fn mse_model_failure_names_sample() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[1.0, 4.0]);
        let problem = FitProblem::new_1d(x.view(), y.view(), None);
        let model = Polynomial::new(1);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        assert_eq!(
            evaluator.mse(&[1.0]),
            Err(FitError::ModelEvaluation { sample: 0 })
        );
    }

    #[test]
    fn model_failure_names_sample() {
        let x = arr1(&[0.0, 1.0]);
        let y = arr1(&[1.0, 4.0]);
        let problem = FitProblem::new_1d(x.view(), y.view(), None);
        let model = Polynomial::new(1);
        let evaluator = ResidualEvaluator::new(&problem, &model).unwrap();
        assert_eq!(
            evaluator.chi2(&[1.0]),
            Err(ResidualError::ModelEvaluation { sample: 0 })
        );
    }
}
