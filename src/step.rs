use crate::error::FitError;
use crate::linalg::{Factorization, try_zeros_vec, try_zeros1, try_zeros2};
use crate::model::FitModel;
use crate::problem::ParameterMap;
use crate::residual::ResidualEvaluator;

use itertools::izip;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Why a candidate step could not be built
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum StepError {
    #[error("model or derivatives evaluation failed for sample {sample}")]
    ModelEvaluation { sample: usize },

    #[error("curvature matrix is singular")]
    Singular,
}

/// Assembles the damped normal equations and solves them for a candidate parameter vector
///
/// For free parameters $i, j$ and samples $k$:
///
/// $$
/// \alpha_{ij} = \sum_k \sigma_k^{-2} \frac{\partial f}{\partial a_i} \frac{\partial f}{\partial a_j} (1 + \lambda \delta_{ij}),
/// \qquad
/// \beta_i = \sum_k \sigma_k^{-2} (y_k - f(x_k)) \frac{\partial f}{\partial a_i},
/// $$
///
/// and the candidate is $a + \delta a$ with $\alpha \delta a = \beta$. Buffers are allocated once
/// and reused by every call.
#[derive(Debug)]
pub struct CandidateStepBuilder<'e, 'p, 'a, M> {
    evaluator: &'e ResidualEvaluator<'p, 'a, M>,
    map: &'e ParameterMap,
    alpha: Array2<f64>,
    beta: Array1<f64>,
    step: Array1<f64>,
    partials: Vec<f64>,
}

impl<'e, 'p, 'a, M> CandidateStepBuilder<'e, 'p, 'a, M>
where
    M: FitModel,
{
    pub fn new(
        evaluator: &'e ResidualEvaluator<'p, 'a, M>,
        map: &'e ParameterMap,
    ) -> Result<Self, FitError> {
        let nfree = map.nfree();
        Ok(Self {
            evaluator,
            map,
            alpha: try_zeros2(nfree)?,
            beta: try_zeros1(nfree)?,
            step: try_zeros1(nfree)?,
            partials: try_zeros_vec(map.nparams())?,
        })
    }

    /// Curvature matrix of the last [Self::accumulate] call
    #[inline]
    pub fn alpha(&self) -> ArrayView2<'_, f64> {
        self.alpha.view()
    }

    /// Gradient vector of the last [Self::accumulate] call
    #[inline]
    pub fn beta(&self) -> ArrayView1<'_, f64> {
        self.beta.view()
    }

    /// Build alpha and beta at `params` with damping `lambda`
    ///
    /// Non-finite model values or derivatives count as a model evaluation failure.
    pub fn accumulate(&mut self, params: &[f64], lambda: f64) -> Result<(), StepError> {
        let evaluator = self.evaluator;
        let problem = evaluator.problem();
        let model = evaluator.model();
        let free = self.map.free();
        let nfree = free.len();

        self.alpha.fill(0.0);
        self.beta.fill(0.0);

        for (sample, (x, &y, &w)) in izip!(
            problem.positions(),
            problem.y(),
            evaluator.inverse_variance()
        )
        .enumerate()
        {
            let failure = StepError::ModelEvaluation { sample };
            let f = model.value(x, params).map_err(|_| failure)?;
            model
                .derivatives(x, params, &mut self.partials)
                .map_err(|_| failure)?;
            if !f.is_finite() || free.iter().any(|&i| !self.partials[i].is_finite()) {
                return Err(failure);
            }

            let weighted_residual = w * (y - f);
            for (i_fit, &i) in free.iter().enumerate() {
                let d_i = self.partials[i];
                self.beta[i_fit] += weighted_residual * d_i;

                let weighted_d_i = w * d_i;
                // lower triangle only, mirrored below
                for (j_fit, &j) in free[..i_fit].iter().enumerate() {
                    self.alpha[[i_fit, j_fit]] += weighted_d_i * self.partials[j];
                }
                self.alpha[[i_fit, i_fit]] += weighted_d_i * d_i * (1.0 + lambda);
            }
        }

        for i in 0..nfree {
            for j in i + 1..nfree {
                self.alpha[[i, j]] = self.alpha[[j, i]];
            }
        }
        Ok(())
    }

    /// Write `params + da` into `candidate`, fixed parameters are copied unchanged
    pub fn candidate(
        &mut self,
        params: &[f64],
        lambda: f64,
        candidate: &mut [f64],
    ) -> Result<(), StepError> {
        self.accumulate(params, lambda)?;

        let factorization =
            Factorization::new(self.alpha.view()).map_err(|_| StepError::Singular)?;
        self.step.assign(&self.beta);
        factorization.solve_in_place(self.step.view_mut());

        candidate.copy_from_slice(params);
        for (&i, &da) in self.map.free().iter().zip(self.step.iter()) {
            candidate[i] += da;
        }
        Ok(())
    }
}
