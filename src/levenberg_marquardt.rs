use crate::covariance::covariance_matrix;
use crate::error::{DivergenceReason, FitError, InvalidInput};
use crate::linalg::try_zeros_vec;
use crate::model::FitModel;
use crate::problem::{FitProblem, ParameterMap};
use crate::residual::{ResidualError, ResidualEvaluator};
use crate::step::{CandidateStepBuilder, StepError};

use ndarray::Array2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Damping factor every fit starts from
pub const INITIAL_LAMBDA: f64 = 1e-3;

/// Damping factor at which the fit is considered divergent
pub const MAX_LAMBDA: f64 = 10e40;

/// Damping is multiplied by this after a rejected step or a singular curvature matrix
const LAMBDA_INCREASE: f64 = 9.0;

/// Damping is divided by this after an accepted step
const LAMBDA_DECREASE: f64 = 10.0;

/// Levenberg-Marquardt least-squares fitter
///
/// Minimises $\chi^2 = \sum_k (y_k - f(x_k, a))^2 / \sigma_k^2$ starting from a caller-supplied
/// initial guess. The damping factor $\lambda$ interpolates between Gauss-Newton steps (small
/// $\lambda$) and steepest descent (large $\lambda$): it is divided by ten after every accepted
/// step and multiplied by nine after every rejected one.
///
/// The fit converges when the relative decrease of $\chi^2$ is smaller than
/// `relative_tolerance` for `tolerance_count` accepted steps in a row. It diverges if
/// `max_iterations` iterations pass first, or if $\lambda$ reaches [MAX_LAMBDA]. When the
/// curvature matrix is singular, $\lambda$ is increased and the step is rebuilt, at most
/// `max_singular_attempts` times per iteration.
///
/// The configuration is immutable during a fit, so one instance can be shared between threads.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "LevenbergMarquardt")]
pub struct LevenbergMarquardt {
    pub relative_tolerance: f64,
    pub tolerance_count: u32,
    pub max_iterations: u32,
    pub max_singular_attempts: u32,
}

impl LevenbergMarquardt {
    /// Create a new [LevenbergMarquardt].
    ///
    /// # Arguments
    /// - `relative_tolerance`: relative decrease of chi-square considered insignificant
    /// - `tolerance_count`: number of insignificant decreases in a row required to converge
    /// - `max_iterations`: maximum number of iterations, accepted or rejected
    ///
    /// Arguments are validated when fitting, see [FitError::InvalidInput].
    pub fn new(relative_tolerance: f64, tolerance_count: u32, max_iterations: u32) -> Self {
        Self {
            relative_tolerance,
            tolerance_count,
            max_iterations,
            max_singular_attempts: Self::default_max_singular_attempts(),
        }
    }

    /// Replace the number of attempts to build a step from a singular curvature matrix
    pub fn with_max_singular_attempts(mut self, max_singular_attempts: u32) -> Self {
        self.max_singular_attempts = max_singular_attempts;
        self
    }

    #[inline]
    pub fn default_relative_tolerance() -> f64 {
        0.01
    }

    #[inline]
    pub fn default_tolerance_count() -> u32 {
        5
    }

    #[inline]
    pub fn default_max_iterations() -> u32 {
        1000
    }

    #[inline]
    pub fn default_max_singular_attempts() -> u32 {
        3
    }

    pub fn validate(&self) -> Result<(), InvalidInput> {
        if !(self.relative_tolerance > 0.0 && self.relative_tolerance.is_finite()) {
            return Err(InvalidInput::RelativeTolerance(self.relative_tolerance));
        }
        if self.tolerance_count == 0 {
            return Err(InvalidInput::ToleranceCount);
        }
        if self.max_iterations == 0 {
            return Err(InvalidInput::MaxIterations);
        }
        if self.max_singular_attempts == 0 {
            return Err(InvalidInput::MaxSingularAttempts);
        }
        Ok(())
    }

    /// Fit `model` to `problem`
    ///
    /// `params` holds the initial guess on input and the best fit on success; it is left
    /// untouched on error. `active` marks free parameters with `true`, parameters with `false`
    /// are held at their initial values; `None` makes all parameters free. `outputs` selects
    /// the optional goodness-of-fit values and the covariance matrix to compute.
    ///
    /// Divergence is reported as [FitError::NonConvergence], use [Self::run] to inspect the
    /// state of a diverged fit.
    pub fn fit<M>(
        &self,
        problem: &FitProblem,
        model: &M,
        params: &mut [f64],
        active: Option<&[bool]>,
        outputs: FitOutputs,
    ) -> Result<FitResult, FitError>
    where
        M: FitModel,
    {
        let map = self.setup(problem, model, params, active)?;
        if outputs.reduced_chi2 && problem.nsamples() <= map.nfree() {
            return Err(InvalidInput::InsufficientDegreesOfFreedom {
                nsamples: problem.nsamples(),
                nfree: map.nfree(),
            }
            .into());
        }

        let evaluator = ResidualEvaluator::new(problem, model)?;
        let state = self.iterate(&evaluator, &map, params)?;
        if let FitStatus::Diverged(reason) = state.status {
            return Err(FitError::NonConvergence {
                reason,
                iterations: state.iterations,
                lambda: state.lambda,
            });
        }

        let mse = if outputs.mse {
            Some(evaluator.mse(&state.params)?)
        } else {
            None
        };
        let reduced_chi2 = outputs
            .reduced_chi2
            .then(|| state.chi2 / (problem.nsamples() - map.nfree()) as f64);
        let covariance = if outputs.covariance {
            Some(covariance_matrix(&evaluator, &map, &state.params)?)
        } else {
            None
        };

        params.copy_from_slice(&state.params);
        Ok(FitResult {
            params: state.params,
            chi2: state.chi2,
            iterations: state.iterations,
            lambda: state.lambda,
            nfree: map.nfree(),
            mse,
            reduced_chi2,
            covariance,
            status: state.status,
            chi2_history: state.chi2_history,
        })
    }

    /// Run the damped iterations without mapping divergence to an error
    ///
    /// Returns the final state, either [FitStatus::Converged] or [FitStatus::Diverged]; in the
    /// latter case `params` of the state are the last accepted ones. Invalid input, model
    /// failures, persistently singular curvature and non-finite chi-square are still errors.
    pub fn run<M>(
        &self,
        problem: &FitProblem,
        model: &M,
        params: &[f64],
        active: Option<&[bool]>,
    ) -> Result<FitState, FitError>
    where
        M: FitModel,
    {
        let map = self.setup(problem, model, params, active)?;
        let evaluator = ResidualEvaluator::new(problem, model)?;
        self.iterate(&evaluator, &map, params)
    }

    fn setup<M>(
        &self,
        problem: &FitProblem,
        model: &M,
        params: &[f64],
        active: Option<&[bool]>,
    ) -> Result<ParameterMap, FitError>
    where
        M: FitModel,
    {
        problem.validate()?;
        self.validate()?;
        if let Some(nparams) = model.nparams() {
            if params.len() != nparams {
                return Err(InvalidInput::LengthMismatch {
                    what: "parameters",
                    actual: params.len(),
                    expected: nparams,
                }
                .into());
            }
        }
        if let Some(ndim) = model.ndim() {
            if problem.ndim() != ndim {
                return Err(InvalidInput::LengthMismatch {
                    what: "position dimension",
                    actual: problem.ndim(),
                    expected: ndim,
                }
                .into());
            }
        }
        ParameterMap::new(active, params.len())
    }

    fn iterate<M>(
        &self,
        evaluator: &ResidualEvaluator<M>,
        map: &ParameterMap,
        initial: &[f64],
    ) -> Result<FitState, FitError>
    where
        M: FitModel,
    {
        let sqrt_eps = f64::EPSILON.sqrt();
        let tolerance_count = self.tolerance_count as usize;
        let max_iterations = self.max_iterations as usize;
        let max_singular_attempts = self.max_singular_attempts as usize;

        let mut builder = CandidateStepBuilder::new(evaluator, map)?;
        let mut candidate = try_zeros_vec(map.nparams())?;
        let mut params = try_zeros_vec(map.nparams())?;
        params.copy_from_slice(initial);

        let mut state = FitState {
            params: Vec::new(),
            chi2: f64::NAN,
            lambda: INITIAL_LAMBDA,
            no_improvement_count: 0,
            iterations: 0,
            status: FitStatus::Converged,
            chi2_history: Vec::new(),
        };
        state.chi2 = evaluator
            .chi2(&params)
            .map_err(|err| residual_error(err, &state))?;
        state.chi2_history.push(state.chi2);

        log::debug!(
            "Levenberg-Marquardt fit of {} samples, {} of {} parameters free, initial chi2 = {}",
            evaluator.problem().nsamples(),
            map.nfree(),
            map.nparams(),
            state.chi2,
        );

        // Every iteration either increases lambda, or increases the counter, or decreases
        // chi2, which is bounded from below, so the loop terminates
        while state.no_improvement_count < tolerance_count
            && state.lambda < MAX_LAMBDA
            && state.iterations < max_iterations
        {
            let mut attempts = 0;
            loop {
                attempts += 1;
                match builder.candidate(&params, state.lambda, &mut candidate) {
                    Ok(()) => break,
                    Err(StepError::Singular)
                        if attempts < max_singular_attempts && state.lambda < MAX_LAMBDA =>
                    {
                        log::debug!(
                            "singular curvature matrix at iteration {}, lambda = {:e}",
                            state.iterations,
                            state.lambda,
                        );
                        state.lambda *= LAMBDA_INCREASE;
                    }
                    Err(StepError::Singular) => {
                        return Err(FitError::NonConvergence {
                            reason: DivergenceReason::SingularCurvature,
                            iterations: state.iterations,
                            lambda: state.lambda,
                        });
                    }
                    Err(StepError::ModelEvaluation { sample }) => {
                        return Err(FitError::ModelEvaluation { sample });
                    }
                }
            }

            let chi2_candidate = evaluator
                .chi2(&candidate)
                .map_err(|err| residual_error(err, &state))?;

            if chi2_candidate - state.chi2 > sqrt_eps {
                log::trace!(
                    "iteration {}: rejected chi2 = {}, lambda = {:e}",
                    state.iterations,
                    chi2_candidate,
                    state.lambda,
                );
                state.lambda *= LAMBDA_INCREASE;
            } else {
                log::trace!(
                    "iteration {}: accepted chi2 = {}, lambda = {:e}",
                    state.iterations,
                    chi2_candidate,
                    state.lambda,
                );
                state.lambda /= LAMBDA_DECREASE;

                if state.chi2 < sqrt_eps
                    || (state.chi2 - chi2_candidate) / state.chi2 < self.relative_tolerance
                {
                    state.no_improvement_count += 1;
                } else {
                    state.no_improvement_count = 0;
                }

                std::mem::swap(&mut params, &mut candidate);
                state.chi2 = chi2_candidate;
                state.chi2_history.push(chi2_candidate);
            }
            state.iterations += 1;
        }

        state.params = params;
        if state.lambda >= MAX_LAMBDA {
            state.status = FitStatus::Diverged(DivergenceReason::DampingCeiling);
        } else if state.iterations >= max_iterations {
            state.status = FitStatus::Diverged(DivergenceReason::IterationLimit);
        }
        log::debug!(
            "Levenberg-Marquardt fit finished: {:?} after {} iterations, chi2 = {}, lambda = {:e}",
            state.status,
            state.iterations,
            state.chi2,
            state.lambda,
        );
        Ok(state)
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(
            Self::default_relative_tolerance(),
            Self::default_tolerance_count(),
            Self::default_max_iterations(),
        )
    }
}

fn residual_error(err: ResidualError, state: &FitState) -> FitError {
    match err {
        ResidualError::ModelEvaluation { sample } => FitError::ModelEvaluation { sample },
        ResidualError::NonFinite => FitError::NonConvergence {
            reason: DivergenceReason::NonFiniteChiSquare,
            iterations: state.iterations,
            lambda: state.lambda,
        },
    }
}

/// Optional values computed after a successful fit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FitOutputs {
    pub mse: bool,
    pub reduced_chi2: bool,
    pub covariance: bool,
}

impl FitOutputs {
    /// Best-fit parameters only
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            mse: true,
            reduced_chi2: true,
            covariance: true,
        }
    }

    pub fn with_mse(mut self) -> Self {
        self.mse = true;
        self
    }

    pub fn with_reduced_chi2(mut self) -> Self {
        self.reduced_chi2 = true;
        self
    }

    pub fn with_covariance(mut self) -> Self {
        self.covariance = true;
        self
    }
}

/// Terminal state of the damped iterations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FitStatus {
    Converged,
    /// Stopped by the damping ceiling or the iteration limit
    Diverged(DivergenceReason),
}

/// Optimizer state after [LevenbergMarquardt::run]
#[derive(Clone, Debug, PartialEq)]
pub struct FitState {
    /// Last accepted parameters
    pub params: Vec<f64>,
    pub chi2: f64,
    pub lambda: f64,
    /// Accepted steps in a row with insignificant chi-square decrease
    pub no_improvement_count: usize,
    /// Number of iterations, both accepted and rejected steps are counted
    pub iterations: usize,
    pub status: FitStatus,
    /// Initial chi-square followed by the chi-square of every accepted step
    pub chi2_history: Vec<f64>,
}

/// Result of a successful [LevenbergMarquardt::fit]
#[derive(Clone, Debug, PartialEq)]
pub struct FitResult {
    /// Best-fit parameters, fixed parameters are equal to their initial values
    pub params: Vec<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub lambda: f64,
    /// Number of free parameters
    pub nfree: usize,
    /// Unweighted mean squared residual, if requested
    pub mse: Option<f64>,
    /// Chi-square per degree of freedom, if requested
    pub reduced_chi2: Option<f64>,
    /// `M x M` covariance matrix of the parameters, if requested
    ///
    /// Rows and columns of fixed parameters are zero, variances of free parameters are positive.
    pub covariance: Option<Array2<f64>>,
    pub status: FitStatus,
    /// Initial chi-square followed by the chi-square of every accepted step
    pub chi2_history: Vec<f64>,
}

impl FitResult {
    /// Square roots of the covariance diagonal, if covariance was requested
    pub fn param_errors(&self) -> Option<Vec<f64>> {
        self.covariance
            .as_ref()
            .map(|covariance| covariance.diag().iter().map(|v| v.sqrt()).collect())
    }
}
