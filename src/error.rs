use std::collections::TryReserveError;

/// Error returned from [crate::LevenbergMarquardt::fit]
///
/// No output is written to the caller's parameter slice when a fit returns an error.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    #[error("uncertainty of the independent variable is not supported")]
    UnsupportedMode,

    #[error("model function or its derivatives failed for sample {sample}")]
    ModelEvaluation { sample: usize },

    #[error("fit did not converge ({reason}) after {iterations} iterations, lambda = {lambda:e}")]
    NonConvergence {
        reason: DivergenceReason,
        iterations: usize,
        lambda: f64,
    },

    #[error("covariance matrix cannot be computed: curvature matrix is singular")]
    SingularCovariance,

    #[error("working buffer allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Exact reason of [FitError::InvalidInput]
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum InvalidInput {
    #[error("relative tolerance must be positive and finite, {0} given")]
    RelativeTolerance(f64),

    #[error("tolerance count must be positive")]
    ToleranceCount,

    #[error("maximum number of iterations must be positive")]
    MaxIterations,

    #[error("maximum number of singular-matrix attempts must be positive")]
    MaxSingularAttempts,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{what} length {actual} does not match the expected length {expected}")]
    LengthMismatch {
        what: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("sigma must be positive and finite, sigma[{index}] = {value}")]
    NonPositiveSigma { index: usize, value: f64 },

    #[error("at least one parameter must be free")]
    AllParametersFixed,

    #[error(
        "reduced chi-square needs more samples ({nsamples}) than free parameters ({nfree})"
    )]
    InsufficientDegreesOfFreedom { nsamples: usize, nfree: usize },
}

/// Why the damped iterations stopped without converging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DivergenceReason {
    /// Damping factor grew up to [crate::MAX_LAMBDA]
    DampingCeiling,
    /// Iteration limit was hit before the improvement counter
    IterationLimit,
    /// Curvature matrix stayed singular after all damping attempts
    SingularCurvature,
    /// Chi-square of a parameter vector is NaN or infinite
    NonFiniteChiSquare,
}

impl std::fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DampingCeiling => write!(f, "damping factor diverged"),
            Self::IterationLimit => write!(f, "iteration limit reached"),
            Self::SingularCurvature => write!(f, "curvature matrix is singular"),
            Self::NonFiniteChiSquare => write!(f, "chi-square is not finite"),
        }
    }
}

/// Failure reported by a [crate::FitModel] callback
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[error("model evaluation failed")]
pub struct EvaluationFailure;

/// Linear system has no unique solution
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("matrix is singular")]
pub struct SingularMatrixError;
