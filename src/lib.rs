#![doc = include_str!("../README.md")]


mod covariance;
pub use covariance::covariance_matrix;

mod error;
pub use error::{DivergenceReason, EvaluationFailure, FitError, InvalidInput};

mod levenberg_marquardt;
pub use levenberg_marquardt::{
    FitOutputs, FitResult, FitState, FitStatus, INITIAL_LAMBDA, LevenbergMarquardt, MAX_LAMBDA,
};

mod linalg;

mod model;
pub use model::{FitModel, FnModel, ProfileModel};

pub mod models;
pub use models::*;

mod problem;
pub use problem::{FitProblem, ParameterMap};

mod residual;
pub use residual::{ResidualError, ResidualEvaluator};

mod step;
pub use step::{CandidateStepBuilder, StepError};

pub use ndarray;
