//! Built-in parametric models: spectral line profiles and polynomials

mod gaussian;
pub use gaussian::{Continuum, GaussianProfile};

mod polynomial;
pub use polynomial::Polynomial;
