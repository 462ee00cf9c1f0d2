//! Dense solver for the small symmetric systems of the damped normal equations

use crate::error::SingularMatrixError;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn, LU};
use ndarray::{Array1, Array2, ArrayView2, ArrayViewMut1};
use std::collections::TryReserveError;

/// Factorized square matrix
///
/// The matrix is equilibrated before factorization, $S A S$ with $S_{ii} = a_{ii}^{-1/2}$, so
/// singularity does not depend on the units of the parameters. A row with a non-positive
/// diagonal is scaled by its largest entry instead, a zero row makes the matrix singular.
///
/// The curvature matrix is symmetric and positive definite as long as the damping is positive
/// and every free parameter has a non-zero derivative somewhere, so Cholesky is tried first.
/// Round-off can make an undamped matrix slightly indefinite, in which case LU with partial
/// pivoting takes over. The equilibrated matrix is singular if a pivot is not larger than
/// `n * eps * max|a|`.
#[derive(Clone, Debug)]
pub(crate) struct Factorization {
    scale: DVector<f64>,
    decomposition: Decomposition,
}

#[derive(Clone, Debug)]
enum Decomposition {
    Cholesky(Cholesky<f64, Dyn>),
    Lu(LU<f64, Dyn, Dyn>),
}

impl Factorization {
    pub(crate) fn new(a: ArrayView2<f64>) -> Result<Self, SingularMatrixError> {
        let n = a.nrows();
        if n == 0 || n != a.ncols() || a.iter().any(|value| !value.is_finite()) {
            return Err(SingularMatrixError);
        }

        let scale = DVector::from_iterator(
            n,
            a.rows().into_iter().enumerate().map(|(i, row)| {
                let norm = if row[i] > 0.0 {
                    row[i]
                } else {
                    row.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
                };
                norm.sqrt().recip()
            }),
        );
        if scale.iter().any(|s| !s.is_finite()) {
            return Err(SingularMatrixError);
        }

        let equilibrated = DMatrix::from_fn(n, n, |i, j| scale[i] * a[[i, j]] * scale[j]);
        let threshold = (n as f64) * f64::EPSILON * equilibrated.amax();

        if let Some(cholesky) = equilibrated.clone().cholesky() {
            if cholesky
                .l_dirty()
                .diagonal()
                .iter()
                .all(|&l| l * l > threshold)
            {
                return Ok(Self {
                    scale,
                    decomposition: Decomposition::Cholesky(cholesky),
                });
            }
        }

        log::trace!("Cholesky factorization failed, falling back to LU");
        let lu = equilibrated.lu();
        if lu.u().diagonal().iter().all(|&u| u.abs() > threshold) {
            Ok(Self {
                scale,
                decomposition: Decomposition::Lu(lu),
            })
        } else {
            Err(SingularMatrixError)
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.scale.len()
    }

    #[cfg(test)]
    fn is_cholesky(&self) -> bool {
        matches!(self.decomposition, Decomposition::Cholesky(_))
    }

    /// Overwrite `b` with the solution `x` of `A x = b`, `b` must have the matrix size
    pub(crate) fn solve_in_place(&self, mut b: ArrayViewMut1<f64>) {
        debug_assert_eq!(b.len(), self.size());
        let mut rhs = DVector::from_iterator(
            self.size(),
            b.iter().zip(self.scale.iter()).map(|(&b, &s)| b * s),
        );
        match &self.decomposition {
            Decomposition::Cholesky(cholesky) => cholesky.solve_mut(&mut rhs),
            Decomposition::Lu(lu) => {
                // pivots are checked on construction
                let solved = lu.solve_mut(&mut rhs);
                debug_assert!(solved);
            }
        }
        for ((b, &y), &s) in b.iter_mut().zip(rhs.iter()).zip(self.scale.iter()) {
            *b = y * s;
        }
    }

    /// $A^{-1} = S (S A S)^{-1} S$
    pub(crate) fn inverse(&self) -> Array2<f64> {
        let n = self.size();
        let inverse = match &self.decomposition {
            Decomposition::Cholesky(cholesky) => cholesky.inverse(),
            Decomposition::Lu(lu) => {
                let mut identity = DMatrix::identity(n, n);
                let solved = lu.solve_mut(&mut identity);
                debug_assert!(solved);
                identity
            }
        };
        Array2::from_shape_fn((n, n), |(i, j)| {
            self.scale[i] * inverse[(i, j)] * self.scale[j]
        })
    }
}

/// Zero-filled buffer, reporting allocation failure instead of aborting
pub(crate) fn try_zeros_vec(len: usize) -> Result<Vec<f64>, TryReserveError> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)?;
    data.resize(len, 0.0);
    Ok(data)
}

pub(crate) fn try_zeros1(len: usize) -> Result<Array1<f64>, TryReserveError> {
    Ok(Array1::from_vec(try_zeros_vec(len)?))
}

/// Zero square matrix, reporting allocation failure instead of aborting
pub(crate) fn try_zeros2(n: usize) -> Result<Array2<f64>, TryReserveError> {
    let data = try_zeros1(n * n)?;
    // Length is n * n, so reshaping cannot fail
    Ok(data.into_shape_with_order((n, n)).unwrap_or_default())
}

/// Inverse of a square, usually symmetric, matrix
pub(crate) fn invert(a: ArrayView2<f64>) -> Result<Array2<f64>, SingularMatrixError> {
    Ok(Factorization::new(a)?.inverse())
}
