use crate::error::{FitError, InvalidInput};

use ndarray::{Array1, ArrayView1, ArrayView2};
use std::borrow::Cow;
use std::collections::TryReserveError;

/// Data to fit: `N` positions of dimension `D`, `N` values and their optional uncertainties
///
/// The problem borrows caller's arrays and never modifies them. Positions are stored as a
/// row-major buffer so every sample is passed to the model as a contiguous `&[f64]` of length
/// `D`; a copy is made only if the given view is not in standard layout.
#[derive(Clone, Debug)]
pub struct FitProblem<'a> {
    positions: Cow<'a, [f64]>,
    nsamples: usize,
    ndim: usize,
    position_sigma: Option<ArrayView2<'a, f64>>,
    y: ArrayView1<'a, f64>,
    sigma: Option<ArrayView1<'a, f64>>,
}

impl<'a> FitProblem<'a> {
    /// New problem, `positions` is an `N x D` matrix with a sample per row
    ///
    /// `sigma` is the uncertainty of `y`, all samples have unit weight if it is `None`.
    pub fn new(
        positions: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        sigma: Option<ArrayView1<'a, f64>>,
    ) -> Self {
        let (nsamples, ndim) = positions.dim();
        let positions = match positions.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(positions.iter().copied().collect()),
        };
        Self {
            positions,
            nsamples,
            ndim,
            position_sigma: None,
            y,
            sigma,
        }
    }

    /// New problem for scalar positions, `D = 1`
    pub fn new_1d(
        x: ArrayView1<'a, f64>,
        y: ArrayView1<'a, f64>,
        sigma: Option<ArrayView1<'a, f64>>,
    ) -> Self {
        let positions = match x.to_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(x.to_vec()),
        };
        Self {
            nsamples: positions.len(),
            positions,
            ndim: 1,
            position_sigma: None,
            y,
            sigma,
        }
    }

    /// Attach uncertainties of the positions
    ///
    /// Fitting with uncertain positions is not supported, any fit of such a problem returns
    /// [FitError::UnsupportedMode].
    pub fn with_position_sigma(mut self, position_sigma: ArrayView2<'a, f64>) -> Self {
        self.position_sigma = Some(position_sigma);
        self
    }

    #[inline]
    pub fn nsamples(&self) -> usize {
        self.nsamples
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    #[inline]
    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    #[inline]
    pub fn sigma(&self) -> Option<ArrayView1<'_, f64>> {
        self.sigma.as_ref().map(|sigma| sigma.view())
    }

    #[inline]
    pub fn has_position_sigma(&self) -> bool {
        self.position_sigma.is_some()
    }

    /// Position of the `k`-th sample
    #[inline]
    pub fn position(&self, k: usize) -> &[f64] {
        &self.positions[k * self.ndim..(k + 1) * self.ndim]
    }

    /// Iterator over sample positions
    pub fn positions(&self) -> impl Iterator<Item = &[f64]> {
        self.positions.chunks_exact(self.ndim)
    }

    /// `1 / sigma^2` for every sample, unity for unweighted problems
    pub(crate) fn inverse_variance(&self) -> Result<Array1<f64>, TryReserveError> {
        let mut weights = Vec::new();
        weights.try_reserve_exact(self.nsamples)?;
        match &self.sigma {
            Some(sigma) => weights.extend(sigma.iter().map(|&s| (s * s).recip())),
            None => weights.resize(self.nsamples, 1.0),
        }
        Ok(Array1::from_vec(weights))
    }

    /// Check the data shape and the uncertainties
    ///
    /// Uncertain positions are rejected before anything else.
    pub fn validate(&self) -> Result<(), FitError> {
        if self.has_position_sigma() {
            return Err(FitError::UnsupportedMode);
        }
        if self.nsamples == 0 {
            return Err(InvalidInput::Empty("positions").into());
        }
        if self.ndim == 0 {
            return Err(InvalidInput::Empty("position dimension").into());
        }
        if self.y.len() != self.nsamples {
            return Err(InvalidInput::LengthMismatch {
                what: "y",
                actual: self.y.len(),
                expected: self.nsamples,
            }
            .into());
        }
        if let Some(sigma) = &self.sigma {
            if sigma.len() != self.nsamples {
                return Err(InvalidInput::LengthMismatch {
                    what: "sigma",
                    actual: sigma.len(),
                    expected: self.nsamples,
                }
                .into());
            }
            if let Some((index, &value)) = sigma
                .iter()
                .enumerate()
                .find(|(_, s)| !(s.is_finite() && **s > 0.0))
            {
                return Err(InvalidInput::NonPositiveSigma { index, value }.into());
            }
        }
        Ok(())
    }
}

/// Free parameters of a fit and their place in the reduced `Mfit`-sized system
///
/// Built once per fit and shared by the normal-equation assembly and the covariance
/// expansion, so both always use the same compaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterMap {
    nparams: usize,
    free: Vec<usize>,
}

impl ParameterMap {
    /// All `nparams` parameters are free
    pub fn all(nparams: usize) -> Result<Self, FitError> {
        if nparams == 0 {
            return Err(InvalidInput::Empty("parameters").into());
        }
        let mut free = Vec::new();
        free.try_reserve_exact(nparams)?;
        free.extend(0..nparams);
        Ok(Self { nparams, free })
    }

    /// Parameters with `true` mask entries are free, the others are held constant
    pub fn from_mask(mask: &[bool], nparams: usize) -> Result<Self, FitError> {
        if nparams == 0 {
            return Err(InvalidInput::Empty("parameters").into());
        }
        if mask.len() != nparams {
            return Err(InvalidInput::LengthMismatch {
                what: "active parameter mask",
                actual: mask.len(),
                expected: nparams,
            }
            .into());
        }
        let nfree = mask.iter().filter(|&&active| active).count();
        if nfree == 0 {
            return Err(FitError::InvalidInput(InvalidInput::AllParametersFixed));
        }
        let mut free = Vec::new();
        free.try_reserve_exact(nfree)?;
        free.extend(
            mask.iter()
                .enumerate()
                .filter_map(|(i, &active)| active.then_some(i)),
        );
        Ok(Self { nparams, free })
    }

    pub fn new(mask: Option<&[bool]>, nparams: usize) -> Result<Self, FitError> {
        match mask {
            Some(mask) => Self::from_mask(mask, nparams),
            None => Self::all(nparams),
        }
    }

    /// Total number of parameters, `M`
    #[inline]
    pub fn nparams(&self) -> usize {
        self.nparams
    }

    /// Number of free parameters, `Mfit`
    #[inline]
    pub fn nfree(&self) -> usize {
        self.free.len()
    }

    /// Indices of the free parameters in the full parameter vector, ascending
    #[inline]
    pub fn free(&self) -> &[usize] {
        &self.free
    }

    pub fn is_free(&self, i: usize) -> bool {
        self.free.binary_search(&i).is_ok()
    }
}
