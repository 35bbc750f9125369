use crate::Real;
use nalgebra::{DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use std::ops::Range;

/// Per-component scale factors for the unknowns and the residuals of an implicit system.
///
/// With unknown factors $s$ and residual factors $r$, the solver works on the normalized
/// unknowns $y = x / s$ and the normalized residual $g = F / r$, so that the normalized
/// Jacobian is $\mathrm{diag}(r)^{-1} J \mathrm{diag}(s)$.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalisation<T: Real> {
    unknown: DVector<T>,
    residual: DVector<T>,
}

impl<T: Real> Normalisation<T> {
    pub fn identity(dimension: usize) -> Self {
        Self {
            unknown: DVector::repeat(dimension, T::one()),
            residual: DVector::repeat(dimension, T::one()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.unknown.len()
    }

    /// Sets the unknown-side factor for the components in `range`.
    ///
    /// # Panics
    ///
    /// Panics if the factor is zero or the range exceeds the dimension.
    pub fn with_unknown_factor(mut self, range: Range<usize>, factor: T) -> Self {
        assert!(factor != T::zero(), "Normalisation factors must be non-zero");
        self.unknown.rows_mut(range.start, range.len()).fill(factor);
        self
    }

    /// Sets the residual-side factor for the components in `range`.
    ///
    /// # Panics
    ///
    /// Panics if the factor is zero or the range exceeds the dimension.
    pub fn with_residual_factor(mut self, range: Range<usize>, factor: T) -> Self {
        assert!(factor != T::zero(), "Normalisation factors must be non-zero");
        self.residual.rows_mut(range.start, range.len()).fill(factor);
        self
    }

    pub fn unknown_factors(&self) -> DVectorView<T> {
        DVectorView::from(&self.unknown)
    }

    pub fn residual_factors(&self) -> DVectorView<T> {
        DVectorView::from(&self.residual)
    }

    pub fn scale_residual(&self, mut f: DVectorViewMut<T>) {
        f.component_div_assign(&self.residual);
    }

    /// Scales column `k` by the unknown factor first, then row `i` by the reciprocal residual factor.
    pub fn scale_jacobian(&self, mut j: DMatrixViewMut<T>) {
        assert_eq!(j.shape(), (self.residual.len(), self.unknown.len()));
        for k in 0..j.ncols() {
            let s = self.unknown[k];
            for i in 0..j.nrows() {
                j[(i, k)] = j[(i, k)] * s / self.residual[i];
            }
        }
    }

    /// Maps a normalized increment back to physical units.
    pub fn physical_increment(&self, normalized: DVectorView<T>) -> DVector<T> {
        normalized.component_mul(&self.unknown)
    }

    pub fn normalized_increment(&self, physical: DVectorView<T>) -> DVector<T> {
        physical.component_div(&self.unknown)
    }
}
