use crate::normalisation::Normalisation;
use crate::Real;
use itertools::izip;
use nalgebra::{DMatrix, DMatrixView, DVector};
use std::error::Error;
use std::fmt;
use std::ops::Range;

/// A block of the inverse Jacobian, given by the unknown rows of `A` and the residual columns of `B`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InverseBlock {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TangentError {
    SingularJacobian,
    BlockOutOfBounds { block: InverseBlock, dimension: usize },
}

impl fmt::Display for TangentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingularJacobian => write!(f, "The converged Jacobian is singular"),
            Self::BlockOutOfBounds { block, dimension } => write!(
                f,
                "Block (rows {:?}, cols {:?}) exceeds the system dimension {}",
                block.rows, block.cols, dimension
            ),
        }
    }
}

impl Error for TangentError {}

/// Extracts blocks of the physical inverse Jacobian from the converged, normalized Jacobian.
///
/// The normalized Jacobian is factorized exactly once. For every canonical basis vector `e_k`,
/// the system `J x = e_k` is solved by back-substitution against that factorization, and the
/// rows of each requested block whose column range contains `k` are copied out. Finally each
/// block is mapped back to physical units by the factor `s_A / r_B`.
pub fn extract_inverse_blocks<T>(
    jacobian: DMatrixView<T>,
    blocks: &[InverseBlock],
    normalisation: &Normalisation<T>,
) -> Result<Vec<DMatrix<T>>, TangentError>
where
    T: Real,
{
    let n = jacobian.nrows();
    assert_eq!(jacobian.ncols(), n);
    assert_eq!(normalisation.dimension(), n);
    if let Some(block) = blocks.iter().find(|b| b.rows.end > n || b.cols.end > n) {
        return Err(TangentError::BlockOutOfBounds {
            block: block.clone(),
            dimension: n,
        });
    }

    let lu = jacobian.clone_owned().lu();
    if !lu.is_invertible() {
        return Err(TangentError::SingularJacobian);
    }

    let mut outputs: Vec<DMatrix<T>> = blocks
        .iter()
        .map(|b| DMatrix::zeros(b.rows.len(), b.cols.len()))
        .collect();

    let mut e = DVector::zeros(n);
    for k in 0..n {
        e.fill(T::zero());
        e[k] = T::one();
        if !lu.solve_mut(&mut e) {
            return Err(TangentError::SingularJacobian);
        }
        for (block, output) in izip!(blocks, &mut outputs) {
            if block.cols.contains(&k) {
                output
                    .column_mut(k - block.cols.start)
                    .copy_from(&e.rows(block.rows.start, block.rows.len()));
            }
        }
    }

    let s = normalisation.unknown_factors();
    let r = normalisation.residual_factors();
    for (block, output) in izip!(blocks, &mut outputs) {
        for (j, col) in block.cols.clone().enumerate() {
            for (i, row) in block.rows.clone().enumerate() {
                output[(i, j)] = output[(i, j)] * s[row] / r[col];
            }
        }
    }

    Ok(outputs)
}
