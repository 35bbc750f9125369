//! Addressing of the Jacobian sub-blocks.
//!
//! The Jacobian block of residual `r` with respect to unknown `u` occupies rows
//! `offset(r) + i * components(r) + local_row` and columns `offset(u) + j * components(u) + local_col`,
//! where `i` and `j` select array elements. How the block is exposed to user code depends on the
//! ranks of the two variables and on whether they are arrays:
//!
//! | residual | unknown | arrays | shape |
//! |---|---|---|---|
//! | scalar | scalar | none | single cell |
//! | scalar | scalar | residual only | column of cells |
//! | scalar | scalar | unknown only | row of cells |
//! | scalar | scalar | both | matrix of cells |
//! | scalar | non-scalar | any | row view |
//! | non-scalar | scalar | any | column view |
//! | non-scalar | non-scalar | any | matrix view |
//!
//! The residual always indexes rows and the unknown always indexes columns.
use crate::error::InternalError;
use crate::layout::UnknownVectorLayout;
use crate::variable::{jacobian_block_name, TensorRank};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BlockShape {
    ScalarCell,
    RowView,
    ColumnView,
    MatrixView,
}

/// Array indices threaded through the accessor of a block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ArrayIndexing {
    None,
    /// Indexed by the array element of the residual.
    Residual { size: u16 },
    /// Indexed by the array element of the unknown.
    Unknown { size: u16 },
    Both { residual: u16, unknown: u16 },
}

/// How to address the Jacobian block `df<r>_dd<u>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressingPlan {
    /// Accessor name, `df<r>_dd<u>`.
    pub name: String,
    pub residual: String,
    pub unknown: String,
    pub residual_rank: TensorRank,
    pub unknown_rank: TensorRank,
    pub shape: BlockShape,
    pub indexing: ArrayIndexing,
    /// First row of the block, i.e. the offset of the residual variable.
    pub row: usize,
    /// First column of the block, i.e. the offset of the unknown variable.
    pub col: usize,
    /// Rows of the block of a single array element.
    pub rows: usize,
    /// Columns of the block of a single array element.
    pub cols: usize,
}

impl AddressingPlan {
    pub fn is_array(&self) -> bool {
        self.indexing != ArrayIndexing::None
    }

    /// Whether the plan addresses single cells, possibly arranged in an array.
    pub fn is_cellwise(&self) -> bool {
        self.residual_rank.is_scalar() && self.unknown_rank.is_scalar()
    }

    pub fn residual_array_size(&self) -> u16 {
        match self.indexing {
            ArrayIndexing::Residual { size } => size,
            ArrayIndexing::Both { residual, .. } => residual,
            _ => 1,
        }
    }

    pub fn unknown_array_size(&self) -> u16 {
        match self.indexing {
            ArrayIndexing::Unknown { size } => size,
            ArrayIndexing::Both { unknown, .. } => unknown,
            _ => 1,
        }
    }

    /// Global row of the local row `local_row` of the residual element `array_index`.
    pub fn row_of(&self, array_index: usize, local_row: usize) -> usize {
        self.row + array_index * self.rows + local_row
    }

    /// Global column of the local column `local_col` of the unknown element `array_index`.
    pub fn col_of(&self, array_index: usize, local_col: usize) -> usize {
        self.col + array_index * self.cols + local_col
    }

    /// A declaration of `alias` giving access to this block of `matrix`.
    ///
    /// Blocks of arrays are exposed through a lambda taking the array indices, in the order
    /// residual index then unknown index.
    pub fn accessor(&self, alias: &str, matrix: &str) -> String {
        let r = self.residual_rank.type_name();
        let u = self.unknown_rank.type_name();
        let access = |row: &str, col: &str| {
            if self.is_cellwise() {
                format!("{}({}, {})", matrix, row, col)
            } else {
                format!("map_derivative<{}, {}>({}, {}, {})", r, u, matrix, row, col)
            }
        };
        let row = self.row.to_string();
        let col = self.col.to_string();
        let indexed_row = indexed(self.row, "idx", self.rows);
        match self.indexing {
            ArrayIndexing::None if self.is_cellwise() => {
                format!("real& {} = {}({}, {});", alias, matrix, self.row, self.col)
            }
            ArrayIndexing::None => format!(
                "auto&& {} = map_derivative<{}, {}, {}, {}>({});",
                alias, self.row, self.col, r, u, matrix
            ),
            ArrayIndexing::Residual { .. } => format!(
                "auto {} = [&](const unsigned short idx) -> decltype(auto) {{ return {}; }};",
                alias,
                access(&indexed_row, &col)
            ),
            ArrayIndexing::Unknown { .. } => format!(
                "auto {} = [&](const unsigned short idx) -> decltype(auto) {{ return {}; }};",
                alias,
                access(&row, &indexed(self.col, "idx", self.cols))
            ),
            ArrayIndexing::Both { .. } => format!(
                "auto {} = [&](const unsigned short idx, const unsigned short idx2) -> decltype(auto) {{ return {}; }};",
                alias,
                access(&indexed_row, &indexed(self.col, "idx2", self.cols))
            ),
        }
    }
}

fn indexed(offset: usize, index: &str, stride: usize) -> String {
    if stride == 1 {
        format!("{} + {}", offset, index)
    } else {
        format!("{} + {} * {}", offset, index, stride)
    }
}

/// Decides how the Jacobian block of `residual` with respect to `unknown` is addressed.
///
/// This is a pure function of the layout. A symmetric-tensor residual differentiated with respect
/// to a vector unknown has no addressing strategy and yields
/// [`InternalError::UnsupportedDerivativeShape`].
pub fn address_for(residual: &str, unknown: &str, layout: &UnknownVectorLayout) -> Result<AddressingPlan, InternalError> {
    let r = layout
        .entry(residual)
        .ok_or_else(|| InternalError::UnknownVariable(residual.to_string()))?;
    let u = layout
        .entry(unknown)
        .ok_or_else(|| InternalError::UnknownVariable(unknown.to_string()))?;

    let residual_rank = r.variable.rank();
    let unknown_rank = u.variable.rank();
    let indexing = match (r.variable.is_array(), u.variable.is_array()) {
        (false, false) => ArrayIndexing::None,
        (true, false) => ArrayIndexing::Residual {
            size: r.variable.array_size(),
        },
        (false, true) => ArrayIndexing::Unknown {
            size: u.variable.array_size(),
        },
        (true, true) => ArrayIndexing::Both {
            residual: r.variable.array_size(),
            unknown: u.variable.array_size(),
        },
    };

    use TensorRank::*;
    let shape = match (residual_rank, unknown_rank) {
        (Scalar, Scalar) => match indexing {
            ArrayIndexing::None => BlockShape::ScalarCell,
            ArrayIndexing::Residual { .. } => BlockShape::ColumnView,
            ArrayIndexing::Unknown { .. } => BlockShape::RowView,
            ArrayIndexing::Both { .. } => BlockShape::MatrixView,
        },
        (Scalar, _) => BlockShape::RowView,
        (SymmetricTensor, Vector) => {
            return Err(InternalError::UnsupportedDerivativeShape {
                residual: residual.to_string(),
                unknown: unknown.to_string(),
                residual_rank,
                unknown_rank,
            })
        }
        (_, Scalar) => BlockShape::ColumnView,
        (_, _) => BlockShape::MatrixView,
    };

    Ok(AddressingPlan {
        name: jacobian_block_name(residual, unknown),
        residual: residual.to_string(),
        unknown: unknown.to_string(),
        residual_rank,
        unknown_rank,
        shape,
        indexing,
        row: r.offset,
        col: u.offset,
        rows: r.components,
        cols: u.components,
    })
}
