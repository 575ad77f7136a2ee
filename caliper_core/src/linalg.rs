// caliper_core/src/linalg.rs

//! Shape-checked dense matrix helpers on top of `nalgebra::DMatrix`.
//!
//! nalgebra panics on mismatched operands. The filter needs those mismatches
//! reported as values instead, so every binary operation here validates the
//! shapes first. Inversion is a plain Gauss-Jordan elimination with partial
//! pivoting so that near-singular systems are rejected with a fixed threshold
//! rather than producing a huge, meaningless inverse.

use nalgebra::DMatrix;
use thiserror::Error;

/// The dense matrix type used throughout the filter.
pub type Matrix = DMatrix<f64>;

/// Pivots with a magnitude below this are treated as zero.
pub const PIVOT_EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error("{op}: expected shape {expected:?}, got {actual:?}")]
    DimensionMismatch {
        op: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error("cannot invert a non-square {rows}x{cols} matrix")]
    NotSquare { rows: usize, cols: usize },
    #[error("matrix is singular or nearly singular (pivot {pivot:e} in column {column})")]
    Singular { column: usize, pivot: f64 },
}

/// Returns `Ok(())` if `m` has exactly the `expected` shape.
pub fn ensure_shape(
    op: &'static str,
    m: &Matrix,
    expected: (usize, usize),
) -> Result<(), MatrixError> {
    if m.shape() == expected {
        Ok(())
    } else {
        Err(MatrixError::DimensionMismatch {
            op,
            expected,
            actual: m.shape(),
        })
    }
}

/// Builds an `n x 1` column vector from a slice.
pub fn column(values: &[f64]) -> Matrix {
    Matrix::from_column_slice(values.len(), 1, values)
}

pub fn identity(n: usize) -> Matrix {
    Matrix::identity(n, n)
}

pub fn checked_add(a: &Matrix, b: &Matrix) -> Result<Matrix, MatrixError> {
    ensure_shape("add", b, a.shape())?;
    Ok(a + b)
}

pub fn checked_sub(a: &Matrix, b: &Matrix) -> Result<Matrix, MatrixError> {
    ensure_shape("sub", b, a.shape())?;
    Ok(a - b)
}

pub fn checked_mul(a: &Matrix, b: &Matrix) -> Result<Matrix, MatrixError> {
    if a.ncols() != b.nrows() {
        return Err(MatrixError::DimensionMismatch {
            op: "mul",
            expected: (a.ncols(), b.ncols()),
            actual: b.shape(),
        });
    }
    Ok(a * b)
}

/// Inverts a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// The augmented system `[A | I]` is reduced to `[I | A^-1]`. At each column
/// the row with the largest remaining magnitude is swapped into the pivot
/// position; a pivot below [`PIVOT_EPSILON`] (or a non-finite one) aborts
/// with [`MatrixError::Singular`].
pub fn invert(m: &Matrix) -> Result<Matrix, MatrixError> {
    let (rows, cols) = m.shape();
    if rows != cols {
        return Err(MatrixError::NotSquare { rows, cols });
    }
    let n = rows;

    let mut aug = Matrix::zeros(n, 2 * n);
    aug.view_mut((0, 0), (n, n)).copy_from(m);
    aug.view_mut((0, n), (n, n)).fill_with_identity();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&a, &b| aug[(a, col)].abs().total_cmp(&aug[(b, col)].abs()))
            .unwrap_or(col);
        if pivot_row != col {
            aug.swap_rows(col, pivot_row);
        }

        let pivot = aug[(col, col)];
        if !pivot.is_finite() || pivot.abs() < PIVOT_EPSILON {
            return Err(MatrixError::Singular { column: col, pivot });
        }

        for j in col..2 * n {
            aug[(col, j)] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = aug[(row, col)];
            if factor == 0.0 {
                continue;
            }
            for j in col..2 * n {
                let delta = factor * aug[(col, j)];
                aug[(row, j)] -= delta;
            }
        }
    }

    Ok(aug.columns(n, n).into_owned())
}
