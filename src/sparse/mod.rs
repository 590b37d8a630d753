mod cg;
mod matrix;

pub use cg::{solve_least_squares, SolveReport, SolverSettings};
pub use matrix::SparseMatrix;

use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    ColumnOutOfRange {
        row: usize,
        column: usize,
        cols: usize,
    },
    ColumnIndexOverflow {
        row: usize,
        column: usize,
    },
}

impl std::error::Error for SolverError {}

impl Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::DimensionMismatch {
                what,
                expected,
                got,
            } => write!(f, "{}: expected length {}, got {}", what, expected, got),
            SolverError::ColumnOutOfRange { row, column, cols } => write!(
                f,
                "Row {} references column {} but the matrix has {} columns",
                row, column, cols
            ),
            SolverError::ColumnIndexOverflow { row, column } => write!(
                f,
                "Row {} references column {}, beyond the u32 column index range",
                row, column
            ),
        }
    }
}
