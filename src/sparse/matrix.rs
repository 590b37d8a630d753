use super::SolverError;

/// Row-major compressed sparse matrix, built one row at a time. Column
/// indices are stored as `u32`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    cols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<u32>,
    values: Vec<f32>,
}

impl SparseMatrix {
    pub fn new(cols: usize) -> Self {
        Self::with_capacity(cols, 0, 0)
    }

    pub fn with_capacity(cols: usize, rows: usize, nnz: usize) -> Self {
        let mut row_ptr = Vec::with_capacity(rows + 1);
        row_ptr.push(0);
        Self {
            cols,
            row_ptr,
            col_idx: Vec::with_capacity(nnz),
            values: Vec::with_capacity(nnz),
        }
    }

    pub fn rows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Appends a row given as (column, value) pairs. Repeated columns add up.
    /// On error the matrix is left as it was.
    pub fn push_row(
        &mut self,
        entries: impl IntoIterator<Item = (usize, f32)>,
    ) -> Result<(), SolverError> {
        let row = self.rows();
        let start = self.values.len();
        for (column, value) in entries {
            let checked = if column >= self.cols {
                Err(SolverError::ColumnOutOfRange {
                    row,
                    column,
                    cols: self.cols,
                })
            } else {
                u32::try_from(column).map_err(|_| SolverError::ColumnIndexOverflow { row, column })
            };
            match checked {
                Ok(c) => {
                    self.col_idx.push(c);
                    self.values.push(value);
                }
                Err(err) => {
                    self.col_idx.truncate(start);
                    self.values.truncate(start);
                    return Err(err);
                }
            }
        }
        self.row_ptr.push(self.values.len());
        Ok(())
    }

    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
        self.col_idx[start..end]
            .iter()
            .map(|&c| c as usize)
            .zip(self.values[start..end].iter().copied())
    }

    /// out = A x
    pub fn mul_vec(&self, x: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        check_len("mul_vec input", self.cols, x.len())?;
        check_len("mul_vec output", self.rows(), out.len())?;
        for (row, o) in out.iter_mut().enumerate() {
            *o = self.row(row).map(|(c, v)| v as f64 * x[c]).sum();
        }
        Ok(())
    }

    /// out = Aᵀ y
    pub fn mul_transpose_vec(&self, y: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        check_len("mul_transpose_vec input", self.rows(), y.len())?;
        check_len("mul_transpose_vec output", self.cols, out.len())?;
        out.iter_mut().for_each(|o| *o = 0.0);
        for (row, &yr) in y.iter().enumerate() {
            if yr == 0.0 {
                continue;
            }
            for (c, v) in self.row(row) {
                out[c] += v as f64 * yr;
            }
        }
        Ok(())
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<(), SolverError> {
    if expected == got {
        Ok(())
    } else {
        Err(SolverError::DimensionMismatch {
            what,
            expected,
            got,
        })
    }
}
