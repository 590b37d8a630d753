use std::fmt::{Display, Formatter};

pub mod blob;
pub mod config;
pub mod grid;
pub mod log;
pub mod nn;
pub mod prelude;
pub mod sparse;
pub mod visualize;

use blob::BlobError;
use grid::GridError;
use sparse::SolverError;

#[derive(Debug)]
pub enum CnnError {
    GridError(GridError),
    BlobError(BlobError),
    SolverError(SolverError),
    ShapeError {
        what: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    StringError(String),
}

impl Display for CnnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CnnError::GridError(e) => write!(f, "Grid error: {}", e),
            CnnError::BlobError(e) => write!(f, "Blob error: {}", e),
            CnnError::SolverError(e) => write!(f, "Solver error: {}", e),
            CnnError::ShapeError {
                what,
                expected,
                got,
            } => write!(
                f,
                "Shape error: {} expected {:?}, got {:?}",
                what, expected, got
            ),
            CnnError::StringError(s) => write!(f, "{}", s),
        }
    }
}

impl std::error::Error for CnnError {}

impl From<GridError> for CnnError {
    fn from(error: GridError) -> Self {
        CnnError::GridError(error)
    }
}

impl From<BlobError> for CnnError {
    fn from(error: BlobError) -> Self {
        CnnError::BlobError(error)
    }
}

impl From<SolverError> for CnnError {
    fn from(error: SolverError) -> Self {
        CnnError::SolverError(error)
    }
}

impl From<String> for CnnError {
    fn from(error: String) -> Self {
        CnnError::StringError(error)
    }
}

impl From<&str> for CnnError {
    fn from(error: &str) -> Self {
        CnnError::StringError(error.to_string())
    }
}

pub type CnnResult<T> = Result<T, CnnError>;
