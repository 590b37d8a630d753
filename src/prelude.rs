pub use crate::config::{NetworkConfig, ReconstructionParams};
pub use crate::grid::{Bitmap, GrayImage, Grid2, Grid3};
pub use crate::nn::{Cnn, CnnLayer, DataTransform, Filter, FilterBank, LayerData, LayerImage};
pub use crate::sparse::{SolveReport, SolverSettings, SparseMatrix};
pub use crate::{CnnError, CnnResult};
