//! The first convolution layer of an ImageNet-style network and its inverse.

mod cnn;
mod constraints;
mod filter;
mod filter_bank;
mod layer;
mod layer_data;
mod transform;

pub use cnn::Cnn;
pub use constraints::{constraint_count, ConstraintId, ConstraintSystem, PixelLayout};
pub use filter::Filter;
pub use filter_bank::FilterBank;
pub use layer::{CnnLayer, InversionReport, Reconstruction};
pub use layer_data::{LayerData, LayerImage};
pub use transform::DataTransform;

use crate::CnnResult;

/// Channels of the input image.
pub const INPUT_CHANNELS: usize = 3;
/// Side length of every square kernel.
pub const KERNEL_SIZE: usize = 11;
pub const FILTER_COUNT: usize = 96;
pub const STRIDE: usize = 4;
/// Side length of the images the mean blob was computed on.
pub const INPUT_SIZE: usize = 256;
/// The layer only sees the central 227 pixels of a 256 input.
pub const CROP_SIZE: usize = 227;
pub const CROP_OFFSET: usize = 15;
/// (CROP_SIZE - KERNEL_SIZE) / STRIDE + 1
pub const OUTPUT_SIZE: usize = 55;
/// Channels with fewer positive activations than this get a zero cutoff.
pub const MIN_POSITIVE_ACTIVATIONS: usize = 11;

pub trait Module {
    fn forward(&self, input: &LayerData) -> CnnResult<LayerData>;
}
