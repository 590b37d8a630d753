use crate::config::ReconstructionParams;
use crate::grid::{Bitmap, Grid2};
use crate::CnnError;

use super::MIN_POSITIVE_ACTIVATIONS;

/// One channel of a layer: an input color plane or a filter's activation map.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerImage {
    values: Grid2<f32>,
}

impl LayerImage {
    pub fn new(values: Grid2<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &Grid2<f32> {
        &self.values
    }

    pub fn positive_count(&self) -> usize {
        self.values.values().filter(|&&v| v > 0.0).count()
    }

    /// Value at the `quartile` position of the sorted strictly positive
    /// activations. Channels with too few positive activations return 0, so
    /// every positive activation passes `value > cutoff`.
    pub fn compute_cutoff(&self, params: &ReconstructionParams) -> f32 {
        let mut positive: Vec<f32> = self.values.values().copied().filter(|&v| v > 0.0).collect();
        if positive.len() < MIN_POSITIVE_ACTIVATIONS {
            return 0.0;
        }

        positive.sort_by(f32::total_cmp);
        let index = (params.quartile.max(0.0) * positive.len() as f32) as usize;
        positive[index.min(positive.len() - 1)]
    }
}

/// Ordered channels of one layer. The position of an image is its channel
/// (or filter) identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerData {
    images: Vec<LayerImage>,
}

impl LayerData {
    pub fn new(images: Vec<LayerImage>) -> Self {
        Self { images }
    }

    /// Three channels with every byte scaled to [0, 1].
    pub fn from_bitmap(bitmap: &Bitmap) -> Self {
        let images = (0..3)
            .map(|channel| LayerImage::new(bitmap.map(|px| px[channel] as f32 / 255.0)))
            .collect();
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[LayerImage] {
        &self.images
    }

    /// Common (x, y) size of every channel. Errors on an empty or ragged layer.
    pub fn dims(&self) -> Result<(usize, usize), CnnError> {
        let first = self
            .images
            .first()
            .ok_or_else(|| CnnError::from("layer has no channels"))?
            .values
            .dims();
        if let Some(other) = self.images.iter().find(|img| img.values.dims() != first) {
            let (x, y) = other.values.dims();
            return Err(CnnError::ShapeError {
                what: "layer channel",
                expected: vec![first.0, first.1],
                got: vec![x, y],
            });
        }
        Ok(first)
    }
}
