use std::io::BufRead;
use std::path::Path;

use log::info;

use crate::blob::{parse_records, read_records, Coverage, Record};
use crate::grid::{Bitmap, Grid2, Grid3};
use crate::{CnnError, CnnResult};

use super::{LayerData, LayerImage, CROP_OFFSET, CROP_SIZE, INPUT_CHANNELS, INPUT_SIZE};

/// Per-channel mean image of the training set. Inputs are normalized against
/// it and cropped to the layer's working resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTransform {
    mean: Grid3<f32>,
}

impl DataTransform {
    /// Fails unless `mean` is (3, 256, 256).
    pub fn new(mean: Grid3<f32>) -> CnnResult<Self> {
        let expected = (INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE);
        if mean.dims() != expected {
            let (c, x, y) = mean.dims();
            return Err(CnnError::ShapeError {
                what: "mean image",
                expected: vec![expected.0, expected.1, expected.2],
                got: vec![c, x, y],
            });
        }
        Ok(Self { mean })
    }

    pub fn load_from_blob(mean_blob: &Path) -> CnnResult<Self> {
        info!("Loading mean image from {}", mean_blob.display());
        Self::from_records(&read_records(mean_blob)?)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> CnnResult<Self> {
        Self::from_records(&parse_records(reader)?)
    }

    /// Records are `channel x y value`, optionally preceded by a zero blob
    /// index. Every pixel of every channel must appear exactly once.
    pub fn from_records(records: &[Record]) -> CnnResult<Self> {
        let mut mean = Grid3::new(INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE);
        let mut coverage = Coverage::new("mean", &[INPUT_CHANNELS, INPUT_SIZE, INPUT_SIZE]);
        for record in records {
            record.expect_fields("4 (channel x y value) or 5 (0 channel x y value)", &[4, 5])?;
            let first = record.len() - 4;
            if first == 1 {
                record.reserved_zero(0)?;
            }
            let channel = record.index(first, "channel", INPUT_CHANNELS)?;
            let x = record.index(first + 1, "x", INPUT_SIZE)?;
            let y = record.index(first + 2, "y", INPUT_SIZE)?;
            let value = record.float(first + 3)?;
            coverage.mark(record.line, &[channel, x, y])?;
            *mean.try_get_mut(channel, x, y)? = value;
        }
        coverage.finish()?;
        Self::new(mean)
    }

    pub fn mean(&self) -> &Grid3<f32> {
        &self.mean
    }

    /// Mean-subtracted central 227x227 crop of a 256x256 (or larger) image.
    pub fn transform(&self, input: &Bitmap) -> CnnResult<LayerData> {
        let (dim_x, dim_y) = input.dims();
        if dim_x < INPUT_SIZE || dim_y < INPUT_SIZE {
            return Err(CnnError::ShapeError {
                what: "input image",
                expected: vec![INPUT_SIZE, INPUT_SIZE],
                got: vec![dim_x, dim_y],
            });
        }

        let images = (0..INPUT_CHANNELS)
            .map(|channel| {
                LayerImage::new(Grid2::from_fn(CROP_SIZE, CROP_SIZE, |x, y| {
                    let (sx, sy) = (x + CROP_OFFSET, y + CROP_OFFSET);
                    input[(sx, sy)][channel] as f32 - self.mean[(channel, sx, sy)]
                }))
            })
            .collect();
        Ok(LayerData::new(images))
    }
}
