use crate::grid::Grid3;
use crate::{CnnError, CnnResult};

use super::{LayerData, INPUT_CHANNELS, KERNEL_SIZE};

/// One learned 3x11x11 kernel of the first layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    weights: Grid3<f32>,
    bias: f32,
}

impl Filter {
    /// Fails unless `weights` is exactly (3, 11, 11).
    pub fn new(weights: Grid3<f32>, bias: f32) -> CnnResult<Self> {
        let expected = (INPUT_CHANNELS, KERNEL_SIZE, KERNEL_SIZE);
        if weights.dims() != expected {
            let (c, x, y) = weights.dims();
            return Err(CnnError::ShapeError {
                what: "filter weights",
                expected: vec![expected.0, expected.1, expected.2],
                got: vec![c, x, y],
            });
        }
        Ok(Self { weights, bias })
    }

    pub fn zeros() -> Self {
        Self {
            weights: Grid3::new(INPUT_CHANNELS, KERNEL_SIZE, KERNEL_SIZE),
            bias: 0.0,
        }
    }

    pub fn weights(&self) -> &Grid3<f32> {
        &self.weights
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    fn check_window(&self, input: &LayerData, x_start: usize, y_start: usize) -> CnnResult<()> {
        if input.len() != INPUT_CHANNELS {
            return Err(CnnError::ShapeError {
                what: "filter input channels",
                expected: vec![INPUT_CHANNELS],
                got: vec![input.len()],
            });
        }
        let (dim_x, dim_y) = input.dims()?;
        if x_start + KERNEL_SIZE > dim_x || y_start + KERNEL_SIZE > dim_y {
            return Err(CnnError::ShapeError {
                what: "filter window",
                expected: vec![x_start + KERNEL_SIZE, y_start + KERNEL_SIZE],
                got: vec![dim_x, dim_y],
            });
        }
        Ok(())
    }

    /// Weighted sum of the window anchored at (x_start, y_start), before the
    /// bias is applied.
    pub fn dot(&self, input: &LayerData, x_start: usize, y_start: usize) -> CnnResult<f32> {
        self.check_window(input, x_start, y_start)?;
        let mut sum = 0.0f32;
        for (channel, image) in input.images().iter().enumerate() {
            let plane = image.values();
            for x in 0..KERNEL_SIZE {
                for y in 0..KERNEL_SIZE {
                    sum += self.weights[(channel, x, y)] * plane[(x + x_start, y + y_start)];
                }
            }
        }
        Ok(sum)
    }

    /// Rectified response `max(0, dot - bias)`.
    pub fn filter(&self, input: &LayerData, x_start: usize, y_start: usize) -> CnnResult<f32> {
        Ok((self.dot(input, x_start, y_start)? - self.bias).max(0.0))
    }

    /// The same window as `dot`, as (flat pixel index, coefficient) pairs over
    /// a flattened image where pixel (channel, x, y) lives at
    /// `channel * channel_pitch + y * y_pitch + x`. Entries follow the
    /// summation order of `dot`.
    pub fn make_filter_row(
        &self,
        x_start: usize,
        y_start: usize,
        y_pitch: usize,
        channel_pitch: usize,
    ) -> impl Iterator<Item = (usize, f32)> + '_ {
        (0..INPUT_CHANNELS).flat_map(move |channel| {
            (0..KERNEL_SIZE).flat_map(move |x| {
                (0..KERNEL_SIZE).map(move |y| {
                    let index = channel * channel_pitch + (y + y_start) * y_pitch + x + x_start;
                    (index, self.weights[(channel, x, y)])
                })
            })
        })
    }
}
