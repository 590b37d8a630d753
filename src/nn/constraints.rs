//! Sparse least-squares system whose solution is a reconstructed image.
//!
//! Rows come in three blocks: filter responses, first-difference smoothness,
//! and a pull toward the dataset mean. Every row carries a [`ConstraintId`] so
//! its meaning never depends on when it was assembled.

use log::debug;

use crate::grid::Grid3;
use crate::sparse::SparseMatrix;
use crate::{CnnError, CnnResult};

/// Flattening of a square multi-channel image: channel-major, then row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub dim: usize,
    pub channels: usize,
}

impl PixelLayout {
    pub fn new(dim: usize, channels: usize) -> Self {
        Self { dim, channels }
    }

    pub fn y_pitch(&self) -> usize {
        self.dim
    }

    pub fn channel_pitch(&self) -> usize {
        self.dim * self.dim
    }

    pub fn len(&self) -> usize {
        self.channels * self.channel_pitch()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, channel: usize, x: usize, y: usize) -> usize {
        channel * self.channel_pitch() + y * self.y_pitch() + x
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintId {
    /// Activation of `filter` at output position (x, y).
    Filter { filter: usize, x: usize, y: usize },
    /// p(c, x, y) - p(c, x + 1, y)
    SmoothHorizontal { channel: usize, x: usize, y: usize },
    /// p(c, x, y) - p(c, x, y + 1)
    SmoothVertical { channel: usize, x: usize, y: usize },
    /// p(c, x, y) pulled toward the mean image.
    Regularization { channel: usize, x: usize, y: usize },
}

/// Rows for a `dim`-sided image with `thresholded` filter constraints.
pub fn constraint_count(thresholded: usize, dim: usize, channels: usize) -> usize {
    let inner = dim.saturating_sub(1);
    thresholded + 2 * channels * inner * inner + channels * dim * dim
}

#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    layout: PixelLayout,
    matrix: SparseMatrix,
    targets: Vec<f32>,
    ids: Vec<ConstraintId>,
}

impl ConstraintSystem {
    pub fn new(layout: PixelLayout) -> Self {
        Self::with_capacity(layout, 0, 0)
    }

    pub fn with_capacity(layout: PixelLayout, rows: usize, nnz: usize) -> Self {
        Self {
            layout,
            matrix: SparseMatrix::with_capacity(layout.len(), rows, nnz),
            targets: Vec::with_capacity(rows),
            ids: Vec::with_capacity(rows),
        }
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn ids(&self) -> &[ConstraintId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn count(&self, pred: impl Fn(&ConstraintId) -> bool) -> usize {
        self.ids.iter().filter(|id| pred(id)).count()
    }

    pub fn push(
        &mut self,
        id: ConstraintId,
        row: impl IntoIterator<Item = (usize, f32)>,
        target: f32,
    ) -> CnnResult<()> {
        self.matrix.push_row(row)?;
        self.targets.push(target);
        self.ids.push(id);
        Ok(())
    }

    /// Appends the row for the activation of `filter` at output (x, y).
    /// Filter rows must all come before the smoothness and regularization rows.
    pub fn push_filter_row(
        &mut self,
        filter: usize,
        x: usize,
        y: usize,
        row: impl IntoIterator<Item = (usize, f32)>,
        target: f32,
    ) -> CnnResult<()> {
        if let Some(last) = self.ids.last() {
            if !matches!(last, ConstraintId::Filter { .. }) {
                return Err(CnnError::from(format!(
                    "filter row ({}, {}, {}) after {:?}",
                    filter, x, y, last
                )));
            }
        }
        self.push(ConstraintId::Filter { filter, x, y }, row, target)
    }

    /// Two rows per channel and per pixel with a right and lower neighbour:
    /// horizontal then vertical first differences, scaled by `weight`, target 0.
    pub fn add_smoothness(&mut self, weight: f32) -> CnnResult<()> {
        let layout = self.layout;
        let inner = layout.dim.saturating_sub(1);
        for channel in 0..layout.channels {
            for x in 0..inner {
                for y in 0..inner {
                    let here = layout.index(channel, x, y);
                    self.push(
                        ConstraintId::SmoothHorizontal { channel, x, y },
                        [(here, weight), (layout.index(channel, x + 1, y), -weight)],
                        0.0,
                    )?;
                    self.push(
                        ConstraintId::SmoothVertical { channel, x, y },
                        [(here, weight), (layout.index(channel, x, y + 1), -weight)],
                        0.0,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// One row per channel and pixel: `weight * p(c, x, y) = weight * mean(c, x, y)`.
    /// The mean is addressed with the image's own (x, y), so it must cover
    /// at least `dim` x `dim`.
    pub fn add_regularization(&mut self, mean: &Grid3<f32>, weight: f32) -> CnnResult<()> {
        let layout = self.layout;
        let (mc, mx, my) = mean.dims();
        if mc < layout.channels || mx < layout.dim || my < layout.dim {
            return Err(CnnError::ShapeError {
                what: "regularization mean",
                expected: vec![layout.channels, layout.dim, layout.dim],
                got: vec![mc, mx, my],
            });
        }
        for channel in 0..layout.channels {
            for x in 0..layout.dim {
                for y in 0..layout.dim {
                    self.push(
                        ConstraintId::Regularization { channel, x, y },
                        [(layout.index(channel, x, y), weight)],
                        mean[(channel, x, y)] * weight,
                    )?;
                }
            }
        }
        debug!(
            "Constraint system: {} rows, {} non-zeros",
            self.len(),
            self.matrix.nnz()
        );
        Ok(())
    }
}
