//! Viewable renderings of activations and filters, and the names they are
//! saved under.

use crate::config::ReconstructionParams;
use crate::grid::{bound_to_byte, Bitmap, GrayImage, Grid2};
use crate::nn::{Filter, FilterBank, LayerImage, KERNEL_SIZE};

const FILTER_BORDER: usize = 1;
const BANK_COLUMNS: usize = 12;
const BANK_ROWS: usize = 8;

impl LayerImage {
    /// Gray level `value + 128`; exact zeros stay black.
    pub fn visualize(&self) -> GrayImage {
        self.values().map(|&v| if v == 0.0 { 0 } else { bound_to_byte(v + 128.0) })
    }

    /// Like [`LayerImage::visualize`], but everything at or below the
    /// channel's cutoff is black.
    pub fn visualize_with_cutoff(&self, params: &ReconstructionParams) -> GrayImage {
        let cutoff = self.compute_cutoff(params);
        self.values().map(|&v| if v <= cutoff { 0 } else { bound_to_byte(v + 128.0) })
    }
}

impl Filter {
    /// The kernel as RGB with weight w mapped to `(w + 0.5) * 255`, framed by
    /// a one-pixel black border.
    pub fn visualize(&self) -> Bitmap {
        let rescale = |w: f32| bound_to_byte((w + 0.5) * 255.0);
        let weights = self.weights();
        let kernel: Bitmap = Grid2::from_fn(KERNEL_SIZE, KERNEL_SIZE, |x, y| {
            [0, 1, 2].map(|c| rescale(weights[(c, x, y)]))
        });

        let side = KERNEL_SIZE + 2 * FILTER_BORDER;
        let mut framed: Bitmap = Grid2::new(side, side);
        framed.blit(&kernel, FILTER_BORDER, FILTER_BORDER);
        framed
    }
}

impl FilterBank {
    /// 12 x 8 tiles of filter renderings, filled down each column first.
    /// Filters beyond 96 are not shown.
    pub fn visualize(&self) -> Bitmap {
        let tile = KERNEL_SIZE + 2 * FILTER_BORDER;
        let mut sheet: Bitmap = Grid2::new(BANK_COLUMNS * tile, BANK_ROWS * tile);
        for (index, filter) in self.filters().iter().take(BANK_COLUMNS * BANK_ROWS).enumerate() {
            let (col, row) = (index / BANK_ROWS, index % BANK_ROWS);
            sheet.blit(&filter.visualize(), col * tile, row * tile);
        }
        sheet
    }
}

/// `07.png` for activation map 7.
pub fn activation_file_name(index: usize) -> String {
    format!("{:02}.png", index)
}

/// File name of a reconstruction, derived from its parameters.
pub fn reconstruction_file_name(params: &ReconstructionParams) -> String {
    format!("{}.png", params.file_suffix())
}
