use std::io::BufRead;
use std::path::Path;

use log::{debug, info};

use crate::blob::{parse_records, read_records, Coverage, Record};
use crate::grid::Grid3;
use crate::{CnnError, CnnResult};

use super::{Filter, FILTER_COUNT, INPUT_CHANNELS, KERNEL_SIZE, STRIDE};

/// The layer's filters in blob order, sharing one stride.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBank {
    filters: Vec<Filter>,
    stride: usize,
}

impl FilterBank {
    pub fn new(filters: Vec<Filter>, stride: usize) -> CnnResult<Self> {
        if filters.is_empty() {
            return Err("filter bank needs at least one filter".into());
        }
        if stride == 0 {
            return Err("filter bank stride must be positive".into());
        }
        Ok(Self { filters, stride })
    }

    /// Loads the standard 96-filter bank with stride 4.
    pub fn load_from_blob(filter_blob: &Path, bias_blob: &Path) -> CnnResult<Self> {
        info!(
            "Loading filter bank from {} and {}",
            filter_blob.display(),
            bias_blob.display()
        );
        let weights = read_records(filter_blob)?;
        let biases = read_records(bias_blob)?;
        Self::from_records(&weights, &biases, FILTER_COUNT, STRIDE)
    }

    pub fn from_readers<W: BufRead, B: BufRead>(
        weights: W,
        biases: B,
        filter_count: usize,
        stride: usize,
    ) -> CnnResult<Self> {
        let weights = parse_records(weights)?;
        let biases = parse_records(biases)?;
        Self::from_records(&weights, &biases, filter_count, stride)
    }

    /// Weight records are `filter channel x y weight`; bias records are
    /// `0 0 0 filter bias`. Every weight and every bias must be given exactly once.
    pub fn from_records(
        weight_records: &[Record],
        bias_records: &[Record],
        filter_count: usize,
        stride: usize,
    ) -> CnnResult<Self> {
        let mut weights = vec![Grid3::new(INPUT_CHANNELS, KERNEL_SIZE, KERNEL_SIZE); filter_count];
        let mut coverage = Coverage::new(
            "filter weight",
            &[filter_count, INPUT_CHANNELS, KERNEL_SIZE, KERNEL_SIZE],
        );
        for record in weight_records {
            record.expect_fields("5 (filter channel x y weight)", &[5])?;
            let filter = record.index(0, "filter", filter_count)?;
            let channel = record.index(1, "channel", INPUT_CHANNELS)?;
            let x = record.index(2, "x", KERNEL_SIZE)?;
            let y = record.index(3, "y", KERNEL_SIZE)?;
            let value = record.float(4)?;
            coverage.mark(record.line, &[filter, channel, x, y])?;
            *weights[filter].try_get_mut(channel, x, y)? = value;
        }
        coverage.finish()?;

        let mut biases = vec![0.0f32; filter_count];
        let mut coverage = Coverage::new("filter bias", &[filter_count]);
        for record in bias_records {
            record.expect_fields("5 (0 0 0 filter bias)", &[5])?;
            for field in 0..3 {
                record.reserved_zero(field)?;
            }
            let filter = record.index(3, "filter", filter_count)?;
            coverage.mark(record.line, &[filter])?;
            biases[filter] = record.float(4)?;
        }
        coverage.finish()?;

        let filters = weights
            .into_iter()
            .zip(biases)
            .map(|(w, b)| Filter::new(w, b))
            .collect::<CnnResult<Vec<_>>>()?;
        debug!("Loaded {} filters with stride {}", filters.len(), stride);
        Self::new(filters, stride)
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn filter(&self, index: usize) -> CnnResult<&Filter> {
        self.filters.get(index).ok_or_else(|| {
            CnnError::from(format!(
                "filter {} out of range for a bank of {}",
                index,
                self.filters.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}
