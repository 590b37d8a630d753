use std::path::{Path, PathBuf};

/// Locations of the blob files that make up one trained first layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub filter_blob_path: PathBuf,
    pub bias_blob_path: PathBuf,
    pub mean_blob_path: PathBuf,
}

impl NetworkConfig {
    pub const FILTER_BLOB_NAME: &'static str = "filterBank.txt";
    pub const BIAS_BLOB_NAME: &'static str = "bias.txt";
    pub const MEAN_BLOB_NAME: &'static str = "imageNetMean.txt";

    pub fn new(
        filter_blob_path: impl Into<PathBuf>,
        bias_blob_path: impl Into<PathBuf>,
        mean_blob_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            filter_blob_path: filter_blob_path.into(),
            bias_blob_path: bias_blob_path.into(),
            mean_blob_path: mean_blob_path.into(),
        }
    }

    /// Uses the conventional blob file names inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(Self::FILTER_BLOB_NAME),
            dir.join(Self::BIAS_BLOB_NAME),
            dir.join(Self::MEAN_BLOB_NAME),
        )
    }
}

/// Weights of the inversion's constraint system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructionParams {
    /// Position in the sorted positive activations used as the per-channel cutoff.
    pub quartile: f32,
    pub smoothness_weight: f32,
    pub regularization_weight: f32,
}

impl Default for ReconstructionParams {
    fn default() -> Self {
        Self {
            quartile: 0.25,
            smoothness_weight: 2.0,
            regularization_weight: 0.5,
        }
    }
}

impl ReconstructionParams {
    pub fn new(quartile: f32, smoothness_weight: f32, regularization_weight: f32) -> Self {
        Self {
            quartile,
            smoothness_weight,
            regularization_weight,
        }
    }

    /// Deterministic file-name suffix such as `_q0.25_s2.00_r0.50`.
    pub fn file_suffix(&self) -> String {
        fn short(v: f32) -> String {
            let mut s = format!("{:.6}", v);
            s.truncate(4);
            s
        }
        format!(
            "_q{}_s{}_r{}",
            short(self.quartile),
            short(self.smoothness_weight),
            short(self.regularization_weight)
        )
    }
}
