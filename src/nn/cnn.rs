use log::info;

use crate::config::{NetworkConfig, ReconstructionParams};
use crate::grid::Bitmap;
use crate::sparse::SolverSettings;
use crate::CnnResult;

use super::{CnnLayer, DataTransform, FilterBank, LayerData, Module, Reconstruction};

/// Input normalization followed by the first convolution layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Cnn {
    pub transform: DataTransform,
    pub layer: CnnLayer,
}

impl Cnn {
    pub fn new(transform: DataTransform, layer: CnnLayer) -> Self {
        Self { transform, layer }
    }

    pub fn load(config: &NetworkConfig) -> CnnResult<Self> {
        let transform = DataTransform::load_from_blob(&config.mean_blob_path)?;
        let bank = FilterBank::load_from_blob(&config.filter_blob_path, &config.bias_blob_path)?;
        info!("Network loaded: {} filters, stride {}", bank.len(), bank.stride());
        Ok(Self::new(transform, CnnLayer::new(bank)))
    }

    /// Activation maps of `input`, which must be at least 256x256.
    pub fn filter(&self, input: &Bitmap) -> CnnResult<LayerData> {
        let normalized = self.transform.transform(input)?;
        self.layer.forward(&normalized)
    }

    pub fn reconstruct(
        &self,
        params: &ReconstructionParams,
        activations: &LayerData,
    ) -> CnnResult<Reconstruction> {
        self.layer.invert(params, activations, self.transform.mean())
    }

    pub fn reconstruct_with(
        &self,
        params: &ReconstructionParams,
        activations: &LayerData,
        settings: &SolverSettings,
    ) -> CnnResult<Reconstruction> {
        self.layer
            .invert_with(params, activations, self.transform.mean(), settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid2, Grid3};
    use crate::nn::{Filter, OUTPUT_SIZE};
    use crate::CnnError;

    fn filter_with(bias: f32, f: impl Fn(usize, usize, usize) -> f32) -> CnnResult<Filter> {
        Filter::new(Grid3::from_fn(3, 11, 11, f), bias)
    }

    fn gray_network(level: f32, filters: Vec<Filter>) -> CnnResult<Cnn> {
        let transform = DataTransform::new(Grid3::from_fn(3, 256, 256, |_, _, _| level))?;
        Ok(Cnn::new(transform, CnnLayer::new(FilterBank::new(filters, 4)?)))
    }

    #[test]
    fn test_mean_gray_input_gives_rectified_negative_bias() -> CnnResult<()> {
        let cnn = gray_network(
            128.0,
            vec![
                filter_with(0.75, |c, x, y| (c + x + y) as f32 * 0.01)?,
                filter_with(-0.25, |c, x, _| if c == x % 3 { -0.5 } else { 0.3 })?,
            ],
        )?;
        let image: Bitmap = Grid2::filled(256, 256, [128, 128, 128]);
        let activations = cnn.filter(&image)?;

        assert_eq!(activations.len(), 2);
        assert_eq!(activations.dims()?, (OUTPUT_SIZE, OUTPUT_SIZE));
        assert!(activations.images()[0].values().values().all(|&v| v == 0.0));
        assert!(activations.images()[1].values().values().all(|&v| v == 0.25));
        Ok(())
    }

    #[test]
    fn test_filter_twice_is_bit_identical() -> CnnResult<()> {
        let cnn = gray_network(
            100.0,
            vec![filter_with(1.0, |c, x, y| ((c * 31 + x * 7 + y * 3) % 13) as f32 * 0.02 - 0.1)?],
        )?;
        let image: Bitmap = Grid2::from_fn(256, 256, |x, y| {
            [(x * 3 % 256) as u8, (y * 5 % 256) as u8, ((x ^ y) % 256) as u8]
        });
        let first = cnn.filter(&image)?;
        let second = cnn.filter(&image)?;
        let bits = |d: &LayerData| -> Vec<u32> {
            d.images()
                .iter()
                .flat_map(|img| img.values().values().map(|v| v.to_bits()).collect::<Vec<_>>())
                .collect()
        };
        assert_eq!(bits(&first), bits(&second));
        Ok(())
    }

    #[test]
    fn test_reconstruct_inactive_layer_returns_mean() -> CnnResult<()> {
        let cnn = gray_network(128.0, vec![filter_with(0.5, |_, _, _| 0.01)?])?;
        let image: Bitmap = Grid2::filled(256, 256, [128, 128, 128]);
        let activations = cnn.filter(&image)?;
        let result = cnn.reconstruct(&ReconstructionParams::default(), &activations)?;

        assert_eq!(result.report.filter_constraints, 0);
        assert_eq!(
            result.report.total_constraints,
            2 * 3 * 226 * 226 + 3 * 227 * 227
        );
        assert_eq!(result.image.dims(), (227, 227));
        assert!(result
            .image
            .values()
            .all(|px| px.iter().all(|&c| (127..=128).contains(&c))));
        Ok(())
    }

    #[test]
    fn test_small_input_is_rejected_before_filtering() -> CnnResult<()> {
        let cnn = gray_network(0.0, vec![Filter::zeros()])?;
        let image: Bitmap = Grid2::new(227, 227);
        assert!(matches!(
            cnn.filter(&image),
            Err(CnnError::ShapeError { what: "input image", .. })
        ));
        Ok(())
    }

    #[test]
    fn test_load_missing_blob_fails() {
        let config = NetworkConfig::from_dir("no/such/network");
        assert!(matches!(Cnn::load(&config), Err(CnnError::BlobError(_))));
    }
}
