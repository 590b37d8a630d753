use log::{debug, info};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::config::ReconstructionParams;
use crate::grid::{bound_to_byte, Bitmap, Grid2, Grid3};
use crate::sparse::{solve_least_squares, SolveReport, SolverSettings};
use crate::{CnnError, CnnResult};

use super::{
    constraint_count, ConstraintId, ConstraintSystem, Filter, FilterBank, LayerData, LayerImage,
    Module, PixelLayout, INPUT_CHANNELS, KERNEL_SIZE,
};

/// Sizes and solver outcome of one inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InversionReport {
    pub filter_constraints: usize,
    pub total_constraints: usize,
    pub nonzeros: usize,
    pub solve: SolveReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub image: Bitmap,
    pub report: InversionReport,
}

/// A single convolution layer: forward filtering and its least-squares inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct CnnLayer {
    bank: FilterBank,
}

impl CnnLayer {
    pub fn new(bank: FilterBank) -> Self {
        Self { bank }
    }

    pub fn bank(&self) -> &FilterBank {
        &self.bank
    }

    /// Number of window positions along one side for an input of side `dim`.
    pub fn output_size(&self, dim: usize) -> usize {
        if dim < KERNEL_SIZE {
            0
        } else {
            (dim - KERNEL_SIZE) / self.bank.stride() + 1
        }
    }

    /// Side of the image whose windows produce an `output`-sided activation map.
    pub fn input_size(&self, output: usize) -> usize {
        (output.max(1) - 1) * self.bank.stride() + KERNEL_SIZE
    }

    fn filter_map(&self, filter: &Filter, input: &LayerData, out: usize) -> CnnResult<LayerImage> {
        let stride = self.bank.stride();
        let mut values = Grid2::new(out, out);
        for fx in 0..out {
            for fy in 0..out {
                values[(fx, fy)] = filter.filter(input, fx * stride, fy * stride)?;
            }
        }
        Ok(LayerImage::new(values))
    }

    /// One activation map per filter, evaluated at every stride step where the
    /// window fits (55x55 for a 227x227 input).
    pub fn filter(&self, input: &LayerData) -> CnnResult<LayerData> {
        if input.len() != INPUT_CHANNELS {
            return Err(CnnError::ShapeError {
                what: "layer input channels",
                expected: vec![INPUT_CHANNELS],
                got: vec![input.len()],
            });
        }
        let (dim_x, dim_y) = input.dims()?;
        let out = self.output_size(dim_x.min(dim_y));
        if out == 0 {
            return Err(CnnError::ShapeError {
                what: "layer input",
                expected: vec![KERNEL_SIZE, KERNEL_SIZE],
                got: vec![dim_x, dim_y],
            });
        }
        debug!(
            "Filtering {}x{} input with {} filters into {}x{} maps",
            dim_x,
            dim_y,
            self.bank.len(),
            out,
            out
        );

        #[cfg(feature = "rayon")]
        let images = self
            .bank
            .filters()
            .par_iter()
            .map(|f| self.filter_map(f, input, out))
            .collect::<CnnResult<Vec<_>>>()?;
        #[cfg(not(feature = "rayon"))]
        let images = self
            .bank
            .filters()
            .iter()
            .map(|f| self.filter_map(f, input, out))
            .collect::<CnnResult<Vec<_>>>()?;

        Ok(LayerData::new(images))
    }

    /// Output positions of `filter_index` strictly above its channel cutoff,
    /// with their activation values, x outer and y inner.
    fn active_positions(
        params: &ReconstructionParams,
        filter_index: usize,
        activations: &LayerImage,
    ) -> Vec<(usize, usize, f32)> {
        let cutoff = activations.compute_cutoff(params);
        debug!("filter {:2}: cutoff {:.4}", filter_index, cutoff);

        let map = activations.values();
        let mut active = Vec::new();
        for x in 0..map.dim_x() {
            for y in 0..map.dim_y() {
                let value = map[(x, y)];
                if value > cutoff {
                    active.push((x, y, value));
                }
            }
        }
        active
    }

    /// Builds the full constraint system for `activations` without solving it.
    pub fn build_constraints(
        &self,
        params: &ReconstructionParams,
        activations: &LayerData,
        mean: &Grid3<f32>,
    ) -> CnnResult<ConstraintSystem> {
        if activations.len() != self.bank.len() {
            return Err(CnnError::ShapeError {
                what: "activation channels",
                expected: vec![self.bank.len()],
                got: vec![activations.len()],
            });
        }
        let (out_x, out_y) = activations.dims()?;
        if out_x != out_y || out_x == 0 {
            return Err(CnnError::ShapeError {
                what: "activation map",
                expected: vec![out_x, out_x],
                got: vec![out_x, out_y],
            });
        }
        let layout = PixelLayout::new(self.input_size(out_x), INPUT_CHANNELS);

        // Thresholding is per filter; rows are then written in filter order.
        #[cfg(feature = "rayon")]
        let active = activations
            .images()
            .par_iter()
            .enumerate()
            .map(|(i, img)| Self::active_positions(params, i, img))
            .collect::<Vec<_>>();
        #[cfg(not(feature = "rayon"))]
        let active = activations
            .images()
            .iter()
            .enumerate()
            .map(|(i, img)| Self::active_positions(params, i, img))
            .collect::<Vec<_>>();

        let thresholded: usize = active.iter().map(Vec::len).sum();
        let rows = constraint_count(thresholded, layout.dim, layout.channels);
        info!("Constraint count: {}", rows);

        let inner = layout.dim.saturating_sub(1);
        let nnz = thresholded * INPUT_CHANNELS * KERNEL_SIZE * KERNEL_SIZE
            + 4 * layout.channels * inner * inner
            + layout.len();
        let mut system = ConstraintSystem::with_capacity(layout, rows, nnz);
        let stride = self.bank.stride();
        for (filter_index, positions) in active.iter().enumerate() {
            let filter = self.bank.filter(filter_index)?;
            for &(x, y, value) in positions {
                let row = filter.make_filter_row(
                    x * stride,
                    y * stride,
                    layout.y_pitch(),
                    layout.channel_pitch(),
                );
                system.push_filter_row(filter_index, x, y, row, value + filter.bias())?;
            }
        }
        system.add_smoothness(params.smoothness_weight)?;
        system.add_regularization(mean, params.regularization_weight)?;
        Ok(system)
    }

    pub fn invert(
        &self,
        params: &ReconstructionParams,
        activations: &LayerData,
        mean: &Grid3<f32>,
    ) -> CnnResult<Reconstruction> {
        self.invert_with(params, activations, mean, &SolverSettings::default())
    }

    /// Recovers the image whose activations best match `activations`, pulled
    /// toward smoothness and toward `mean`. Running out of iterations still
    /// yields an image; see `report.solve.converged`.
    pub fn invert_with(
        &self,
        params: &ReconstructionParams,
        activations: &LayerData,
        mean: &Grid3<f32>,
        settings: &SolverSettings,
    ) -> CnnResult<Reconstruction> {
        let system = self.build_constraints(params, activations, mean)?;
        let filter_constraints = system.count(|id| matches!(id, ConstraintId::Filter { .. }));

        info!(
            "Solving {} x {} system ({} non-zeros)",
            system.len(),
            system.layout().len(),
            system.matrix().nnz()
        );
        let (solution, solve) = solve_least_squares(system.matrix(), system.targets(), settings)?;
        info!(
            "Solver finished after {} iterations (converged: {})",
            solve.iterations, solve.converged
        );

        Ok(Reconstruction {
            image: unpack_image(&solution, system.layout())?,
            report: InversionReport {
                filter_constraints,
                total_constraints: system.len(),
                nonzeros: system.matrix().nnz(),
                solve,
            },
        })
    }
}

impl Module for CnnLayer {
    fn forward(&self, input: &LayerData) -> CnnResult<LayerData> {
        self.filter(input)
    }
}

/// Maps a solved pixel vector back to an RGB image, saturating every value
/// to a byte.
pub(crate) fn unpack_image(solution: &[f32], layout: PixelLayout) -> CnnResult<Bitmap> {
    if solution.len() != layout.len() || layout.channels != 3 {
        return Err(CnnError::ShapeError {
            what: "solution vector",
            expected: vec![3 * layout.channel_pitch()],
            got: vec![solution.len()],
        });
    }
    Ok(Grid2::from_fn(layout.dim, layout.dim, |x, y| {
        [0, 1, 2].map(|c| bound_to_byte(solution[layout.index(c, x, y)]))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{CROP_SIZE, OUTPUT_SIZE};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn bank(filters: Vec<Filter>) -> CnnResult<FilterBank> {
        FilterBank::new(filters, 4)
    }

    fn uniform_input(dim: usize, value: f32) -> LayerData {
        LayerData::new(
            (0..3)
                .map(|_| LayerImage::new(Grid2::filled(dim, dim, value)))
                .collect(),
        )
    }

    fn single_tap_filter(channel: usize, x: usize, y: usize, bias: f32) -> CnnResult<Filter> {
        let weights = Grid3::from_fn(3, 11, 11, |c, kx, ky| {
            if (c, kx, ky) == (channel, x, y) {
                1.0
            } else {
                0.0
            }
        });
        Filter::new(weights, bias)
    }

    /// Four random filters over a 27x27 image and 5x5 activation maps. The
    /// last map has only three positive values.
    fn random_case(seed: u64) -> CnnResult<(CnnLayer, LayerData, Grid3<f32>)> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut filters = Vec::new();
        for _ in 0..4 {
            let weights = Grid3::from_fn(3, 11, 11, |_, _, _| rng.gen_range(-1.0f32..1.0));
            filters.push(Filter::new(weights, rng.gen_range(-0.5f32..0.5))?);
        }
        let mut maps = Vec::new();
        for _ in 0..3 {
            maps.push(LayerImage::new(Grid2::from_fn(5, 5, |_, _| rng.gen_range(-1.0f32..3.0))));
        }
        maps.push(LayerImage::new(Grid2::from_fn(5, 5, |x, y| {
            if x == y && x < 3 {
                1.0 + x as f32
            } else {
                -1.0
            }
        })));
        let mean = Grid3::from_fn(3, 27, 27, |_, _, _| rng.gen_range(0.0f32..255.0));
        Ok((CnnLayer::new(bank(filters)?), LayerData::new(maps), mean))
    }

    #[test]
    fn test_geometry() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![Filter::zeros()])?);
        assert_eq!(layer.output_size(CROP_SIZE), OUTPUT_SIZE);
        assert_eq!(layer.input_size(OUTPUT_SIZE), CROP_SIZE);
        assert_eq!(layer.output_size(10), 0);
        assert_eq!(layer.output_size(19), 3);
        Ok(())
    }

    #[test]
    fn test_forward_produces_one_map_per_filter() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![
            single_tap_filter(0, 0, 0, 0.0)?,
            single_tap_filter(2, 10, 10, 1.0)?,
        ])?);
        let input = LayerData::new(
            (0..3)
                .map(|c| {
                    LayerImage::new(Grid2::from_fn(19, 19, |x, y| (c * 1000 + y * 19 + x) as f32))
                })
                .collect(),
        );
        let output = layer.forward(&input)?;
        assert_eq!(output.len(), 2);
        assert_eq!(output.dims()?, (3, 3));
        // first filter reads channel 0 at the window origin
        assert_eq!(output.images()[0].values()[(1, 2)], (8 * 19 + 4) as f32);
        // second reads channel 2 at the far corner, minus its bias
        assert_eq!(
            output.images()[1].values()[(2, 0)],
            (2000 + 10 * 19 + 18) as f32 - 1.0
        );
        Ok(())
    }

    #[test]
    fn test_forward_is_deterministic() -> CnnResult<()> {
        let weights = Grid3::from_fn(3, 11, 11, |c, x, y| ((c + 2 * x + 3 * y) % 5) as f32 - 2.0);
        let layer = CnnLayer::new(bank(vec![Filter::new(weights, 0.3)?, Filter::zeros()])?);
        let input = LayerData::new(
            (0..3)
                .map(|c| {
                    LayerImage::new(Grid2::from_fn(27, 27, |x, y| {
                        ((x * y + c) % 11) as f32 * 0.37
                    }))
                })
                .collect(),
        );
        assert_eq!(layer.filter(&input)?, layer.filter(&input)?);
        Ok(())
    }

    #[test]
    fn test_forward_rejects_bad_input() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![Filter::zeros()])?);
        assert!(layer.filter(&uniform_input(10, 0.0)).is_err());
        let two = LayerData::new(uniform_input(19, 0.0).images()[..2].to_vec());
        assert!(layer.filter(&two).is_err());
        Ok(())
    }

    #[test]
    fn test_filter_constraints_follow_cutoff_and_bias() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![single_tap_filter(1, 3, 4, 0.5)?])?);
        // 3x3 map with 2 positive activations: cutoff 0, both kept.
        let mut map: Grid2<f32> = Grid2::new(3, 3);
        map[(0, 1)] = 2.0;
        map[(2, 2)] = 0.25;
        let activations = LayerData::new(vec![LayerImage::new(map)]);
        let mean = Grid3::new(3, 19, 19);
        let system =
            layer.build_constraints(&ReconstructionParams::default(), &activations, &mean)?;

        assert_eq!(system.layout().dim, 19);
        assert_eq!(system.len(), constraint_count(2, 19, 3));
        assert_eq!(system.ids()[0], ConstraintId::Filter { filter: 0, x: 0, y: 1 });
        assert_eq!(system.targets()[0], 2.5);
        assert_eq!(system.ids()[1], ConstraintId::Filter { filter: 0, x: 2, y: 2 });
        assert_eq!(system.targets()[1], 0.75);

        // the single non-zero weight of the first row sits at channel 1, (0 + 3, 4 + 4)
        let nonzero: Vec<_> = system.matrix().row(0).filter(|(_, w)| *w != 0.0).collect();
        assert_eq!(nonzero, vec![(19 * 19 + 8 * 19 + 3, 1.0)]);
        Ok(())
    }

    #[test]
    fn test_invert_rejects_mismatched_activations() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![Filter::zeros(), Filter::zeros()])?);
        let activations = LayerData::new(vec![LayerImage::new(Grid2::new(3, 3))]);
        let mean = Grid3::new(3, 19, 19);
        assert!(layer
            .invert(&ReconstructionParams::default(), &activations, &mean)
            .is_err());

        let layer = CnnLayer::new(bank(vec![Filter::zeros()])?);
        let small_mean = Grid3::new(3, 18, 18);
        assert!(layer
            .invert(&ReconstructionParams::default(), &activations, &small_mean)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_inactive_activations_reconstruct_the_mean() -> CnnResult<()> {
        let layer = CnnLayer::new(bank(vec![
            single_tap_filter(0, 5, 5, 0.5)?,
            single_tap_filter(1, 5, 5, -0.5)?,
        ])?);
        // What a mean-equal input produces: max(0, -bias) everywhere. With 25
        // equal positives the cutoff is that value, so nothing passes.
        let activations = layer.filter(&uniform_input(27, 0.0))?;
        assert_eq!(activations.dims()?, (5, 5));
        assert!(activations.images()[0].values().values().all(|&v| v == 0.0));
        assert!(activations.images()[1].values().values().all(|&v| v == 0.5));

        let mean = Grid3::from_fn(3, 27, 27, |_, _, _| 90.0);
        let result = layer.invert(&ReconstructionParams::default(), &activations, &mean)?;
        assert_eq!(result.report.filter_constraints, 0);
        assert_eq!(result.report.total_constraints, constraint_count(0, 27, 3));
        assert!(result.report.solve.converged);
        assert_eq!(result.image.dims(), (27, 27));
        for px in result.image.values() {
            for &c in px {
                assert!((89..=90).contains(&c), "pixel channel {}", c);
            }
        }
        Ok(())
    }

    #[test]
    fn test_invert_recovers_tapped_pixels() -> CnnResult<()> {
        // One filter reading channel 0 at the window origin: each activation
        // pins one pixel exactly.
        let layer = CnnLayer::new(bank(vec![single_tap_filter(0, 0, 0, 0.0)?])?);
        let map = Grid2::from_fn(3, 3, |x, y| 40.0 + (x * 3 + y) as f32 * 10.0);
        let activations = LayerData::new(vec![LayerImage::new(map.clone())]);
        let mean = Grid3::from_fn(3, 19, 19, |_, _, _| 60.0);
        let params = ReconstructionParams::new(0.0, 0.0, 0.01);
        let settings = SolverSettings {
            max_iterations: 10_000,
            tolerance: 1e-6,
        };
        let result = layer.invert_with(&params, &activations, &mean, &settings)?;
        assert!(result.report.solve.converged);
        for (x, y, v) in map.cells() {
            let got = result.image[(x * 4, y * 4)][0] as f32;
            assert!((got - v).abs() <= 1.0, "({}, {}): {} vs {}", x, y, got, v);
        }
        Ok(())
    }

    #[test]
    fn test_unpack_clamps_to_bytes() -> CnnResult<()> {
        let layout = PixelLayout::new(1, 3);
        let image = unpack_image(&[-50.0, 300.0, 12.7], layout)?;
        assert_eq!(image[(0, 0)], [0, 255, 12]);
        assert!(unpack_image(&[0.0; 2], layout).is_err());
        Ok(())
    }

    #[test]
    fn test_filter_rows_follow_filter_then_position_order() -> CnnResult<()> {
        let (layer, activations, mean) = random_case(11)?;
        let params = ReconstructionParams::default();
        let system = layer.build_constraints(&params, &activations, &mean)?;

        let layout = PixelLayout::new(27, 3);
        let mut expected = ConstraintSystem::new(layout);
        for (f, img) in activations.images().iter().enumerate() {
            let filter = layer.bank().filter(f)?;
            let cutoff = img.compute_cutoff(&params);
            for x in 0..5 {
                for y in 0..5 {
                    let value = img.values()[(x, y)];
                    if value > cutoff {
                        let row = filter.make_filter_row(4 * x, 4 * y, 27, 27 * 27);
                        expected.push_filter_row(f, x, y, row, value + filter.bias())?;
                    }
                }
            }
        }
        expected.add_smoothness(params.smoothness_weight)?;
        expected.add_regularization(&mean, params.regularization_weight)?;

        assert_eq!(system.layout(), layout);
        assert_eq!(system.ids(), expected.ids());
        assert_eq!(system.targets(), expected.targets());
        assert_eq!(system.matrix(), expected.matrix());

        // three positives: zero cutoff, all kept
        assert_eq!(system.count(|id| matches!(id, ConstraintId::Filter { filter: 3, .. })), 3);
        let filter_rows = system.count(|id| matches!(id, ConstraintId::Filter { .. }));
        assert_eq!(system.matrix().nnz(), filter_rows * 363 + 4 * 3 * 26 * 26 + 3 * 27 * 27);
        Ok(())
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_assembly_is_repeatable() -> CnnResult<()> {
        let (layer, activations, mean) = random_case(5)?;
        let params = ReconstructionParams::default();
        let first = layer.build_constraints(&params, &activations, &mean)?;
        for _ in 0..4 {
            let again = layer.build_constraints(&params, &activations, &mean)?;
            assert_eq!(again.ids(), first.ids());
            assert_eq!(again.targets(), first.targets());
            assert_eq!(again.matrix(), first.matrix());
        }

        let order: Vec<_> = first
            .ids()
            .iter()
            .filter_map(|id| match *id {
                ConstraintId::Filter { filter, x, y } => Some((filter, x, y)),
                _ => None,
            })
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
        Ok(())
    }
}
