//! Per-voxel matrix assembly

use nalgebra::DMatrix;

use crate::preprocess::{PreprocessPlan, PreprocessScratch};
use crate::volume::TimeSeriesDataset;

/// K x T matrix of preprocessed series for one voxel, plus the buffers
/// needed to fill it. One per worker, refilled for every voxel.
pub struct VoxelMatrix {
    matrix: DMatrix<f64>,
    n_inputs: usize,
    row: Vec<f64>,
    scratch: PreprocessScratch,
}

impl VoxelMatrix {
    /// Workspace for `n_inputs` datasets preprocessed with `plan`.
    pub fn new(n_inputs: usize, plan: &PreprocessPlan) -> Self {
        Self {
            matrix: DMatrix::zeros(n_inputs, plan.nvals()),
            n_inputs,
            row: vec![0.0; plan.nvals()],
            scratch: plan.scratch(),
        }
    }

    /// Row i becomes the preprocessed series of `inputs[i]` at voxel `v`.
    ///
    /// Constant or all-zero rows are kept as they are.
    pub fn fill(
        &mut self,
        inputs: &[TimeSeriesDataset],
        v: usize,
        plan: &PreprocessPlan,
    ) -> &DMatrix<f64> {
        debug_assert_eq!(inputs.len(), self.n_inputs);
        if self.matrix.shape() != (self.n_inputs, self.row.len()) {
            self.matrix = DMatrix::zeros(self.n_inputs, self.row.len());
        }
        for (i, dataset) in inputs.iter().enumerate() {
            plan.apply(dataset.series(v), &mut self.row, &mut self.scratch);
            for (t, &x) in self.row.iter().enumerate() {
                self.matrix[(i, t)] = x;
            }
        }
        &self.matrix
    }

    /// Fill for voxel `v` and hand the matrix over, leaving an empty one
    /// behind. The next fill allocates a fresh matrix.
    pub fn take(
        &mut self,
        inputs: &[TimeSeriesDataset],
        v: usize,
        plan: &PreprocessPlan,
    ) -> DMatrix<f64> {
        self.fill(inputs, v, plan);
        std::mem::replace(&mut self.matrix, DMatrix::zeros(0, 0))
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}
