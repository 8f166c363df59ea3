//! Parallel voxel driver
//!
//! All outputs of a run are written into one voxel-major block: voxel v owns
//! `block[v * stride..(v + 1) * stride]`, laid out as R component series of
//! T values followed by R singular values when those are kept. rayon hands
//! out disjoint chunks of that block, so workers never share output memory.
//! Each work split builds one [`VoxelMatrix`] and reuses it for every voxel
//! it visits.
//!
//! Voxels are independent and computed with the same sequence of floating
//! point operations whatever thread runs them, so the block is bit-identical
//! for any pool size.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, trace};
use rayon::prelude::*;

use crate::assemble::VoxelMatrix;
use crate::preprocess::PreprocessPlan;
use crate::reduce::write_voxel;
use crate::svd::decompose;
use crate::volume::{Mask, TimeSeriesDataset};

/// Voxel counts of one pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Voxels selected by the mask
    pub masked: usize,
    /// Masked voxels decomposed successfully
    pub processed: usize,
    /// Masked voxels whose decomposition failed; their outputs are zero
    pub failed: usize,
}

/// Output of [`reduce_volumes`].
#[derive(Clone, Debug)]
pub struct ReducedBlock {
    rdim: usize,
    nvals: usize,
    with_singular: bool,
    nvox: usize,
    data: Vec<f32>,
}

impl ReducedBlock {
    fn stride(&self) -> usize {
        self.rdim * self.nvals + if self.with_singular { self.rdim } else { 0 }
    }

    pub fn rdim(&self) -> usize {
        self.rdim
    }

    /// Voxel-major values of component `r` (0-based), `nvals` per voxel.
    pub fn component(&self, r: usize) -> Vec<f32> {
        let stride = self.stride();
        let offset = r * self.nvals;
        let mut out = Vec::with_capacity(self.nvox * self.nvals);
        for voxel in self.data.chunks_exact(stride) {
            out.extend_from_slice(&voxel[offset..offset + self.nvals]);
        }
        out
    }

    /// Voxel-major singular values, `rdim` per voxel, if they were kept.
    pub fn singular_values(&self) -> Option<Vec<f32>> {
        if !self.with_singular {
            return None;
        }
        let stride = self.stride();
        let offset = self.rdim * self.nvals;
        let mut out = Vec::with_capacity(self.nvox * self.rdim);
        for voxel in self.data.chunks_exact(stride) {
            out.extend_from_slice(&voxel[offset..]);
        }
        Some(out)
    }
}

/// Decompose every masked voxel of `inputs` and keep the top `rdim`
/// components.
///
/// Runs on the current rayon pool; use `ThreadPool::install` to pick one.
/// `rdim` must be at least 1 and every input must have `plan.nvals()` values
/// per voxel on the mask's grid.
pub fn reduce_volumes(
    inputs: &[TimeSeriesDataset],
    plan: &PreprocessPlan,
    mask: &Mask,
    rdim: usize,
    save_singular_values: bool,
) -> (ReducedBlock, DriverStats) {
    let nvals = plan.nvals();
    let nvox = mask.len();
    let mut block = ReducedBlock {
        rdim,
        nvals,
        with_singular: save_singular_values,
        nvox,
        data: Vec::new(),
    };
    let stride = block.stride();
    debug_assert!(stride > 0, "reduction needs at least one component");
    debug_assert!(inputs.iter().all(|d| d.nvox() == nvox && d.nvals == nvals));

    block.data = vec![0.0f32; nvox * stride];
    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let split = rdim * nvals;

    debug!(
        "reducing {} voxels ({} masked) on {} threads",
        nvox,
        mask.count(),
        rayon::current_num_threads()
    );

    block
        .data
        .par_chunks_mut(stride.max(1))
        .enumerate()
        .for_each_init(
            || VoxelMatrix::new(inputs.len(), plan),
            |workspace, (v, out)| {
                if !mask.contains(v) {
                    return;
                }
                match decompose(workspace.take(inputs, v, plan)) {
                    Ok(svd) => {
                        let (components, singular) = out.split_at_mut(split);
                        let singular = save_singular_values.then_some(singular);
                        write_voxel(&svd, rdim, nvals, components, singular);
                        processed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(failure) => {
                        trace!("voxel {}: {}", v, failure);
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            },
        );

    let stats = DriverStats {
        masked: mask.count(),
        processed: processed.into_inner(),
        failed: failed.into_inner(),
    };
    (block, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preprocess;
    use crate::volume::{DatasetFormat, VolumeGrid};

    fn synthetic_inputs(k: usize, nvox: usize, nvals: usize) -> Vec<TimeSeriesDataset> {
        (0..k)
            .map(|i| {
                let data = (0..nvox * nvals)
                    .map(|n| {
                        let (v, t) = (n / nvals, n % nvals);
                        ((v * 13 + t * 7 + i * 31) % 17) as f32 * 0.5
                            + (t as f32 * 0.3 + i as f32).sin()
                    })
                    .collect();
                TimeSeriesDataset::from_voxel_major(
                    format!("in{i}.1D"),
                    DatasetFormat::OneD,
                    VolumeGrid::new((nvox, 1, 1)),
                    nvals,
                    None,
                    data,
                )
                .unwrap()
            })
            .collect()
    }

    fn run_with_threads(threads: usize, inputs: &[TimeSeriesDataset], mask: &Mask) -> ReducedBlock {
        let plan = PreprocessPlan::new(Preprocess::PolyDetrend { order: 1 }, true, 16, None).unwrap();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        pool.install(|| reduce_volumes(inputs, &plan, mask, 2, true)).0
    }

    #[test]
    fn test_output_independent_of_thread_count() {
        let inputs = synthetic_inputs(3, 57, 16);
        let mask = Mask::all(57);
        let single = run_with_threads(1, &inputs, &mask);
        let multi = run_with_threads(4, &inputs, &mask);
        assert_eq!(single.data, multi.data);
        assert!(single.data.iter().any(|&x| x != 0.0));
    }

    #[test]
    fn test_unmasked_voxels_stay_zero() {
        let inputs = synthetic_inputs(2, 6, 10);
        let mask = Mask::from_flags(vec![true, false, true, false, false, true]);
        let plan = PreprocessPlan::new(Preprocess::MeanRemove, false, 10, None).unwrap();
        let (block, stats) = reduce_volumes(&inputs, &plan, &mask, 1, false);

        assert_eq!(
            stats,
            DriverStats {
                masked: 3,
                processed: 3,
                failed: 0
            }
        );
        let comp = block.component(0);
        assert_eq!(comp.len(), 60);
        for v in [1, 3, 4] {
            assert!(comp[v * 10..(v + 1) * 10].iter().all(|&x| x == 0.0));
        }
        assert!(comp[0..10].iter().any(|&x| x != 0.0));
        assert!(block.singular_values().is_none());
    }

    #[test]
    fn test_failed_voxel_is_zero_filled_and_counted() {
        let mut inputs = synthetic_inputs(2, 4, 8);
        let mut data = inputs[1].as_slice().to_vec();
        data[2 * 8 + 3] = f32::NAN;
        inputs[1] = TimeSeriesDataset::from_voxel_major(
            "nan.1D",
            DatasetFormat::OneD,
            VolumeGrid::new((4, 1, 1)),
            8,
            None,
            data,
        )
        .unwrap();

        let plan = PreprocessPlan::new(Preprocess::MeanRemove, false, 8, None).unwrap();
        let (block, stats) = reduce_volumes(&inputs, &plan, &Mask::all(4), 1, true);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.processed, 3);

        let comp = block.component(0);
        assert!(comp[16..24].iter().all(|&x| x == 0.0));
        let sing = block.singular_values().unwrap();
        assert_eq!(sing.len(), 4);
        assert_eq!(sing[2], 0.0);
        assert!(sing[0] > 0.0);
    }
}
