//! Temporal preprocessing of voxel time series
//!
//! A [`PreprocessPlan`] is resolved once per run from the [`Preprocess`]
//! mode, the series length and the sampling interval. It holds everything
//! that only depends on those (polynomial basis, FFT plan, kept frequency
//! bins) and is shared read-only by all workers. Each worker owns a
//! [`PreprocessScratch`] so that processing a series does not allocate.
//!
//! Order of operations for one series:
//! 1. convert to f64
//! 2. despike (optional)
//! 3. mean removal, polynomial detrend or band-pass

pub mod bandpass;
pub mod despike;
pub mod detrend;

use log::debug;

use crate::config::Preprocess;
use crate::error::ConfigError;
use crate::fft::FftWorkspace;

pub use bandpass::BandpassFilter;
pub use despike::{despike, DespikeScratch};
pub use detrend::PolyBasis;

/// Fewest time points accepted for band-pass filtering.
const MIN_BANDPASS_NVALS: usize = 4;

#[derive(Clone)]
enum Stage {
    Detrend(PolyBasis),
    Bandpass(BandpassFilter),
}

/// Preprocessing resolved against the actual inputs.
#[derive(Clone)]
pub struct PreprocessPlan {
    nvals: usize,
    despike: bool,
    stage: Stage,
}

/// Per-worker buffers for [`PreprocessPlan::apply`].
#[derive(Default)]
pub struct PreprocessScratch {
    despike: DespikeScratch,
    fft: Option<FftWorkspace>,
}

impl PreprocessPlan {
    /// Resolve `mode` for series of `nvals` samples spaced `dt` seconds.
    ///
    /// `dt` is only consulted for band-pass filtering; the caller resolves it
    /// from the override or the dataset headers.
    pub fn new(
        mode: Preprocess,
        despike: bool,
        nvals: usize,
        dt: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let stage = match mode {
            Preprocess::MeanRemove => Stage::Detrend(detrend_basis(0, nvals)?),
            Preprocess::PolyDetrend { order } => Stage::Detrend(detrend_basis(order, nvals)?),
            Preprocess::Bandpass { fbot, ftop } => {
                if nvals < MIN_BANDPASS_NVALS {
                    return Err(ConfigError::TooFewTimepoints {
                        nvals,
                        needed: MIN_BANDPASS_NVALS,
                    });
                }
                // the pipeline reports a missing header dt with its path before
                // getting here
                let dt = dt.ok_or(ConfigError::InvalidTimeStep(f64::NAN))?;
                let filter = BandpassFilter::new(nvals, dt, fbot, ftop)?;
                debug!(
                    "band-pass {}-{} Hz at dt = {} s keeps {} of {} bins",
                    fbot,
                    ftop,
                    dt,
                    filter.kept_bins(),
                    nvals
                );
                Stage::Bandpass(filter)
            }
        };

        Ok(Self {
            nvals,
            despike,
            stage,
        })
    }

    /// Series length this plan was resolved for.
    pub fn nvals(&self) -> usize {
        self.nvals
    }

    pub fn scratch(&self) -> PreprocessScratch {
        PreprocessScratch {
            despike: DespikeScratch::default(),
            fft: match &self.stage {
                Stage::Bandpass(filter) => Some(filter.workspace()),
                Stage::Detrend(_) => None,
            },
        }
    }

    /// Preprocess `raw` into `out`. Both must have length [`Self::nvals`].
    pub fn apply(&self, raw: &[f32], out: &mut [f64], scratch: &mut PreprocessScratch) {
        debug_assert_eq!(raw.len(), self.nvals);
        debug_assert_eq!(out.len(), self.nvals);

        for (o, &x) in out.iter_mut().zip(raw) {
            *o = f64::from(x);
        }

        if self.despike {
            despike(out, &mut scratch.despike);
        }

        match &self.stage {
            Stage::Detrend(basis) => basis.remove(out),
            Stage::Bandpass(filter) => {
                let ws = scratch.fft.get_or_insert_with(|| filter.workspace());
                filter.apply(out, ws);
            }
        }
    }

    /// Convenience wrapper allocating its own output and scratch.
    pub fn apply_to_vec(&self, raw: &[f32]) -> Vec<f64> {
        let mut out = vec![0.0; self.nvals];
        self.apply(raw, &mut out, &mut self.scratch());
        out
    }
}

/// A fit of order q leaves nothing to decompose unless T > q + 1.
fn detrend_basis(order: usize, nvals: usize) -> Result<PolyBasis, ConfigError> {
    let needed = order + 2;
    if nvals < needed {
        return Err(ConfigError::TooFewTimepoints { nvals, needed });
    }
    Ok(PolyBasis::new(order, nvals))
}
