//! FFT band-pass filtering of a single time series

use super::detrend::PolyBasis;
use crate::error::ConfigError;
use crate::fft::{fftfreq, FftPlan, FftWorkspace};

/// Zero every frequency bin outside `[fbot, ftop]` (Hz).
///
/// The linear trend is removed before transforming so that the wrap-around
/// discontinuity does not leak into the pass band. DC is always removed.
#[derive(Clone)]
pub struct BandpassFilter {
    plan: FftPlan,
    keep: Vec<bool>,
    linear: PolyBasis,
}

impl BandpassFilter {
    /// Filter for `nvals` samples spaced `dt` seconds apart.
    ///
    /// Fails with [`ConfigError::EmptyBand`] when no non-DC bin falls in the
    /// band, which would leave every series identically zero.
    pub fn new(nvals: usize, dt: f64, fbot: f64, ftop: f64) -> Result<Self, ConfigError> {
        let keep: Vec<bool> = fftfreq(nvals, dt)
            .iter()
            .enumerate()
            .map(|(k, f)| k != 0 && (fbot..=ftop).contains(&f.abs()))
            .collect();

        if !keep.iter().any(|&k| k) {
            return Err(ConfigError::EmptyBand {
                fbot,
                ftop,
                nvals,
                dt,
            });
        }

        Ok(Self {
            plan: FftPlan::new(nvals),
            keep,
            linear: PolyBasis::new(1, nvals),
        })
    }

    /// Number of bins (positive and negative) kept.
    pub fn kept_bins(&self) -> usize {
        self.keep.iter().filter(|&&k| k).count()
    }

    pub fn workspace(&self) -> FftWorkspace {
        self.plan.workspace()
    }

    /// Filter `series` in place.
    pub fn apply(&self, series: &mut [f64], ws: &mut FftWorkspace) {
        self.linear.remove(series);

        self.plan.load_real(ws, series);
        self.plan.forward(ws);
        for (c, &keep) in ws.buffer.iter_mut().zip(&self.keep) {
            if !keep {
                *c = num_complex::Complex64::new(0.0, 0.0);
            }
        }
        self.plan.inverse(ws);

        // the kept set is symmetric in frequency, so the result is real
        for (s, c) in series.iter_mut().zip(&ws.buffer) {
            *s = c.re;
        }
    }
}
