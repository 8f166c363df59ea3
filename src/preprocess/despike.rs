//! Spike suppression
//!
//! Each sample is compared against a running median of its neighbours. The
//! residual scale comes from the median absolute residual, with the mean
//! absolute residual as a fallback when more than half the residuals are
//! zero. Samples further than [`DESPIKE_CUT`] scales from the local median are
//! replaced by it. Detection always uses the unmodified input.

/// Running median window length
pub const DESPIKE_WINDOW: usize = 9;
/// Replacement threshold in units of the robust residual scale
pub const DESPIKE_CUT: f64 = 4.0;

/// MAD to standard deviation for Gaussian noise
const MAD_SCALE: f64 = 1.4826;
/// Mean absolute deviation to standard deviation for Gaussian noise
const MEAN_ABS_SCALE: f64 = 1.2533;

/// Scratch buffers reused across voxels.
#[derive(Default)]
pub struct DespikeScratch {
    median: Vec<f64>,
    window: Vec<f64>,
    resid: Vec<f64>,
}

/// Despike `series` in place and return the number of replaced samples.
pub fn despike(series: &mut [f64], scratch: &mut DespikeScratch) -> usize {
    let n = series.len();
    if n < 3 {
        return 0;
    }
    let width = DESPIKE_WINDOW.min(n);
    let half = DESPIKE_WINDOW / 2;

    scratch.median.clear();
    for t in 0..n {
        // window slides inward at the edges so it always holds `width` samples
        let lo = t.saturating_sub(half).min(n - width);
        scratch.window.clear();
        scratch.window.extend_from_slice(&series[lo..lo + width]);
        scratch.median.push(median_in_place(&mut scratch.window));
    }

    scratch.resid.clear();
    scratch
        .resid
        .extend(series.iter().zip(&scratch.median).map(|(x, m)| (x - m).abs()));

    let mean_abs = scratch.resid.iter().sum::<f64>() / n as f64;
    let mad = median_in_place(&mut scratch.resid);
    let scale = if mad > 0.0 {
        MAD_SCALE * mad
    } else {
        MEAN_ABS_SCALE * mean_abs
    };
    if !scale.is_finite() || scale <= 0.0 {
        return 0;
    }

    let cut = DESPIKE_CUT * scale;
    let mut replaced = 0;
    for (x, &m) in series.iter_mut().zip(&scratch.median) {
        if (*x - m).abs() > cut {
            *x = m;
            replaced += 1;
        }
    }
    replaced
}

fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sort_unstable_by(f64::total_cmp);
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}
