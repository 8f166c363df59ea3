//! FFT wrapper for 1D time series using rustfft
//!
//! Plans are created once per series length and shared by all worker
//! threads; each worker owns an [`FftWorkspace`] with its buffer and scratch
//! so that transforming a voxel's series allocates nothing.
//! Conventions follow NumPy (`ifft` includes the 1/N normalization).

use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftDirection, FftPlanner};

/// Forward and inverse plans for one transform length.
#[derive(Clone)]
pub struct FftPlan {
    n: usize,
    fft: Arc<dyn Fft<f64>>,
    ifft: Arc<dyn Fft<f64>>,
}

/// Per-thread buffers for an [`FftPlan`].
pub struct FftWorkspace {
    /// Data transformed in place
    pub buffer: Vec<Complex64>,
    scratch: Vec<Complex64>,
}

impl FftPlan {
    pub fn new(n: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft(n, FftDirection::Forward);
        let ifft = planner.plan_fft(n, FftDirection::Inverse);
        Self { n, fft, ifft }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Buffers sized for this plan.
    pub fn workspace(&self) -> FftWorkspace {
        let scratch_len = self
            .fft
            .get_inplace_scratch_len()
            .max(self.ifft.get_inplace_scratch_len());
        FftWorkspace {
            buffer: vec![Complex64::new(0.0, 0.0); self.n],
            scratch: vec![Complex64::new(0.0, 0.0); scratch_len],
        }
    }

    /// Load a real series into the workspace buffer.
    pub fn load_real(&self, ws: &mut FftWorkspace, data: &[f64]) {
        debug_assert_eq!(data.len(), self.n);
        for (c, &x) in ws.buffer.iter_mut().zip(data) {
            *c = Complex64::new(x, 0.0);
        }
    }

    /// In-place forward FFT of `ws.buffer`
    pub fn forward(&self, ws: &mut FftWorkspace) {
        self.fft.process_with_scratch(&mut ws.buffer, &mut ws.scratch);
    }

    /// In-place inverse FFT of `ws.buffer` (with normalization)
    pub fn inverse(&self, ws: &mut FftWorkspace) {
        self.ifft.process_with_scratch(&mut ws.buffer, &mut ws.scratch);
        let n = self.n as f64;
        for val in ws.buffer.iter_mut() {
            *val /= n;
        }
    }
}

/// Generate FFT frequency values for a given length
/// Matches numpy.fft.fftfreq(n, d)
pub fn fftfreq(n: usize, d: f64) -> Vec<f64> {
    let mut freq = vec![0.0; n];
    if n == 0 {
        return freq;
    }
    let val = 1.0 / (n as f64 * d);

    if n % 2 == 0 {
        // Even: [0, 1, ..., n/2-1, -n/2, ..., -1]
        for i in 0..n / 2 {
            freq[i] = (i as f64) * val;
        }
        for i in n / 2..n {
            freq[i] = ((i as i64) - (n as i64)) as f64 * val;
        }
    } else {
        // Odd: [0, 1, ..., (n-1)/2, -(n-1)/2, ..., -1]
        for i in 0..=(n - 1) / 2 {
            freq[i] = (i as f64) * val;
        }
        for i in (n + 1) / 2..n {
            freq[i] = ((i as i64) - (n as i64)) as f64 * val;
        }
    }
    freq
}
