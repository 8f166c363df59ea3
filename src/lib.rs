//! voxel-dimred: voxelwise dimensionality reduction across matched datasets
//!
//! K datasets on the same grid with the same number of time points are
//! reduced voxel by voxel: the K preprocessed series at a voxel form a K x T
//! matrix whose SVD gives R < K component time series `sigma_r * v_r`, each
//! written to its own output dataset.
//!
//! # Modules
//! - `config`: validated run options
//! - `volume`: NIfTI-1 and `.1D` datasets, masks, output naming
//! - `preprocess`: despiking, mean removal, polynomial detrend, band-pass
//! - `fft`: 1D FFT plans using rustfft
//! - `assemble`: per-voxel K x T matrix
//! - `svd`: ordered, sign-fixed SVD using nalgebra
//! - `reduce`: component and singular value extraction
//! - `driver`: parallel pass over voxels (rayon)
//! - `pipeline`: whole run, from input files to output files

// Core modules
pub mod config;
pub mod error;
pub mod fft;

// Algorithm modules
pub mod assemble;
pub mod preprocess;
pub mod reduce;
pub mod svd;

// Orchestration
pub mod driver;
pub mod pipeline;

// I/O modules
pub mod volume;

pub use config::{Config, ConfigBuilder, MaskSpec, Preprocess};
pub use error::{ConfigError, Error, Result};
pub use pipeline::{run, RunSummary};

/// Crate version, as reported by the command line tool.
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = get_version();
        assert!(!version.is_empty());
    }
}
