//! Dataset store
//!
//! Everything that touches files lives here:
//! - `nifti_io`: NIfTI-1 3D+time datasets (`.nii`, `.nii.gz`)
//! - `onedee`: plain text `.1D` datasets, one row per voxel
//! - `mask`: voxel selection
//!
//! Datasets are fully loaded into memory, stored voxel-major so that the
//! time series of a voxel is one contiguous slice.

pub mod mask;
pub mod nifti_io;
pub mod onedee;

pub use mask::{build_mask, Mask};

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Spatial sampling shared by all inputs and outputs of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGrid {
    /// Dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Voxel sizes in mm
    pub voxel_size: (f64, f64, f64),
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl VolumeGrid {
    /// Grid with unit voxels and an identity affine.
    pub fn new(dims: (usize, usize, usize)) -> Self {
        Self {
            dims,
            voxel_size: (1.0, 1.0, 1.0),
            affine: [
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    /// Number of voxels.
    pub fn nvox(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Two grids can be reduced together when their dimensions agree.
    pub fn same_dims(&self, other: &VolumeGrid) -> bool {
        self.dims == other.dims
    }
}

/// On-disk representation of a dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatasetFormat {
    Nifti { gzip: bool },
    OneD,
}

impl DatasetFormat {
    /// Format implied by a file name, if it has a known extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        split_extension(name).1
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DatasetFormat::Nifti { gzip: false } => ".nii",
            DatasetFormat::Nifti { gzip: true } => ".nii.gz",
            DatasetFormat::OneD => ".1D",
        }
    }
}

/// Split a known dataset extension off a name.
fn split_extension(name: &str) -> (&str, Option<DatasetFormat>) {
    const KNOWN: [(&str, DatasetFormat); 5] = [
        (".nii.gz", DatasetFormat::Nifti { gzip: true }),
        (".nii", DatasetFormat::Nifti { gzip: false }),
        (".1D", DatasetFormat::OneD),
        (".1d", DatasetFormat::OneD),
        (".txt", DatasetFormat::OneD),
    ];
    for (ext, format) in KNOWN {
        if let Some(stem) = name.strip_suffix(ext) {
            if !stem.is_empty() {
                return (stem, Some(format));
            }
        }
    }
    (name, None)
}

/// A 3D+time dataset held in memory.
#[derive(Clone, Debug)]
pub struct TimeSeriesDataset {
    /// Where the dataset came from, or where it will be written
    pub path: PathBuf,
    pub format: DatasetFormat,
    pub grid: VolumeGrid,
    /// Number of values per voxel (time points)
    pub nvals: usize,
    /// Sampling interval in seconds, when the file records one
    pub dt: Option<f64>,
    /// Voxel-major values: `data[v * nvals + t]`
    data: Vec<f32>,
}

impl TimeSeriesDataset {
    /// Wrap voxel-major values. Fails if the length does not match the grid.
    pub fn from_voxel_major(
        path: impl Into<PathBuf>,
        format: DatasetFormat,
        grid: VolumeGrid,
        nvals: usize,
        dt: Option<f64>,
        data: Vec<f32>,
    ) -> Result<Self> {
        let path = path.into();
        if data.len() != grid.nvox() * nvals {
            return Err(Error::format(
                path,
                format!(
                    "{} values do not fill {} voxels x {} time points",
                    data.len(),
                    grid.nvox(),
                    nvals
                ),
            ));
        }
        Ok(Self {
            path,
            format,
            grid,
            nvals,
            dt,
            data,
        })
    }

    /// Zero-filled dataset ready to receive output series.
    pub fn zeros(
        path: impl Into<PathBuf>,
        format: DatasetFormat,
        grid: VolumeGrid,
        nvals: usize,
        dt: Option<f64>,
    ) -> Self {
        let data = vec![0.0; grid.nvox() * nvals];
        Self {
            path: path.into(),
            format,
            grid,
            nvals,
            dt,
            data,
        }
    }

    pub fn nvox(&self) -> usize {
        self.grid.nvox()
    }

    /// Time series of voxel `v`.
    #[inline]
    pub fn series(&self, v: usize) -> &[f32] {
        &self.data[v * self.nvals..(v + 1) * self.nvals]
    }

    #[inline]
    pub fn series_mut(&mut self, v: usize) -> &mut [f32] {
        let n = self.nvals;
        &mut self.data[v * n..(v + 1) * n]
    }

    /// All values, voxel-major.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Values of time point `t` for every voxel (one 3D volume).
    pub fn volume(&self, t: usize) -> Vec<f32> {
        (0..self.nvox()).map(|v| self.data[v * self.nvals + t]).collect()
    }
}

/// Load a dataset, choosing the reader from the file extension.
pub fn open_dataset(path: &Path) -> Result<TimeSeriesDataset> {
    match DatasetFormat::from_path(path) {
        Some(DatasetFormat::OneD) => onedee::load_onedee(path),
        Some(DatasetFormat::Nifti { .. }) => nifti_io::load_nifti_file(path),
        None => Err(Error::format(
            path,
            "unknown dataset type (expected .nii, .nii.gz or .1D)",
        )),
    }
}

/// Write a dataset to `dataset.path` in `dataset.format`.
pub fn write_dataset(dataset: &TimeSeriesDataset) -> Result<()> {
    match dataset.format {
        DatasetFormat::OneD => onedee::save_onedee(dataset),
        DatasetFormat::Nifti { gzip } => nifti_io::save_nifti_file(dataset, gzip),
    }
}

/// Output file names derived from a root prefix.
///
/// `<prefix>_001`, `<prefix>_002`, ... and `<prefix>_sing`. A known extension
/// on the prefix picks the output format; otherwise `default_format` is used.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputNaming {
    stem: String,
    format: DatasetFormat,
}

impl OutputNaming {
    pub fn new(prefix: &str, default_format: DatasetFormat) -> Self {
        let (stem, format) = split_extension(prefix);
        Self {
            stem: stem.to_string(),
            format: format.unwrap_or(default_format),
        }
    }

    pub fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Path of component `r` (1-based).
    pub fn component(&self, r: usize) -> PathBuf {
        self.with_suffix(&format!("{r:03}"))
    }

    /// Path of the singular value dataset.
    pub fn singular(&self) -> PathBuf {
        self.with_suffix("sing")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}_{}{}", self.stem, suffix, self.format.extension()))
    }
}
