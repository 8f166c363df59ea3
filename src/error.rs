//! Error types
//!
//! Two layers:
//! - [`ConfigError`]: anything wrong with the options or with how the inputs
//!   fit together. Always detected before the first voxel is processed.
//! - [`Error`]: everything fatal, including I/O and file format problems.
//!
//! Per-voxel numerical trouble is not an error; see [`crate::svd::SvdFailure`].

use std::path::PathBuf;

use thiserror::Error;

/// Invalid options, or inputs that cannot be reduced together.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("need at least 2 input datasets, got {count}")]
    TooFewInputs { count: usize },

    #[error("-rdim {rdim} is out of range: must be >= 0 and less than the number of inputs ({inputs})")]
    RankOutOfRange { rdim: i64, inputs: usize },

    #[error("-polort and -band cannot be used together")]
    ConflictingPreprocess,

    #[error("-polort {0} is invalid: order must be >= 0")]
    InvalidPolort(i64),

    #[error("-band {fbot} {ftop} is invalid: need 0 <= fbot < ftop")]
    InvalidBand { fbot: f64, ftop: f64 },

    #[error("time step {0} is invalid: must be a positive number of seconds")]
    InvalidTimeStep(f64),

    #[error("prefix '{0}' is not acceptable")]
    InvalidPrefix(String),

    #[error("thread count must be at least 1")]
    InvalidThreads,

    #[error("dataset {path} has grid {found:?}, expected {expected:?} (from the first input)")]
    GridMismatch {
        path: PathBuf,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("dataset {path} has {found} time points, expected {expected} (from the first input)")]
    LengthMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("mask {path} has grid {found:?}, inputs have {expected:?}")]
    MaskGridMismatch {
        path: PathBuf,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("dataset {path} has no time step in its header; -band needs -dt (or -TR)")]
    MissingTimeStep { path: PathBuf },

    #[error("{nvals} time points is too few: at least {needed} are needed for this preprocessing")]
    TooFewTimepoints { nvals: usize, needed: usize },

    #[error("-band {fbot} {ftop} keeps no frequencies for {nvals} time points at dt = {dt} s")]
    EmptyBand {
        fbot: f64,
        ftop: f64,
        nvals: usize,
        dt: f64,
    },
}

/// Fatal errors of a reduction run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read dataset {path}: {message}")]
    Format { path: PathBuf, message: String },

    #[error("output {0} already exists (use -overwrite to replace it)")]
    OutputExists(PathBuf),

    #[error("output {0} exists and is not a regular file")]
    OutputNotFile(PathBuf),

    #[error("cannot start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for problems with options or input compatibility.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
