//! Run configuration
//!
//! [`Config`] is built once through [`ConfigBuilder`], which performs every
//! check that does not need the input datasets. After that it is immutable
//! and passed by reference into the pipeline and the voxel driver.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Root prefix used when none is given.
pub const DEFAULT_PREFIX: &str = "dimred";

/// Temporal preprocessing applied to every series before decomposition.
///
/// The modes are mutually exclusive; despiking is a separate flag that runs
/// before whichever mode is selected.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Preprocess {
    /// Subtract the mean of each series (same as `PolyDetrend { order: 0 }`)
    #[default]
    MeanRemove,
    /// Remove a least-squares polynomial trend of the given order
    PolyDetrend { order: usize },
    /// Keep only frequencies in `[fbot, ftop]` Hz
    Bandpass { fbot: f64, ftop: f64 },
}

impl Preprocess {
    pub fn is_bandpass(&self) -> bool {
        matches!(self, Preprocess::Bandpass { .. })
    }
}

/// Which voxels to process.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum MaskSpec {
    /// Every voxel of the grid
    #[default]
    All,
    /// Nonzero voxels of the first volume of a dataset
    Dataset(PathBuf),
}

/// Validated, immutable run description.
#[derive(Clone, Debug)]
pub struct Config {
    inputs: Vec<PathBuf>,
    rdim: usize,
    preprocess: Preprocess,
    despike: bool,
    dt_override: Option<f64>,
    prefix: String,
    save_singular_values: bool,
    mask: MaskSpec,
    threads: Option<usize>,
    overwrite: bool,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Number of input datasets (K).
    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output components (R). Zero means a validation-only run.
    pub fn rdim(&self) -> usize {
        self.rdim
    }

    pub fn preprocess(&self) -> Preprocess {
        self.preprocess
    }

    pub fn despike(&self) -> bool {
        self.despike
    }

    /// Time step forced by the user, in seconds.
    pub fn dt_override(&self) -> Option<f64> {
        self.dt_override
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn save_singular_values(&self) -> bool {
        self.save_singular_values
    }

    pub fn mask(&self) -> &MaskSpec {
        &self.mask
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }
}

/// Collects options and validates them into a [`Config`].
///
/// Numeric options are taken as the user typed them (signed) so that
/// out-of-range values are reported instead of wrapping.
#[derive(Clone, Debug, Default)]
pub struct ConfigBuilder {
    inputs: Vec<PathBuf>,
    rdim: i64,
    polort: Option<i64>,
    band: Option<(f64, f64)>,
    despike: bool,
    dt: Option<f64>,
    prefix: Option<String>,
    save_singular_values: bool,
    mask: MaskSpec,
    threads: Option<usize>,
    overwrite: bool,
}

impl ConfigBuilder {
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn rdim(mut self, rdim: i64) -> Self {
        self.rdim = rdim;
        self
    }

    pub fn polort(mut self, order: i64) -> Self {
        self.polort = Some(order);
        self
    }

    pub fn band(mut self, fbot: f64, ftop: f64) -> Self {
        self.band = Some((fbot, ftop));
        self
    }

    pub fn despike(mut self, despike: bool) -> Self {
        self.despike = despike;
        self
    }

    pub fn dt(mut self, dt: f64) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn save_singular_values(mut self, save: bool) -> Self {
        self.save_singular_values = save;
        self
    }

    pub fn mask(mut self, mask: MaskSpec) -> Self {
        self.mask = mask;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn build(self) -> Result<Config, ConfigError> {
        let k = self.inputs.len();
        if k < 2 {
            return Err(ConfigError::TooFewInputs { count: k });
        }

        if self.rdim < 0 || self.rdim as u64 >= k as u64 {
            return Err(ConfigError::RankOutOfRange {
                rdim: self.rdim,
                inputs: k,
            });
        }

        let preprocess = match (self.polort, self.band) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingPreprocess),
            (Some(order), None) => {
                if order < 0 {
                    return Err(ConfigError::InvalidPolort(order));
                }
                if order == 0 {
                    Preprocess::MeanRemove
                } else {
                    Preprocess::PolyDetrend {
                        order: order as usize,
                    }
                }
            }
            (None, Some((fbot, ftop))) => {
                if !(fbot.is_finite() && ftop.is_finite()) || fbot < 0.0 || fbot >= ftop {
                    return Err(ConfigError::InvalidBand { fbot, ftop });
                }
                Preprocess::Bandpass { fbot, ftop }
            }
            (None, None) => Preprocess::MeanRemove,
        };

        if let Some(dt) = self.dt {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(ConfigError::InvalidTimeStep(dt));
            }
        }

        let prefix = self.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        if !prefix_ok(&prefix) {
            return Err(ConfigError::InvalidPrefix(prefix));
        }

        if self.threads == Some(0) {
            return Err(ConfigError::InvalidThreads);
        }

        Ok(Config {
            inputs: self.inputs,
            rdim: self.rdim as usize,
            preprocess,
            despike: self.despike,
            dt_override: self.dt,
            prefix,
            save_singular_values: self.save_singular_values,
            mask: self.mask,
            threads: self.threads,
            overwrite: self.overwrite,
        })
    }
}

/// A prefix must name a file: non-empty, no trailing separator, no control
/// characters.
fn prefix_ok(prefix: &str) -> bool {
    !prefix.trim().is_empty()
        && !prefix.ends_with('/')
        && !prefix.ends_with(std::path::MAIN_SEPARATOR)
        && !prefix.chars().any(|c| c.is_control())
}
