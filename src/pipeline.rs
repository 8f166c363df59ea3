//! Run orchestration: open, validate, reduce, write
//!
//! Every check that can fail a run happens before the first voxel is
//! processed, and nothing is written unless the whole pass completed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::Config;
use crate::driver::{reduce_volumes, DriverStats, ReducedBlock};
use crate::error::{ConfigError, Error, Result};
use crate::preprocess::PreprocessPlan;
use crate::volume::{
    build_mask, open_dataset, write_dataset, OutputNaming, TimeSeriesDataset, VolumeGrid,
};

/// Relative difference above which per-input time steps are reported.
const DT_TOLERANCE: f64 = 1e-3;

/// What the inputs agree on, after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct InputLayout {
    pub grid: VolumeGrid,
    /// Time points per voxel (T)
    pub nvals: usize,
    /// Sampling interval used for filtering and recorded in the outputs
    pub dt: Option<f64>,
}

/// Result of a completed run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Files written, components first
    pub outputs: Vec<PathBuf>,
    pub stats: DriverStats,
    pub nvox: usize,
    pub nvals: usize,
}

/// Execute a reduction run described by `config`.
pub fn run(config: &Config) -> Result<RunSummary> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads().unwrap_or(0))
        .build()?;
    pool.install(|| run_in_pool(config))
}

fn run_in_pool(config: &Config) -> Result<RunSummary> {
    info!(
        "reducing {} inputs to {} components ({:?}{})",
        config.n_inputs(),
        config.rdim(),
        config.preprocess(),
        if config.despike() { ", despiked" } else { "" }
    );

    let inputs = open_inputs(config.inputs())?;
    let layout = validate_inputs(&inputs, config)?;
    let plan = PreprocessPlan::new(config.preprocess(), config.despike(), layout.nvals, layout.dt)?;
    let mask = build_mask(config.mask(), &layout.grid)?;

    let naming = OutputNaming::new(config.prefix(), inputs[0].format);
    let rdim = config.rdim();
    let save_singular = config.save_singular_values() && rdim > 0;
    if config.save_singular_values() && rdim == 0 {
        warn!("-sing ignored: no components requested");
    }

    let mut outputs: Vec<PathBuf> = (1..=rdim).map(|r| naming.component(r)).collect();
    if save_singular {
        outputs.push(naming.singular());
    }
    check_outputs(&outputs, config.overwrite())?;

    let mut summary = RunSummary {
        outputs: Vec::new(),
        stats: DriverStats {
            masked: mask.count(),
            ..DriverStats::default()
        },
        nvox: layout.grid.nvox(),
        nvals: layout.nvals,
    };

    if rdim == 0 {
        info!("rank 0: inputs validated, nothing to write");
        return Ok(summary);
    }

    let (block, stats) = reduce_volumes(&inputs, &plan, &mask, rdim, save_singular);
    drop(inputs);

    write_outputs(&block, &layout, &naming, save_singular)?;

    info!(
        "decomposed {} of {} masked voxels ({} total), wrote {} datasets",
        stats.processed,
        stats.masked,
        layout.grid.nvox(),
        outputs.len()
    );
    if stats.failed > 0 {
        warn!(
            "{} voxels could not be decomposed; their outputs are zero",
            stats.failed
        );
    }

    summary.stats = stats;
    summary.outputs = outputs;
    Ok(summary)
}

/// Load every input, in parallel. The first failing input (in argument
/// order) is reported.
fn open_inputs(paths: &[PathBuf]) -> Result<Vec<TimeSeriesDataset>> {
    let loaded: Vec<Result<TimeSeriesDataset>> =
        paths.par_iter().map(|path| open_dataset(path)).collect();
    let inputs = loaded.into_iter().collect::<Result<Vec<_>>>()?;
    for dataset in &inputs {
        debug!(
            "{}: grid {:?}, {} time points, dt {:?}",
            dataset.path.display(),
            dataset.grid.dims,
            dataset.nvals,
            dataset.dt
        );
    }
    Ok(inputs)
}

/// Check that the inputs can be reduced together and resolve the time step.
///
/// Grids and series lengths must match the first input. The time step is the
/// override when one is given, else the first input's; band-pass filtering
/// needs every input to record one when there is no override.
pub fn validate_inputs(inputs: &[TimeSeriesDataset], config: &Config) -> Result<InputLayout> {
    let first = inputs
        .first()
        .ok_or(ConfigError::TooFewInputs { count: 0 })?;

    for dataset in &inputs[1..] {
        if !dataset.grid.same_dims(&first.grid) {
            return Err(ConfigError::GridMismatch {
                path: dataset.path.clone(),
                expected: first.grid.dims,
                found: dataset.grid.dims,
            }
            .into());
        }
        if dataset.nvals != first.nvals {
            return Err(ConfigError::LengthMismatch {
                path: dataset.path.clone(),
                expected: first.nvals,
                found: dataset.nvals,
            }
            .into());
        }
        if dataset.grid.voxel_size != first.grid.voxel_size {
            warn!(
                "{} has voxel size {:?}, first input has {:?}",
                dataset.path.display(),
                dataset.grid.voxel_size,
                first.grid.voxel_size
            );
        }
    }

    let dt = match config.dt_override() {
        Some(dt) => Some(dt),
        None => {
            if config.preprocess().is_bandpass() {
                if let Some(missing) = inputs.iter().find(|d| d.dt.is_none()) {
                    return Err(ConfigError::MissingTimeStep {
                        path: missing.path.clone(),
                    }
                    .into());
                }
            }
            warn_on_dt_spread(inputs);
            first.dt
        }
    };

    Ok(InputLayout {
        grid: first.grid.clone(),
        nvals: first.nvals,
        dt,
    })
}

fn warn_on_dt_spread(inputs: &[TimeSeriesDataset]) {
    let Some(reference) = inputs.first().and_then(|d| d.dt) else {
        return;
    };
    for dataset in inputs {
        if let Some(dt) = dataset.dt {
            if ((dt - reference) / reference).abs() > DT_TOLERANCE {
                warn!(
                    "{} has dt = {} s, using {} s from the first input",
                    dataset.path.display(),
                    dt,
                    reference
                );
            }
        }
    }
}

fn check_outputs(outputs: &[PathBuf], overwrite: bool) -> Result<()> {
    for path in outputs {
        if path.exists() {
            if !path.is_file() {
                return Err(Error::OutputNotFile(path.clone()));
            }
            if !overwrite {
                return Err(Error::OutputExists(path.clone()));
            }
            debug!("{} will be overwritten", path.display());
        }
    }
    Ok(())
}

fn write_outputs(
    block: &ReducedBlock,
    layout: &InputLayout,
    naming: &OutputNaming,
    save_singular: bool,
) -> Result<()> {
    let mut datasets = (0..block.rdim())
        .into_par_iter()
        .map(|r| {
            output_dataset(
                naming.component(r + 1),
                naming,
                layout,
                layout.nvals,
                layout.dt,
                block.component(r),
            )
        })
        .collect::<Result<Vec<_>>>()?;

    if save_singular {
        if let Some(values) = block.singular_values() {
            datasets.push(output_dataset(
                naming.singular(),
                naming,
                layout,
                block.rdim(),
                None,
                values,
            )?);
        }
    }
    write_all_or_nothing(datasets)
}

fn output_dataset(
    path: PathBuf,
    naming: &OutputNaming,
    layout: &InputLayout,
    nvals: usize,
    dt: Option<f64>,
    data: Vec<f32>,
) -> Result<TimeSeriesDataset> {
    TimeSeriesDataset::from_voxel_major(path, naming.format(), layout.grid.clone(), nvals, dt, data)
}

/// Hidden sibling of `path` that a dataset is written to before it is moved
/// into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".partial");
    path.with_file_name(name)
}

/// Write every dataset under its staging name, then rename them all to their
/// final paths. A failed write removes the staged files and leaves the final
/// paths untouched.
fn write_all_or_nothing(mut datasets: Vec<TimeSeriesDataset>) -> Result<()> {
    let targets: Vec<PathBuf> = datasets
        .iter_mut()
        .map(|dataset| {
            let staged = staging_path(&dataset.path);
            std::mem::replace(&mut dataset.path, staged)
        })
        .collect();

    let written: Vec<Result<()>> = datasets.par_iter().map(write_dataset).collect();
    if let Err(e) = written.into_iter().collect::<Result<Vec<()>>>() {
        discard_staged(&datasets);
        return Err(e);
    }

    for (i, (dataset, target)) in datasets.iter().zip(&targets).enumerate() {
        if let Err(e) = std::fs::rename(&dataset.path, target) {
            discard_staged(&datasets[i..]);
            return Err(Error::io(target, e));
        }
        info!("wrote {}", target.display());
    }
    Ok(())
}

fn discard_staged(datasets: &[TimeSeriesDataset]) {
    for dataset in datasets {
        match std::fs::remove_file(&dataset.path) {
            Ok(()) => debug!("removed {}", dataset.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot remove {}: {}", dataset.path.display(), e),
        }
    }
}
