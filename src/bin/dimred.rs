//! dimred - voxelwise SVD reduction of K matched datasets to R components
//!
//! Usage:
//!   dimred -rdim 1 run1.nii run2.nii run3.nii
//!   dimred -rdim 2 -polort 2 -sing -rprefix red a.nii b.nii c.nii
//!   dimred -rdim 1 -band 0.01 0.1 -dt 2 a.1D b.1D
//!
//! Single-dash long options are accepted as well as `--long` forms.
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use voxel_dimred::{run, Config, MaskSpec};

/// Voxelwise dimensional reduction: at each voxel the K input series form a
/// K x T matrix whose top R right singular vectors, scaled by their singular
/// values, are written as R output datasets.
#[derive(Parser, Debug)]
#[command(name = "dimred")]
#[command(author, version, about, long_about = None)]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// Number of components to keep (0 <= R < number of inputs)
    #[arg(long, default_value_t = 0, value_name = "R")]
    rdim: i64,

    /// Root name for the outputs; an extension (.nii, .nii.gz, .1D) picks the format
    #[arg(long, alias = "prefix", value_name = "PREFIX")]
    rprefix: Option<String>,

    /// Also write the top R singular values of every voxel
    #[arg(long)]
    sing: bool,

    /// Remove a polynomial trend of this order instead of only the mean
    #[arg(long, value_name = "ORDER", conflicts_with = "band")]
    polort: Option<i64>,

    /// Keep only frequencies between FBOT and FTOP (Hz)
    #[arg(long, num_args = 2, value_names = ["FBOT", "FTOP"])]
    band: Option<Vec<f64>>,

    /// Sampling interval in seconds, overriding the dataset headers
    #[arg(long, alias = "TR", value_name = "SECONDS")]
    dt: Option<f64>,

    /// Replace spikes with the local median before other preprocessing
    #[arg(long)]
    despike: bool,

    /// Only process voxels that are nonzero in this dataset
    #[arg(long, value_name = "DATASET")]
    mask: Option<PathBuf>,

    /// Worker threads (default: all cores)
    #[arg(long, env = "DIMRED_NUM_THREADS", value_name = "N")]
    nthreads: Option<usize>,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,

    /// Input datasets, at least two, all on the same grid
    #[arg(value_name = "DATASET")]
    inputs: Vec<PathBuf>,
}

/// Rewrite `-name` options as `--name`. Negative numbers and `--` forms are
/// left alone; the program name is never touched.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(i, arg)| {
            if i == 0 {
                return arg;
            }
            match arg.to_str() {
                Some(s) if is_single_dash_word(s) => OsString::from(format!("-{s}")),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_word(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next() == Some('-')
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && s.len() > 2
}

fn build_config(cli: Cli) -> anyhow::Result<Config> {
    let mut builder = Config::builder()
        .inputs(cli.inputs)
        .rdim(cli.rdim)
        .despike(cli.despike)
        .save_singular_values(cli.sing)
        .overwrite(cli.overwrite);

    if let Some(prefix) = cli.rprefix {
        builder = builder.prefix(prefix);
    }
    if let Some(order) = cli.polort {
        builder = builder.polort(order);
    }
    if let Some(band) = cli.band {
        if let [fbot, ftop] = band[..] {
            builder = builder.band(fbot, ftop);
        }
    }
    if let Some(dt) = cli.dt {
        builder = builder.dt(dt);
    }
    if let Some(mask) = cli.mask {
        builder = builder.mask(MaskSpec::Dataset(mask));
    }
    if let Some(threads) = cli.nthreads {
        builder = builder.threads(threads);
    }

    builder.build().context("invalid options")
}

fn try_main(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(cli)?;
    let summary = run(&config)?;
    for path in &summary.outputs {
        info!("output: {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse_from(normalize_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not failures
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
