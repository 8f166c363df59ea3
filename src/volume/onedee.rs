//! Plain text `.1D` datasets
//!
//! One row per voxel, whitespace-separated values along time. Lines that are
//! blank or start with `#` are skipped. A file with a single column is one
//! time series instead: one voxel, one time point per row. A `.1D` file has
//! no header, so it carries no sampling interval.

use std::path::Path;

use log::debug;

use super::{DatasetFormat, TimeSeriesDataset, VolumeGrid};
use crate::error::{Error, Result};

/// Load a `.1D` file as a dataset.
pub fn load_onedee(path: &Path) -> Result<TimeSeriesDataset> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let dataset = parse_onedee(&text, path)?;
    debug!(
        "loaded {}: {} voxels x {} time points",
        path.display(),
        dataset.nvox(),
        dataset.nvals
    );
    Ok(dataset)
}

/// Load a `.1D` file keeping one voxel per row, whatever the column count.
///
/// Used for per-voxel value lists such as masks, where a single column means
/// one value for each voxel.
pub fn load_onedee_rows(path: &Path) -> Result<TimeSeriesDataset> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_onedee_rows(&text, path)
}

/// Parse `.1D` text; `path` only labels errors and the result.
///
/// A single column of several rows is read as one voxel's time series.
pub fn parse_onedee(text: &str, path: &Path) -> Result<TimeSeriesDataset> {
    let table = parse_table(text, path)?;
    if table.ncols == 1 && table.nrows > 1 {
        return TimeSeriesDataset::from_voxel_major(
            path,
            DatasetFormat::OneD,
            VolumeGrid::new((1, 1, 1)),
            table.nrows,
            None,
            table.data,
        );
    }
    table.into_rows_dataset(path)
}

/// Parse `.1D` text with one voxel per row.
pub fn parse_onedee_rows(text: &str, path: &Path) -> Result<TimeSeriesDataset> {
    parse_table(text, path)?.into_rows_dataset(path)
}

/// Row-major numbers from a `.1D` file.
struct Table {
    data: Vec<f32>,
    nrows: usize,
    ncols: usize,
}

impl Table {
    fn into_rows_dataset(self, path: &Path) -> Result<TimeSeriesDataset> {
        TimeSeriesDataset::from_voxel_major(
            path,
            DatasetFormat::OneD,
            VolumeGrid::new((self.nrows, 1, 1)),
            self.ncols,
            None,
            self.data,
        )
    }
}

fn parse_table(text: &str, path: &Path) -> Result<Table> {
    let mut data = Vec::new();
    let mut ncols: Option<usize> = None;
    let mut nrows = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let before = data.len();
        for (j, tok) in line.split_whitespace().enumerate() {
            let value = tok.parse::<f32>().map_err(|_| {
                Error::format(
                    path,
                    format!("line {}, column {}: '{}' is not a number", line_no + 1, j + 1, tok),
                )
            })?;
            data.push(value);
        }
        let count = data.len() - before;

        match ncols {
            None => ncols = Some(count),
            Some(n) if n != count => {
                return Err(Error::format(
                    path,
                    format!("line {} has {} values, earlier rows have {}", line_no + 1, count, n),
                ));
            }
            Some(_) => {}
        }
        nrows += 1;
    }

    let ncols = ncols.ok_or_else(|| Error::format(path, "no data rows"))?;
    Ok(Table { data, nrows, ncols })
}

/// Render a dataset as `.1D` text, one voxel per row.
pub fn format_onedee(dataset: &TimeSeriesDataset) -> String {
    let mut out = String::with_capacity(dataset.nvox() * dataset.nvals * 12);
    for v in 0..dataset.nvox() {
        let mut first = true;
        for &value in dataset.series(v) {
            if !first {
                out.push(' ');
            }
            first = false;
            // shortest representation that round-trips exactly
            out.push_str(&value.to_string());
        }
        out.push('\n');
    }
    out
}

/// Write a dataset as `.1D` text to `dataset.path`.
pub fn save_onedee(dataset: &TimeSeriesDataset) -> Result<()> {
    let path = &dataset.path;
    std::fs::write(path, format_onedee(dataset)).map_err(|e| Error::io(path, e))?;
    debug!("wrote {} ({} rows)", path.display(), dataset.nvox());
    Ok(())
}
