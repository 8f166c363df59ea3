//! End-to-end runs through the library API on small on-disk datasets.

use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use voxel_dimred::volume::onedee::load_onedee_rows;
use voxel_dimred::volume::{open_dataset, write_dataset, DatasetFormat, TimeSeriesDataset, VolumeGrid};
use voxel_dimred::{run, Config, ConfigError, Error, MaskSpec};

/// Write rows (one per voxel) as a `.1D` file.
fn write_onedee(dir: &Path, name: &str, rows: &[Vec<f32>]) -> PathBuf {
    let path = dir.join(name);
    let text: String = rows
        .iter()
        .map(|row| {
            let cols: Vec<String> = row.iter().map(|x| x.to_string()).collect();
            cols.join(" ") + "\n"
        })
        .collect();
    std::fs::write(&path, text).unwrap();
    path
}

fn base_rows(nvox: usize, nvals: usize) -> Vec<Vec<f32>> {
    (0..nvox)
        .map(|v| {
            (0..nvals)
                .map(|t| ((t * (v + 2)) % 7) as f32 + 0.25 * v as f32 - 0.1 * t as f32)
                .collect()
        })
        .collect()
}

fn scaled(rows: &[Vec<f32>], factor: f32) -> Vec<Vec<f32>> {
    rows.iter()
        .map(|row| row.iter().map(|x| x * factor).collect())
        .collect()
}

fn demeaned(row: &[f32]) -> Vec<f64> {
    let mean = row.iter().map(|&x| f64::from(x)).sum::<f64>() / row.len() as f64;
    row.iter().map(|&x| f64::from(x) - mean).collect()
}

fn prefix_in(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

#[test]
fn test_two_inputs_rank_one() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(4, 10);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &scaled(&rows, 2.0));
    let prefix = prefix_in(dir.path(), "dimred");

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .prefix(prefix.clone())
        .build()
        .unwrap();
    let summary = run(&config).unwrap();

    let comp_path = dir.path().join("dimred_001.1D");
    assert_eq!(summary.outputs, vec![comp_path.clone()]);
    assert_eq!(summary.stats.masked, 4);
    assert_eq!(summary.stats.processed, 4);
    assert_eq!(summary.stats.failed, 0);
    assert!(!dir.path().join("dimred_sing.1D").exists());

    let comp = open_dataset(&comp_path).unwrap();
    assert_eq!(comp.grid.dims, (4, 1, 1));
    assert_eq!(comp.nvals, 10);

    // b = 2a, so the matrix is rank one with loadings (1, 2)/sqrt(5) and the
    // component is sqrt(5) times the demeaned first input
    let factor = 5.0f64.sqrt();
    for (v, row) in rows.iter().enumerate() {
        for (t, expected) in demeaned(row).into_iter().enumerate() {
            assert_abs_diff_eq!(f64::from(comp.series(v)[t]), factor * expected, epsilon = 1e-4);
        }
    }
}

#[test]
fn test_singular_values_saved() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(4, 10);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &scaled(&rows, 2.0));

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .save_singular_values(true)
        .prefix(prefix_in(dir.path(), "dimred"))
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert_eq!(summary.outputs.len(), 2);

    // one value per voxel, so read it back one row per voxel
    let sing = load_onedee_rows(&dir.path().join("dimred_sing.1D")).unwrap();
    assert_eq!(sing.grid.dims, (4, 1, 1));
    assert_eq!(sing.nvals, 1);
    for (v, row) in rows.iter().enumerate() {
        let norm = demeaned(row).iter().map(|x| x * x).sum::<f64>().sqrt();
        let sigma = f64::from(sing.series(v)[0]);
        assert!(sigma >= 0.0);
        assert_abs_diff_eq!(sigma, 5.0f64.sqrt() * norm, epsilon = 1e-4);
    }
}

#[test]
fn test_single_column_inputs_are_one_series_each() {
    let dir = tempfile::tempdir().unwrap();
    let series: Vec<f32> = (0..10).map(|t| ((t * 3) % 7) as f32 - 0.2 * t as f32).collect();
    let column = |factor: f32| -> Vec<Vec<f32>> { series.iter().map(|&x| vec![x * factor]).collect() };
    let a = write_onedee(dir.path(), "a.1D", &column(1.0));
    let b = write_onedee(dir.path(), "b.1D", &column(2.0));

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .prefix(prefix_in(dir.path(), "col"))
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert_eq!(summary.nvox, 1);
    assert_eq!(summary.nvals, 10);
    assert_eq!(summary.stats.processed, 1);

    let comp = open_dataset(&dir.path().join("col_001.1D")).unwrap();
    assert_eq!(comp.grid.dims, (1, 1, 1));
    assert_eq!(comp.nvals, 10);
    for (t, expected) in demeaned(&series).into_iter().enumerate() {
        assert_abs_diff_eq!(f64::from(comp.series(0)[t]), 5.0f64.sqrt() * expected, epsilon = 1e-4);
    }
}

#[test]
fn test_rank_must_be_below_input_count() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(2, 6);
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| write_onedee(dir.path(), &format!("in{i}.1D"), &scaled(&rows, i as f32 + 1.0)))
        .collect();

    let err = Config::builder().inputs(inputs).rdim(3).build().unwrap_err();
    assert_eq!(err, ConfigError::RankOutOfRange { rdim: 3, inputs: 3 });
}

#[test]
fn test_mismatched_voxel_counts_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_onedee(dir.path(), "a.1D", &base_rows(4, 10));
    let b = write_onedee(dir.path(), "b.1D", &base_rows(5, 10));

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .prefix(prefix_in(dir.path(), "dimred"))
        .build()
        .unwrap();
    let err = run(&config).unwrap_err();
    assert!(err.is_config());
    assert!(matches!(err, Error::Config(ConfigError::GridMismatch { .. })));
    assert!(!dir.path().join("dimred_001.1D").exists());
}

#[test]
fn test_rank_zero_validates_only() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(3, 8);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &rows);

    let config = Config::builder()
        .inputs([a, b])
        .rdim(0)
        .save_singular_values(true)
        .prefix(prefix_in(dir.path(), "dimred"))
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert!(summary.outputs.is_empty());
    assert_eq!(summary.nvals, 8);
    assert!(!dir.path().join("dimred_sing.1D").exists());
}

#[test]
fn test_bandpass_on_text_inputs_needs_time_step() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(2, 40);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &scaled(&rows, -1.5));
    let prefix = prefix_in(dir.path(), "bp");

    let config = Config::builder()
        .inputs([a.clone(), b.clone()])
        .rdim(1)
        .band(0.01, 0.2)
        .prefix(prefix.clone())
        .build()
        .unwrap();
    let err = run(&config).unwrap_err();
    assert!(matches!(err, Error::Config(ConfigError::MissingTimeStep { .. })));

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .band(0.01, 0.2)
        .dt(1.0)
        .prefix(prefix)
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert_eq!(summary.stats.processed, 2);
    let comp = open_dataset(&dir.path().join("bp_001.1D")).unwrap();
    let mean: f32 = comp.series(0).iter().sum::<f32>() / 40.0;
    assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-4);
}

#[test]
fn test_existing_outputs_need_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(2, 6);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &scaled(&rows, 3.0));
    let existing = dir.path().join("dimred_001.1D");
    std::fs::write(&existing, "stale\n").unwrap();

    let builder = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .prefix(prefix_in(dir.path(), "dimred"));

    let err = run(&builder.clone().build().unwrap()).unwrap_err();
    assert!(matches!(err, Error::OutputExists(ref p) if *p == existing));
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "stale\n");

    run(&builder.overwrite(true).build().unwrap()).unwrap();
    assert!(open_dataset(&existing).is_ok());
}

#[test]
fn test_directory_output_path_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(3, 8);
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| write_onedee(dir.path(), &format!("in{i}.1D"), &scaled(&rows, i as f32 + 1.0)))
        .collect();
    let blocked = dir.path().join("dimred_002.1D");
    std::fs::create_dir(&blocked).unwrap();

    let config = Config::builder()
        .inputs(inputs)
        .rdim(2)
        .save_singular_values(true)
        .overwrite(true)
        .prefix(prefix_in(dir.path(), "dimred"))
        .build()
        .unwrap();
    let err = run(&config).unwrap_err();
    assert!(matches!(err, Error::OutputNotFile(ref p) if *p == blocked));
    assert!(!dir.path().join("dimred_001.1D").exists());
    assert!(!dir.path().join("dimred_sing.1D").exists());
    assert!(blocked.is_dir());
}

#[test]
fn test_mask_limits_processed_voxels() {
    let dir = tempfile::tempdir().unwrap();
    let rows = base_rows(4, 10);
    let a = write_onedee(dir.path(), "a.1D", &rows);
    let b = write_onedee(dir.path(), "b.1D", &scaled(&rows, 0.5));
    let mask = write_onedee(
        dir.path(),
        "mask.1D",
        &[vec![1.0], vec![0.0], vec![1.0], vec![0.0]],
    );

    let config = Config::builder()
        .inputs([a, b])
        .rdim(1)
        .mask(MaskSpec::Dataset(mask))
        .prefix(prefix_in(dir.path(), "masked"))
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert_eq!(summary.stats.masked, 2);
    assert_eq!(summary.stats.processed, 2);

    let comp = open_dataset(&dir.path().join("masked_001.1D")).unwrap();
    assert!(comp.series(1).iter().all(|&x| x == 0.0));
    assert!(comp.series(3).iter().all(|&x| x == 0.0));
    assert!(comp.series(0).iter().any(|&x| x != 0.0));
}

#[test]
fn test_nifti_inputs_to_gzipped_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let nvals = 24;
    let grid = VolumeGrid::new((2, 2, 1));
    let inputs: Vec<PathBuf> = (0..3)
        .map(|i| {
            let path = dir.path().join(format!("run{i}.nii"));
            let data: Vec<f32> = (0..4 * nvals)
                .map(|n| {
                    let (v, t) = (n / nvals, n % nvals);
                    100.0
                        + (t as f32 * (0.4 + 0.1 * i as f32)).sin() * (v + 1) as f32
                        + 0.05 * t as f32
                })
                .collect();
            let ds = TimeSeriesDataset::from_voxel_major(
                &path,
                DatasetFormat::Nifti { gzip: false },
                grid.clone(),
                nvals,
                Some(2.0),
                data,
            )
            .unwrap();
            write_dataset(&ds).unwrap();
            path
        })
        .collect();

    let config = Config::builder()
        .inputs(inputs)
        .rdim(2)
        .polort(1)
        .despike(true)
        .save_singular_values(true)
        .threads(2)
        .prefix(prefix_in(dir.path(), "red.nii.gz"))
        .build()
        .unwrap();
    let summary = run(&config).unwrap();
    assert_eq!(summary.outputs.len(), 3);

    for r in 1..=2 {
        let comp = open_dataset(&dir.path().join(format!("red_{r:03}.nii.gz"))).unwrap();
        assert_eq!(comp.format, DatasetFormat::Nifti { gzip: true });
        assert_eq!(comp.grid.dims, (2, 2, 1));
        assert_eq!(comp.nvals, nvals);
        assert_eq!(comp.dt, Some(2.0));
    }

    let sing = open_dataset(&dir.path().join("red_sing.nii.gz")).unwrap();
    assert_eq!(sing.nvals, 2);
    for v in 0..4 {
        let s = sing.series(v);
        assert!(s[0] >= s[1] && s[1] >= 0.0);
    }
}
