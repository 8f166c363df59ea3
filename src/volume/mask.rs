//! Voxel selection

use log::info;

use super::{onedee, open_dataset, DatasetFormat, VolumeGrid};
use crate::config::MaskSpec;
use crate::error::{ConfigError, Result};

/// Per-voxel flag: process this voxel or leave its output at zero.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    flags: Vec<bool>,
}

impl Mask {
    /// Every voxel selected.
    pub fn all(nvox: usize) -> Self {
        Self {
            flags: vec![true; nvox],
        }
    }

    pub fn from_flags(flags: Vec<bool>) -> Self {
        Self { flags }
    }

    #[inline]
    pub fn contains(&self, v: usize) -> bool {
        self.flags[v]
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Number of selected voxels.
    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&m| m).count()
    }
}

/// Build the mask for `grid`.
///
/// A mask dataset selects its nonzero voxels in the first volume and must
/// share the grid of the inputs.
pub fn build_mask(spec: &MaskSpec, grid: &VolumeGrid) -> Result<Mask> {
    match spec {
        MaskSpec::All => Ok(Mask::all(grid.nvox())),
        MaskSpec::Dataset(path) => {
            // a single-column text mask lists one value per voxel
            let dataset = match DatasetFormat::from_path(path) {
                Some(DatasetFormat::OneD) => onedee::load_onedee_rows(path)?,
                _ => open_dataset(path)?,
            };
            if !dataset.grid.same_dims(grid) {
                return Err(ConfigError::MaskGridMismatch {
                    path: path.clone(),
                    expected: grid.dims,
                    found: dataset.grid.dims,
                }
                .into());
            }
            let flags = (0..dataset.nvox())
                .map(|v| dataset.series(v).first().is_some_and(|&x| x != 0.0))
                .collect();
            let mask = Mask::from_flags(flags);
            info!("mask {}: {} of {} voxels", path.display(), mask.count(), mask.len());
            Ok(mask)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_all_mask() {
        let mask = build_mask(&MaskSpec::All, &VolumeGrid::new((2, 3, 4))).unwrap();
        assert_eq!(mask.len(), 24);
        assert_eq!(mask.count(), 24);
    }

    #[test]
    fn test_mask_from_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.1D");
        std::fs::write(&path, "1 0\n0 0\n2.5 1\n").unwrap();

        let mask = build_mask(&MaskSpec::Dataset(path.clone()), &VolumeGrid::new((3, 1, 1))).unwrap();
        assert_eq!(mask.count(), 2);
        assert!(mask.contains(0));
        assert!(!mask.contains(1));
        assert!(mask.contains(2));

        let err = build_mask(&MaskSpec::Dataset(path), &VolumeGrid::new((4, 1, 1))).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::MaskGridMismatch { .. })));
    }

    #[test]
    fn test_single_column_mask_is_per_voxel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.1D");
        std::fs::write(&path, "1\n0\n1\n1\n").unwrap();

        let mask = build_mask(&MaskSpec::Dataset(path), &VolumeGrid::new((4, 1, 1))).unwrap();
        assert_eq!(mask.count(), 3);
        assert!(!mask.contains(1));
    }
}
