//! NIfTI-1 file I/O
//!
//! Reads 3D and 3D+time datasets (`.nii` and `.nii.gz`, gzip is detected
//! from the bytes, not the name) and writes float32 3D+time datasets.
//! Data is converted between NIfTI's time-major, x-fastest layout and the
//! voxel-major layout of [`TimeSeriesDataset`].

use std::io::{Cursor, Write};
use std::path::Path;

use ::nifti::volume::ndarray::IntoNdArray;
use ::nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::debug;
use ndarray::Array;

use super::{DatasetFormat, TimeSeriesDataset, VolumeGrid};
use crate::error::{Error, Result};

const HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;

/// `xyzt_units` time codes
const UNITS_SEC: u8 = 8;
const UNITS_MSEC: u8 = 16;
const UNITS_USEC: u8 = 24;
const UNITS_MM: u8 = 2;

/// Check if bytes are gzip compressed
fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header summary for diagnostics
fn header_summary(bytes: &[u8]) -> String {
    if bytes.len() < HEADER_SIZE {
        return format!("file too small ({} bytes, need at least {})", bytes.len(), HEADER_SIZE);
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Load a NIfTI dataset from disk.
pub fn load_nifti_file(path: &Path) -> Result<TimeSeriesDataset> {
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    let gzip = is_gzip(&bytes);
    let dataset = load_nifti_bytes(&bytes, path)?;
    debug!(
        "loaded {}: grid {:?}, {} time points, dt {:?}",
        path.display(),
        dataset.grid.dims,
        dataset.nvals,
        dataset.dt
    );
    Ok(TimeSeriesDataset {
        format: DatasetFormat::Nifti { gzip },
        ..dataset
    })
}

/// Decode NIfTI bytes; `path` only labels errors and the result.
pub fn load_nifti_bytes(bytes: &[u8], path: &Path) -> Result<TimeSeriesDataset> {
    let obj: InMemNiftiObject = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let info = if std::io::Read::read_to_end(&mut decoder, &mut decompressed).is_ok() {
                header_summary(&decompressed)
            } else {
                "could not decompress".to_string()
            };
            Error::format(path, format!("{} ({})", e, info))
        })?
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| Error::format(path, format!("{} ({})", e, header_summary(bytes))))?
    };

    let header = obj.header();
    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(Error::format(path, format!("expected at least 3D volume, got {}D", ndim)));
    }

    let vsx = header.pixdim[1] as f64;
    let vsy = header.pixdim[2] as f64;
    let vsz = header.pixdim[3] as f64;
    let dt = if ndim >= 4 { time_step(header) } else { None };
    let affine = get_affine(header);

    let volume = obj.into_volume();
    let array: Array<f32, _> = volume
        .into_ndarray()
        .map_err(|e| Error::format(path, format!("cannot convert volume: {}", e)))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(Error::format(path, format!("expected at least 3D array, got {}D", shape.len())));
    }
    if shape.len() > 4 && shape[4..].iter().any(|&d| d > 1) {
        return Err(Error::format(path, format!("{}D datasets are not supported", shape.len())));
    }

    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 { shape[3] } else { 1 };

    // voxel index = x + y*nx + z*nx*ny (NIfTI order), series contiguous per voxel
    let mut data = vec![0.0f32; nx * ny * nz * nt];
    let mut index = vec![0usize; shape.len()];
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let v = i + j * nx + k * nx * ny;
                index[0] = i;
                index[1] = j;
                index[2] = k;
                for (t, val) in data[v * nt..(v + 1) * nt].iter_mut().enumerate() {
                    if shape.len() > 3 {
                        index[3] = t;
                    }
                    *val = array[index.as_slice()];
                }
            }
        }
    }

    let grid = VolumeGrid {
        dims: (nx, ny, nz),
        voxel_size: (vsx, vsy, vsz),
        affine,
    };
    TimeSeriesDataset::from_voxel_major(path, DatasetFormat::Nifti { gzip: false }, grid, nt, dt, data)
}

/// Sampling interval in seconds from `pixdim[4]`, honoring the time unit.
fn time_step(header: &NiftiHeader) -> Option<f64> {
    let raw = header.pixdim[4] as f64;
    if !raw.is_finite() || raw <= 0.0 {
        return None;
    }
    let scale = match header.xyzt_units & 0x38 {
        UNITS_MSEC => 1e-3,
        UNITS_USEC => 1e-6,
        _ => 1.0,
    };
    Some(raw * scale)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        // Fall back to identity with voxel scaling
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Encode a dataset as an uncompressed single-file NIfTI-1 (float32).
pub fn encode_nifti(dataset: &TimeSeriesDataset) -> Result<Vec<u8>> {
    let (nx, ny, nz) = dataset.grid.dims;
    let (vsx, vsy, vsz) = dataset.grid.voxel_size;
    let nt = dataset.nvals;
    let affine = &dataset.grid.affine;

    for (axis, n) in [("x", nx), ("y", ny), ("z", nz), ("t", nt)] {
        if n == 0 || n > i16::MAX as usize {
            return Err(Error::format(
                &dataset.path,
                format!("{} dimension {} cannot be stored in a NIfTI-1 header", axis, n),
            ));
        }
    }

    let mut header = [0u8; HEADER_SIZE];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&(HEADER_SIZE as i32).to_le_bytes());

    // dim[0..7]
    let ndim: i16 = if nt > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    // datatype = 16 (FLOAT32), bitpix = 32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    // pixdim[0..7], pixdim[4] is the time step
    let dt = dataset.dt.unwrap_or(1.0) as f32;
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, dt, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension)
    header[108..112].copy_from_slice(&(VOX_OFFSET as f32).to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // xyzt_units: mm and seconds
    header[123] = UNITS_MM | UNITS_SEC;

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    for (row, base) in [280usize, 296, 312].into_iter().enumerate() {
        for i in 0..4 {
            let offset = base + i * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + i] as f32).to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    let nvox = dataset.nvox();
    let mut buffer = Vec::with_capacity(VOX_OFFSET + nvox * nt * 4);
    buffer.extend_from_slice(&header);
    // extension (4 bytes, all zeros = no extension)
    buffer.extend_from_slice(&[0u8; 4]);

    // time-major on disk
    let values = dataset.as_slice();
    for t in 0..nt {
        for v in 0..nvox {
            buffer.extend_from_slice(&values[v * nt + t].to_le_bytes());
        }
    }

    Ok(buffer)
}

/// Write a dataset to `dataset.path`, gzipped when asked.
pub fn save_nifti_file(dataset: &TimeSeriesDataset, gzip: bool) -> Result<()> {
    let path = &dataset.path;
    let uncompressed = encode_nifti(dataset)?;

    let bytes = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&uncompressed).map_err(|e| Error::io(path, e))?;
        encoder.finish().map_err(|e| Error::io(path, e))?
    } else {
        uncompressed
    };

    std::fs::write(path, bytes).map_err(|e| Error::io(path, e))?;
    debug!("wrote {} ({} time points)", path.display(), dataset.nvals);
    Ok(())
}
