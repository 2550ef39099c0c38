// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::io::Write;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, IxDyn, ShapeBuilder};

use crate::bootstrap::{BootstrapResult, BootstrapSample};
use crate::core::{PointSet, SlipVector};
use crate::error::{Result, SlipError};
use crate::inversion::MisfitGrid;

/// MAT variable holding an N x 3 point array.
pub const POINTS_VARIABLE: &str = "xyz";

/// Supported file formats for array I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(SlipError::UnsupportedFileFormat(ext.to_string())),
        None => Err(SlipError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Load a .npy array of f64 (or f32, promoted) as its shape and row-major data.
fn load_npy_array(path: &Path) -> Result<(Vec<usize>, Vec<f64>)> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| SlipError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(|v| v as f64)
        }
    };
    // Logical (row-major) order regardless of the file's memory order.
    Ok((arr.shape().to_vec(), arr.iter().copied().collect()))
}

/// Load a .mat variable as its shape and row-major data.
fn load_mat_array(path: &Path, variable_name: &str) -> Result<(Vec<usize>, Vec<f64>)> {
    let mat = parse_mat(path)?;
    let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();
    let array = mat
        .find_by_name(variable_name)
        .ok_or_else(|| SlipError::MatVariableNotFound {
            expected: variable_name.to_string(),
            available,
        })?;
    mat_array_row_major(array)
}

fn parse_mat(path: &Path) -> Result<matfile::MatFile> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    matfile::MatFile::parse(&mut reader)
        .map_err(|e| SlipError::Other(format!("MAT parse error: {}", e)))
}

fn mat_array_row_major(array: &matfile::Array) -> Result<(Vec<usize>, Vec<f64>)> {
    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, imag: _ } => real.clone(),
        matfile::NumericData::Single { real, imag: _ } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(SlipError::UnsupportedDtype(format!(
                "MAT variable '{}' is not f64 or f32",
                array.name()
            )))
        }
    };
    let shape: Vec<usize> = array.size().to_vec();
    // MAT data is column-major.
    let arr = ArrayD::from_shape_vec(IxDyn(&shape).f(), data)
        .map_err(|e| SlipError::Other(format!("shape error: {}", e)))?;
    Ok((shape, arr.iter().copied().collect()))
}

/// Load an N x 3 point array from .npy or .mat (variable `xyz`).
///
/// # Errors
/// Returns `ShapeMismatch` if the array is not two-dimensional with 3 columns.
pub fn load_points(path: &Path) -> Result<PointSet> {
    let (shape, data) = match infer_format(path)? {
        FileFormat::Npy => load_npy_array(path)?,
        FileFormat::Mat => load_mat_array(path, POINTS_VARIABLE)?,
    };
    if shape.len() != 2 || shape[1] != 3 {
        return Err(SlipError::ShapeMismatch {
            expected: vec![shape.first().copied().unwrap_or(0), 3],
            got: shape,
        });
    }
    PointSet::from_flat(&data)
}

/// Save points as an N x 3 array to .npy or .mat (variable `xyz`).
pub fn save_points(points: &PointSet, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => {
            let arr = Array2::from_shape_vec((points.len(), 3), points.to_flat())
                .map_err(|e| SlipError::Other(format!("shape error: {}", e)))?;
            write_npy(path, &arr)
        }
        FileFormat::Mat => {
            let var = MatVariable::from_rows(POINTS_VARIABLE, points.len(), 3, &points.to_flat());
            write_mat_level5(path, &[var])
        }
    }
}

/// Save a slip-space misfit grid.
///
/// `.npy` holds one `(dx, dy, misfit)` row per node; `.mat` holds column
/// vectors `dx` and `dy` and the `dx.len()` x `dy.len()` matrix `misfit`.
pub fn save_misfit_grid(grid: &MisfitGrid, path: &Path) -> Result<()> {
    match infer_format(path)? {
        FileFormat::Npy => {
            let rows = grid.rows();
            let flat: Vec<f64> = rows.iter().flatten().copied().collect();
            let arr = Array2::from_shape_vec((rows.len(), 3), flat)
                .map_err(|e| SlipError::Other(format!("shape error: {}", e)))?;
            write_npy(path, &arr)
        }
        FileFormat::Mat => {
            let (nx, ny) = (grid.dx.len(), grid.dy.len());
            write_mat_level5(
                path,
                &[
                    MatVariable::from_rows("dx", nx, 1, &grid.dx),
                    MatVariable::from_rows("dy", ny, 1, &grid.dy),
                    MatVariable::from_rows("misfit", nx, ny, &grid.values),
                ],
            )
        }
    }
}

fn write_npy<T>(path: &Path, arr: &T) -> Result<()>
where
    T: ndarray_npy::WriteNpyExt,
{
    ndarray_npy::write_npy(path, arr)
        .map_err(|e| SlipError::Other(format!("npy write error: {}", e)))
}

/// A real f64 matrix to be written to a MAT file.
#[derive(Debug, Clone)]
struct MatVariable {
    name: String,
    dims: [usize; 2],
    /// Column-major data.
    data: Vec<f64>,
}

impl MatVariable {
    /// Build from row-major `rows x cols` data.
    fn from_rows(name: &str, rows: usize, cols: usize, row_major: &[f64]) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for c in 0..cols {
            for r in 0..rows {
                data.push(row_major[r * cols + c]);
            }
        }
        MatVariable {
            name: name.to_string(),
            dims: [rows, cols],
            data,
        }
    }
}

/// Round up to the 8-byte boundary data elements are padded to.
fn padded(len: u32) -> u32 {
    len.div_ceil(8) * 8
}

fn write_padding<W: Write>(w: &mut W, data_len: u32) -> Result<()> {
    let pad = (padded(data_len) - data_len) as usize;
    if pad > 0 {
        w.write_all(&vec![0u8; pad])?;
    }
    Ok(())
}

/// Minimal MAT-file Level 5 writer for real f64 matrices.
///
/// The `matfile` crate reads MAT files but cannot write them, so the writer
/// is hand-rolled: a 128-byte header followed by one uncompressed miMATRIX
/// element per variable (array flags, dimensions, name, real part).
///
/// Reference: <https://www.mathworks.com/help/pdf_doc/matlab/matfile_format.pdf>
fn write_mat_level5(path: &Path, variables: &[MatVariable]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut w = std::io::BufWriter::new(file);

    // Header: 116 bytes of text, 8-byte subsystem offset, version, endian "IM".
    let desc = b"MATLAB 5.0 MAT-file, created by fault-slip";
    let mut header_text = [b' '; 116];
    header_text[..desc.len()].copy_from_slice(desc);
    w.write_all(&header_text)?;
    w.write_all(&[0u8; 8])?;
    w.write_all(&0x0100u16.to_le_bytes())?;
    w.write_all(b"IM")?;

    for var in variables {
        let dims_size = 8u32;
        let name_bytes = var.name.as_bytes();
        let name_size = name_bytes.len() as u32;
        let real_size = (var.data.len() * 8) as u32;
        let matrix_size =
            16 + (8 + padded(dims_size)) + (8 + padded(name_size)) + (8 + padded(real_size));

        // miMATRIX = 14
        w.write_all(&14u32.to_le_bytes())?;
        w.write_all(&matrix_size.to_le_bytes())?;

        // Array flags: miUINT32 tag, mxDOUBLE_CLASS = 6, reserved.
        w.write_all(&6u32.to_le_bytes())?;
        w.write_all(&8u32.to_le_bytes())?;
        w.write_all(&6u32.to_le_bytes())?;
        w.write_all(&0u32.to_le_bytes())?;

        // Dimensions: miINT32 = 5
        w.write_all(&5u32.to_le_bytes())?;
        w.write_all(&dims_size.to_le_bytes())?;
        for &d in &var.dims {
            w.write_all(&(d as i32).to_le_bytes())?;
        }
        write_padding(&mut w, dims_size)?;

        // Name: miINT8 = 1
        w.write_all(&1u32.to_le_bytes())?;
        w.write_all(&name_size.to_le_bytes())?;
        w.write_all(name_bytes)?;
        write_padding(&mut w, name_size)?;

        // Real part: miDOUBLE = 9
        w.write_all(&9u32.to_le_bytes())?;
        w.write_all(&real_size.to_le_bytes())?;
        for &val in &var.data {
            w.write_all(&val.to_le_bytes())?;
        }
        write_padding(&mut w, real_size)?;
    }

    w.flush()?;
    Ok(())
}

/// Check that `name` can key a horizon in an archive: non-empty, starting
/// with an ASCII letter, followed by ASCII letters, digits, or '_'.
pub fn validate_horizon_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SlipError::InvalidName(name.to_string()))
    }
}

/// Bootstrap samples of one horizon, as stored in an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonRecord {
    /// Horizon name.
    pub name: String,
    /// Inverted slips, one per valid trial.
    pub slips: Vec<SlipVector>,
    /// Roughness per slip.
    pub roughness: Vec<f64>,
}

impl HorizonRecord {
    /// Build a record from samples.
    ///
    /// # Errors
    /// Returns `InvalidName` for a name that cannot key a dataset.
    pub fn new(name: &str, samples: &[BootstrapSample]) -> Result<Self> {
        validate_horizon_name(name)?;
        Ok(HorizonRecord {
            name: name.to_string(),
            slips: samples.iter().map(|s| s.slip).collect(),
            roughness: samples.iter().map(|s| s.roughness).collect(),
        })
    }

    /// Build a record from the valid samples of a bootstrap run.
    ///
    /// # Errors
    /// Returns `InvalidName` for a name that cannot key a dataset.
    pub fn from_result(name: &str, result: &BootstrapResult) -> Result<Self> {
        HorizonRecord::new(name, &result.samples())
    }

    /// The stored samples.
    pub fn samples(&self) -> Vec<BootstrapSample> {
        self.slips
            .iter()
            .zip(&self.roughness)
            .map(|(&slip, &roughness)| BootstrapSample { slip, roughness })
            .collect()
    }

    fn slip_rows(&self) -> Vec<f64> {
        self.slips.iter().flat_map(|s| s.to_array()).collect()
    }

    fn from_arrays(
        name: &str,
        slip_shape: &[usize],
        slips: &[f64],
        roughness: Vec<f64>,
    ) -> Result<Self> {
        validate_horizon_name(name)?;
        if slip_shape.len() != 2 || slip_shape[1] != 2 || slip_shape[0] != roughness.len() {
            return Err(SlipError::ShapeMismatch {
                expected: vec![roughness.len(), 2],
                got: slip_shape.to_vec(),
            });
        }
        Ok(HorizonRecord {
            name: name.to_string(),
            slips: slips.chunks_exact(2).map(|c| SlipVector::new(c[0], c[1])).collect(),
            roughness,
        })
    }
}

/// Bootstrap results for several horizons sharing one shear angle.
///
/// Saved as a single `.mat` file (variables `alpha`, `<name>_slip`,
/// `<name>_variance`) or, for any other path, as a directory holding
/// `alpha.npy` and one `<name>/slip.npy` + `<name>/variance.npy` pair per horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapArchive {
    /// Shear angle in degrees.
    pub alpha: f64,
    /// Horizon records in insertion order.
    pub horizons: Vec<HorizonRecord>,
}

const SLIP_SUFFIX: &str = "_slip";
const VARIANCE_SUFFIX: &str = "_variance";

impl BootstrapArchive {
    /// An empty archive for shear angle `alpha` (degrees).
    pub fn new(alpha: f64) -> Self {
        BootstrapArchive {
            alpha,
            horizons: Vec::new(),
        }
    }

    /// Add a horizon.
    ///
    /// # Errors
    /// Returns `InvalidName` if a horizon with the same name is already present.
    pub fn push(&mut self, record: HorizonRecord) -> Result<()> {
        validate_horizon_name(&record.name)?;
        if self.get(&record.name).is_some() {
            return Err(SlipError::InvalidName(format!("{} (duplicate)", record.name)));
        }
        self.horizons.push(record);
        Ok(())
    }

    /// The record for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&HorizonRecord> {
        self.horizons.iter().find(|h| h.name == name)
    }

    /// Write the archive; `.mat` paths produce one file, anything else a directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        if is_mat(path) {
            self.save_mat(path)
        } else {
            self.save_dir(path)
        }
    }

    /// Read an archive written by [`BootstrapArchive::save`].
    pub fn load(path: &Path) -> Result<Self> {
        if is_mat(path) {
            Self::load_mat(path)
        } else {
            Self::load_dir(path)
        }
    }

    fn save_mat(&self, path: &Path) -> Result<()> {
        let mut vars = vec![MatVariable::from_rows("alpha", 1, 1, &[self.alpha])];
        for h in &self.horizons {
            let n = h.slips.len();
            vars.push(MatVariable::from_rows(
                &format!("{}{}", h.name, SLIP_SUFFIX),
                n,
                2,
                &h.slip_rows(),
            ));
            vars.push(MatVariable::from_rows(
                &format!("{}{}", h.name, VARIANCE_SUFFIX),
                n,
                1,
                &h.roughness,
            ));
        }
        write_mat_level5(path, &vars)
    }

    fn load_mat(path: &Path) -> Result<Self> {
        let mat = parse_mat(path)?;
        let available: Vec<String> = mat.arrays().iter().map(|a| a.name().to_string()).collect();
        let find = |name: &str| {
            mat.find_by_name(name).ok_or_else(|| SlipError::MatVariableNotFound {
                expected: name.to_string(),
                available: available.clone(),
            })
        };

        let (_, alpha) = mat_array_row_major(find("alpha")?)?;
        let alpha = alpha.first().copied().ok_or_else(|| SlipError::ShapeMismatch {
            expected: vec![1, 1],
            got: vec![0],
        })?;

        let mut archive = BootstrapArchive::new(alpha);
        for array in mat.arrays() {
            let Some(name) = array.name().strip_suffix(SLIP_SUFFIX) else {
                continue;
            };
            let (slip_shape, slips) = mat_array_row_major(array)?;
            let variance = find(&format!("{}{}", name, VARIANCE_SUFFIX))?;
            let (_, roughness) = mat_array_row_major(variance)?;
            archive.push(HorizonRecord::from_arrays(name, &slip_shape, &slips, roughness)?)?;
        }
        Ok(archive)
    }

    fn save_dir(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        write_npy(&path.join("alpha.npy"), &Array1::from_vec(vec![self.alpha]))?;
        for h in &self.horizons {
            let dir = path.join(&h.name);
            std::fs::create_dir_all(&dir)?;
            let slips = Array2::from_shape_vec((h.slips.len(), 2), h.slip_rows())
                .map_err(|e| SlipError::Other(format!("shape error: {}", e)))?;
            write_npy(&dir.join("slip.npy"), &slips)?;
            write_npy(&dir.join("variance.npy"), &Array1::from_vec(h.roughness.clone()))?;
        }
        Ok(())
    }

    fn load_dir(path: &Path) -> Result<Self> {
        let (_, alpha) = load_npy_array(&path.join("alpha.npy"))?;
        let alpha = alpha.first().copied().ok_or_else(|| SlipError::ShapeMismatch {
            expected: vec![1],
            got: vec![0],
        })?;

        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();

        let mut archive = BootstrapArchive::new(alpha);
        for name in names {
            let dir = path.join(&name);
            let (slip_shape, slips) = load_npy_array(&dir.join("slip.npy"))?;
            let (_, roughness) = load_npy_array(&dir.join("variance.npy"))?;
            archive.push(HorizonRecord::from_arrays(&name, &slip_shape, &slips, roughness)?)?;
        }
        Ok(archive)
    }
}

fn is_mat(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("mat")
}
