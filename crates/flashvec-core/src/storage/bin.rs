//! Binary matrix file framing.
//!
//! Sibling index files share one layout: two little-endian `i32` values
//! (rows, cols) followed by the row-major data. Several sections may be
//! concatenated in one file; the `*_from` variants read sequentially from an
//! open stream for that case.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};

/// Reads one `(rows, cols)` matrix section from a stream.
///
/// # Errors
///
/// Returns [`Error::Load`] on a negative or overflowing shape and
/// [`Error::Io`] on short reads.
pub fn load_bin_from<T: Pod + Zeroable>(reader: &mut impl Read) -> Result<(Vec<T>, usize, usize)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let rows = i32::from_le_bytes(header[0..4].try_into().unwrap());
    let cols = i32::from_le_bytes(header[4..8].try_into().unwrap());
    if rows < 0 || cols < 0 {
        return Err(Error::Load(format!("negative bin shape ({rows}, {cols})")));
    }
    let (rows, cols) = (rows as usize, cols as usize);

    let count = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::Load(format!("bin shape ({rows}, {cols}) overflows")))?;
    let mut data = vec![T::zeroed(); count];
    reader.read_exact(bytemuck::cast_slice_mut(&mut data))?;

    Ok((data, rows, cols))
}

/// Reads a whole single-section `.bin` file.
///
/// # Errors
///
/// Same as [`load_bin_from`], plus [`Error::Load`] when the file is absent.
pub fn load_bin<T: Pod + Zeroable>(path: &Path) -> Result<(Vec<T>, usize, usize)> {
    let file = File::open(path)
        .map_err(|e| Error::Load(format!("bin file {}: {e}", path.display())))?;
    load_bin_from(&mut BufReader::new(file))
}

/// Writes one matrix section to a stream.
///
/// # Errors
///
/// Returns [`Error::Usage`] when `data.len() != rows * cols` and
/// [`Error::Io`] on write failure.
pub fn save_bin_to<T: Pod>(
    writer: &mut impl Write,
    data: &[T],
    rows: usize,
    cols: usize,
) -> Result<()> {
    if data.len() != rows * cols {
        return Err(Error::Usage(format!(
            "bin section has {} elements for shape ({rows}, {cols})",
            data.len()
        )));
    }
    writer.write_all(&(rows as i32).to_le_bytes())?;
    writer.write_all(&(cols as i32).to_le_bytes())?;
    writer.write_all(bytemuck::cast_slice(data))?;
    Ok(())
}

/// Writes a single-section `.bin` file.
///
/// # Errors
///
/// Same as [`save_bin_to`].
pub fn save_bin<T: Pod>(path: &Path, data: &[T], rows: usize, cols: usize) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    save_bin_to(&mut writer, data, rows, cols)?;
    writer.flush()?;
    Ok(())
}
