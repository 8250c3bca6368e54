//! File inspection and file-tree helpers.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Default number of bytes inspected by [`is_binary`], [`get_bof`] and [`get_eof`].
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Whether a byte is allowed in a text file: BEL, BS, TAB, LF, FF, CR, ESC,
/// printable ASCII and everything from 0x80 upwards.
fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7 | 8 | 9 | 10 | 12 | 13 | 27 | 0x20..=0x7E | 0x80..=0xFF)
}

/// Check whether the first `chunk_size` bytes of a file contain any byte
/// outside the text set.
pub fn is_binary(path: &Path, chunk_size: usize) -> std::io::Result<bool> {
    let head = get_bof(path, chunk_size)?;
    Ok(head.iter().any(|&b| !is_text_byte(b)))
}

/// Read the first `chunk_size` bytes of a file (less if the file is shorter).
pub fn get_bof(path: &Path, chunk_size: usize) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = Vec::with_capacity(chunk_size);
    file.take(chunk_size as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Read the last `chunk_size` bytes of a file (the whole file if it is shorter).
pub fn get_eof(path: &Path, chunk_size: usize) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let start = size.saturating_sub(chunk_size as u64);
    file.seek(SeekFrom::Start(start))?;
    let mut buffer = Vec::with_capacity(chunk_size);
    file.take(chunk_size as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Read the width and height of an image from its header.
///
/// Supports the raster formats enabled for the `image` crate (PNG, JPEG,
/// GIF, TIFF, BMP, WebP).
pub fn image_size(path: &Path) -> Result<(u32, u32), CoreError> {
    image::image_dimensions(path).map_err(|e| CoreError::ImageIdentification {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Recursively collect the files under `path`, in sorted order.
///
/// Paths listed in `exclude` are skipped together with their children. If
/// `path` is itself a file it is returned on its own.
pub fn find_files(path: &Path, exclude: &[PathBuf]) -> Result<Vec<PathBuf>, CoreError> {
    let mut files = Vec::new();
    collect_files(path, exclude, &mut files)?;
    Ok(files)
}

fn collect_files(path: &Path, exclude: &[PathBuf], files: &mut Vec<PathBuf>) -> Result<(), CoreError> {
    if exclude.iter().any(|e| e == path) {
        return Ok(());
    }

    if path.is_file() {
        files.push(path.to_path_buf());
    } else if path.is_dir() {
        let mut entries = fs::read_dir(path)
            .map_err(|e| CoreError::FileCollection(format!("{}: {e}", path.display())))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CoreError::FileCollection(format!("{}: {e}", path.display())))?;
        entries.sort();

        let nested: Vec<PathBuf> = exclude.iter().filter(|e| e.starts_with(path)).cloned().collect();
        for entry in entries {
            collect_files(&entry, &nested, files)?;
        }
    }

    Ok(())
}

/// Remove a file, or a directory and everything it contains.
///
/// A path that does not exist is not an error.
pub fn rm_tree(path: &Path) -> std::io::Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
