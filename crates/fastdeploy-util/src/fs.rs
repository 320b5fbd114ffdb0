//! Filesystem utilities for fastdeploy.

use std::path::Path;

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Read a file to a string, returning `None` if it does not exist.
///
/// A missing build-info file is an expected state (first build, or cleaned
/// project), so absence is not an error.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn read_if_exists(path: &Path) -> Result<Option<String>, UtilError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Write `content` to `path` atomically, creating parent directories.
///
/// Uses write-to-temp-then-rename so a crash mid-write never leaves a
/// truncated file behind.
///
/// # Errors
/// Returns an error if the parent directory cannot be created or the file
/// cannot be written or renamed.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), UtilError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp_path = path.with_extension("xml.tmp");
    std::fs::write(&tmp_path, content).map_err(|source| UtilError::Io {
        path: tmp_path.display().to_string(),
        source,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Remove a file. No error if it is already absent.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Copy `src` to `dest`, creating parent directories of `dest`.
///
/// # Errors
/// Returns an error if the copy fails.
pub fn copy_file(src: &Path, dest: &Path) -> Result<(), UtilError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(src, dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    Ok(())
}
