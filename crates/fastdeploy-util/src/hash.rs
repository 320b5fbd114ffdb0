//! Hashing utilities used to mint the deploy session token.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::UtilError;

/// Compute the SHA-256 hex digest of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash all files matching `pattern` inside `dir`, sorted by relative path
/// for determinism.
///
/// Relative paths are folded into the hash so renames are detected.
///
/// # Errors
/// Returns an error if the glob pattern is invalid or any matched file
/// cannot be read.
pub fn sha256_dir(dir: &Path, pattern: &str) -> Result<String, UtilError> {
    let full_pattern = dir.join(pattern);
    let full_pattern_str = full_pattern.display().to_string();

    let mut paths: Vec<_> = glob::glob(&full_pattern_str)
        .map_err(|e| UtilError::GlobPattern {
            pattern: full_pattern_str.clone(),
            message: e.to_string(),
        })?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();

    paths.sort();

    let mut hasher = Sha256::new();
    for path in &paths {
        let relative = path.strip_prefix(dir).unwrap_or(path);
        hasher.update(relative.display().to_string().as_bytes());

        let data = std::fs::read(path).map_err(|source| UtilError::Io {
            path: path.display().to_string(),
            source,
        })?;
        hasher.update(&data);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Mint a session token from the build output directory.
///
/// The token is the first eight bytes of the directory digest, so the same
/// output tree always yields the same token.
///
/// # Errors
/// Returns an error if the directory cannot be hashed.
pub fn token_from_dir(dir: &Path) -> Result<u64, UtilError> {
    let digest = sha256_dir(dir, "**/*")?;
    let leading = digest.get(..16).unwrap_or(&digest);
    // The digest is lowercase hex, so this parse cannot fail in practice;
    // fall back to 0 rather than panicking.
    Ok(u64::from_str_radix(leading, 16).unwrap_or(0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn sha256_bytes_deterministic() {
        let a = sha256_bytes(b"hello");
        let b = sha256_bytes(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sha256_bytes_empty() {
        // Known SHA-256 of empty input
        assert_eq!(
            sha256_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_dir_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.apk"), b"apk").unwrap();
        fs::write(dir.path().join("res.apk"), b"res").unwrap();

        let hash1 = sha256_dir(dir.path(), "**/*").unwrap();
        let hash2 = sha256_dir(dir.path(), "**/*").unwrap();
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn sha256_dir_detects_rename() {
        let dir1 = tempfile::tempdir().unwrap();
        fs::write(dir1.path().join("a.apk"), b"bytes").unwrap();

        let dir2 = tempfile::tempdir().unwrap();
        fs::write(dir2.path().join("b.apk"), b"bytes").unwrap();

        let hash1 = sha256_dir(dir1.path(), "**/*").unwrap();
        let hash2 = sha256_dir(dir2.path(), "**/*").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn token_is_stable_for_same_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.apk"), b"apk").unwrap();

        let t1 = token_from_dir(dir.path()).unwrap();
        let t2 = token_from_dir(dir.path()).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn token_changes_with_tree() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.apk"), b"apk").unwrap();
        let t1 = token_from_dir(dir.path()).unwrap();

        fs::write(dir.path().join("app.apk"), b"apk v2").unwrap();
        let t2 = token_from_dir(dir.path()).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn token_of_empty_dir_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = token_from_dir(dir.path()).unwrap();
        let t2 = token_from_dir(dir.path()).unwrap();
        assert_eq!(t1, t2);
    }
}
