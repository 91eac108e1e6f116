//! Input validation and path-traversal guard
//!
//! Argument checks run synchronously at the top of each operation; the path
//! guard runs before any filesystem access is attempted.

use std::path::{Component, Path, PathBuf};

use crate::errors::{MemoryError, Result};

/// Validate an embedding vector
pub fn validate_embedding(field: &str, embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(MemoryError::invalid_input(field, "cannot be empty"));
    }
    Ok(())
}

/// Validate a top_k argument
pub fn validate_top_k(top_k: usize) -> Result<()> {
    if top_k == 0 {
        return Err(MemoryError::invalid_input("top_k", "must be positive"));
    }
    Ok(())
}

/// Validate a max-age argument in hours
///
/// Zero is allowed: `prune(0)` is a documented no-op, rejected nowhere.
pub fn validate_max_age(max_age_hours: f64) -> Result<()> {
    if max_age_hours.is_nan() || max_age_hours < 0.0 {
        return Err(MemoryError::invalid_input(
            "max_age_hours",
            "must be non-negative",
        ));
    }
    Ok(())
}

/// Security check for path traversal.
///
/// The path must resolve, after following symlinks and relative segments,
/// to a location under `base_dir` or the system temp directory. Returns
/// `PathTraversal` otherwise, before any I/O on the path is attempted.
pub fn validate_store_path(path: &Path, base_dir: &Path) -> Result<()> {
    let resolved = resolve_path(path);
    let base = resolve_path(base_dir);
    let temp = resolve_path(&std::env::temp_dir());

    if resolved.starts_with(&base) || resolved.starts_with(&temp) {
        Ok(())
    } else {
        Err(MemoryError::PathTraversal(path.display().to_string()))
    }
}

/// Resolve a path to its real absolute form.
///
/// Symlinks are followed for the deepest existing prefix; components that do
/// not exist yet (e.g. a snapshot that has never been written) are appended
/// lexically after `.` and `..` normalization.
fn resolve_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };

    // Lexical normalization of `.` and `..`
    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    // Canonicalize the deepest existing ancestor, then re-attach the
    // not-yet-created tail.
    let mut existing = normalized.clone();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for name in tail.iter().rev() {
        resolved.push(name);
    }
    resolved
}
