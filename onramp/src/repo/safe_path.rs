//! Sandboxed path resolution against a working-area root.

use std::path::{Component, Path, PathBuf};

use crate::error::{OnrampError, OnrampResult};

/// Resolve `relative_path` under `root`, rejecting anything that lands outside.
///
/// The joined path is normalized lexically first, then resolved through the
/// filesystem: an existing target is canonicalized as a whole, a missing one
/// through its deepest existing ancestor. Either way every symlink on the way
/// is followed, so one that points out of the root is an escape. Containment
/// is checked per path component, never by string prefix.
pub fn resolve(root: &Path, relative_path: &str) -> OnrampResult<PathBuf> {
    let canon_root = root.canonicalize()?;
    let normalized = normalize_lexically(&canon_root.join(relative_path));
    if !normalized.starts_with(&canon_root) {
        return Err(OnrampError::path_escape(relative_path));
    }

    let resolved = canonicalize_existing_prefix(&normalized);
    if !resolved.starts_with(&canon_root) {
        return Err(OnrampError::path_escape(relative_path));
    }
    Ok(resolved)
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest.
fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(canon) = ancestor.canonicalize() {
            return match path.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => canon.join(rest),
                _ => canon,
            };
        }
    }
    path.to_path_buf()
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
