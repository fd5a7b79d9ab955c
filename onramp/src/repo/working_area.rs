//! Working areas: exclusively owned scratch directories holding one checkout.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const AREA_PREFIX: &str = "onramp-";

/// Scratch directory for a single repository checkout.
///
/// Dropping an area removes it best-effort; [`WorkingArea::destroy`] removes
/// it and reports failure.
#[derive(Debug)]
pub struct WorkingArea {
    dir: TempDir,
}

impl WorkingArea {
    /// Create a fresh, empty area under `parent`.
    pub fn create(parent: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(AREA_PREFIX)
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Recursively remove the area.
    ///
    /// Read-only entries (git pack files on some platforms) are made writable
    /// and removal is retried once.
    pub fn destroy(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                tracing::debug!(path = %path.display(), "Fixing permissions before removal");
                force_writable(&path);
                std::fs::remove_dir_all(&path)
            }
            Err(e) if !path.exists() => {
                tracing::debug!(path = %path.display(), error = %e, "Area already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Clear the read-only bit on every entry below `root`, ignoring failures.
fn force_writable(root: &Path) {
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(metadata) = std::fs::symlink_metadata(&path) else {
            continue;
        };
        if metadata.file_type().is_symlink() {
            continue;
        }
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            if let Err(e) = std::fs::set_permissions(&path, permissions) {
                tracing::debug!(path = %path.display(), error = %e, "Could not make writable");
            }
        }
        if metadata.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&path) {
                stack.extend(entries.flatten().map(|entry| entry.path()));
            }
        }
    }
}
