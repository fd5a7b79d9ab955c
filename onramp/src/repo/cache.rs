//! Repository cache: one acquisition per reference for the process lifetime.
//!
//! Each reference owns a single-flight slot, so concurrent first-time
//! analyses of the same reference share one fetch. Working areas live in a
//! central arena and entries refer to them by [`AreaId`]; only
//! [`RepositoryCache::teardown_all`] destroys them.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;

use super::safe_path;
use super::source::{display_name, ReferenceValidator, RepositorySource};
use super::tree::{count_nodes, TreeBuilder, TreeNode};
use super::working_area::WorkingArea;
use crate::error::{OnrampError, OnrampResult};

/// Handle to a working area held by the cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AreaId(usize);

/// Immutable result of analyzing one reference.
#[derive(Debug)]
pub struct CacheEntry {
    pub reference: String,
    pub display_name: String,
    pub area: AreaId,
    pub tree: Vec<TreeNode>,
    root: PathBuf,
}

impl CacheEntry {
    /// Root of the checkout inside the working area.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn analysis(&self) -> RepoAnalysis {
        RepoAnalysis {
            name: self.display_name.clone(),
            url: self.reference.clone(),
            structure: self.tree.clone(),
        }
    }
}

/// Analysis payload returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepoAnalysis {
    pub name: String,
    pub url: String,
    pub structure: Vec<TreeNode>,
}

/// Working area that could not be removed during teardown.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of [`RepositoryCache::teardown_all`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct TeardownReport {
    pub removed: usize,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

type Slot = Arc<OnceCell<Arc<CacheEntry>>>;

#[derive(Default)]
struct Arena {
    next: usize,
    areas: BTreeMap<AreaId, WorkingArea>,
}

/// Process-wide store of analyzed repositories.
pub struct RepositoryCache {
    source: Arc<dyn RepositorySource>,
    tree_builder: TreeBuilder,
    validator: ReferenceValidator,
    work_root: PathBuf,
    slots: Mutex<HashMap<String, Slot>>,
    arena: Mutex<Arena>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RepositoryCache {
    pub fn new(
        source: Arc<dyn RepositorySource>,
        tree_builder: TreeBuilder,
        validator: ReferenceValidator,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            tree_builder,
            validator,
            work_root: work_root.into(),
            slots: Mutex::new(HashMap::new()),
            arena: Mutex::new(Arena::default()),
        }
    }

    pub fn validator(&self) -> &ReferenceValidator {
        &self.validator
    }

    /// Analyze `reference`, fetching it only if no entry exists yet.
    ///
    /// Invalid references are rejected before the cache or filesystem is
    /// touched. A failed acquisition leaves the slot empty, so a later call
    /// tries again.
    pub async fn analyze(&self, reference: &str) -> OnrampResult<Arc<CacheEntry>> {
        if let Err(e) = self.validator.validate(reference) {
            tracing::warn!(reference, "Invalid repository reference format");
            return Err(e);
        }

        let slot = self.slot(reference);
        if let Some(entry) = slot.get() {
            tracing::info!(reference, root = %entry.root.display(), "Using cached repository");
            return Ok(Arc::clone(entry));
        }

        match slot.get_or_try_init(|| self.acquire(reference)).await {
            Ok(entry) => Ok(Arc::clone(entry)),
            Err(e) => {
                self.forget_empty_slot(reference, &slot);
                Err(e)
            }
        }
    }

    /// Non-mutating read of an existing entry.
    pub fn lookup(&self, reference: &str) -> Option<Arc<CacheEntry>> {
        lock(&self.slots)
            .get(reference)
            .and_then(|slot| slot.get().cloned())
    }

    /// Read a file of an analyzed repository as text.
    ///
    /// Invalid UTF-8 is replaced, never reported.
    pub async fn resolve_file(&self, reference: &str, relative_path: &str) -> OnrampResult<String> {
        let entry = self.lookup(reference).ok_or_else(|| {
            tracing::warn!(reference, "Repository not found in cache");
            OnrampError::not_found("Repository not found or hasn't been analyzed yet")
        })?;

        let path = match safe_path::resolve(entry.root(), relative_path) {
            Ok(path) => path,
            Err(e @ OnrampError::PathEscape { .. }) => {
                tracing::warn!(reference, "Rejected file path outside repository bounds");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            tracing::warn!(reference, path = %relative_path, "File does not exist or is not a file");
            return Err(OnrampError::not_found(format!(
                "File does not exist in the repository: {relative_path}"
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        tracing::debug!(reference, path = %relative_path, bytes = bytes.len(), "Read file content");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Destroy every working area and forget every entry.
    ///
    /// Failures are collected; one stuck directory never stops the pass.
    pub fn teardown_all(&self) -> TeardownReport {
        let entries = std::mem::take(&mut *lock(&self.slots));
        let areas = std::mem::take(&mut lock(&self.arena).areas);

        let mut report = TeardownReport::default();
        for (id, area) in areas {
            let path = area.path().to_path_buf();
            match area.destroy() {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    tracing::warn!(area = id.0, path = %path.display(), error = %e, "Failed to remove working area");
                    report.failures.push(TeardownFailure {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            entries = entries.len(),
            removed = report.removed,
            failed = report.failures.len(),
            "Repository cache torn down"
        );
        report
    }

    /// Number of analyzed references.
    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of working areas currently on disk.
    pub fn area_count(&self) -> usize {
        lock(&self.arena).areas.len()
    }

    fn slot(&self, reference: &str) -> Slot {
        let mut slots = lock(&self.slots);
        Arc::clone(slots.entry(reference.to_string()).or_default())
    }

    /// Drop `slot` from the map if it is still empty and nobody else waits on it.
    fn forget_empty_slot(&self, reference: &str, slot: &Slot) {
        let mut slots = lock(&self.slots);
        let idle = slots.get(reference).is_some_and(|current| {
            // One count for the map, one for `slot`; clones are only taken under this lock
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if idle {
            slots.remove(reference);
        }
    }

    async fn acquire(&self, reference: &str) -> OnrampResult<Arc<CacheEntry>> {
        let started = Instant::now();
        let area = WorkingArea::create(&self.work_root)?;
        tracing::info!(reference, dest = %area.path().display(), "Cloning repository");

        if let Err(e) = self.source.fetch(reference, area.path()).await {
            tracing::error!(reference, error = %e, "Failed during repository acquisition");
            let path = area.path().to_path_buf();
            if let Err(cleanup) = area.destroy() {
                tracing::warn!(path = %path.display(), error = %cleanup, "Failed to clean up working area");
            }
            return Err(e);
        }

        let root = area.path().to_path_buf();
        let tree = self.tree_builder.build(&root, &root);

        let id = {
            let mut arena = lock(&self.arena);
            let id = AreaId(arena.next);
            arena.next += 1;
            arena.areas.insert(id, area);
            id
        };

        tracing::info!(
            reference,
            area = id.0,
            nodes = count_nodes(&tree),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Repository analysis completed"
        );

        Ok(Arc::new(CacheEntry {
            reference: reference.to_string(),
            display_name: display_name(reference),
            area: id,
            tree,
            root,
        }))
    }
}
