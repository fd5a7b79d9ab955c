//! Tree Builder: bounded, deterministic structural summary of a checkout
//!
//! The walk is iterative: a stack of `(directory, depth)` frames feeds a flat
//! list of listings, and listings are assembled into nodes afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_MAX_TREE_DEPTH;

/// Version-control metadata directory, always excluded.
const VCS_DIR: &str = ".git";

/// File or directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// One entry of the structural summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    /// Relative to the working-area root, `/`-separated.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// `None` for files. Directories past the depth bound carry `Some(vec![])`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Entry of a pending listing. Directories point at the listing that will
/// hold their children.
struct PendingEntry {
    name: String,
    path: String,
    child_listing: Option<usize>,
}

struct Frame {
    dir: PathBuf,
    depth: usize,
    listing: usize,
}

/// Walks a directory into an ordered [`TreeNode`] hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    max_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TREE_DEPTH)
    }
}

impl TreeBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Build the listing of `dir`, with every `path` relative to `root`.
    ///
    /// A directory listed at depth `d` has its children listed at `d + 1`;
    /// listings deeper than `max_depth` are empty without touching the
    /// filesystem. A directory that cannot be enumerated yields an empty
    /// listing and a warning, never an error.
    pub fn build(&self, dir: &Path, root: &Path) -> Vec<TreeNode> {
        // listings[i] is filled by exactly one frame; children always get a
        // higher index than their parent.
        let mut listings: Vec<Vec<PendingEntry>> = vec![Vec::new()];
        let mut stack = vec![Frame {
            dir: dir.to_path_buf(),
            depth: 0,
            listing: 0,
        }];

        while let Some(frame) = stack.pop() {
            if frame.depth > self.max_depth {
                tracing::debug!(
                    dir = %frame.dir.display(),
                    max_depth = self.max_depth,
                    "Reached max depth"
                );
                continue;
            }

            let entries = match read_sorted(&frame.dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        dir = %frame.dir.display(),
                        error = %e,
                        "Failed to enumerate directory, skipping subtree"
                    );
                    continue;
                }
            };

            let mut pending = Vec::with_capacity(entries.len());
            for (name, is_dir) in entries {
                let full = frame.dir.join(&name);
                let path = relative_slash_path(&full, root);
                let child_listing = if is_dir {
                    let index = listings.len();
                    listings.push(Vec::new());
                    stack.push(Frame {
                        dir: full,
                        depth: frame.depth + 1,
                        listing: index,
                    });
                    Some(index)
                } else {
                    None
                };
                pending.push(PendingEntry {
                    name,
                    path,
                    child_listing,
                });
            }
            tracing::trace!(dir = %frame.dir.display(), items = pending.len(), "Listed directory");
            listings[frame.listing] = pending;
        }

        assemble(listings)
    }
}

/// Turn flat listings into nodes, deepest first.
fn assemble(listings: Vec<Vec<PendingEntry>>) -> Vec<TreeNode> {
    let mut built: Vec<Vec<TreeNode>> = Vec::with_capacity(listings.len());
    built.resize_with(listings.len(), Vec::new);

    for (index, listing) in listings.into_iter().enumerate().rev() {
        let nodes = listing
            .into_iter()
            .map(|entry| match entry.child_listing {
                Some(child) => TreeNode {
                    name: entry.name,
                    path: entry.path,
                    kind: NodeKind::Directory,
                    children: Some(std::mem::take(&mut built[child])),
                },
                None => TreeNode {
                    name: entry.name,
                    path: entry.path,
                    kind: NodeKind::File,
                    children: None,
                },
            })
            .collect();
        built[index] = nodes;
    }

    built.into_iter().next().unwrap_or_default()
}

/// Directory entries as `(name, is_dir)`, directories first, then by name.
///
/// Symlinks are classified by their own type and never followed.
fn read_sorted(dir: &Path) -> std::io::Result<Vec<(String, bool)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == VCS_DIR {
            continue;
        }
        let is_dir = entry.file_type()?.is_dir();
        entries.push((name, is_dir));
    }
    entries.sort_by(|(a_name, a_dir), (b_name, b_dir)| {
        b_dir.cmp(a_dir).then_with(|| a_name.cmp(b_name))
    });
    Ok(entries)
}

fn relative_slash_path(full: &Path, root: &Path) -> String {
    let relative = full.strip_prefix(root).unwrap_or(full);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Number of nodes in a snapshot.
pub fn count_nodes(nodes: &[TreeNode]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&[TreeNode]> = vec![nodes];
    while let Some(level) = stack.pop() {
        count += level.len();
        for node in level {
            if let Some(children) = &node.children {
                stack.push(children);
            }
        }
    }
    count
}
