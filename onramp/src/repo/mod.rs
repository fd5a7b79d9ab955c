//! Repository ingestion: validation, shallow fetch, bounded tree, safe reads
//!
//! The cache is the only entry point callers need; the other modules are
//! exposed for reuse and testing.

pub mod cache;
pub mod safe_path;
pub mod source;
pub mod tree;
pub mod working_area;

pub use cache::{AreaId, CacheEntry, RepoAnalysis, RepositoryCache, TeardownFailure, TeardownReport};
pub use source::{display_name, GitCliSource, ReferenceValidator, RepositorySource};
pub use tree::{NodeKind, TreeBuilder, TreeNode};
pub use working_area::WorkingArea;
