//! Integration tests for the repository cache
//!
//! Covers the lifecycle a server process goes through:
//! - First analysis fetches, later analyses reuse the entry
//! - Concurrent first-time analyses share one fetch
//! - Sandboxed file reads (escape rejection, exact bytes, lossy decoding)
//! - Failed acquisitions leave nothing behind and can be retried
//! - Teardown removes every working area
//! - Real shallow clone through the git CLI

use async_trait::async_trait;
use onramp::repo::{
    GitCliSource, ReferenceValidator, RepositoryCache, RepositorySource, TreeBuilder,
};
use onramp::{OnrampError, OnrampResult};
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const REPO: &str = "https://github.com/octo/widget";

/// Writes a small fixed checkout and counts how often it was asked to.
struct CountingSource {
    calls: AtomicUsize,
    fail_first: usize,
    delay: Duration,
}

impl CountingSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            delay: Duration::ZERO,
        }
    }

    fn failing_first(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Self::new()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositorySource for CountingSource {
    async fn fetch(&self, reference: &str, dest: &Path) -> OnrampResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        // Partial checkout before failing, like an interrupted clone
        fs::write(dest.join("README.md"), "# widget\n")?;
        if call < self.fail_first {
            return Err(OnrampError::acquisition(reference, "connection reset"));
        }
        fs::create_dir_all(dest.join("src"))?;
        fs::write(dest.join("src/lib.rs"), "pub fn widget() {}\n")?;
        fs::write(dest.join("latin1.txt"), b"caf\xe9")?;
        fs::create_dir_all(dest.join(".git"))?;
        fs::write(dest.join(".git/HEAD"), "ref: refs/heads/main\n")?;
        Ok(())
    }
}

fn cache_with(source: Arc<CountingSource>, work_root: &Path) -> RepositoryCache {
    RepositoryCache::new(
        source,
        TreeBuilder::default(),
        ReferenceValidator::new(r"^https://github\.com/[\w\-]+/[\w\-\.]+").unwrap(),
        work_root,
    )
}

fn entries_under(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_second_analysis_reuses_entry() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::new());
    let cache = cache_with(Arc::clone(&source), work.path());

    let first = cache.analyze(REPO).await.unwrap();
    let second = cache.analyze(REPO).await.unwrap();

    assert_eq!(source.calls(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.display_name, "widget");
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.area_count(), 1);

    let names: Vec<&str> = first.tree.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["src", "README.md", "latin1.txt"]);
}

#[tokio::test]
async fn test_concurrent_first_analyses_share_one_fetch() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::slow(Duration::from_millis(50)));
    let cache = cache_with(Arc::clone(&source), work.path());

    let results = futures::future::join_all((0..8).map(|_| cache.analyze(REPO))).await;

    assert_eq!(source.calls(), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
    assert_eq!(entries_under(work.path()), 1);
}

#[tokio::test]
async fn test_distinct_references_get_distinct_areas() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::new());
    let cache = cache_with(Arc::clone(&source), work.path());

    let (a, b) = tokio::join!(
        cache.analyze("https://github.com/octo/widget"),
        cache.analyze("https://github.com/octo/gadget"),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(source.calls(), 2);
    assert_ne!(a.area, b.area);
    assert_ne!(a.root(), b.root());
    assert_eq!(cache.len(), 2);
}

#[tokio::test]
async fn test_invalid_reference_touches_nothing() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::new());
    let cache = cache_with(Arc::clone(&source), work.path());

    let result = cache.analyze("https://gitlab.com/octo/widget").await;

    assert!(matches!(result, Err(OnrampError::InvalidReference { .. })));
    assert_eq!(source.calls(), 0);
    assert!(cache.is_empty());
    assert_eq!(entries_under(work.path()), 0);
}

#[tokio::test]
async fn test_read_file_returns_exact_content() {
    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    cache.analyze(REPO).await.unwrap();

    let content = cache.resolve_file(REPO, "src/lib.rs").await.unwrap();
    assert_eq!(content, "pub fn widget() {}\n");
}

#[tokio::test]
async fn test_read_file_decodes_invalid_utf8_lossily() {
    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    cache.analyze(REPO).await.unwrap();

    let content = cache.resolve_file(REPO, "latin1.txt").await.unwrap();
    assert_eq!(content, "caf\u{FFFD}");
}

#[tokio::test]
async fn test_read_file_rejects_escape() {
    let work = tempdir().unwrap();
    fs::write(work.path().join("secret.txt"), "hunter2").unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    cache.analyze(REPO).await.unwrap();

    for path in ["../secret.txt", "src/../../secret.txt", "../../../../etc/passwd"] {
        let result = cache.resolve_file(REPO, path).await;
        match result {
            Err(e @ OnrampError::PathEscape { .. }) => {
                assert!(!e.to_structured().message.contains("secret"));
            }
            other => panic!("expected path escape for {path}, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_read_file_missing_and_directory_are_not_found() {
    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    cache.analyze(REPO).await.unwrap();

    for path in ["src/missing.rs", "src", ""] {
        let result = cache.resolve_file(REPO, path).await;
        assert!(
            matches!(result, Err(OnrampError::NotFound { .. })),
            "{path}: {result:?}"
        );
    }
}

#[tokio::test]
async fn test_read_file_before_analysis_is_not_found() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::new());
    let cache = cache_with(Arc::clone(&source), work.path());

    let result = cache.resolve_file(REPO, "README.md").await;

    assert!(matches!(result, Err(OnrampError::NotFound { .. })));
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_failed_acquisition_cleans_up_and_retries() {
    let work = tempdir().unwrap();
    let source = Arc::new(CountingSource::failing_first(1));
    let cache = cache_with(Arc::clone(&source), work.path());

    let failed = cache.analyze(REPO).await;
    assert!(matches!(failed, Err(OnrampError::Acquisition { .. })));
    assert!(cache.lookup(REPO).is_none());
    assert_eq!(cache.area_count(), 0);
    assert_eq!(entries_under(work.path()), 0);

    let entry = cache.analyze(REPO).await.unwrap();
    assert_eq!(source.calls(), 2);
    assert!(entry.root().join("src/lib.rs").is_file());
}

#[tokio::test]
async fn test_teardown_removes_every_area() {
    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    cache.analyze("https://github.com/octo/widget").await.unwrap();
    cache.analyze("https://github.com/octo/gadget").await.unwrap();
    assert_eq!(entries_under(work.path()), 2);

    let report = cache.teardown_all();

    assert!(report.is_clean());
    assert_eq!(report.removed, 2);
    assert_eq!(entries_under(work.path()), 0);
    assert!(cache.is_empty());
    assert!(cache.lookup(REPO).is_none());

    // Idempotent
    let again = cache.teardown_all();
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn test_teardown_continues_past_stuck_area() {
    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    let stuck = cache.analyze("https://github.com/octo/widget").await.unwrap();
    let healthy = cache.analyze("https://github.com/octo/gadget").await.unwrap();

    // A plain file where the directory was cannot be removed as a directory
    let stuck_root = stuck.root().to_path_buf();
    fs::remove_dir_all(&stuck_root).unwrap();
    fs::write(&stuck_root, "not a directory").unwrap();

    let report = cache.teardown_all();

    assert!(!report.is_clean());
    assert_eq!(report.removed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, stuck_root);
    assert!(!report.failures[0].message.is_empty());
    assert!(!healthy.root().exists());
    assert!(cache.is_empty());
    assert_eq!(cache.area_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_teardown_removes_read_only_checkout() {
    use std::os::unix::fs::PermissionsExt;

    let work = tempdir().unwrap();
    let cache = cache_with(Arc::new(CountingSource::new()), work.path());
    let entry = cache.analyze(REPO).await.unwrap();

    // git object files are written read-only
    let src = entry.root().join("src");
    fs::set_permissions(src.join("lib.rs"), fs::Permissions::from_mode(0o444)).unwrap();
    fs::set_permissions(&src, fs::Permissions::from_mode(0o555)).unwrap();

    let report = cache.teardown_all();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(!entry.root().exists());
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git failed to start")
        .status;
    assert!(status.success(), "git {args:?} failed");
}

#[tokio::test]
async fn test_git_source_shallow_clones_local_repository() {
    let upstream = tempdir().unwrap();
    git(upstream.path(), &["init", "--quiet"]);
    git(upstream.path(), &["config", "user.email", "test@test.com"]);
    git(upstream.path(), &["config", "user.name", "Test User"]);
    fs::create_dir_all(upstream.path().join("docs")).unwrap();
    fs::write(upstream.path().join("docs/guide.md"), "# Guide\n").unwrap();
    git(upstream.path(), &["add", "."]);
    git(upstream.path(), &["commit", "--quiet", "-m", "first"]);
    fs::write(upstream.path().join("README.md"), "# Project\n").unwrap();
    git(upstream.path(), &["add", "."]);
    git(upstream.path(), &["commit", "--quiet", "-m", "second"]);

    let url = format!("file://{}", upstream.path().display());
    let work = tempdir().unwrap();
    let cache = RepositoryCache::new(
        Arc::new(GitCliSource::default()),
        TreeBuilder::default(),
        ReferenceValidator::new("^file://").unwrap(),
        work.path(),
    );

    let entry = cache.analyze(&url).await.unwrap();

    let names: Vec<&str> = entry.tree.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["docs", "README.md"]);
    assert_eq!(
        cache.resolve_file(&url, "docs/guide.md").await.unwrap(),
        "# Guide\n"
    );

    // Only the latest revision is fetched
    let log = Command::new("git")
        .args(["rev-list", "--count", "HEAD"])
        .current_dir(entry.root())
        .output()
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&log.stdout).trim(), "1");

    assert!(cache.teardown_all().is_clean());
}

#[tokio::test]
async fn test_git_source_missing_repository_is_acquisition_error() {
    let missing = tempdir().unwrap();
    let url = format!("file://{}/nope", missing.path().display());
    let work = tempdir().unwrap();
    let cache = RepositoryCache::new(
        Arc::new(GitCliSource::default()),
        TreeBuilder::default(),
        ReferenceValidator::new("^file://").unwrap(),
        work.path(),
    );

    let result = cache.analyze(&url).await;

    assert!(matches!(result, Err(OnrampError::Acquisition { .. })));
    assert_eq!(entries_under(work.path()), 0);
}
