//! Project workspace resolution.
//!
//! A workspace is the directory holding one project's checked-out source
//! tree. The mapping is `root / host / path-segments` of the repository URL,
//! so the same repository always lands in the same directory and distinct
//! repositories never collide. Directories are created lazily and never
//! deleted here.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

/// Resolves repository locators to workspace directories under a fixed root.
#[derive(Debug, Clone)]
pub struct WorkspaceResolver {
    root: PathBuf,
}

impl WorkspaceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        WorkspaceResolver { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace directory for `repo`, created (with parents) if missing.
    ///
    /// The repository must carry a host; callers validate that before
    /// resolving. Creation failures other than "already exists" surface as
    /// the returned error.
    pub fn resolve(&self, repo: &Url) -> io::Result<PathBuf> {
        let host = repo.host_str().filter(|h| !h.is_empty()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("repository URL has no host: {repo}"),
            )
        })?;

        let mut dir = self.root.join(host);
        for segment in repo.path_segments().into_iter().flatten() {
            if !segment.is_empty() {
                dir.push(segment);
            }
        }

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o750);
        }
        builder.create(&dir)?;

        debug!(workspace = %dir.display(), "workspace resolved");
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> (tempfile::TempDir, WorkspaceResolver) {
        let root = tempfile::tempdir().unwrap();
        let resolver = WorkspaceResolver::new(root.path());
        (root, resolver)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_repo_resolves_to_same_path() {
        let (_root, resolver) = resolver();
        let a = resolver
            .resolve(&url("https://example.com/org/repo"))
            .unwrap();
        let b = resolver
            .resolve(&url("https://example.com/org/repo"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_repos_resolve_to_distinct_paths() {
        let (_root, resolver) = resolver();
        let a = resolver
            .resolve(&url("https://example.com/org/repo"))
            .unwrap();
        let b = resolver
            .resolve(&url("https://example.com/org/repo2"))
            .unwrap();
        let c = resolver
            .resolve(&url("https://other.example.com/org/repo"))
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn path_mirrors_host_and_segments() {
        let (root, resolver) = resolver();
        let dir = resolver
            .resolve(&url("git+ssh://github.com/org/repo"))
            .unwrap();
        assert_eq!(dir, root.path().join("github.com").join("org").join("repo"));
        assert!(dir.is_dir());
    }

    #[test]
    fn hostless_url_is_an_error() {
        let (_root, resolver) = resolver();
        let err = resolver.resolve(&url("file:///tmp/repo")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[cfg(unix)]
    #[test]
    fn workspace_is_created_with_restrictive_mode() {
        use std::os::unix::fs::PermissionsExt;

        let (_root, resolver) = resolver();
        let dir = resolver
            .resolve(&url("https://example.com/org/repo"))
            .unwrap();
        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        // No group-write and nothing for others; umask may strip further bits.
        assert_eq!(mode & 0o027, 0);
    }

    #[test]
    fn resolve_fails_when_root_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("blocked");
        fs::write(&blocker, b"not a dir").unwrap();

        let resolver = WorkspaceResolver::new(&blocker);
        assert!(resolver
            .resolve(&url("https://example.com/org/repo"))
            .is_err());
    }
}
