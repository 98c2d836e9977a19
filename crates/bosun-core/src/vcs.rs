//! Source synchronization.
//!
//! The orchestrator only speaks [`VcsClient`]; [`GitClient`] is the
//! production implementation, shelling out to the system `git` the same way
//! the rest of the agent shells out to build scripts. Progress is streamed to
//! the request's output sink and the subprocess is killed when the request's
//! cancellation token fires.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::output::{forward_lines, OutputSink, StreamKind};

/// Errors produced while syncing a working tree.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{op} exited with status {status}")]
    CommandFailed { op: String, status: i32 },

    #[error("sync interrupted")]
    Interrupted,
}

/// Clone or update a working tree, streaming progress to the request output.
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Fresh checkout of `repo` into `dest`.
    async fn clone_repo(
        &self,
        repo: &Url,
        dest: &Path,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), VcsError>;

    /// Update the existing working tree in `dest` from `repo`.
    async fn pull(
        &self,
        repo: &Url,
        dest: &Path,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), VcsError>;

    /// Whether `dest` already holds a working tree for this VCS.
    fn has_working_tree(&self, dest: &Path) -> bool;
}

/// Git client shelling out to the system `git`.
///
/// The repository URL may use a `git+` scheme prefix (`git+ssh://...`),
/// which is stripped before handing the URL to git, and may carry a
/// `#fragment` naming the revision to check out after clone/fetch.
#[derive(Debug, Default)]
pub struct GitClient;

impl GitClient {
    pub fn new() -> Self {
        GitClient
    }

    /// The URL git itself understands: fragment removed, `git+` prefix gone.
    /// Git's file transport wants an empty host, so any host on a `file` URL
    /// is dropped.
    fn fetch_url(repo: &Url) -> String {
        let mut bare = repo.clone();
        bare.set_fragment(None);
        if bare.scheme() == "file" {
            return format!("file://{}", bare.path());
        }
        let s = bare.to_string();
        s.strip_prefix("git+").map(str::to_string).unwrap_or(s)
    }

    async fn git(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), VcsError> {
        let op = format!("git {}", args.join(" "));
        debug!(%op, "running vcs command");

        let mut cmd = Command::new("git");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| VcsError::Spawn {
            tool: "git".to_string(),
            source,
        })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let out = forward_lines(stdout, StreamKind::Stdout, sink.clone());
        let err = forward_lines(stderr, StreamKind::Stderr, sink.clone());

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| VcsError::Spawn {
                tool: "git".to_string(),
                source,
            })?,
            _ = cancel.cancelled() => {
                warn!(%op, "sync cancelled, killing git");
                let _ = child.start_kill();
                let _ = child.wait().await;
                // Child processes of git may keep the pipes open; drop the
                // forwarders rather than draining to EOF.
                out.abort();
                err.abort();
                return Err(VcsError::Interrupted);
            }
        };

        let _ = tokio::join!(out, err);

        if status.success() {
            Ok(())
        } else {
            Err(VcsError::CommandFailed {
                op,
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

#[async_trait]
impl VcsClient for GitClient {
    async fn clone_repo(
        &self,
        repo: &Url,
        dest: &Path,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), VcsError> {
        let url = Self::fetch_url(repo);
        let dest_str = dest.to_string_lossy().into_owned();
        self.git(&["clone", &url, &dest_str], None, sink, cancel)
            .await?;

        if let Some(rev) = repo.fragment() {
            self.git(&["checkout", rev], Some(dest), sink, cancel)
                .await?;
        }
        Ok(())
    }

    async fn pull(
        &self,
        repo: &Url,
        dest: &Path,
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), VcsError> {
        match repo.fragment() {
            Some(rev) => {
                self.git(&["fetch", "origin"], Some(dest), sink, cancel)
                    .await?;
                self.git(&["checkout", rev], Some(dest), sink, cancel)
                    .await
            }
            None => {
                self.git(&["pull", "--ff-only"], Some(dest), sink, cancel)
                    .await
            }
        }
    }

    fn has_working_tree(&self, dest: &Path) -> bool {
        dest.join(".git").exists()
    }
}
