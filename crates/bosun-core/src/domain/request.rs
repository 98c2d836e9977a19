//! Inbound build requests and their arguments.

use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::domain::error::{BuildError, Result};
use crate::output::OutputSink;

/// One extra environment entry supplied by the master.
///
/// Kept as an explicit pair, in submission order, rather than a map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// Arguments of a build request, as decoded from the request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildArgs {
    /// Repository to build, e.g. `git+ssh://github.com/org/repo`.
    /// An optional `#fragment` names the revision to check out.
    pub repo_url: String,
    /// Build script to execute, relative to the checkout root.
    pub script: String,
    /// Extra environment entries for the script.
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

impl BuildArgs {
    /// Validate the arguments and parse the repository locator.
    ///
    /// Checks that the URL is well formed and carries a host, that the script
    /// identifier is a plain relative path, and that env keys are usable.
    pub fn validate(&self) -> Result<Url> {
        let repo = Url::parse(&self.repo_url)
            .map_err(|e| BuildError::InvalidArgs(format!("repository URL: {e}")))?;

        if repo.host_str().map_or(true, str::is_empty) {
            return Err(BuildError::InvalidArgs(format!(
                "repository URL has no host: {}",
                self.repo_url
            )));
        }
        if !has_plain_segments(&repo) {
            return Err(BuildError::InvalidArgs(format!(
                "repository path must not contain '.' or '..' segments: {}",
                self.repo_url
            )));
        }

        if self.script.is_empty() {
            return Err(BuildError::InvalidArgs("script name is empty".into()));
        }
        if !is_plain_relative(Path::new(&self.script)) {
            return Err(BuildError::InvalidArgs(format!(
                "script must be a plain relative path: {}",
                self.script
            )));
        }

        for var in &self.env {
            if var.key.is_empty() || var.key.contains('=') {
                return Err(BuildError::InvalidArgs(format!(
                    "bad environment key: {:?}",
                    var.key
                )));
            }
        }

        Ok(repo)
    }
}

/// A relative path made only of normal components.
fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// URL path segments free of '.' and '..', so they cannot escape the
/// workspace root when joined onto it.
fn has_plain_segments(repo: &Url) -> bool {
    repo.path_segments()
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .all(|s| s != "." && s != "..")
}

/// One inbound unit of build work, owned by exactly one in-flight build.
#[derive(Debug)]
pub struct BuildRequest {
    /// Request id, assigned by the RPC layer or generated on creation.
    pub id: Uuid,
    /// Raw argument payload; decoded and validated by the orchestrator.
    pub payload: serde_json::Value,
    /// Where the request's stdout/stderr lines go.
    pub sink: OutputSink,
    /// Fires when the requester aborts.
    pub cancel: CancellationToken,
}

impl BuildRequest {
    pub fn new(payload: serde_json::Value, sink: OutputSink, cancel: CancellationToken) -> Self {
        BuildRequest {
            id: Uuid::new_v4(),
            payload,
            sink,
            cancel,
        }
    }

    /// Same as [`BuildRequest::new`] with an id assigned by the caller.
    pub fn with_id(
        id: Uuid,
        payload: serde_json::Value,
        sink: OutputSink,
        cancel: CancellationToken,
    ) -> Self {
        BuildRequest {
            id,
            payload,
            sink,
            cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(repo_url: &str, script: &str) -> BuildArgs {
        BuildArgs {
            repo_url: repo_url.to_string(),
            script: script.to_string(),
            env: Vec::new(),
        }
    }

    #[test]
    fn valid_args_parse() {
        let repo = args("git+ssh://github.com/org/repo", "ci/build.sh")
            .validate()
            .unwrap();
        assert_eq!(repo.host_str(), Some("github.com"));
    }

    #[test]
    fn revision_fragment_is_allowed() {
        let repo = args("https://github.com/org/repo#release-1.2", "build.sh")
            .validate()
            .unwrap();
        assert_eq!(repo.fragment(), Some("release-1.2"));
    }

    #[test]
    fn rejects_unparsable_url() {
        assert!(matches!(
            args("not a url", "build.sh").validate(),
            Err(BuildError::InvalidArgs(_))
        ));
    }

    #[test]
    fn rejects_hostless_url() {
        assert!(args("file:///tmp/repo", "build.sh").validate().is_err());
    }

    #[test]
    fn rejects_empty_script() {
        assert!(args("https://example.com/org/repo", "").validate().is_err());
    }

    #[test]
    fn rejects_escaping_script_path() {
        assert!(args("https://example.com/org/repo", "../evil.sh")
            .validate()
            .is_err());
        assert!(args("https://example.com/org/repo", "/etc/passwd")
            .validate()
            .is_err());
    }

    #[test]
    fn dot_segments_are_normalized_away_by_parsing() {
        let repo = args("https://example.com/../org/repo", "build.sh")
            .validate()
            .unwrap();
        let segments: Vec<_> = repo.path_segments().unwrap().collect();
        assert_eq!(segments, ["org", "repo"]);
    }

    #[test]
    fn rejects_bad_env_key() {
        let mut a = args("https://example.com/org/repo", "build.sh");
        a.env.push(EnvVar {
            key: "A=B".into(),
            value: "x".into(),
        });
        assert!(a.validate().is_err());
    }
}
