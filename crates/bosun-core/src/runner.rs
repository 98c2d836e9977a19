//! Build script execution.
//!
//! A [`ScriptRunner`] executes one named script inside a checked-out source
//! tree, streams its output to the request sink, and aborts promptly on
//! cancellation. [`ShellRunner`] is the POSIX-shell implementation; other
//! interpreters register under their own runner name.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::output::{forward_lines, OutputSink, StreamKind};

/// Errors produced while executing a build script.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        source: std::io::Error,
    },

    #[error("script {script} exited with status {status}")]
    NonZeroExit { script: String, status: i32 },

    #[error("script run interrupted")]
    Interrupted,
}

/// Executes a named build script with a given environment.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runner name, used as the method suffix when advertised to the master.
    fn name(&self) -> &str;

    /// Run `script` in `src_dir` with `env` appended to the inherited
    /// process environment.
    async fn run(
        &self,
        script: &str,
        src_dir: &Path,
        env: &[(String, String)],
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError>;
}

/// Runs scripts through a POSIX shell.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    interpreter: PathBuf,
}

impl ShellRunner {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        ShellRunner {
            interpreter: interpreter.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        ShellRunner::new("sh")
    }
}

#[async_trait]
impl ScriptRunner for ShellRunner {
    fn name(&self) -> &str {
        "shell"
    }

    async fn run(
        &self,
        script: &str,
        src_dir: &Path,
        env: &[(String, String)],
        sink: &OutputSink,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError> {
        debug!(script, src_dir = %src_dir.display(), "running build script");

        let mut child = Command::new(&self.interpreter)
            .arg(script)
            .current_dir(src_dir)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                interpreter: self.interpreter.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");
        let out = forward_lines(stdout, StreamKind::Stdout, sink.clone());
        let err = forward_lines(stderr, StreamKind::Stderr, sink.clone());

        let status = tokio::select! {
            status = child.wait() => status.map_err(|source| RunnerError::Spawn {
                interpreter: self.interpreter.display().to_string(),
                source,
            })?,
            _ = cancel.cancelled() => {
                warn!(script, "script cancelled, killing child");
                let _ = child.start_kill();
                let _ = child.wait().await;
                // Grandchildren may keep the pipes open; drop the forwarders
                // rather than draining to EOF so the unwind stays prompt.
                out.abort();
                err.abort();
                return Err(RunnerError::Interrupted);
            }
        };

        let _ = tokio::join!(out, err);

        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::NonZeroExit {
                script: script.to_string(),
                status: status.code().unwrap_or(-1),
            })
        }
    }
}
