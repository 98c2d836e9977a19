//! Error taxonomy for build execution.

use crate::domain::result::ResultCode;
use crate::runner::RunnerError;
use crate::vcs::VcsError;

/// Errors that terminate a build request.
///
/// Each variant corresponds to exactly one [`ResultCode`], so the master can
/// branch on the code without parsing the message.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The request payload could not be decoded into build arguments.
    #[error("malformed build request: {0}")]
    InvalidInput(String),

    /// The arguments decoded but failed validation.
    #[error("invalid build arguments: {0}")]
    InvalidArgs(String),

    /// The project workspace could not be resolved or created.
    #[error("workspace setup failed: {0}")]
    Workspace(#[source] std::io::Error),

    /// The request was cancelled while waiting for a gate.
    #[error("build interrupted")]
    Interrupted,

    /// Source synchronization failed or was cancelled mid-sync.
    #[error("source sync failed: {0}")]
    Sync(#[from] VcsError),

    /// The build script failed, could not be spawned, or was cancelled mid-run.
    #[error("build script failed: {0}")]
    Script(#[from] RunnerError),
}

impl BuildError {
    /// The result code reported to the master for this error.
    pub fn code(&self) -> ResultCode {
        match self {
            BuildError::InvalidInput(_) => ResultCode::InvalidInput,
            BuildError::InvalidArgs(_) => ResultCode::InvalidArgs,
            BuildError::Workspace(_) => ResultCode::WorkspaceFailed,
            BuildError::Interrupted => ResultCode::Interrupted,
            BuildError::Sync(_) => ResultCode::SyncFailed,
            BuildError::Script(_) => ResultCode::ScriptFailed,
        }
    }
}

/// Result type for build-agent operations.
pub type Result<T> = std::result::Result<T, BuildError>;
