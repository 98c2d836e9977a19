//! Terminal build results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::BuildError;

/// Result code of a finished build request.
///
/// Small integer domain shared with the master; `0` is success and every
/// failure class gets its own nonzero value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ResultCode {
    Ok = 0,
    InvalidInput = 1,
    InvalidArgs = 2,
    WorkspaceFailed = 3,
    Interrupted = 4,
    SyncFailed = 5,
    ScriptFailed = 6,
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> u8 {
        code as u8
    }
}

impl TryFrom<u8> for ResultCode {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ResultCode::Ok),
            1 => Ok(ResultCode::InvalidInput),
            2 => Ok(ResultCode::InvalidArgs),
            3 => Ok(ResultCode::WorkspaceFailed),
            4 => Ok(ResultCode::Interrupted),
            5 => Ok(ResultCode::SyncFailed),
            6 => Ok(ResultCode::ScriptFailed),
            other => Err(format!("unknown result code: {other}")),
        }
    }
}

/// Outcome of one build request.
///
/// Created exactly once per request, at the single point where the
/// orchestrator finishes.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Terminal result code.
    pub code: ResultCode,
    /// Human-readable failure message; `None` on success.
    pub error: Option<String>,
    /// Elapsed time: sync plus script execution on completed builds, time
    /// spent waiting when the request never reached the sync phase.
    pub duration: Duration,
}

impl BuildResult {
    /// Successful result.
    pub fn ok(duration: Duration) -> Self {
        BuildResult {
            code: ResultCode::Ok,
            error: None,
            duration,
        }
    }

    /// Failed result carrying the error's code and message.
    pub fn from_error(err: &BuildError, duration: Duration) -> Self {
        BuildResult {
            code: err.code(),
            error: Some(err.to_string()),
            duration,
        }
    }

    /// Whether the build succeeded.
    pub fn success(&self) -> bool {
        self.code == ResultCode::Ok
    }
}
