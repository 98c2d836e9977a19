//! Wire frames exchanged with the master.
//!
//! The transport is newline-delimited JSON over a stream socket. Frame
//! layout is agent-local glue, not part of the build contract: masters only
//! rely on the result codes, the output lines, and the heartbeat behavior
//! documented in `bosun-core`.

use bosun_core::{BuildResult, ResultCode, StreamKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent by the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostFrame {
    /// First frame on a connection; carries the shared access token.
    Hello { token: String },

    /// Submit a build to one of the exported methods.
    Build {
        id: Uuid,
        method: String,
        #[serde(default)]
        args: serde_json::Value,
    },

    /// Abort an in-flight build.
    Cancel { id: Uuid },

    /// Liveness probe.
    Ping,
}

/// Frames sent by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentFrame {
    /// Handshake accepted; lists the exported method names.
    Ready { methods: Vec<String> },

    /// One line of build output.
    Output {
        id: Uuid,
        stream: StreamKind,
        line: String,
    },

    /// Terminal result of a build.
    Resolved {
        id: Uuid,
        code: ResultCode,
        error: Option<String>,
        duration_ms: u64,
        finished_at: DateTime<Utc>,
    },

    /// Reply to [`HostFrame::Ping`].
    Pong,

    /// Connection-level failure: bad token or an undecodable frame.
    Error { message: String },
}

impl AgentFrame {
    pub fn resolved(id: Uuid, result: &BuildResult) -> Self {
        AgentFrame::Resolved {
            id,
            code: result.code,
            error: result.error.clone(),
            duration_ms: result.duration.as_millis() as u64,
            finished_at: Utc::now(),
        }
    }
}
