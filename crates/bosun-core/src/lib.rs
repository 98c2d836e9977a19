//! Bosun core - build-execution agent internals.
//!
//! One node in a master/agent build farm. A master submits a build request;
//! the agent resolves a per-project workspace, serializes builds on that
//! workspace, takes a slot from the global executor pool, syncs the sources,
//! runs the build script, and reports a coded result. Every waiting point
//! observes the request's cancellation token and emits liveness heartbeats
//! while blocked.
//!
//! The RPC surface lives in the `bosund` binary crate; this library is the
//! transport-independent core.

pub mod builder;
pub mod domain;
pub mod gate;
pub mod output;
pub mod runner;
pub mod telemetry;
pub mod vcs;
pub mod workspace;

pub use builder::{Builder, ENV_SRC_DIR, ENV_WORKSPACE};
pub use domain::error::{BuildError, Result};
pub use domain::request::{BuildArgs, BuildRequest, EnvVar};
pub use domain::result::{BuildResult, ResultCode};
pub use gate::{Gate, GateRegistry, Permit, HEARTBEAT_INTERVAL, HEARTBEAT_LINE};
pub use output::{OutputLine, OutputSink, StreamKind};
pub use runner::{RunnerError, ScriptRunner, ShellRunner};
pub use vcs::{GitClient, VcsClient, VcsError};
pub use workspace::WorkspaceResolver;
