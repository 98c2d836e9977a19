//! Build orchestration.
//!
//! [`Builder`] drives one request through the whole pipeline: argument
//! validation, workspace resolution, the two gate acquisitions, source sync,
//! and script execution. Every waiting point observes the request's
//! cancellation token, and both gate permits are scoped to the pipeline so
//! they are released on every exit path, in reverse acquisition order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::time::Instant;

use tracing::{info, warn};

use crate::domain::error::{BuildError, Result};
use crate::domain::request::{BuildArgs, BuildRequest};
use crate::domain::result::BuildResult;
use crate::gate::{Gate, GateRegistry};
use crate::runner::ScriptRunner;
use crate::vcs::VcsClient;
use crate::workspace::WorkspaceResolver;

/// Injected variable naming the project workspace directory.
pub const ENV_WORKSPACE: &str = "BOSUN_WORKSPACE";

/// Injected variable naming the checked-out source directory.
pub const ENV_SRC_DIR: &str = "BOSUN_SRC_DIR";

/// Subdirectory of a workspace that holds the working tree.
const SRC_DIR_NAME: &str = "src";

/// Shared build orchestrator.
///
/// One instance per agent process: the executor pool and the per-workspace
/// gate registry live here, so every request contends on the same gates.
/// Constructed explicitly and passed around rather than held in a global,
/// which keeps tests free to use fresh gates.
pub struct Builder {
    workspaces: WorkspaceResolver,
    registry: GateRegistry,
    executors: Gate,
    vcs: Arc<dyn VcsClient>,
}

impl Builder {
    /// `executors` is clamped to at least one slot.
    pub fn new(
        workspace_root: impl Into<PathBuf>,
        executors: usize,
        vcs: Arc<dyn VcsClient>,
    ) -> Self {
        Builder {
            workspaces: WorkspaceResolver::new(workspace_root),
            registry: GateRegistry::new(),
            executors: Gate::new(executors.max(1)),
            vcs,
        }
    }

    /// The global executor gate.
    pub fn executor_gate(&self) -> &Gate {
        &self.executors
    }

    /// Run one build request to completion with the given runner.
    ///
    /// Always returns exactly one [`BuildResult`]; no error escapes as a
    /// panic or is silently swallowed. The reported duration covers sync and
    /// script execution once the build reached the sync phase, otherwise the
    /// time spent before failing or being interrupted.
    pub async fn build(&self, request: BuildRequest, runner: &dyn ScriptRunner) -> BuildResult {
        info!(id = %request.id, "build request received");

        let mut clock = Instant::now();
        let outcome = self.drive(&request, runner, &mut clock).await;
        let duration = clock.elapsed();

        match outcome {
            Ok(()) => {
                info!(id = %request.id, ?duration, "build finished");
                BuildResult::ok(duration)
            }
            Err(err) => {
                if matches!(err, BuildError::Interrupted) {
                    request.sink.stdout("---> Build interrupted");
                }
                warn!(id = %request.id, code = u8::from(err.code()), %err, "build failed");
                BuildResult::from_error(&err, duration)
            }
        }
    }

    async fn drive(
        &self,
        request: &BuildRequest,
        runner: &dyn ScriptRunner,
        clock: &mut Instant,
    ) -> Result<()> {
        // Validating
        let args: BuildArgs = serde_json::from_value(request.payload.clone())
            .map_err(|e| BuildError::InvalidInput(e.to_string()))?;
        let repo = args.validate()?;

        // ResolvingWorkspace
        let workspace = self
            .workspaces
            .resolve(&repo)
            .map_err(BuildError::Workspace)?;

        // AcquiringWorkspaceGate
        request.sink.stdout("---> Waiting for the workspace");
        let _workspace_permit = self
            .registry
            .gate_for(&workspace)
            .acquire(&request.cancel, &request.sink)
            .await?;

        // AcquiringExecutorSlot
        request.sink.stdout("---> Waiting for a free executor");
        let _executor_permit = self
            .executors
            .acquire(&request.cancel, &request.sink)
            .await?;
        request.sink.stdout("---> Executor acquired, starting the build");

        // SyncingSources; the reported duration starts here.
        *clock = Instant::now();
        let src_dir = workspace.join(SRC_DIR_NAME);
        if self.vcs.has_working_tree(&src_dir) {
            request.sink.stdout("---> Updating the sources");
            self.vcs
                .pull(&repo, &src_dir, &request.sink, &request.cancel)
                .await?;
        } else {
            request.sink.stdout("---> Cloning the sources");
            self.vcs
                .clone_repo(&repo, &src_dir, &request.sink, &request.cancel)
                .await?;
        }

        // RunningScript
        request.sink.stdout("---> Running the build script");
        let mut env: Vec<(String, String)> =
            args.env.into_iter().map(|v| (v.key, v.value)).collect();
        env.push((ENV_WORKSPACE.to_string(), workspace.display().to_string()));
        env.push((ENV_SRC_DIR.to_string(), src_dir.display().to_string()));
        runner
            .run(&args.script, &src_dir, &env, &request.sink, &request.cancel)
            .await?;

        Ok(())
        // Permits drop here in reverse order: executor slot, then workspace.
    }
}
