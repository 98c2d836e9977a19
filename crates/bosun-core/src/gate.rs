//! Bounded admission gates.
//!
//! One primitive covers both concurrency controls in the agent: a workspace
//! gate is a capacity-1 [`Gate`] (mutual exclusion per project), the executor
//! pool is a capacity-N [`Gate`] (bounded script concurrency across all
//! projects). Admission order under contention is unspecified; callers must
//! not rely on FIFO queueing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::domain::error::{BuildError, Result};
use crate::output::OutputSink;

/// Interval between liveness lines written while blocked on a gate.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// Liveness line emitted while waiting.
pub const HEARTBEAT_LINE: &str = "---> ...";

/// A bounded admission gate. Cloning shares the underlying slots.
#[derive(Debug, Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A held admission slot. Dropping it returns the slot to the gate, on every
/// exit path, which is the only release mechanism the gate offers.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl Gate {
    pub fn new(capacity: usize) -> Self {
        Gate {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free; primarily useful for tests and introspection.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a slot, writing a heartbeat line to `sink` every
    /// [`HEARTBEAT_INTERVAL`] spent blocked.
    ///
    /// Returns [`BuildError::Interrupted`] if `cancel` fires first. The wait
    /// itself never times out.
    pub async fn acquire(&self, cancel: &CancellationToken, sink: &OutputSink) -> Result<Permit> {
        loop {
            tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    // The semaphore is never closed.
                    let permit = permit.expect("gate semaphore closed");
                    trace!(available = self.available(), "gate slot acquired");
                    return Ok(Permit { _permit: permit });
                }
                _ = cancel.cancelled() => {
                    return Err(BuildError::Interrupted);
                }
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    sink.stdout(HEARTBEAT_LINE);
                }
            }
        }
    }
}

/// Lazily-created capacity-1 gates, one per workspace path.
///
/// All requests targeting the same workspace share the same gate, so at most
/// one build may touch a working tree at a time. Entries are never evicted;
/// the map grows with the number of distinct workspaces ever seen, which is
/// bounded by the projects this agent serves between restarts.
#[derive(Debug, Default)]
pub struct GateRegistry {
    gates: Mutex<HashMap<PathBuf, Gate>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        GateRegistry::default()
    }

    /// The gate for `workspace`, created on first reference.
    ///
    /// Lookup-or-create runs under a short exclusive section so concurrent
    /// first-time lookups cannot produce two distinct gates.
    pub fn gate_for(&self, workspace: &Path) -> Gate {
        let mut gates = self.gates.lock().expect("gate registry poisoned");
        gates
            .entry(workspace.to_path_buf())
            .or_insert_with(|| Gate::new(1))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> OutputSink {
        OutputSink::channel().0
    }

    #[tokio::test]
    async fn acquire_and_drop_restore_capacity() {
        let gate = Gate::new(2);
        assert_eq!(gate.available(), 2);

        let a = gate.acquire(&CancellationToken::new(), &sink()).await.unwrap();
        let b = gate.acquire(&CancellationToken::new(), &sink()).await.unwrap();
        assert_eq!(gate.available(), 0);

        drop(a);
        assert_eq!(gate.available(), 1);
        drop(b);
        assert_eq!(gate.available(), 2);
    }

    #[tokio::test]
    async fn cancelled_wait_returns_interrupted() {
        let gate = Gate::new(1);
        let held = gate.acquire(&CancellationToken::new(), &sink()).await.unwrap();

        let cancel = CancellationToken::new();
        let contender = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.acquire(&cancel, &sink()).await })
        };

        cancel.cancel();
        let result = contender.await.unwrap();
        assert!(matches!(result, Err(BuildError::Interrupted)));

        // The failed wait must not have consumed the slot.
        drop(held);
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_wait_emits_heartbeats() {
        let gate = Gate::new(1);
        let held = gate.acquire(&CancellationToken::new(), &sink()).await.unwrap();

        let (wait_sink, mut rx) = OutputSink::channel();
        let contender = {
            let gate = gate.clone();
            tokio::spawn(async move {
                gate.acquire(&CancellationToken::new(), &wait_sink).await
            })
        };

        tokio::time::sleep(HEARTBEAT_INTERVAL + Duration::from_secs(1)).await;
        let beat = rx.recv().await.unwrap();
        assert_eq!(beat.line, HEARTBEAT_LINE);

        drop(held);
        assert!(contender.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn registry_hands_out_one_gate_per_path() {
        let registry = GateRegistry::new();
        let a = registry.gate_for(Path::new("/ws/project-a"));
        let b = registry.gate_for(Path::new("/ws/project-a"));
        let other = registry.gate_for(Path::new("/ws/project-b"));

        // Same path shares slots; the second handle sees the first's hold.
        let held = a.acquire(&CancellationToken::new(), &sink()).await.unwrap();
        assert_eq!(b.available(), 0);
        assert_eq!(other.available(), 1);
        drop(held);
        assert_eq!(b.available(), 1);
    }
}
