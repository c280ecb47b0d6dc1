//! Child process handles.
//!
//! The manager is generic over how a "child" is actually represented:
//! [`OsChildHandle`] spawns and supervises a real OS process, while
//! [`FakeChildHandle`] (test-only) lets tests kill a child on demand
//! without touching the OS at all.

use std::any::Any;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::warn;

use crate::errors::{AlerterError, AlerterResult};

/// A supervised worker: something the manager can start, poll for
/// liveness, and tear down.
#[async_trait]
pub trait ChildHandle: Send + Sync {
    /// Non-blocking liveness check. `false` if the child was never
    /// started or has exited.
    fn is_alive(&mut self) -> bool;

    /// Start (or restart) the child. Safe to call when already alive —
    /// callers are expected to check [`Self::is_alive`] first.
    async fn start(&mut self) -> AlerterResult<()>;

    /// Wait for an already-exited child to release its OS resources.
    /// A no-op if the child was never started.
    async fn join(&mut self) -> AlerterResult<()>;

    /// Request termination and wait for exit.
    async fn terminate(&mut self) -> AlerterResult<()>;

    /// Downcasting hook so tests can reach concrete fakes stored as
    /// `Box<dyn ChildHandle>` in the manager's children map.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Supervises a real OS process, restarted from the same command line
/// on every [`ChildHandle::start`].
pub struct OsChildHandle {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl OsChildHandle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }
}

#[async_trait]
impl ChildHandle for OsChildHandle {
    fn is_alive(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    async fn start(&mut self) -> AlerterResult<()> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .spawn()
            .map_err(|e| AlerterError::Transport(format!("spawning {}: {e}", self.program)))?;
        self.child = Some(child);
        Ok(())
    }

    async fn join(&mut self) -> AlerterResult<()> {
        if let Some(mut child) = self.child.take() {
            child
                .wait()
                .await
                .map_err(|e| AlerterError::Transport(format!("joining {}: {e}", self.program)))?;
        }
        Ok(())
    }

    async fn terminate(&mut self) -> AlerterResult<()> {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                warn!(program = %self.program, error = %e, "failed to signal child, it may already be gone");
            }
        }
        self.join().await
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// In-memory stand-in for a child process, used by tests to exercise
/// the manager's dead/restart/heartbeat logic deterministically.
#[derive(Default)]
pub struct FakeChildHandle {
    alive: bool,
    start_count: u32,
}

impl FakeChildHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the process dying on its own, as an external observer
    /// (e.g. the OS) would report it.
    pub fn kill(&mut self) {
        self.alive = false;
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }
}

#[async_trait]
impl ChildHandle for FakeChildHandle {
    fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn start(&mut self) -> AlerterResult<()> {
        self.alive = true;
        self.start_count += 1;
        Ok(())
    }

    async fn join(&mut self) -> AlerterResult<()> {
        Ok(())
    }

    async fn terminate(&mut self) -> AlerterResult<()> {
        self.alive = false;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_child_starts_alive_and_can_be_killed() {
        let mut child = FakeChildHandle::new();
        assert!(!child.is_alive());

        child.start().await.unwrap();
        assert!(child.is_alive());
        assert_eq!(child.start_count(), 1);

        child.kill();
        assert!(!child.is_alive());
    }

    #[tokio::test]
    async fn fake_child_terminate_marks_it_dead() {
        let mut child = FakeChildHandle::new();
        child.start().await.unwrap();
        child.terminate().await.unwrap();
        assert!(!child.is_alive());
    }
}
