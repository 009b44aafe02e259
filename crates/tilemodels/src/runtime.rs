//! Task spawning for fetch jobs.
//!
//! The engine never blocks on network or decode work. Jobs are handed to a
//! [`Spawner`] as `Send + 'static` futures and report back over channels.

use std::{future::Future, pin::Pin};

use crate::error::{Error, Result};

/// A boxed background task.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs background tasks to completion.
pub trait Spawner: Send + Sync {
    /// Spawn a task that runs to completion.
    ///
    /// Tasks return `()`. Results travel back through channels drained on
    /// the render timeline.
    fn spawn(&self, task: BoxTask);
}

/// Spawner backed by a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    /// Use an explicit runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running inside.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn current() -> Result<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::Runtime {
                message: e.to_string(),
            })
    }
}

impl Spawner for TokioSpawner {
    fn spawn(&self, task: BoxTask) {
        // Completion is observed through the job's channel, not the handle.
        drop(self.handle.spawn(task));
    }
}
