// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task spawning for stateful messaging components.
//!
//! Every queue, stack and router owns exactly one task spawned through an
//! [`Executor`]. The executor tracks those tasks so an owner can wait for
//! all of them to finish.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Spawns and tracks component tasks on a tokio runtime.
#[derive(Clone)]
pub struct Executor {
    handle: Handle,
    tracker: TaskTracker,
    name: Arc<str>,
}

impl Executor {
    pub fn new(name: impl Into<Arc<str>>, handle: Handle) -> Self {
        Self { handle, tracker: TaskTracker::new(), name: name.into() }
    }

    /// Executor on the runtime of the calling task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn current(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Handle::current())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn_on(future, &self.handle)
    }

    /// Number of spawned tasks that have not finished.
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Refuse further tracking and wait until every spawned task has exited.
    pub async fn stop(&self) {
        self.tracker.close();
        debug!(executor = %self.name, active = self.tracker.len(), "waiting for tasks");
        self.tracker.wait().await;
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").field("name", &self.name).field("active", &self.active()).finish()
    }
}
