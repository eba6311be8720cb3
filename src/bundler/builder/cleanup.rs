//! Deferred cleanup tasks of a build run.

use crate::bundler::{
    Result,
    error::{Context, all_settled},
};
use futures::future::{BoxFuture, FutureExt};
use std::{
    future::Future,
    sync::{Arc, Mutex},
};

type CleanupTask = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Tasks registered during a run and executed once it ends, whether it
/// succeeded or not.
///
/// Tasks run concurrently; every failure is collected under
/// `"Cannot cleanup: "`.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    tasks: Arc<Mutex<Vec<(String, CleanupTask)>>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` for the end of the run.
    pub fn register<F, Fut>(&self, name: impl Into<String>, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        log::debug!("Registered cleanup: {}", name);
        self.lock().push((name, Box::new(move || task().boxed())));
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs and drains every pending task.
    pub async fn run_all(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.lock());
        if tasks.is_empty() {
            return Ok(());
        }

        log::debug!("Running {} cleanup task(s)", tasks.len());
        all_settled(
            tasks
                .into_iter()
                .map(|(name, task)| async move { task().await.context(name) }),
            "Cannot cleanup: ",
        )
        .await
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, CleanupTask)>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
