use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Delayed-operation timers keyed by operation identity. Scheduling under a
/// key that already holds a pending timer replaces it, so bursts of the same
/// operation collapse into the latest one.
pub struct RefetchScheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RefetchScheduler {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `operation` after `delay`, cancelling any pending timer under the
    /// same key. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, key: &str, delay: Duration, operation: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            operation.await;
        });

        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        if let Some(previous) = tasks.insert(key.to_string(), handle) {
            previous.abort();
        }
        tasks.retain(|_, task| !task.is_finished());
    }

    pub fn cancel(&self, key: &str) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        if let Some(task) = tasks.remove(key) {
            task.abort();
        }
    }

    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().expect("scheduler lock poisoned");
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

impl Default for RefetchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RefetchScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
