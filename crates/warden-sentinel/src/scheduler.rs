//! Recurring task scheduler
//!
//! Every job runs in its own tokio task driven by `tokio::time::interval`, so a
//! slow job only delays its own next tick. Because time comes from tokio, tests
//! on a paused clock (`start_paused`, `time::advance`) drive the schedule
//! deterministically.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct Scheduler {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Run `job` every `period`, first after one full period
    ///
    /// Replaces any job already scheduled under `key`. Returns false when no tokio
    /// runtime is available to host the task.
    pub fn schedule<F, Fut>(&self, key: impl Into<String>, period: Duration, mut job: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let Ok(handle) = Handle::try_current() else {
            warn!(task = %key, "no tokio runtime, task not scheduled");
            return false;
        };

        let period = period.max(Duration::from_millis(1));
        let task = handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                job().await;
            }
        });

        if let Some(previous) = self.lock().insert(key.clone(), task) {
            previous.abort();
        }
        debug!(task = %key, ?period, "task scheduled");
        true
    }

    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn task_count(&self) -> usize {
        self.lock().len()
    }

    /// Tasks that have not finished or panicked
    pub fn alive_count(&self) -> usize {
        self.lock().values().filter(|task| !task.is_finished()).count()
    }

    /// Abort every task; returns how many were stopped
    pub fn shutdown(&self) -> usize {
        let mut tasks = self.lock();
        let count = tasks.len();
        for (_, task) in tasks.drain() {
            task.abort();
        }
        count
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
