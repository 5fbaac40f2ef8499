//! Named worker pools for the Ember engine.
//!
//! A [`TaskPool`] is a fixed-size pool of OS threads that runs detached,
//! fire-and-forget tasks. The scheduler owns one pool per executor label and
//! dispatches each system to the pool its set names.

use core::fmt;

/// Builds a [`TaskPool`] with a thread count and a thread-name prefix.
#[derive(Default, Clone)]
pub struct TaskPoolBuilder {
    num_threads: Option<usize>,
    thread_name: Option<String>,
}

impl TaskPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the number of worker threads. Defaults to the number of
    /// logical cores.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Overrides the name prefix of the worker threads, as reported to the OS.
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = Some(thread_name.into());
        self
    }

    pub fn build(self) -> TaskPool {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(num_threads) = self.num_threads {
            builder = builder.num_threads(num_threads);
        }
        let prefix = self.thread_name.unwrap_or_else(|| "Worker".to_string());
        builder = builder.thread_name(move |index| format!("{prefix} ({index})"));
        let pool = builder
            .build()
            .expect("failed to spawn worker threads for task pool");
        log::debug!("task pool started with {} threads", pool.current_num_threads());
        TaskPool { pool }
    }
}

/// A fixed-size pool of worker threads running detached tasks.
///
/// Tasks are `FnOnce() + Send + 'static` closures; completion is signalled by
/// whatever channel the caller bakes into the task. Dropping the pool waits
/// for in-flight tasks to finish.
pub struct TaskPool {
    pool: rayon::ThreadPool,
}

impl TaskPool {
    /// A pool with `num_threads` workers and a default thread name.
    pub fn new(num_threads: usize) -> Self {
        TaskPoolBuilder::new().num_threads(num_threads).build()
    }

    /// Queues `task` for execution on some worker thread and returns
    /// immediately.
    pub fn spawn(&self, task: impl FnOnce() + Send + 'static) {
        self.pool.spawn(task);
    }

    /// The number of worker threads in this pool.
    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("thread_count", &self.thread_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn runs_detached_tasks() {
        let pool = TaskPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = crossbeam_channel::unbounded();
        for _ in 0..64 {
            let counter = counter.clone();
            let sender = sender.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                sender.send(()).unwrap();
            });
        }
        for _ in 0..64 {
            receiver.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    #[test]
    fn single_thread_pool_runs_in_submission_order() {
        let pool = TaskPool::new(1);
        let (sender, receiver) = crossbeam_channel::unbounded();
        for i in 0..16 {
            let sender = sender.clone();
            pool.spawn(move || sender.send(i).unwrap());
        }
        let received: Vec<_> = receiver.iter().take(16).collect();
        assert_eq!(received, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn named_threads() {
        let pool = TaskPoolBuilder::new()
            .num_threads(1)
            .thread_name("Test Worker")
            .build();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        pool.spawn(move || {
            let name = std::thread::current().name().map(ToOwned::to_owned);
            sender.send(name).unwrap();
        });
        let name = receiver.recv().unwrap();
        assert_eq!(name.as_deref(), Some("Test Worker (0)"));
    }
}
