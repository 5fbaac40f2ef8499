//! Named worker pools for system dispatch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ember_tasks::{TaskPool, TaskPoolBuilder};

use crate::schedule::label::{AsExecutorLabel, ExecutorLabel};

/// The default multi-thread pool every system runs on unless its set names
/// another executor.
pub struct MultiThread;
impl AsExecutorLabel for MultiThread {}

/// A one-thread pool for work that must stay on a single thread (GUI, GPU
/// submission, thread-pinned libraries).
pub struct SingleThread;
impl AsExecutorLabel for SingleThread {}

impl Default for ExecutorLabel {
    fn default() -> Self {
        MultiThread.as_executor_label()
    }
}

/// The executor table: one [`TaskPool`] per label.
///
/// [`MultiThread`] and [`SingleThread`] always exist; plugins may register
/// additional named pools with [`Executors::add_pool`], which works through
/// a shared handle because the table is handed out as an `Arc` to every
/// sub-app.
pub struct Executors {
    pools: RwLock<HashMap<ExecutorLabel, Arc<TaskPool>>>,
}

impl Executors {
    pub const DEFAULT_POOL_SIZE: usize = 4;

    /// Builds the two standard pools, sizing the multi-thread pool to
    /// `default_pool_size`.
    pub fn new(default_pool_size: usize) -> Self {
        let executors = Executors {
            pools: RwLock::new(HashMap::new()),
        };
        executors.add_pool(MultiThread, default_pool_size.max(1));
        executors.add_pool(SingleThread, 1);
        executors
    }

    /// Registers a pool under `label` if none exists yet.
    pub fn add_pool(&self, label: impl AsExecutorLabel, num_threads: usize) {
        let label = label.as_executor_label();
        let mut pools = self
            .pools
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        pools.entry(label).or_insert_with(|| {
            Arc::new(
                TaskPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(label.name())
                    .build(),
            )
        });
    }

    pub fn get(&self, label: ExecutorLabel) -> Option<Arc<TaskPool>> {
        self.pools
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&label)
            .cloned()
    }

    pub fn contains(&self, label: ExecutorLabel) -> bool {
        self.pools
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&label)
    }
}

impl Default for Executors {
    fn default() -> Self {
        Executors::new(Self::DEFAULT_POOL_SIZE)
    }
}
