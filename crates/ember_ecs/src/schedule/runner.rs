//! The schedule run loop.
//!
//! Mechanics per invocation: sets whose dependencies are satisfied wait for
//! their parents to enter, then have their conditions evaluated, then their
//! system dispatched to its executor pool; completions flow back through a
//! channel and unlock successors and parents. Dispatch is conflict-aware:
//! a system (or condition) only starts when its declared access is
//! compatible with everything in flight.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender};

use crate::query::Access;
use crate::schedule::label::{ExecutorLabel, ScheduleLabel, SystemSetLabel};
use crate::schedule::schedule::{RunScheduleError, Schedule, ScheduleCache, ScheduleCommand};
use crate::schedule::Executors;
use crate::system::{RunSystemError, System};
use crate::world::{UnsafeWorldCell, World};

/// A raw pointer to a boxed system, movable onto a worker thread.
///
/// Valid for the duration of one schedule run: the set map is not touched
/// while the run loop is live, and the loop joins every in-flight system
/// before returning.
#[derive(Clone, Copy)]
struct SystemTaskPtr(*mut dyn System<Out = ()>);

// SAFETY: the pointee is `Send + Sync` (all systems are); exclusive use is
// guaranteed by the run loop, which dispatches each system at most once
// concurrently.
unsafe impl Send for SystemTaskPtr {}

/// A world pointer movable onto a worker thread; see [`UnsafeWorldCell`].
#[derive(Clone, Copy)]
struct WorldTaskPtr(*mut World);

// SAFETY: access through the pointer follows the declared-access discipline.
unsafe impl Send for WorldTaskPtr {}

enum FinishKind {
    /// The owned system ran (or failed); frees its executor slot.
    SystemDone(Result<(), RunSystemError>),
    /// The owned system was skipped by a failed condition or parent.
    Skipped,
    /// The set's children count reached zero.
    Drained,
}

struct FinishEvent {
    index: usize,
    kind: FinishKind,
}

struct RunNode {
    label: SystemSetLabel,
    executor: ExecutorLabel,
    system: Option<SystemTaskPtr>,
    system_access: Access,
    conditions: Vec<*mut dyn System<Out = bool>>,
    condition_access: Vec<Access>,
    /// Condition indices not yet evaluated this run.
    remaining_conditions: Vec<usize>,
    cond_passed: bool,
    depends_count: usize,
    children_count: usize,
    entered: bool,
    passed: bool,
    finished: bool,
    result: Option<Result<(), RunSystemError>>,
}

/// Per-invocation bookkeeping: the world cell, the executor table, the
/// waiting queues, and the in-flight access set.
struct RunState<'env> {
    schedule_label: ScheduleLabel,
    cache: &'env ScheduleCache,
    executors: Option<&'env Executors>,
    world: UnsafeWorldCell<'env>,
    nodes: Vec<RunNode>,
    sender: Sender<FinishEvent>,
    /// Sets whose dependencies are met but whose parents have not all
    /// entered yet.
    queue_wait_to_enter: VecDeque<usize>,
    /// Sets whose parents have all entered, paired with the AND of the
    /// parents' pass state.
    waiting_sets: VecDeque<(usize, bool)>,
    running: usize,
    /// Declared accesses of in-flight systems.
    active: Vec<(usize, Access)>,
    new_entered: bool,
}

impl Schedule {
    /// Builds (if dirty), validates, and runs the schedule to completion,
    /// then drains the world's command queue.
    ///
    /// Passing `None` for `executors` marks every system as
    /// finished-with-error instead of running it.
    pub fn run(
        &mut self,
        world: &mut World,
        executors: Option<&Executors>,
    ) -> Result<(), RunScheduleError> {
        if let Err(source) = self.prepare() {
            return Err(RunScheduleError::Prepare {
                schedule: self.label(),
                source,
            });
        }
        self.initialize_systems(world);

        let remaining = self.execute(world, executors);

        world.flush_commands();

        if self.config.run_once {
            let owned: Vec<SystemSetLabel> = self
                .sets
                .iter()
                .filter(|(_, set)| set.has_system())
                .map(|(label, _)| *label)
                .collect();
            for label in owned {
                self.queue_edit(ScheduleCommand::RemoveSystem(label));
            }
            self.flush_pending();
        }

        if remaining.is_empty() {
            Ok(())
        } else {
            for label in &remaining {
                log::warn!(
                    "set {:?} in schedule {:?} was not reached",
                    label,
                    self.label()
                );
            }
            Err(RunScheduleError::SetsRemaining {
                schedule: self.label(),
                remaining,
            })
        }
    }

    /// The run loop proper. Returns the labels of unreached sets.
    fn execute(&mut self, world: &mut World, executors: Option<&Executors>) -> Vec<SystemSetLabel> {
        let label = self.label();
        let Schedule { sets, cache, .. } = self;
        debug_assert_eq!(sets.len(), cache.infos.len());

        // Collect raw system/condition pointers and access clones up front;
        // the map itself is not touched again until the loop is done.
        let mut nodes: Vec<RunNode> = Vec::with_capacity(cache.infos.len());
        for (set, info) in sets.values_mut().zip(&cache.infos) {
            debug_assert_eq!(set.label(), info.label);
            debug_assert_eq!(set.has_system(), info.has_system);
            let system = set
                .system
                .as_mut()
                .map(|system| SystemTaskPtr(&mut **system as *mut dyn System<Out = ()>));
            let system_access = set
                .system
                .as_ref()
                .map(|system| system.access().clone())
                .unwrap_or_default();
            let conditions: Vec<*mut dyn System<Out = bool>> = set
                .conditions
                .iter_mut()
                .map(|condition| &mut **condition as *mut dyn System<Out = bool>)
                .collect();
            let condition_access: Vec<Access> = set
                .conditions
                .iter()
                .map(|condition| condition.access().clone())
                .collect();
            nodes.push(RunNode {
                label: info.label,
                executor: set.executor,
                system,
                system_access,
                remaining_conditions: (0..conditions.len()).collect(),
                conditions,
                condition_access,
                cond_passed: true,
                depends_count: info.cached_depends_count,
                children_count: info.cached_children_count,
                entered: false,
                passed: false,
                finished: false,
                result: None,
            });
        }

        let (sender, receiver): (Sender<FinishEvent>, Receiver<FinishEvent>) =
            crossbeam_channel::unbounded();
        let mut state = RunState {
            schedule_label: label,
            cache,
            executors,
            world: world.as_unsafe_world_cell(),
            nodes,
            sender,
            queue_wait_to_enter: VecDeque::new(),
            waiting_sets: VecDeque::new(),
            running: 0,
            active: Vec::new(),
            new_entered: false,
        };
        for (index, node) in state.nodes.iter().enumerate() {
            if node.depends_count == 0 {
                state.queue_wait_to_enter.push_back(index);
            }
        }

        state.try_queued();
        while state.running > 0 || !receiver.is_empty() {
            let Ok(event) = receiver.recv() else { break };
            state.handle_finished(event);
            state.try_queued();
        }

        let failed = state
            .nodes
            .iter()
            .filter(|node| matches!(node.result, Some(Err(_))))
            .count();
        if failed > 0 {
            log::debug!("schedule {label:?} completed with {failed} system errors");
        }

        state
            .nodes
            .iter()
            .filter(|node| !node.finished)
            .map(|node| node.label)
            .collect()
    }
}

impl RunState<'_> {
    /// Moves sets whose parents have all entered into the waiting queue,
    /// then lets the waiting queue make progress; repeats while entries keep
    /// entering.
    fn try_queued(&mut self) {
        loop {
            self.new_entered = false;
            let pending = self.queue_wait_to_enter.len();
            for _ in 0..pending {
                let Some(index) = self.queue_wait_to_enter.pop_front() else {
                    break;
                };
                let mut parents_entered = true;
                let mut parents_passed = true;
                for &parent in &self.cache.infos[index].parents {
                    if !self.nodes[parent].entered {
                        parents_entered = false;
                        break;
                    }
                    parents_passed &= self.nodes[parent].passed;
                }
                if parents_entered {
                    self.waiting_sets.push_back((index, parents_passed));
                } else {
                    self.queue_wait_to_enter.push_back(index);
                }
            }
            self.enter_waiting();
            if !self.new_entered {
                break;
            }
        }
    }

    /// Tries to enter every waiting set: evaluate conditions (when their
    /// access is free), then dispatch the owned system (when its access is
    /// free). Entries that cannot make progress are requeued and retried
    /// after the next completion.
    fn enter_waiting(&mut self) {
        let waiting = self.waiting_sets.len();
        for _ in 0..waiting {
            let Some((index, parents_passed)) = self.waiting_sets.pop_front() else {
                break;
            };

            if !parents_passed {
                {
                    let node = &mut self.nodes[index];
                    node.entered = true;
                    node.passed = false;
                }
                self.new_entered = true;
                let has_system = self.nodes[index].system.is_some();
                if has_system {
                    self.send(index, FinishKind::Skipped);
                } else if self.nodes[index].children_count == 0 {
                    self.send(index, FinishKind::Drained);
                }
                continue;
            }

            if !self.try_conditions(index) {
                // Some condition still conflicts with running work.
                self.waiting_sets.push_back((index, parents_passed));
                continue;
            }

            let passed = self.nodes[index].cond_passed;
            if passed && self.nodes[index].system.is_some() {
                if self.conflicts_with_active(&self.nodes[index].system_access) {
                    self.waiting_sets.push_back((index, parents_passed));
                    continue;
                }
                self.nodes[index].entered = true;
                self.nodes[index].passed = true;
                self.new_entered = true;
                self.dispatch_system(index);
            } else {
                {
                    let node = &mut self.nodes[index];
                    node.entered = true;
                    node.passed = passed;
                }
                self.new_entered = true;
                let has_system = self.nodes[index].system.is_some();
                if has_system {
                    // Condition short-circuited the system.
                    self.send(index, FinishKind::Skipped);
                } else if self.nodes[index].children_count == 0 {
                    self.send(index, FinishKind::Drained);
                }
            }
        }
    }

    /// Evaluates the set's outstanding conditions inline, skipping (for now)
    /// any whose access conflicts with running systems. Returns whether all
    /// conditions have been decided.
    fn try_conditions(&mut self, index: usize) -> bool {
        let mut remaining = core::mem::take(&mut self.nodes[index].remaining_conditions);
        let mut undecided = Vec::new();
        for condition_index in remaining.drain(..) {
            if !self.nodes[index].cond_passed {
                // Short-circuited; drop the rest.
                continue;
            }
            if self.conflicts_with_active(&self.nodes[index].condition_access[condition_index]) {
                undecided.push(condition_index);
                continue;
            }
            let condition = self.nodes[index].conditions[condition_index];
            // SAFETY: conditions run inline on the loop thread; their access
            // was just checked against everything in flight.
            let outcome = unsafe { (*condition).run_unsafe(self.world) };
            let node = &mut self.nodes[index];
            match outcome {
                Ok(pass) => node.cond_passed &= pass,
                Err(error) => {
                    log::error!(
                        "condition of set {:?} in schedule {:?} failed: {error}",
                        node.label,
                        self.schedule_label
                    );
                    node.cond_passed = false;
                }
            }
        }
        let done = undecided.is_empty() || !self.nodes[index].cond_passed;
        self.nodes[index].remaining_conditions = undecided;
        done
    }

    fn conflicts_with_active(&self, access: &Access) -> bool {
        self.active
            .iter()
            .any(|(_, running)| running.conflicts_with(access))
    }

    /// Hands the set's system to its executor pool. Missing pools mark the
    /// system finished-with-error without running it.
    fn dispatch_system(&mut self, index: usize) {
        let (system, access, executor, label) = {
            let node = &self.nodes[index];
            (
                node.system,
                node.system_access.clone(),
                node.executor,
                node.label,
            )
        };
        let Some(system) = system else { return };
        self.running += 1;
        self.active.push((index, access));

        let pool = match self.executors {
            Some(executors) => match executors.get(executor) {
                Some(pool) => pool,
                None => {
                    let error = RunSystemError::ExecutorNotFound {
                        system: label.name().into(),
                        executor,
                    };
                    log::error!("schedule {:?}: {error}", self.schedule_label);
                    self.send(index, FinishKind::SystemDone(Err(error)));
                    return;
                }
            },
            None => {
                let error = RunSystemError::NoExecutorsProvided {
                    system: label.name().into(),
                };
                log::error!("schedule {:?}: {error}", self.schedule_label);
                self.send(index, FinishKind::SystemDone(Err(error)));
                return;
            }
        };

        let sender = self.sender.clone();
        let world = WorldTaskPtr(self.world.raw());
        let name = label.name();
        pool.spawn(move || {
            let result = run_system_task(system, world, name);
            // The loop may only have exited if nothing was running, so the
            // receiver is still alive here.
            let _ = sender.send(FinishEvent {
                index,
                kind: FinishKind::SystemDone(result),
            });
        });
    }

    /// Books a finished set: frees the executor slot, completes the set once
    /// its children are drained, and unlocks successors and parents.
    fn handle_finished(&mut self, event: FinishEvent) {
        let index = event.index;
        match event.kind {
            FinishKind::SystemDone(result) => {
                if let Err(error) = &result {
                    log::error!(
                        "system {:?} in schedule {:?} did not complete: {error}",
                        self.nodes[index].label,
                        self.schedule_label
                    );
                }
                {
                    let node = &mut self.nodes[index];
                    node.result = Some(result);
                    node.children_count -= 1;
                }
                self.running -= 1;
                self.active.retain(|(active_index, _)| *active_index != index);
            }
            FinishKind::Skipped => {
                self.nodes[index].children_count -= 1;
            }
            FinishKind::Drained => {}
        }

        if self.nodes[index].children_count != 0 || self.nodes[index].finished {
            return;
        }
        self.nodes[index].finished = true;

        let info = &self.cache.infos[index];
        for &successor in &info.succeeds {
            self.nodes[successor].depends_count -= 1;
            if self.nodes[successor].depends_count == 0 {
                self.queue_wait_to_enter.push_back(successor);
            }
        }
        for &parent in &info.parents {
            self.nodes[parent].children_count -= 1;
            if self.nodes[parent].children_count == 0 {
                self.send(parent, FinishKind::Drained);
            }
        }
    }

    fn send(&self, index: usize, kind: FinishKind) {
        // The receiver lives as long as the loop; a send can only fail after
        // teardown, where it is moot.
        let _ = self.sender.send(FinishEvent { index, kind });
    }
}

/// Runs one system on a worker thread, catching panics into the result.
fn run_system_task(
    system: SystemTaskPtr,
    world: WorldTaskPtr,
    name: &'static str,
) -> Result<(), RunSystemError> {
    let caught = std::panic::catch_unwind(core::panic::AssertUnwindSafe(|| {
        // SAFETY: the run loop guarantees this system is dispatched at most
        // once concurrently, keeps the set map untouched while tasks are in
        // flight, and only admits access-compatible work in parallel.
        let system = unsafe { &mut *system.0 };
        let cell = unsafe { UnsafeWorldCell::from_raw(world.0) };
        // SAFETY: conflict-aware dispatch upholds `run_unsafe`'s contract.
        unsafe { system.run_unsafe(cell) }
    }));
    match caught {
        Ok(result) => result,
        Err(payload) => {
            let message = if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                "non-string panic payload".to_string()
            };
            Err(RunSystemError::Panicked {
                system: name.into(),
                message,
            })
        }
    }
}
