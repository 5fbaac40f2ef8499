//! The set graph, its build pass, and the cached execution plan.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use fixedbitset::FixedBitSet;
use indexmap::IndexMap;
use thiserror::Error;

use crate::schedule::config::{IntoSystemSetConfigs, SystemSetConfig};
use crate::schedule::label::{AsScheduleLabel, ExecutorLabel, ScheduleLabel, SystemSetLabel};
use crate::system::{BoxedCondition, BoxedSystem};
use crate::world::World;

/// A node in the set graph.
///
/// Every system lives inside the set that shares its label; a set may also
/// exist purely as a grouping or ordering anchor. Edges come in two kinds:
/// dependency (`depends`/`succeeds`) and containment (`in_sets`).
///
/// Declared edges keep whatever labels were mentioned, even ones not (yet)
/// present in the schedule; the build pass projects them onto the present
/// sets and installs the symmetric links.
pub struct SystemSet {
    label: SystemSetLabel,
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) system: Option<BoxedSystem>,
    pub(crate) conditions: Vec<BoxedCondition>,
    pub(crate) executor: ExecutorLabel,
    pub(crate) in_sets: HashSet<SystemSetLabel>,
    pub(crate) depends: HashSet<SystemSetLabel>,
    pub(crate) succeeds: HashSet<SystemSetLabel>,
    pub(crate) built_in_sets: HashSet<SystemSetLabel>,
    pub(crate) built_depends: HashSet<SystemSetLabel>,
    pub(crate) built_succeeds: HashSet<SystemSetLabel>,
}

impl SystemSet {
    fn new(label: SystemSetLabel) -> Self {
        SystemSet {
            label,
            name: None,
            system: None,
            conditions: Vec::new(),
            executor: ExecutorLabel::default(),
            in_sets: HashSet::new(),
            depends: HashSet::new(),
            succeeds: HashSet::new(),
            built_in_sets: HashSet::new(),
            built_depends: HashSet::new(),
            built_succeeds: HashSet::new(),
        }
    }

    #[inline]
    pub fn label(&self) -> SystemSetLabel {
        self.label
    }

    /// The display name: the explicit name if set, else the label's.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.label.name())
    }

    pub fn has_system(&self) -> bool {
        self.system.is_some()
    }

    /// Removes `label` from every edge set.
    fn detach(&mut self, label: SystemSetLabel) {
        self.in_sets.remove(&label);
        self.depends.remove(&label);
        self.succeeds.remove(&label);
        self.built_in_sets.remove(&label);
        self.built_depends.remove(&label);
        self.built_succeeds.remove(&label);
    }
}

/// A deferred edit of the set map, applied on the next build.
pub enum ScheduleCommand {
    AddSystems(SystemSetConfig),
    ConfigureSets(SystemSetConfig),
    RemoveSystem(SystemSetLabel),
    RemoveSet(SystemSetLabel),
}

/// Per-schedule configuration.
#[derive(Default, Clone, Copy)]
pub struct ScheduleConfig {
    /// After each successful run, remove every system (startup schedules).
    pub run_once: bool,
}

/// One entry of the flattened execution plan.
pub(crate) struct SystemSetInfo {
    pub label: SystemSetLabel,
    pub has_system: bool,
    /// Indices of built parents (`in_sets`).
    pub parents: Vec<usize>,
    /// Indices of built children (inverse of `parents`).
    pub children: Vec<usize>,
    /// Indices of built successors.
    pub succeeds: Vec<usize>,
    /// Children plus one for an owned system.
    pub cached_children_count: usize,
    pub cached_depends_count: usize,
}

/// The flattened set graph: indexed nodes in map-insertion order.
#[derive(Default)]
pub(crate) struct ScheduleCache {
    pub set_index_map: HashMap<SystemSetLabel, usize>,
    pub infos: Vec<SystemSetInfo>,
}

/// Building the execution plan failed; the schedule refuses to run.
#[derive(Error, Debug, Clone)]
pub enum SchedulePrepareError {
    #[error("cyclic dependency between system sets {0:?}")]
    CyclicDependency(Vec<SystemSetLabel>),
    #[error("cyclic hierarchy between system sets {0:?}")]
    CyclicHierarchy(Vec<SystemSetLabel>),
    #[error("set {set:?} has ancestors ordered against each other: {parents:?}")]
    ParentsWithDeps {
        set: SystemSetLabel,
        parents: Vec<SystemSetLabel>,
    },
}

/// Running a schedule failed.
#[derive(Error, Debug)]
pub enum RunScheduleError {
    #[error("schedule {schedule:?} refused to run: {source}")]
    Prepare {
        schedule: ScheduleLabel,
        #[source]
        source: SchedulePrepareError,
    },
    #[error("schedule {schedule:?} finished with {} unreached sets", remaining.len())]
    SetsRemaining {
        schedule: ScheduleLabel,
        remaining: Vec<SystemSetLabel>,
    },
}

/// A labelled set graph plus its cached execution plan.
///
/// Edits mark the cache dirty; the next run rebuilds the symmetric links,
/// re-flattens the graph, and re-validates it (cycle and hierarchy checks)
/// before executing.
pub struct Schedule {
    label: ScheduleLabel,
    pub(crate) config: ScheduleConfig,
    pub(crate) sets: IndexMap<SystemSetLabel, SystemSet>,
    newly_added: Vec<SystemSetLabel>,
    pending: Vec<ScheduleCommand>,
    pub(crate) cache: ScheduleCache,
    cache_dirty: bool,
    prepare_error: Option<SchedulePrepareError>,
}

impl Schedule {
    pub fn new(label: impl AsScheduleLabel) -> Self {
        Schedule {
            label: label.as_schedule_label(),
            config: ScheduleConfig::default(),
            sets: IndexMap::new(),
            newly_added: Vec::new(),
            pending: Vec::new(),
            cache: ScheduleCache::default(),
            cache_dirty: false,
            prepare_error: None,
        }
    }

    #[inline]
    pub fn label(&self) -> ScheduleLabel {
        self.label
    }

    /// Marks this schedule to shed its systems after each successful run.
    pub fn set_run_once(&mut self) -> &mut Self {
        self.config.run_once = true;
        self
    }

    pub fn is_run_once(&self) -> bool {
        self.config.run_once
    }

    /// Adds systems (and any set configuration they carry) to the graph.
    pub fn add_systems<M>(&mut self, configs: impl IntoSystemSetConfigs<M>) -> &mut Self {
        self.install_config(configs.into_configs());
        self
    }

    /// Adds or extends plain sets (no systems attached here).
    pub fn configure_sets<M>(&mut self, configs: impl IntoSystemSetConfigs<M>) -> &mut Self {
        let mut config = configs.into_configs();
        debug_assert!(
            config.system.is_none(),
            "configure_sets cannot install systems"
        );
        config.system = None;
        self.install_config(config);
        self
    }

    fn install_config(&mut self, mut config: SystemSetConfig) {
        let sub_configs = core::mem::take(&mut config.sub_configs);
        if let Some(label) = config.label {
            let set = self
                .sets
                .entry(label)
                .or_insert_with(|| SystemSet::new(label));
            if let Some(system) = config.system.take() {
                if set.system.is_none() {
                    set.system = Some(system);
                } else {
                    log::warn!(
                        "system {:?} is already present in schedule {:?}; keeping the first",
                        label,
                        self.label
                    );
                }
            }
            if let Some(name) = config.name.take() {
                set.name = Some(name);
            }
            if let Some(executor) = config.executor {
                set.executor = executor;
            }
            set.conditions.extend(config.conditions);
            set.in_sets.extend(config.in_sets);
            set.depends.extend(config.depends);
            set.succeeds.extend(config.succeeds);
            self.newly_added.push(label);
            self.cache_dirty = true;
        }
        for sub in sub_configs {
            self.install_config(sub);
        }
    }

    /// Drops the system owned by `label`, keeping the set node, and detaches
    /// the label from every other set's edges.
    pub fn remove_system(&mut self, label: SystemSetLabel) {
        if let Some(set) = self.sets.get_mut(&label) {
            set.system = None;
        }
        for (other_label, other) in self.sets.iter_mut() {
            if *other_label != label {
                other.detach(label);
            }
        }
        self.cache_dirty = true;
    }

    /// Removes the set node entirely.
    pub fn remove_set(&mut self, label: SystemSetLabel) {
        self.sets.shift_remove(&label);
        for other in self.sets.values_mut() {
            other.detach(label);
        }
        self.newly_added.retain(|added| *added != label);
        self.cache_dirty = true;
    }

    pub fn contains_set(&self, label: SystemSetLabel) -> bool {
        self.sets.contains_key(&label)
    }

    pub fn contains_system(&self, label: SystemSetLabel) -> bool {
        self.sets
            .get(&label)
            .is_some_and(|set| set.system.is_some())
    }

    /// Number of sets in the graph.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Defers an edit to the next build (used while the schedule's sets must
    /// not change, e.g. by the run-once sweep).
    pub fn queue_edit(&mut self, command: ScheduleCommand) {
        self.pending.push(command);
    }

    /// Applies deferred edits. Returns whether anything changed.
    pub(crate) fn flush_pending(&mut self) -> bool {
        let pending = core::mem::take(&mut self.pending);
        let any = !pending.is_empty();
        for command in pending {
            match command {
                ScheduleCommand::AddSystems(config) => self.install_config(config),
                ScheduleCommand::ConfigureSets(config) => self.install_config(config),
                ScheduleCommand::RemoveSystem(label) => self.remove_system(label),
                ScheduleCommand::RemoveSet(label) => self.remove_set(label),
            }
        }
        any
    }

    /// Completes symmetric links for newly added sets: dependencies of
    /// present labels get the matching `succeeds` entry and vice versa;
    /// referenced labels that are absent are dropped from the *built* edges
    /// but stay declared, so a later add re-links them.
    pub(crate) fn build_sets(&mut self) -> bool {
        let newly = core::mem::take(&mut self.newly_added);
        let mut any = false;
        for label in newly {
            if !self.sets.contains_key(&label) {
                continue;
            }
            any = true;
            let (declared_depends, declared_succeeds, declared_in_sets) = {
                let set = &self.sets[&label];
                (
                    set.depends.iter().copied().collect::<Vec<_>>(),
                    set.succeeds.iter().copied().collect::<Vec<_>>(),
                    set.in_sets.iter().copied().collect::<Vec<_>>(),
                )
            };
            if let Some(set) = self.sets.get_mut(&label) {
                set.built_in_sets.clear();
                set.built_depends.clear();
                set.built_succeeds.clear();
            }
            for depend in declared_depends {
                if depend == label {
                    continue;
                }
                if let Some(depend_set) = self.sets.get_mut(&depend) {
                    depend_set.built_succeeds.insert(label);
                    if let Some(set) = self.sets.get_mut(&label) {
                        set.built_depends.insert(depend);
                    }
                }
            }
            for succeed in declared_succeeds {
                if succeed == label {
                    continue;
                }
                if let Some(succeed_set) = self.sets.get_mut(&succeed) {
                    succeed_set.built_depends.insert(label);
                    if let Some(set) = self.sets.get_mut(&label) {
                        set.built_succeeds.insert(succeed);
                    }
                }
            }
            for parent in declared_in_sets {
                if parent != label && self.sets.contains_key(&parent) {
                    if let Some(set) = self.sets.get_mut(&label) {
                        set.built_in_sets.insert(parent);
                    }
                }
            }
            // Symmetrise existing sets whose declared edges reference the
            // newly added label.
            let others: Vec<SystemSetLabel> = self
                .sets
                .keys()
                .copied()
                .filter(|other| *other != label)
                .collect();
            for other in others {
                let (references_depend, references_succeed, references_parent) = {
                    let other_set = &self.sets[&other];
                    (
                        other_set.depends.contains(&label),
                        other_set.succeeds.contains(&label),
                        other_set.in_sets.contains(&label),
                    )
                };
                if references_depend {
                    if let Some(other_set) = self.sets.get_mut(&other) {
                        other_set.built_depends.insert(label);
                    }
                    if let Some(set) = self.sets.get_mut(&label) {
                        set.built_succeeds.insert(other);
                    }
                }
                if references_succeed {
                    if let Some(other_set) = self.sets.get_mut(&other) {
                        other_set.built_succeeds.insert(label);
                    }
                    if let Some(set) = self.sets.get_mut(&label) {
                        set.built_depends.insert(other);
                    }
                }
                if references_parent {
                    if let Some(other_set) = self.sets.get_mut(&other) {
                        other_set.built_in_sets.insert(label);
                    }
                }
            }
        }
        any
    }

    /// Flattens the set map into indexed arrays, in map-insertion order.
    pub(crate) fn update_cache(&mut self) {
        let mut cache = ScheduleCache {
            set_index_map: HashMap::with_capacity(self.sets.len()),
            infos: Vec::with_capacity(self.sets.len()),
        };
        for (index, (label, set)) in self.sets.iter().enumerate() {
            cache.set_index_map.insert(*label, index);
            cache.infos.push(SystemSetInfo {
                label: *label,
                has_system: set.system.is_some(),
                parents: Vec::with_capacity(set.built_in_sets.len()),
                children: Vec::new(),
                succeeds: Vec::with_capacity(set.built_succeeds.len()),
                cached_children_count: usize::from(set.system.is_some()),
                cached_depends_count: set.built_depends.len(),
            });
        }
        for (index, set) in self.sets.values().enumerate() {
            for parent in &set.built_in_sets {
                let parent_index = cache.set_index_map[parent];
                cache.infos[index].parents.push(parent_index);
                cache.infos[parent_index].children.push(index);
                cache.infos[parent_index].cached_children_count += 1;
            }
            for succeed in &set.built_succeeds {
                let succeed_index = cache.set_index_map[succeed];
                cache.infos[index].succeeds.push(succeed_index);
            }
        }
        self.cache = cache;
    }

    /// Rebuilds and re-validates the plan if anything changed since the last
    /// run. On error the plan is rejected until the graph is edited again.
    pub(crate) fn prepare(&mut self) -> Result<(), SchedulePrepareError> {
        self.flush_pending();
        self.build_sets();
        if self.cache_dirty {
            self.update_cache();
            self.cache_dirty = false;
            self.prepare_error = self.validate().err();
        }
        match &self.prepare_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), SchedulePrepareError> {
        let infos = &self.cache.infos;
        let node_count = infos.len();

        // Cycles in the hierarchy alone.
        {
            let mut temp = vec![false; node_count];
            let mut perm = vec![false; node_count];
            let mut path = Vec::new();
            fn visit(
                infos: &[SystemSetInfo],
                index: usize,
                temp: &mut [bool],
                perm: &mut [bool],
                path: &mut Vec<SystemSetLabel>,
            ) -> bool {
                if perm[index] {
                    return false;
                }
                if temp[index] {
                    path.push(infos[index].label);
                    return true;
                }
                temp[index] = true;
                path.push(infos[index].label);
                for &child in &infos[index].children {
                    if visit(infos, child, temp, perm, path) {
                        return true;
                    }
                }
                temp[index] = false;
                perm[index] = true;
                path.pop();
                false
            }
            for index in 0..node_count {
                if !perm[index] && visit(infos, index, &mut temp, &mut perm, &mut path) {
                    return Err(SchedulePrepareError::CyclicHierarchy(cycle_of(path)));
                }
            }
        }

        // Cycles across dependency and hierarchy edges together.
        {
            let mut temp = vec![false; node_count];
            let mut perm = vec![false; node_count];
            let mut path = Vec::new();
            fn visit(
                infos: &[SystemSetInfo],
                index: usize,
                temp: &mut [bool],
                perm: &mut [bool],
                path: &mut Vec<SystemSetLabel>,
            ) -> bool {
                if perm[index] {
                    return false;
                }
                if temp[index] {
                    path.push(infos[index].label);
                    return true;
                }
                temp[index] = true;
                path.push(infos[index].label);
                for &next in infos[index].succeeds.iter().chain(&infos[index].children) {
                    if visit(infos, next, temp, perm, path) {
                        return true;
                    }
                }
                temp[index] = false;
                perm[index] = true;
                path.pop();
                false
            }
            for index in 0..node_count {
                if !perm[index] && visit(infos, index, &mut temp, &mut perm, &mut path) {
                    return Err(SchedulePrepareError::CyclicDependency(cycle_of(path)));
                }
            }
        }

        // Ancestors of one set must not be ordered against each other: the
        // run loop admits a child only once *all* its parents entered, which
        // is unsatisfiable if one ancestor must finish before another starts.
        // Orientation does not matter, so reachability over `succeeds` is
        // checked in both directions.
        {
            let reachable_parents = reachability(infos, node_count, EdgeKind::Parents, true);
            let reachable_depends = reachability(infos, node_count, EdgeKind::Succeeds, false);
            for index in 0..node_count {
                let parents: Vec<usize> = reachable_parents[index].ones().collect();
                for (position, &first) in parents.iter().enumerate() {
                    for &second in &parents[position + 1..] {
                        let ordered = reachable_depends[first].contains(second)
                            || reachable_depends[second].contains(first);
                        if ordered {
                            return Err(SchedulePrepareError::ParentsWithDeps {
                                set: infos[index].label,
                                parents: vec![infos[first].label, infos[second].label],
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Trims a DFS path down to the cycle it discovered: everything from the
/// first occurrence of the repeated tail label.
fn cycle_of(mut path: Vec<SystemSetLabel>) -> Vec<SystemSetLabel> {
    if let Some(repeated) = path.last().copied() {
        if let Some(start) = path.iter().position(|label| *label == repeated) {
            path.pop();
            return path.split_off(start);
        }
    }
    path
}

#[derive(Clone, Copy)]
enum EdgeKind {
    Parents,
    Succeeds,
}

impl EdgeKind {
    fn of(self, info: &SystemSetInfo) -> &[usize] {
        match self {
            EdgeKind::Parents => &info.parents,
            EdgeKind::Succeeds => &info.succeeds,
        }
    }
}

/// Transitive reachability over `edges`, optionally counting each node as
/// reachable from itself.
fn reachability(
    infos: &[SystemSetInfo],
    node_count: usize,
    edges: EdgeKind,
    include_self: bool,
) -> Vec<FixedBitSet> {
    let mut reach = vec![FixedBitSet::with_capacity(node_count); node_count];
    let mut visited = vec![false; node_count];
    fn dfs(
        infos: &[SystemSetInfo],
        index: usize,
        edges: EdgeKind,
        include_self: bool,
        reach: &mut [FixedBitSet],
        visited: &mut [bool],
    ) {
        if visited[index] {
            return;
        }
        visited[index] = true;
        if include_self {
            reach[index].grow(index + 1);
            reach[index].insert(index);
        }
        let next: Vec<usize> = edges.of(&infos[index]).to_vec();
        for edge in next {
            dfs(infos, edge, edges, include_self, reach, visited);
            let other = reach[edge].clone();
            reach[index].grow(edge + 1);
            reach[index].insert(edge);
            reach[index].union_with(&other);
        }
    }
    for index in 0..node_count {
        dfs(infos, index, edges, include_self, &mut reach, &mut visited);
    }
    reach
}

/// The schedules owned by an app, keyed by label.
#[derive(Default)]
pub struct Schedules {
    map: HashMap<ScheduleLabel, Schedule>,
}

/// An operation named a schedule that does not exist.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("schedule {0:?} not found")]
pub struct ScheduleNotFound(pub ScheduleLabel);

impl Schedules {
    /// Inserts a schedule, returning the one it replaced, if any.
    pub fn insert(&mut self, schedule: Schedule) -> Option<Schedule> {
        self.map.insert(schedule.label(), schedule)
    }

    pub fn contains(&self, label: impl AsScheduleLabel) -> bool {
        self.map.contains_key(&label.as_schedule_label())
    }

    pub fn get(&self, label: impl AsScheduleLabel) -> Option<&Schedule> {
        self.map.get(&label.as_schedule_label())
    }

    pub fn get_mut(&mut self, label: impl AsScheduleLabel) -> Option<&mut Schedule> {
        self.map.get_mut(&label.as_schedule_label())
    }

    /// The schedule under `label`, created on first use.
    pub fn entry(&mut self, label: impl AsScheduleLabel) -> &mut Schedule {
        let label = label.as_schedule_label();
        self.map
            .entry(label)
            .or_insert_with(|| Schedule::new(label))
    }

    pub fn remove(&mut self, label: impl AsScheduleLabel) -> Option<Schedule> {
        self.map.remove(&label.as_schedule_label())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ScheduleLabel, &Schedule)> {
        self.map.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ScheduleLabel, &mut Schedule)> {
        self.map.iter_mut()
    }
}

/// Initializes every system and condition against `world`; re-initialization
/// happens automatically when the world changed or new types appeared.
impl Schedule {
    pub(crate) fn initialize_systems(&mut self, world: &mut World) {
        for set in self.sets.values_mut() {
            if let Some(system) = &mut set.system {
                system.initialize(world);
            }
            for condition in &mut set.conditions {
                condition.initialize(world);
            }
        }
    }
}
