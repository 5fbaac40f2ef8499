//! Sub-applications: a world, its schedules, and the phase orders.

use core::ptr::NonNull;
use std::sync::Arc;

use ember_ecs::event::{Event, Events};
use ember_ecs::schedule::{
    AsScheduleLabel, Executors, IntoSystemSetConfigs, RunScheduleError, Schedule, ScheduleLabel,
    ScheduleNotFound, Schedules,
};
use ember_ecs::world::{FromWorld, World};
use thiserror::Error;

use crate::main_schedule::{Last, ScheduleOrder};
use crate::AppLabel;

type ExtractFn = Box<dyn FnMut(&mut World, &mut World) + Send>;

/// Running one of an app's schedules by label failed.
#[derive(Error, Debug)]
pub enum AppScheduleError {
    #[error(transparent)]
    NotFound(#[from] ScheduleNotFound),
    #[error(transparent)]
    Run(#[from] RunScheduleError),
}

/// While a sub-app extracts, its parent's world carries this resource,
/// pointing at the sub-app's world. It is removed unconditionally once the
/// extract step completes, so the pointer never leaks into later schedules.
pub struct ExtractTarget {
    target: NonNull<World>,
}

// SAFETY: the pointer is only dereferenced during the extract step, while
// the app holds both worlds exclusively.
unsafe impl Send for ExtractTarget {}
unsafe impl Sync for ExtractTarget {}

impl ExtractTarget {
    fn new(world: &mut World) -> Self {
        ExtractTarget {
            target: NonNull::from(world),
        }
    }

    /// The world being extracted into.
    pub fn world_mut(&mut self) -> &mut World {
        // SAFETY: the resource only exists while the extract step runs and
        // the app is not otherwise touching the target world.
        unsafe { self.target.as_mut() }
    }
}

/// A world plus a set of schedules and the ordered schedule lists for each
/// lifecycle phase. The main app is a `SubApp` too; auxiliary ones (for
/// example a render world) additionally run an extract order after being fed
/// by their [`extract`](SubApp::set_extract) function.
pub struct SubApp {
    label: AppLabel,
    world: World,
    schedules: Schedules,
    startup_order: ScheduleOrder,
    main_order: ScheduleOrder,
    exit_order: ScheduleOrder,
    extract_order: ScheduleOrder,
    extract: Option<ExtractFn>,
    executors: Arc<Executors>,
}

impl SubApp {
    pub(crate) fn new(label: AppLabel, executors: Arc<Executors>) -> Self {
        SubApp {
            label,
            world: World::new(),
            schedules: Schedules::default(),
            startup_order: ScheduleOrder::default(),
            main_order: ScheduleOrder::default(),
            exit_order: ScheduleOrder::default(),
            extract_order: ScheduleOrder::default(),
            extract: None,
            executors,
        }
    }

    #[inline]
    pub fn label(&self) -> AppLabel {
        self.label
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[inline]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[inline]
    pub fn executors(&self) -> &Arc<Executors> {
        &self.executors
    }

    // --- schedules ---

    /// Adds a schedule; an existing schedule under the same label is kept
    /// and the new one dropped.
    pub fn add_schedule(&mut self, schedule: Schedule) -> &mut Self {
        if self.schedules.contains(schedule.label()) {
            log::warn!(
                "app {:?} already has schedule {:?}; keeping the existing one",
                self.label,
                schedule.label()
            );
            return self;
        }
        self.schedules.insert(schedule);
        self
    }

    /// Makes sure a schedule exists under `label`.
    pub fn init_schedule(&mut self, label: impl AsScheduleLabel) -> &mut Self {
        self.schedules.entry(label);
        self
    }

    pub fn get_schedule(&self, label: impl AsScheduleLabel) -> Option<&Schedule> {
        self.schedules.get(label)
    }

    pub fn get_schedule_mut(&mut self, label: impl AsScheduleLabel) -> Option<&mut Schedule> {
        self.schedules.get_mut(label)
    }

    /// Edits the schedule under `label`, creating it if needed.
    pub fn edit_schedule(
        &mut self,
        label: impl AsScheduleLabel,
        edit: impl FnOnce(&mut Schedule),
    ) -> &mut Self {
        edit(self.schedules.entry(label));
        self
    }

    pub fn add_systems<M>(
        &mut self,
        schedule: impl AsScheduleLabel,
        systems: impl IntoSystemSetConfigs<M>,
    ) -> &mut Self {
        self.schedules.entry(schedule).add_systems(systems);
        self
    }

    pub fn configure_sets<M>(
        &mut self,
        schedule: impl AsScheduleLabel,
        sets: impl IntoSystemSetConfigs<M>,
    ) -> &mut Self {
        self.schedules.entry(schedule).configure_sets(sets);
        self
    }

    // --- resources & events ---

    pub fn insert_resource<R: ember_ecs::component::Resource>(&mut self, value: R) -> &mut Self {
        self.world.insert_resource(value);
        self
    }

    pub fn init_resource<R: ember_ecs::component::Resource + FromWorld>(&mut self) -> &mut Self {
        self.world.init_resource::<R>();
        self
    }

    /// Registers the event channel for `E` and its once-per-frame rotation
    /// in [`Last`].
    pub fn add_events<E: Event>(&mut self) -> &mut Self {
        if !self.world.contains_resource::<Events<E>>() {
            self.world.insert_resource(Events::<E>::default());
            self.add_systems(Last, Events::<E>::update_system);
        }
        self
    }

    // --- phase orders ---

    pub fn startup_order(&self) -> &ScheduleOrder {
        &self.startup_order
    }

    pub fn startup_order_mut(&mut self) -> &mut ScheduleOrder {
        &mut self.startup_order
    }

    pub fn main_order(&self) -> &ScheduleOrder {
        &self.main_order
    }

    pub fn main_order_mut(&mut self) -> &mut ScheduleOrder {
        &mut self.main_order
    }

    pub fn exit_order(&self) -> &ScheduleOrder {
        &self.exit_order
    }

    pub fn exit_order_mut(&mut self) -> &mut ScheduleOrder {
        &mut self.exit_order
    }

    pub fn extract_order(&self) -> &ScheduleOrder {
        &self.extract_order
    }

    pub fn extract_order_mut(&mut self) -> &mut ScheduleOrder {
        &mut self.extract_order
    }

    // --- extract ---

    /// Sets the function that copies data from a source world (the parent
    /// app's) into this sub-app's world.
    pub fn set_extract(
        &mut self,
        extract: impl FnMut(&mut World, &mut World) + Send + 'static,
    ) -> &mut Self {
        self.extract = Some(Box::new(extract));
        self
    }

    /// Removes and returns the extract function, if any was set.
    pub fn take_extract(&mut self) -> Option<ExtractFn> {
        self.extract.take()
    }

    /// The extract step: expose this world to the source through
    /// [`ExtractTarget`], run the extract function, then this app's extract
    /// order. The target resource is removed unconditionally afterwards.
    pub(crate) fn run_extract(&mut self, source: &mut World) {
        source.insert_resource(ExtractTarget::new(&mut self.world));
        if let Some(extract) = &mut self.extract {
            extract(source, &mut self.world);
        }
        let order = self.extract_order.labels.clone();
        for label in order {
            self.run_schedule_logged(label);
        }
        source.remove_resource::<ExtractTarget>();
        self.world.remove_resource::<ExtractTarget>();
    }

    // --- driving ---

    /// Runs one schedule by label, surfacing errors.
    pub fn run_schedule(&mut self, label: impl AsScheduleLabel) -> Result<(), AppScheduleError> {
        let label = label.as_schedule_label();
        let schedule = self
            .schedules
            .get_mut(label)
            .ok_or(ScheduleNotFound(label))?;
        schedule.run(&mut self.world, Some(&*self.executors))?;
        Ok(())
    }

    fn run_schedule_logged(&mut self, label: ScheduleLabel) {
        if let Err(error) = self.run_schedule(label) {
            log::error!("app {:?}: {error}", self.label);
        }
    }

    /// Runs the startup order once.
    pub fn run_startup(&mut self) {
        let order = self.startup_order.labels.clone();
        for label in order {
            self.run_schedule_logged(label);
        }
    }

    /// Runs the main order once and advances the world's frame trackers.
    pub fn update(&mut self) {
        let order = self.main_order.labels.clone();
        for label in order {
            self.run_schedule_logged(label);
        }
        self.world.clear_trackers();
    }

    /// Runs the exit order once.
    pub fn run_exit(&mut self) {
        let order = self.exit_order.labels.clone();
        for label in order {
            self.run_schedule_logged(label);
        }
    }
}

impl core::fmt::Debug for SubApp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SubApp({:?})", self.label)
    }
}
