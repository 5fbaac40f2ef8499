//! The [`App`]: a main world, its schedules, sub-apps, and plugins.

use core::num::NonZeroU8;
use std::collections::HashMap;
use std::sync::Arc;

use ember_ecs::event::Events;
use ember_ecs::schedule::{
    AsScheduleLabel, Executors, IntoSystemSetConfigs, Schedule,
};
use ember_ecs::world::{FromWorld, World};

use crate::main_schedule::{
    Exit, ExtractSchedule, First, Last, PostExit, PostStartup, PostUpdate, PreExit, PreStartup,
    PreUpdate, Startup, StateTransition, Update,
};
use crate::plugin::{AppPlugins, PlaceholderPlugin, Plugin, PluginError, PluginStore, Plugins};
use crate::sub_app::{AppScheduleError, SubApp};

ember_ecs::define_label!(
    /// Identifies an [`App`] or sub-app.
    AppLabel,
    /// Types usable where an [`AppLabel`] is expected.
    AsAppLabel,
    as_app_label
);

/// The label of the main app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Main;
impl AsAppLabel for Main {}

/// An event that tells the app to leave its main loop.
///
/// The runner observes it between frames; the carried code becomes the
/// process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppExit {
    #[default]
    Success,
    Error(NonZeroU8),
}

impl AppExit {
    /// A generic failure exit.
    pub fn error() -> Self {
        AppExit::Error(NonZeroU8::MIN)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AppExit::Success)
    }

    /// The process exit code this corresponds to.
    pub fn code(&self) -> u8 {
        match self {
            AppExit::Success => 0,
            AppExit::Error(code) => code.get(),
        }
    }
}

/// Configuration for [`App::create`].
#[derive(Clone, Copy, Debug)]
pub struct AppCreateInfo {
    /// Worker count of the default multi-thread executor pool.
    pub default_pool_size: usize,
}

impl Default for AppCreateInfo {
    fn default() -> Self {
        AppCreateInfo {
            default_pool_size: Executors::DEFAULT_POOL_SIZE,
        }
    }
}

type RunnerFn = Box<dyn FnOnce(App) -> AppExit>;

/// The main sub-app plus the labeled auxiliary ones.
pub struct SubApps {
    pub main: SubApp,
    pub sub_apps: HashMap<AppLabel, SubApp>,
}

/// A plugin-assembled application.
///
/// Owns the main world (through the main [`SubApp`]), any auxiliary
/// sub-apps, the executor table shared between them, and the registered
/// plugins. [`run`](App::run) builds the plugins to fixpoint, drives one
/// startup pass, loops the main order until [`AppExit`] is observed, then
/// runs the exit order.
pub struct App {
    sub_apps: SubApps,
    executors: Arc<Executors>,
    plugins: PluginStore,
    runner: Option<RunnerFn>,
}

impl Default for App {
    fn default() -> Self {
        App::new()
    }
}

impl App {
    /// An app with the standard schedules, orders, and executor pools.
    pub fn new() -> App {
        App::create(AppCreateInfo::default())
    }

    pub fn create(create_info: AppCreateInfo) -> App {
        let mut app = App::empty(create_info);
        {
            let main = app.main_mut();
            for label in [
                PreStartup.as_schedule_label(),
                Startup.as_schedule_label(),
                PostStartup.as_schedule_label(),
            ] {
                let mut schedule = Schedule::new(label);
                schedule.set_run_once();
                main.add_schedule(schedule);
                main.startup_order_mut().push(label);
            }
            main.init_schedule(First)
                .init_schedule(PreUpdate)
                .init_schedule(StateTransition)
                .init_schedule(Update)
                .init_schedule(PostUpdate)
                .init_schedule(Last);
            main.main_order_mut()
                .push(First)
                .push(PreUpdate)
                .push(StateTransition)
                .push(Update)
                .push(PostUpdate)
                .push(Last);
            main.init_schedule(PreExit)
                .init_schedule(Exit)
                .init_schedule(PostExit);
            main.exit_order_mut().push(PreExit).push(Exit).push(PostExit);
        }
        app.add_events::<AppExit>();
        app
    }

    /// An app with no schedules and no orders.
    pub fn empty(create_info: AppCreateInfo) -> App {
        let executors = Arc::new(Executors::new(create_info.default_pool_size));
        let main = SubApp::new(Main.as_app_label(), executors.clone());
        App {
            sub_apps: SubApps {
                main,
                sub_apps: HashMap::new(),
            },
            executors,
            plugins: PluginStore::default(),
            runner: None,
        }
    }

    /// The main sub-app.
    pub fn main(&self) -> &SubApp {
        &self.sub_apps.main
    }

    /// The main sub-app, mutably.
    pub fn main_mut(&mut self) -> &mut SubApp {
        &mut self.sub_apps.main
    }

    /// The shared executor table.
    pub fn executors(&self) -> &Arc<Executors> {
        &self.executors
    }

    /// Registers an additional named executor pool.
    pub fn add_executor_pool(
        &mut self,
        label: impl ember_ecs::schedule::AsExecutorLabel,
        num_threads: usize,
    ) -> &mut Self {
        self.executors.add_pool(label, num_threads);
        self
    }

    // --- main-world conveniences ---

    pub fn world(&self) -> &World {
        self.main().world()
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.main_mut().world_mut()
    }

    pub fn add_schedule(&mut self, schedule: Schedule) -> &mut Self {
        self.main_mut().add_schedule(schedule);
        self
    }

    pub fn init_schedule(&mut self, label: impl AsScheduleLabel) -> &mut Self {
        self.main_mut().init_schedule(label);
        self
    }

    pub fn get_schedule(&self, label: impl AsScheduleLabel) -> Option<&Schedule> {
        self.main().get_schedule(label)
    }

    pub fn get_schedule_mut(&mut self, label: impl AsScheduleLabel) -> Option<&mut Schedule> {
        self.main_mut().get_schedule_mut(label)
    }

    pub fn add_systems<M>(
        &mut self,
        schedule: impl AsScheduleLabel,
        systems: impl IntoSystemSetConfigs<M>,
    ) -> &mut Self {
        self.main_mut().add_systems(schedule, systems);
        self
    }

    pub fn configure_sets<M>(
        &mut self,
        schedule: impl AsScheduleLabel,
        sets: impl IntoSystemSetConfigs<M>,
    ) -> &mut Self {
        self.main_mut().configure_sets(schedule, sets);
        self
    }

    pub fn insert_resource<R: ember_ecs::component::Resource>(&mut self, value: R) -> &mut Self {
        self.main_mut().insert_resource(value);
        self
    }

    pub fn init_resource<R: ember_ecs::component::Resource + FromWorld>(&mut self) -> &mut Self {
        self.main_mut().init_resource::<R>();
        self
    }

    pub fn add_events<E: ember_ecs::event::Event>(&mut self) -> &mut Self {
        self.main_mut().add_events::<E>();
        self
    }

    // --- sub-apps ---

    /// Creates (or returns) the sub-app under `label`, pre-wired with an
    /// [`ExtractSchedule`] in its extract order.
    pub fn add_sub_app(&mut self, label: impl AsAppLabel) -> &mut SubApp {
        let label = label.as_app_label();
        let executors = self.executors.clone();
        self.sub_apps.sub_apps.entry(label).or_insert_with(|| {
            let mut sub_app = SubApp::new(label, executors);
            sub_app.init_schedule(ExtractSchedule);
            sub_app.extract_order_mut().push(ExtractSchedule);
            sub_app
        })
    }

    /// The sub-app under `label`; panics if it does not exist.
    pub fn sub_app(&self, label: impl AsAppLabel) -> &SubApp {
        let label = label.as_app_label();
        self.get_sub_app(label)
            .unwrap_or_else(|| panic!("sub-app {label:?} does not exist"))
    }

    /// The sub-app under `label`, mutably; panics if it does not exist.
    pub fn sub_app_mut(&mut self, label: impl AsAppLabel) -> &mut SubApp {
        let label = label.as_app_label();
        self.get_sub_app_mut(label)
            .unwrap_or_else(|| panic!("sub-app {label:?} does not exist"))
    }

    pub fn get_sub_app(&self, label: impl AsAppLabel) -> Option<&SubApp> {
        self.sub_apps.sub_apps.get(&label.as_app_label())
    }

    pub fn get_sub_app_mut(&mut self, label: impl AsAppLabel) -> Option<&mut SubApp> {
        self.sub_apps.sub_apps.get_mut(&label.as_app_label())
    }

    // --- plugins ---

    /// Registers one plugin or a tuple of plugins.
    ///
    /// Panics when called after [`build`](App::build); plugin registration
    /// is rejected once the build fixpoint completed.
    pub fn add_plugins<M>(&mut self, plugins: impl Plugins<M>) -> &mut Self {
        plugins.add_to_app(self);
        self
    }

    pub(crate) fn try_add_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        self.plugins.add(plugin)
    }

    pub fn is_plugin_added<P: Plugin>(&self) -> bool {
        self.plugins.is_added(core::any::TypeId::of::<P>())
    }

    /// Walks all registered plugins in insertion order calling `build`;
    /// plugins added during the walk are built too. After the fixpoint every
    /// plugin's `finish` runs once, and the plugins move into the
    /// [`AppPlugins`] resource on the main world.
    pub fn build(&mut self) {
        if self.plugins.built {
            return;
        }
        let mut cursor = 0;
        while cursor < self.plugins.plugins.len() {
            let mut plugin: Box<dyn Plugin> = Box::new(PlaceholderPlugin);
            core::mem::swap(&mut self.plugins.plugins[cursor], &mut plugin);
            log::debug!("building plugin {}", plugin.name());
            plugin.build(self);
            core::mem::swap(&mut self.plugins.plugins[cursor], &mut plugin);
            cursor += 1;
        }
        for index in 0..self.plugins.plugins.len() {
            let mut plugin: Box<dyn Plugin> = Box::new(PlaceholderPlugin);
            core::mem::swap(&mut self.plugins.plugins[index], &mut plugin);
            plugin.finish(self);
            core::mem::swap(&mut self.plugins.plugins[index], &mut plugin);
        }
        self.plugins.built = true;
        let plugins = core::mem::take(&mut self.plugins.plugins);
        self.world_mut().insert_resource(AppPlugins::new(plugins));
    }

    /// The built plugin of type `P`.
    pub fn get_plugin<P: Plugin>(&self) -> Option<&P> {
        self.world().get_resource::<AppPlugins>()?.get::<P>()
    }

    // --- driving ---

    /// Runs one frame: the main app's main order, then each sub-app's
    /// extract step and own main order.
    pub fn update(&mut self) {
        let SubApps { main, sub_apps } = &mut self.sub_apps;
        main.update();
        for sub_app in sub_apps.values_mut() {
            sub_app.run_extract(main.world_mut());
            sub_app.update();
        }
    }

    /// Runs the startup order once.
    pub fn startup(&mut self) {
        self.main_mut().run_startup();
    }

    /// Runs the exit orders of the main app and every sub-app.
    pub fn exit(&mut self) {
        self.main_mut().run_exit();
        for sub_app in self.sub_apps.sub_apps.values_mut() {
            sub_app.run_exit();
        }
    }

    /// Runs one schedule of the main app by label, surfacing errors.
    pub fn run_schedule(&mut self, label: impl AsScheduleLabel) -> Result<(), AppScheduleError> {
        self.main_mut().run_schedule(label)
    }

    /// Any [`AppExit`] events written since the last frame; errors win.
    pub fn should_exit(&self) -> Option<AppExit> {
        let events = self.world().get_resource::<Events<AppExit>>()?;
        let mut cursor = events.get_cursor();
        let mut exit = None;
        for event in cursor.read(events) {
            match event {
                AppExit::Success => exit = exit.or(Some(AppExit::Success)),
                error => return Some(*error),
            }
        }
        exit
    }

    /// Overrides the main loop; the runner receives the built [`App`] and
    /// returns its exit state.
    pub fn set_runner(&mut self, runner: impl FnOnce(App) -> AppExit + 'static) -> &mut Self {
        self.runner = Some(Box::new(runner));
        self
    }

    /// Builds plugins, then hands the app to its runner (the standard loop
    /// runner unless [`set_runner`](App::set_runner) replaced it).
    pub fn run(&mut self) -> AppExit {
        let mut app = core::mem::replace(self, App::empty(AppCreateInfo::default()));
        app.build();
        let runner = app
            .runner
            .take()
            .unwrap_or_else(|| Box::new(crate::schedule_runner::loop_runner));
        (runner)(app)
    }
}

impl core::fmt::Debug for App {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "App(sub_apps: {})", self.sub_apps.sub_apps.len() + 1)
    }
}
