//! The application layer of Ember: [`App`], sub-apps, plugins, and the
//! standard schedule lineup.

mod app;
mod main_schedule;
mod plugin;
mod schedule_runner;
mod sub_app;

pub use app::{App, AppCreateInfo, AppExit, AppLabel, AsAppLabel, Main, SubApps};
pub use main_schedule::{
    Exit, ExtractSchedule, First, Last, PostExit, PostStartup, PostUpdate, PreExit, PreStartup,
    PreUpdate, ScheduleOrder, Startup, StateTransition, Update,
};
pub use plugin::{AppPlugins, Plugin, PluginError, PluginMarker, Plugins};
pub use schedule_runner::{loop_runner, run_once_runner};
pub use sub_app::{AppScheduleError, ExtractTarget, SubApp};

/// The app prelude.
pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        App, AppExit, AsAppLabel, Exit, ExtractSchedule, First, Last, Plugin, PostStartup,
        PostUpdate, PreStartup, PreUpdate, Startup, SubApp, Update,
    };
}
