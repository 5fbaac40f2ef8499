//! Ember: a plugin-assembled app framework built around a parallel ECS
//! scheduler.
//!
//! The facade crate re-exports the engine's crates under one roof:
//!
//! - [`ecs`]: world, components, resources, events, queries, systems, and
//!   the conflict-aware parallel scheduler.
//! - [`app`]: the [`App`](app::App) / sub-app / plugin layer and the
//!   standard schedule lineup.
//! - [`tasks`]: the named worker pools systems are dispatched to.
//!
//! ```
//! use ember::prelude::*;
//!
//! #[derive(Default)]
//! struct FrameCount(u64);
//!
//! fn count_frames(mut count: ResMut<FrameCount>, mut exit: EventWriter<AppExit>) {
//!     count.0 += 1;
//!     if count.0 == 3 {
//!         exit.send(AppExit::Success);
//!     }
//! }
//!
//! let exit = App::new()
//!     .init_resource::<FrameCount>()
//!     .add_systems(Update, count_frames)
//!     .run();
//! assert!(exit.is_success());
//! ```

pub use ember_app as app;
pub use ember_ecs as ecs;
pub use ember_tasks as tasks;

/// The engine prelude: the app and ECS preludes combined.
pub mod prelude {
    #[doc(hidden)]
    pub use ember_app::prelude::*;
    #[doc(hidden)]
    pub use ember_ecs::prelude::*;
}
