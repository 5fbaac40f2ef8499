//! Systems: callables with a declared access set.

mod commands;
mod function_system;
mod query;
mod system_param;

pub use commands::{Command, CommandQueue, Commands};
pub use function_system::{FunctionSystem, IsFunctionSystem, SystemParamFunction};
pub use query::Query;
pub use system_param::{
    EventReader, EventWriter, Local, SystemParam, SystemParamError, SystemParamItem, WorldMut,
};

use std::borrow::Cow;

use thiserror::Error;

use crate::query::Access;
use crate::schedule::ExecutorLabel;
use crate::world::{UnsafeWorldCell, World};

/// A schedulable unit of work: a callable plus the access set it declares
/// over components, resources, and the world.
///
/// Systems are constructed via [`IntoSystem`], initialized against a
/// specific [`World`] before their first run (resolving type ids and
/// per-system state), and then invoked by the scheduler. Conditions are
/// systems with `Out = bool`.
pub trait System: Send + Sync + 'static {
    type Out;

    fn name(&self) -> Cow<'static, str>;

    /// The declared access set. Only valid after initialization.
    fn access(&self) -> &Access;

    fn is_initialized(&self) -> bool;

    /// Resolves parameters against `world`. Idempotent: re-initializes only
    /// when the world changed or new types were registered since.
    fn initialize(&mut self, world: &mut World);

    /// Runs the system through a shared world cell.
    ///
    /// # Safety
    /// The caller must guarantee no concurrently running access conflicts
    /// with this system's declared access set.
    unsafe fn run_unsafe(&mut self, world: UnsafeWorldCell<'_>)
    -> Result<Self::Out, RunSystemError>;

    /// Runs the system with exclusive world access.
    fn run(&mut self, world: &mut World) -> Result<Self::Out, RunSystemError> {
        self.initialize(world);
        let cell = world.as_unsafe_world_cell();
        // SAFETY: the exclusive borrow covers any declared access.
        unsafe { self.run_unsafe(cell) }
    }
}

pub type BoxedSystem<Out = ()> = Box<dyn System<Out = Out>>;

/// A boxed run-condition: a system returning `bool`.
pub type BoxedCondition = BoxedSystem<bool>;

/// Running a system failed. The scheduler logs these and accounts the
/// system as finished, so the dependency graph still unblocks.
#[derive(Error, Debug, Clone)]
pub enum RunSystemError {
    #[error("system {system} was run before being initialized")]
    NotInitialized { system: Cow<'static, str> },
    #[error("system {system} could not fetch its parameters: {source}")]
    ParamFailed {
        system: Cow<'static, str>,
        #[source]
        source: SystemParamError,
    },
    #[error("system {system} panicked: {message}")]
    Panicked {
        system: Cow<'static, str>,
        message: String,
    },
    #[error("no executors were provided, system {system} was not run")]
    NoExecutorsProvided { system: Cow<'static, str> },
    #[error("executor {executor:?} for system {system} was not found, system was not run")]
    ExecutorNotFound {
        system: Cow<'static, str>,
        executor: ExecutorLabel,
    },
}

/// Conversion into a [`System`].
///
/// Implemented for all eligible functions and closures (over
/// [`SystemParam`] arguments) and for existing systems.
pub trait IntoSystem<Marker>: Sized {
    type System: System;

    fn into_system(self) -> Self::System;
}

/// [`IntoSystem`] marker for types that already are systems.
pub struct AlreadyWasSystem;

impl<S: System> IntoSystem<AlreadyWasSystem> for S {
    type System = S;

    fn into_system(self) -> Self::System {
        self
    }
}
