//! Parameters a function system can take.

use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use thiserror::Error;
use variadics_please::all_tuples;

use crate::change_detection::{Res, ResMut, Ticks, TicksMut};
use crate::component::{ComponentId, Resource, Tick};
use crate::event::{Event, EventCursor, EventId, Events};
use crate::query::Access;
use crate::world::{FromWorld, UnsafeWorldCell, World};

/// A parameter's fetch failed; the owning system reports this as a run
/// error and is accounted as finished.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SystemParamError {
    #[error("resource {0} does not exist")]
    MissingResource(&'static str),
    #[error("event channel for {0} is not registered")]
    MissingEvents(&'static str),
}

/// A type usable as a function-system argument.
///
/// Each parameter contributes its access to the system's declared set at
/// initialization and fetches its item from the world cell at run time.
///
/// # Safety
/// [`init_state`](SystemParam::init_state) must register every access that
/// [`get_param`](SystemParam::get_param) exercises.
pub unsafe trait SystemParam: Sized {
    type State: Send + Sync + 'static;
    type Item<'world, 'state>: SystemParam<State = Self::State>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State;

    /// Fetches the parameter.
    ///
    /// # Safety
    /// The caller must hold the access registered by
    /// [`init_state`](SystemParam::init_state).
    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError>;
}

/// Shorthand for the item a parameter produces.
pub type SystemParamItem<'w, 's, P> = <P as SystemParam>::Item<'w, 's>;

// SAFETY: registers a read of the resource id.
unsafe impl<'a, T: Resource> SystemParam for Res<'a, T> {
    type State = ComponentId;
    type Item<'world, 'state> = Res<'world, T>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        let id = world.components_mut().register_resource::<T>();
        access.add_read(id);
        id
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared read access.
        let world = unsafe { world.world() };
        // SAFETY: shared access under the declared read.
        let (value, ticks) = unsafe { world.resources.get::<T>(*state) }
            .ok_or(SystemParamError::MissingResource(core::any::type_name::<T>()))?;
        Ok(Res {
            value,
            ticks: Ticks {
                ticks,
                last_run,
                this_run,
            },
        })
    }
}

// SAFETY: registers a write of the resource id.
unsafe impl<'a, T: Resource> SystemParam for ResMut<'a, T> {
    type State = ComponentId;
    type Item<'world, 'state> = ResMut<'world, T>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        let id = world.components_mut().register_resource::<T>();
        access.add_write(id);
        id
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared write access makes this exclusive.
        let world = unsafe { world.world() };
        // SAFETY: exclusive access under the declared write.
        let (value, ticks) = unsafe { world.resources.get_mut::<T>(*state) }
            .ok_or(SystemParamError::MissingResource(core::any::type_name::<T>()))?;
        Ok(ResMut {
            value,
            ticks: TicksMut {
                ticks,
                last_run,
                this_run,
            },
        })
    }
}

// SAFETY: delegates to `P`; an absent value becomes `None`.
unsafe impl<P: SystemParam> SystemParam for Option<P> {
    type State = P::State;
    type Item<'world, 'state> = Option<P::Item<'world, 'state>>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        P::init_state(world, access)
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: forwarded caller contract.
        Ok(unsafe { P::get_param(state, world, last_run, this_run) }.ok())
    }
}

/// Per-system private state, created via [`FromWorld`] at initialization.
/// Never conflicts with anything.
pub struct Local<'s, T: Send + 'static>(pub(crate) &'s mut T);

impl<T: Send + 'static> Deref for Local<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.0
    }
}

impl<T: Send + 'static> DerefMut for Local<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.0
    }
}

// SAFETY: fully owned by the system; no world access.
unsafe impl<'a, T: FromWorld + Send + Sync + 'static> SystemParam for Local<'a, T> {
    type State = T;
    type Item<'world, 'state> = Local<'state, T>;

    fn init_state(world: &mut World, _access: &mut Access) -> Self::State {
        T::from_world(world)
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        _world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        Ok(Local(state))
    }
}

// SAFETY: declares a read of everything.
unsafe impl<'w> SystemParam for &'w World {
    type State = ();
    type Item<'world, 'state> = &'world World;

    fn init_state(_world: &mut World, access: &mut Access) -> Self::State {
        access.read_all();
    }

    unsafe fn get_param<'world, 'state>(
        _state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared world-wide read.
        Ok(unsafe { world.world() })
    }
}

/// Exclusive world access as a parameter. Conflicts with every other
/// system, so the scheduler runs the owner alone.
pub struct WorldMut<'w> {
    world: &'w mut World,
}

impl WorldMut<'_> {
    #[inline]
    pub fn reborrow(&mut self) -> &mut World {
        self.world
    }
}

impl Deref for WorldMut<'_> {
    type Target = World;

    #[inline]
    fn deref(&self) -> &World {
        self.world
    }
}

impl DerefMut for WorldMut<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut World {
        self.world
    }
}

// SAFETY: declares exclusive world access.
unsafe impl<'a> SystemParam for WorldMut<'a> {
    type State = ();
    type Item<'world, 'state> = WorldMut<'world>;

    fn init_state(_world: &mut World, access: &mut Access) -> Self::State {
        access.write_all();
    }

    unsafe fn get_param<'world, 'state>(
        _state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared exclusive world access.
        Ok(WorldMut {
            world: unsafe { world.world_mut() },
        })
    }
}

/// Reads events of type `E` from the point this system's cursor reached.
pub struct EventReader<'w, 's, E: Event> {
    events: &'w Events<E>,
    cursor: &'s mut EventCursor<E>,
}

impl<E: Event> EventReader<'_, '_, E> {
    /// Unseen events in write order; advances the cursor.
    pub fn read<'a>(&'a mut self) -> impl Iterator<Item = &'a E> {
        self.cursor.read(self.events)
    }

    /// Like [`read`](Self::read), also yielding event ids.
    pub fn read_with_id<'a>(&'a mut self) -> impl Iterator<Item = (&'a E, EventId<E>)> {
        self.cursor.read_with_id(self.events)
    }

    pub fn len(&self) -> usize {
        self.cursor.len(self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty(self.events)
    }

    /// Marks all buffered events seen without yielding them.
    pub fn clear(&mut self) {
        self.cursor.clear(self.events);
    }
}

// SAFETY: registers a read of the `Events<E>` resource; the cursor is
// system-local.
unsafe impl<'w, 's, E: Event> SystemParam for EventReader<'w, 's, E> {
    type State = (ComponentId, EventCursor<E>);
    type Item<'world, 'state> = EventReader<'world, 'state, E>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        let id = world.components_mut().register_resource::<Events<E>>();
        access.add_read(id);
        (id, EventCursor::default())
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared read access.
        let world = unsafe { world.world() };
        // SAFETY: shared access under the declared read.
        let (events, _) = unsafe { world.resources.get::<Events<E>>(state.0) }
            .ok_or(SystemParamError::MissingEvents(core::any::type_name::<E>()))?;
        Ok(EventReader {
            events,
            cursor: &mut state.1,
        })
    }
}

/// Writes events of type `E`.
pub struct EventWriter<'w, E: Event> {
    events: &'w mut Events<E>,
}

impl<E: Event> EventWriter<'_, E> {
    pub fn send(&mut self, event: E) -> EventId<E> {
        self.events.send(event)
    }

    pub fn send_batch(&mut self, events: impl IntoIterator<Item = E>) {
        self.events.extend(events);
    }
}

// SAFETY: registers a write of the `Events<E>` resource.
unsafe impl<'w, E: Event> SystemParam for EventWriter<'w, E> {
    type State = ComponentId;
    type Item<'world, 'state> = EventWriter<'world, E>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        let id = world.components_mut().register_resource::<Events<E>>();
        access.add_write(id);
        id
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: declared write access makes this exclusive.
        let world = unsafe { world.world() };
        // SAFETY: exclusive access under the declared write.
        let (events, _) = unsafe { world.resources.get_mut::<Events<E>>(*state) }
            .ok_or(SystemParamError::MissingEvents(core::any::type_name::<E>()))?;
        Ok(EventWriter { events })
    }
}

macro_rules! impl_system_param_tuple {
    ($(($param: ident, $state: ident)),*) => {
        // SAFETY: each element registers its own access.
        unsafe impl<$($param: SystemParam),*> SystemParam for ($($param,)*) {
            type State = ($($param::State,)*);
            type Item<'world, 'state> = ($($param::Item<'world, 'state>,)*);

            #[allow(unused_variables, clippy::unused_unit)]
            fn init_state(world: &mut World, access: &mut Access) -> Self::State {
                ($($param::init_state(world, access),)*)
            }

            #[allow(unused_variables, non_snake_case, clippy::unused_unit)]
            unsafe fn get_param<'world, 'state>(
                state: &'state mut Self::State,
                world: UnsafeWorldCell<'world>,
                last_run: Tick,
                this_run: Tick,
            ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
                let ($($state,)*) = state;
                // SAFETY: forwarded caller contract.
                Ok(($(unsafe { $param::get_param($state, world, last_run, this_run) }?,)*))
            }
        }
    };
}

all_tuples!(impl_system_param_tuple, 0, 15, P, s);

/// `PhantomData` is a no-op parameter; handy in generic plumbing.
// SAFETY: accesses nothing.
unsafe impl<T: Send + Sync + 'static> SystemParam for PhantomData<T> {
    type State = ();
    type Item<'world, 'state> = PhantomData<T>;

    fn init_state(_world: &mut World, _access: &mut Access) -> Self::State {}

    unsafe fn get_param<'world, 'state>(
        _state: &'state mut Self::State,
        _world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        Ok(PhantomData)
    }
}
