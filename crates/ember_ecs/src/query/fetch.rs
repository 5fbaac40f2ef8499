//! What a query yields per entity.

use variadics_please::all_tuples;

use crate::archetype::Archetype;
use crate::change_detection::{Mut, TicksMut};
use crate::component::{Component, ComponentId, Tick};
use crate::entity::{Entity, EntityLocation};
use crate::query::Access;
use crate::world::{UnsafeWorldCell, World};

/// A type that can be fetched for each entity matched by a query.
///
/// Implemented for `Entity`, `&T`, `&mut T` (yielding [`Mut`]), `Option`s of
/// those, and tuples. The type parameter itself is only a key; borrows come
/// out through [`QueryData::Item`] with the query's lifetime.
///
/// # Safety
/// [`update_access`](QueryData::update_access) must declare every component
/// that [`fetch`](QueryData::fetch) touches, with the right mutability.
pub unsafe trait QueryData {
    type Item<'w>;
    type State: Send + Sync + Clone + 'static;

    fn init_state(world: &mut World) -> Self::State;

    fn update_access(state: &Self::State, access: &mut Access);

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool;

    /// Fetches the item for one matched entity.
    ///
    /// # Safety
    /// `location` must be `entity`'s live location in `world`, the entity's
    /// archetype must have matched, and the caller must hold the declared
    /// access.
    unsafe fn fetch<'w>(
        state: &Self::State,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w>;
}

/// Marker for [`QueryData`] that never writes; required for iterating a
/// query through a shared reference.
///
/// # Safety
/// The implementation must not declare or perform any mutable access.
pub unsafe trait ReadOnlyQueryData: QueryData {}

// SAFETY: yields the entity id only; no component access.
unsafe impl QueryData for Entity {
    type Item<'w> = Entity;
    type State = ();

    fn init_state(_world: &mut World) -> Self::State {}

    fn update_access(_state: &Self::State, _access: &mut Access) {}

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        _state: &Self::State,
        _world: UnsafeWorldCell<'w>,
        entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        entity
    }
}

// SAFETY: declares a read of `T` and only reads it.
unsafe impl ReadOnlyQueryData for Entity {}

// SAFETY: declares a read of `T` and fetches a shared reference.
unsafe impl<'a, T: Component> QueryData for &'a T {
    type Item<'w> = &'w T;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.components_mut().register_component::<T>()
    }

    fn update_access(state: &Self::State, access: &mut Access) {
        access.add_read(*state);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(*state)
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: shared world access with a declared read.
        let world = unsafe { world.world() };
        let (ptr, _) = world
            .get_component_ptr_ticks(*state, entity, location)
            .expect("matched archetype must contain the queried component");
        // SAFETY: the pointer is a live `T` and the access is a read.
        unsafe { &*ptr.cast::<T>() }
    }
}

// SAFETY: only reads.
unsafe impl<'a, T: Component> ReadOnlyQueryData for &'a T {}

// SAFETY: declares a write of `T` and fetches an exclusive reference.
unsafe impl<'a, T: Component> QueryData for &'a mut T {
    type Item<'w> = Mut<'w, T>;
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.components_mut().register_component::<T>()
    }

    fn update_access(state: &Self::State, access: &mut Access) {
        access.add_write(*state);
    }

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(*state)
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: the declared write makes this access exclusive.
        let world = unsafe { world.world() };
        let (ptr, ticks) = world
            .get_component_ptr_ticks(*state, entity, location)
            .expect("matched archetype must contain the queried component");
        // SAFETY: exclusive access per the declared write; each entity is
        // fetched at most once per iteration.
        unsafe {
            Mut {
                value: &mut *ptr.cast::<T>(),
                ticks: TicksMut {
                    ticks: &mut *ticks.get(),
                    last_run,
                    this_run,
                },
            }
        }
    }
}

// SAFETY: delegates to `D`; absent components yield `None`.
unsafe impl<D: QueryData> QueryData for Option<D> {
    type Item<'w> = Option<D::Item<'w>>;
    type State = D::State;

    fn init_state(world: &mut World) -> Self::State {
        D::init_state(world)
    }

    fn update_access(state: &Self::State, access: &mut Access) {
        D::update_access(state, access);
    }

    fn matches_archetype(_state: &Self::State, _archetype: &Archetype) -> bool {
        true
    }

    unsafe fn fetch<'w>(
        state: &Self::State,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> Self::Item<'w> {
        // SAFETY: the archetype is re-checked before fetching.
        unsafe {
            let archetype = world.world().archetypes().get(location.archetype_id);
            D::matches_archetype(state, archetype)
                .then(|| D::fetch(state, world, entity, location, last_run, this_run))
        }
    }
}

// SAFETY: `D` never writes.
unsafe impl<D: ReadOnlyQueryData> ReadOnlyQueryData for Option<D> {}

macro_rules! impl_query_data_tuple {
    ($(($name: ident, $state: ident)),*) => {
        // SAFETY: each element declares its own access.
        unsafe impl<$($name: QueryData),*> QueryData for ($($name,)*) {
            type Item<'w> = ($($name::Item<'w>,)*);
            type State = ($($name::State,)*);

            #[allow(unused_variables, clippy::unused_unit)]
            fn init_state(world: &mut World) -> Self::State {
                ($($name::init_state(world),)*)
            }

            #[allow(unused_variables, non_snake_case)]
            fn update_access(state: &Self::State, access: &mut Access) {
                let ($($state,)*) = state;
                $($name::update_access($state, access);)*
            }

            #[allow(unused_variables, non_snake_case)]
            fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
                let ($($state,)*) = state;
                true $(&& $name::matches_archetype($state, archetype))*
            }

            #[allow(unused_variables, non_snake_case, clippy::unused_unit)]
            unsafe fn fetch<'w>(
                state: &Self::State,
                world: UnsafeWorldCell<'w>,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> Self::Item<'w> {
                let ($($state,)*) = state;
                // SAFETY: forwarded caller contract.
                unsafe { ($($name::fetch($state, world, entity, location, last_run, this_run),)*) }
            }
        }

        // SAFETY: all elements are read-only.
        unsafe impl<$($name: ReadOnlyQueryData),*> ReadOnlyQueryData for ($($name,)*) {}
    };
}

all_tuples!(impl_query_data_tuple, 0, 15, D, s);
