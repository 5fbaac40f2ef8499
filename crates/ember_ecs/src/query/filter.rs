//! Query filters: structural (`With`/`Without`) and tick-based
//! (`Added`/`Changed`).

use core::marker::PhantomData;

use variadics_please::all_tuples;

use crate::archetype::Archetype;
use crate::component::{Component, ComponentId, Tick};
use crate::entity::{Entity, EntityLocation};
use crate::query::Access;
use crate::world::{UnsafeWorldCell, World};

/// Restricts which entities a query yields.
///
/// Structural filters decide per archetype; tick filters additionally check
/// each entity's change ticks and declare a read on the filtered component.
///
/// # Safety
/// [`update_access`](QueryFilter::update_access) must declare everything
/// [`filter_fetch`](QueryFilter::filter_fetch) reads.
pub unsafe trait QueryFilter {
    type State: Send + Sync + Clone + 'static;

    fn init_state(world: &mut World) -> Self::State;

    fn update_access(state: &Self::State, access: &mut Access);

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool;

    /// Per-entity check, run after the archetype matched.
    ///
    /// # Safety
    /// Same contract as [`QueryData::fetch`](crate::query::QueryData::fetch).
    unsafe fn filter_fetch(
        state: &Self::State,
        world: UnsafeWorldCell<'_>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> bool;
}

/// Matches entities that have `T`, without accessing it.
pub struct With<T>(PhantomData<T>);

// SAFETY: never reads component data.
unsafe impl<T: Component> QueryFilter for With<T> {
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.components_mut().register_component::<T>()
    }

    fn update_access(_state: &Self::State, _access: &mut Access) {}

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        archetype.contains(*state)
    }

    unsafe fn filter_fetch(
        _state: &Self::State,
        _world: UnsafeWorldCell<'_>,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> bool {
        true
    }
}

/// Matches entities that do not have `T`.
pub struct Without<T>(PhantomData<T>);

// SAFETY: never reads component data.
unsafe impl<T: Component> QueryFilter for Without<T> {
    type State = ComponentId;

    fn init_state(world: &mut World) -> Self::State {
        world.components_mut().register_component::<T>()
    }

    fn update_access(_state: &Self::State, _access: &mut Access) {}

    fn matches_archetype(state: &Self::State, archetype: &Archetype) -> bool {
        !archetype.contains(*state)
    }

    unsafe fn filter_fetch(
        _state: &Self::State,
        _world: UnsafeWorldCell<'_>,
        _entity: Entity,
        _location: EntityLocation,
        _last_run: Tick,
        _this_run: Tick,
    ) -> bool {
        true
    }
}

/// Matches entities whose `T` was added since the system last ran.
pub struct Added<T>(PhantomData<T>);

// SAFETY: declares a read of `T` and only reads its ticks.
unsafe impl<T: Component> QueryFilter for Added<T> {
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

    unsafe fn filter_fetch(
        state: &Self::State,
        world: UnsafeWorldCell<'_>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> bool {
        // SAFETY: shared access with a declared read.
        let world = unsafe { world.world() };
        let (_, ticks) = world
            .get_component_ptr_ticks(*state, entity, location)
            .expect("matched archetype must contain the filtered component");
        // SAFETY: reading ticks under the declared read.
        unsafe { (*ticks.get()).is_added(last_run, this_run) }
    }
}

/// Matches entities whose `T` was added or mutated since the system last
/// ran.
pub struct Changed<T>(PhantomData<T>);

// SAFETY: declares a read of `T` and only reads its ticks.
unsafe impl<T: Component> QueryFilter for Changed<T> {
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

    unsafe fn filter_fetch(
        state: &Self::State,
        world: UnsafeWorldCell<'_>,
        entity: Entity,
        location: EntityLocation,
        last_run: Tick,
        this_run: Tick,
    ) -> bool {
        // SAFETY: shared access with a declared read.
        let world = unsafe { world.world() };
        let (_, ticks) = world
            .get_component_ptr_ticks(*state, entity, location)
            .expect("matched archetype must contain the filtered component");
        // SAFETY: reading ticks under the declared read.
        unsafe { (*ticks.get()).is_changed(last_run, this_run) }
    }
}

macro_rules! impl_query_filter_tuple {
    ($(($name: ident, $state: ident)),*) => {
        // SAFETY: each element declares its own access.
        unsafe impl<$($name: QueryFilter),*> QueryFilter for ($($name,)*) {
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

            #[allow(unused_variables, non_snake_case)]
            unsafe fn filter_fetch(
                state: &Self::State,
                world: UnsafeWorldCell<'_>,
                entity: Entity,
                location: EntityLocation,
                last_run: Tick,
                this_run: Tick,
            ) -> bool {
                let ($($state,)*) = state;
                // SAFETY: forwarded caller contract.
                unsafe { true $(&& $name::filter_fetch($state, world, entity, location, last_run, this_run))* }
            }
        }
    };
}

all_tuples!(impl_query_filter_tuple, 0, 15, F, s);
