//! The [`Query`] system parameter.

use crate::component::Tick;
use crate::query::{
    Access, QueryData, QueryEntityError, QueryFilter, QueryIter, QueryState, ReadOnlyQueryData,
};
use crate::entity::Entity;
use crate::system::{SystemParam, SystemParamError};
use crate::world::{UnsafeWorldCell, World};

/// Component access for every entity matching `D` under filter `F`.
///
/// The declared access is the union of the data and filter accesses; the
/// scheduler uses it to decide which systems may run concurrently with this
/// one.
pub struct Query<'w, 's, D: QueryData + 'static, F: QueryFilter + 'static = ()> {
    world: UnsafeWorldCell<'w>,
    state: &'s QueryState<D, F>,
    last_run: Tick,
    this_run: Tick,
}

impl<'w, 's, D: QueryData + 'static, F: QueryFilter + 'static> Query<'w, 's, D, F> {
    /// Iterates matched entities read-only.
    pub fn iter(&self) -> QueryIter<'w, 's, D, F>
    where
        D: ReadOnlyQueryData,
    {
        // SAFETY: read-only items cannot alias; access was declared.
        unsafe {
            self.state
                .iter_unchecked_manual(self.world, self.last_run, self.this_run)
        }
    }

    /// Iterates matched entities; items may be mutable.
    pub fn iter_mut(&mut self) -> QueryIter<'_, '_, D, F> {
        // SAFETY: `&mut self` prevents overlapping mutable iteration; the
        // declared access covers the fetched data.
        unsafe {
            self.state
                .iter_unchecked_manual(self.world, self.last_run, self.this_run)
        }
    }

    /// Fetches one entity read-only.
    pub fn get(&self, entity: Entity) -> Result<D::Item<'w>, QueryEntityError>
    where
        D: ReadOnlyQueryData,
    {
        // SAFETY: as in `iter`.
        unsafe {
            self.state
                .get_unchecked_manual(self.world, entity, self.last_run, self.this_run)
        }
    }

    /// Fetches one entity; the item may be mutable.
    pub fn get_mut(&mut self, entity: Entity) -> Result<D::Item<'_>, QueryEntityError> {
        // SAFETY: as in `iter_mut`.
        unsafe {
            self.state
                .get_unchecked_manual(self.world, entity, self.last_run, self.this_run)
        }
    }

    /// Whether `entity` matches this query.
    pub fn contains(&self, entity: Entity) -> bool {
        // SAFETY: only consults metadata and filters.
        unsafe {
            self.state
                .get_unchecked_manual(self.world, entity, self.last_run, self.this_run)
                .is_ok()
        }
    }
}

impl<'q, 'w, 's, D: ReadOnlyQueryData + 'static, F: QueryFilter + 'static> IntoIterator
    for &'q Query<'w, 's, D, F>
{
    type Item = D::Item<'w>;
    type IntoIter = QueryIter<'w, 's, D, F>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// SAFETY: the query's combined access is registered at initialization and
// checked against the system's other parameters.
unsafe impl<D: QueryData + 'static, F: QueryFilter + 'static> SystemParam for Query<'_, '_, D, F> {
    type State = QueryState<D, F>;
    type Item<'world, 'state> = Query<'world, 'state, D, F>;

    fn init_state(world: &mut World, access: &mut Access) -> Self::State {
        let state = QueryState::<D, F>::new(world);
        assert!(
            access.is_compatible(state.access()),
            "query in system conflicts with a previous parameter's access",
        );
        access.extend(state.access());
        state
    }

    unsafe fn get_param<'world, 'state>(
        state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: archetype metadata only changes under `&mut World`, which
        // cannot coexist with running systems.
        state.update_archetypes(unsafe { world.world() });
        Ok(Query {
            world,
            state,
            last_run,
            this_run,
        })
    }
}
