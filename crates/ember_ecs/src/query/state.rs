//! Cached query state and iteration.

use core::marker::PhantomData;

use thiserror::Error;

use crate::archetype::ArchetypeId;
use crate::component::Tick;
use crate::entity::{Entity, EntityLocation};
use crate::query::{Access, QueryData, QueryFilter, ReadOnlyQueryData};
use crate::world::{UnsafeWorldCell, World};

/// Typed access to one entity failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEntityError {
    #[error("entity {0} does not exist")]
    EntityDoesNotExist(Entity),
    #[error("entity {0} does not match the query")]
    DoesNotMatch(Entity),
}

/// Cached per-query state: resolved component ids, the combined access set,
/// and the archetypes matched so far.
///
/// The matched list is revalidated against the world's archetype count, so a
/// state stays correct as new archetypes appear.
pub struct QueryState<D: QueryData + 'static, F: QueryFilter + 'static = ()> {
    data_state: D::State,
    filter_state: F::State,
    access: Access,
    matched: Vec<ArchetypeId>,
    archetype_watermark: usize,
    marker: PhantomData<fn() -> (D, F)>,
}

impl<D: QueryData + 'static, F: QueryFilter + 'static> QueryState<D, F> {
    pub fn new(world: &mut World) -> Self {
        let data_state = D::init_state(world);
        let filter_state = F::init_state(world);
        let mut access = Access::default();
        D::update_access(&data_state, &mut access);
        F::update_access(&filter_state, &mut access);
        let mut state = QueryState {
            data_state,
            filter_state,
            access,
            matched: Vec::new(),
            archetype_watermark: 0,
            marker: PhantomData,
        };
        state.update_archetypes(world);
        state
    }

    /// The combined access set of data and filters.
    #[inline]
    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Catches up on archetypes created since the last call.
    pub fn update_archetypes(&mut self, world: &World) {
        let archetypes = world.archetypes();
        for index in self.archetype_watermark..archetypes.len() {
            let archetype = archetypes.get(ArchetypeId(index));
            if D::matches_archetype(&self.data_state, archetype)
                && F::matches_archetype(&self.filter_state, archetype)
            {
                self.matched.push(archetype.id());
            }
        }
        self.archetype_watermark = archetypes.len();
    }

    /// Iterates matched entities read-only.
    pub fn iter<'w, 's>(&'s mut self, world: &'w World) -> QueryIter<'w, 's, D, F>
    where
        D: ReadOnlyQueryData,
    {
        self.update_archetypes(world);
        // SAFETY: read-only data through a shared world reference.
        unsafe {
            self.iter_unchecked_manual(
                UnsafeWorldCell::new_readonly(world),
                world.last_change_tick(),
                world.tick(),
            )
        }
    }

    /// Iterates matched entities with mutable items.
    pub fn iter_mut<'w, 's>(&'s mut self, world: &'w mut World) -> QueryIter<'w, 's, D, F> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.tick();
        // SAFETY: `&mut World` gives this query exclusive access.
        unsafe { self.iter_unchecked_manual(world.as_unsafe_world_cell(), last_run, this_run) }
    }

    /// Fetches one entity read-only.
    pub fn get<'w>(
        &mut self,
        world: &'w World,
        entity: Entity,
    ) -> Result<D::Item<'w>, QueryEntityError>
    where
        D: ReadOnlyQueryData,
    {
        self.update_archetypes(world);
        // SAFETY: read-only data through a shared world reference.
        unsafe {
            self.get_unchecked_manual(
                UnsafeWorldCell::new_readonly(world),
                entity,
                world.last_change_tick(),
                world.tick(),
            )
        }
    }

    /// Fetches one entity with a mutable item.
    pub fn get_mut<'w>(
        &mut self,
        world: &'w mut World,
        entity: Entity,
    ) -> Result<D::Item<'w>, QueryEntityError> {
        self.update_archetypes(world);
        let last_run = world.last_change_tick();
        let this_run = world.tick();
        // SAFETY: `&mut World` gives this query exclusive access.
        unsafe {
            self.get_unchecked_manual(world.as_unsafe_world_cell(), entity, last_run, this_run)
        }
    }

    /// Raw iteration against a world cell.
    ///
    /// # Safety
    /// The caller must hold this query's declared access and must have
    /// called [`update_archetypes`](Self::update_archetypes) for this world.
    pub(crate) unsafe fn iter_unchecked_manual<'w, 's>(
        &'s self,
        world: UnsafeWorldCell<'w>,
        last_run: Tick,
        this_run: Tick,
    ) -> QueryIter<'w, 's, D, F> {
        QueryIter {
            world,
            data_state: &self.data_state,
            filter_state: &self.filter_state,
            matched: &self.matched,
            archetype_index: 0,
            row: 0,
            last_run,
            this_run,
        }
    }

    /// Raw single-entity fetch against a world cell.
    ///
    /// # Safety
    /// Same contract as [`iter_unchecked_manual`](Self::iter_unchecked_manual).
    pub(crate) unsafe fn get_unchecked_manual<'w>(
        &self,
        world: UnsafeWorldCell<'w>,
        entity: Entity,
        last_run: Tick,
        this_run: Tick,
    ) -> Result<D::Item<'w>, QueryEntityError> {
        // SAFETY: shared metadata reads under the caller's contract.
        let world_ref = unsafe { world.world() };
        let location = world_ref
            .entities()
            .get(entity)
            .ok_or(QueryEntityError::EntityDoesNotExist(entity))?;
        let archetype = world_ref.archetypes().get(location.archetype_id);
        if !D::matches_archetype(&self.data_state, archetype)
            || !F::matches_archetype(&self.filter_state, archetype)
        {
            return Err(QueryEntityError::DoesNotMatch(entity));
        }
        // SAFETY: location verified; access per caller contract.
        unsafe {
            if !F::filter_fetch(
                &self.filter_state,
                world,
                entity,
                location,
                last_run,
                this_run,
            ) {
                return Err(QueryEntityError::DoesNotMatch(entity));
            }
            Ok(D::fetch(
                &self.data_state,
                world,
                entity,
                location,
                last_run,
                this_run,
            ))
        }
    }
}

/// Iterator over a query's matched entities.
pub struct QueryIter<'w, 's, D: QueryData + 'static, F: QueryFilter + 'static> {
    world: UnsafeWorldCell<'w>,
    data_state: &'s D::State,
    filter_state: &'s F::State,
    matched: &'s [ArchetypeId],
    archetype_index: usize,
    row: usize,
    last_run: Tick,
    this_run: Tick,
}

impl<'w, D: QueryData + 'static, F: QueryFilter + 'static> Iterator for QueryIter<'w, '_, D, F> {
    type Item = D::Item<'w>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let archetype_id = *self.matched.get(self.archetype_index)?;
            // SAFETY: shared metadata reads under the iterator's contract.
            let world = unsafe { self.world.world() };
            let archetype = world.archetypes().get(archetype_id);
            if self.row >= archetype.len() {
                self.archetype_index += 1;
                self.row = 0;
                continue;
            }
            let entity = archetype.entities()[self.row];
            let location = EntityLocation {
                archetype_id,
                row: self.row,
            };
            self.row += 1;
            // SAFETY: location is live; access per the iterator's contract.
            unsafe {
                if !F::filter_fetch(
                    self.filter_state,
                    self.world,
                    entity,
                    location,
                    self.last_run,
                    self.this_run,
                ) {
                    continue;
                }
                return Some(D::fetch(
                    self.data_state,
                    self.world,
                    entity,
                    location,
                    self.last_run,
                    self.this_run,
                ));
            }
        }
    }
}
