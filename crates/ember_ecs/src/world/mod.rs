//! The [`World`]: entities, components, resources, and the deferred command
//! queue.

mod entity_ref;
mod unsafe_world_cell;

pub use entity_ref::{EntityMut, EntityRef};
pub use unsafe_world_cell::UnsafeWorldCell;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use thiserror::Error;

use crate::archetype::{ArchetypeId, Archetypes};
use crate::bundle::Bundles;
use crate::change_detection::{Mut, ResMut, TicksMut};
use crate::component::{
    Component, ComponentId, ComponentTicks, Components, Resource, StorageKind, Tick,
};
use crate::entity::{Entities, Entity, EntityLocation};
use crate::event::{Event, Events};
use crate::query::{QueryData, QueryState};
use crate::storage::{Resources, SparseSets};
use crate::system::{Command, CommandQueue};

/// A stale or never-allocated entity handle was used.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("entity {0} does not exist")]
pub struct EntityDoesNotExist(pub Entity);

/// Typed component access failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentAccessError {
    #[error(transparent)]
    EntityDoesNotExist(#[from] EntityDoesNotExist),
    #[error("entity {entity} has no component {component}")]
    ComponentMissing {
        entity: Entity,
        component: &'static str,
    },
}

/// Unique identity of a [`World`] within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldId(usize);

static WORLD_COUNT: AtomicUsize = AtomicUsize::new(0);

impl WorldId {
    fn new() -> Self {
        WorldId(WORLD_COUNT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Stores entities, components, resources, and the deferred command queue.
///
/// Structural changes (spawn, despawn, insert, remove) need `&mut World`.
/// While a schedule runs, systems instead share an [`UnsafeWorldCell`] and
/// defer structural changes through [`Commands`](crate::system::Commands);
/// the scheduler drains the queue once the schedule completes.
pub struct World {
    id: WorldId,
    pub(crate) entities: Entities,
    pub(crate) components: Components,
    pub(crate) archetypes: Archetypes,
    pub(crate) sparse_sets: SparseSets,
    pub(crate) resources: Resources,
    pub(crate) bundles: Bundles,
    command_queue: CommandQueue,
    change_tick: AtomicU32,
    last_change_tick: Tick,
}

impl Default for World {
    fn default() -> Self {
        World {
            id: WorldId::new(),
            entities: Entities::default(),
            components: Components::default(),
            archetypes: Archetypes::default(),
            sparse_sets: SparseSets::default(),
            resources: Resources::default(),
            bundles: Bundles::default(),
            command_queue: CommandQueue::default(),
            // Start at 1 so tick 0 can serve as "before everything".
            change_tick: AtomicU32::new(1),
            last_change_tick: Tick::new(0),
        }
    }
}

impl World {
    pub fn new() -> Self {
        World::default()
    }

    #[inline]
    pub fn id(&self) -> WorldId {
        self.id
    }

    #[inline]
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    #[inline]
    pub fn components_mut(&mut self) -> &mut Components {
        &mut self.components
    }

    #[inline]
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    // --- ticks ---

    /// The current change tick.
    #[inline]
    pub fn tick(&self) -> Tick {
        Tick::new(self.change_tick.load(Ordering::Acquire))
    }

    /// Bumps and returns the new change tick. Works through `&self` so
    /// running systems can stamp their writes.
    #[inline]
    pub fn advance_tick(&self) -> Tick {
        Tick::new(self.change_tick.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The tick direct (`&mut World`) accesses compare against.
    #[inline]
    pub fn last_change_tick(&self) -> Tick {
        self.last_change_tick
    }

    /// Advances the reference tick used by direct world access; typically
    /// called once per frame. The counter is bumped past the new reference
    /// so later writes always read as newer.
    pub fn clear_trackers(&mut self) {
        self.last_change_tick = self.tick();
        self.advance_tick();
    }

    // --- entities & components ---

    /// Spawns an entity with `bundle` applied atomically.
    pub fn spawn<B: crate::bundle::Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.spawn_empty();
        let location = self
            .entities
            .get(entity)
            .expect("freshly spawned entity must exist");
        self.insert_internal(entity, location, bundle);
        entity
    }

    /// Spawns an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        self.flush_reserved();
        let entity = self.entities.alloc();
        let empty = self.archetypes.get_mut(ArchetypeId::EMPTY);
        let row = empty.entities.len();
        empty.entities.push(entity);
        self.entities.set_location(
            entity,
            Some(EntityLocation {
                archetype_id: ArchetypeId::EMPTY,
                row,
            }),
        );
        entity
    }

    /// Despawns an entity, dropping its components and bumping the index
    /// generation. Returns whether the handle was live.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        self.flush_reserved();
        let Some(location) = self.entities.get(entity) else {
            return false;
        };
        self.entities.free(entity);
        let archetype = self.archetypes.get_mut(location.archetype_id);
        // SAFETY: `location.row` is this entity's live row.
        unsafe { archetype.table.swap_remove_row(location.row) };
        archetype.entities.swap_remove(location.row);
        if location.row < archetype.entities.len() {
            let moved = archetype.entities[location.row];
            self.entities.set_location(moved, Some(location));
        }
        let sparse_ids: Vec<ComponentId> =
            self.archetypes.get(location.archetype_id).sparse_components().to_vec();
        for id in sparse_ids {
            if let Some(set) = self.sparse_sets.get_mut(id) {
                set.remove(entity);
            }
        }
        true
    }

    /// Applies `bundle` to an existing entity, moving it across archetypes
    /// through the cached transition graph.
    pub fn insert<B: crate::bundle::Bundle>(
        &mut self,
        entity: Entity,
        bundle: B,
    ) -> Result<(), EntityDoesNotExist> {
        self.flush_reserved();
        let location = self.entities.get(entity).ok_or(EntityDoesNotExist(entity))?;
        self.insert_internal(entity, location, bundle);
        Ok(())
    }

    /// Removes the components of `B` from the entity, dropping their values.
    /// Components the entity does not have are ignored.
    pub fn remove<B: crate::bundle::Bundle>(
        &mut self,
        entity: Entity,
    ) -> Result<(), EntityDoesNotExist> {
        self.flush_reserved();
        let location = self.entities.get(entity).ok_or(EntityDoesNotExist(entity))?;
        let bundle_id = self.bundles.register::<B>(&mut self.components);

        let target_id = {
            let source = self.archetypes.get(location.archetype_id);
            let mut removed: Vec<ComponentId> = self
                .bundles
                .info(bundle_id)
                .component_ids()
                .iter()
                .copied()
                .filter(|&id| source.contains(id))
                .collect();
            removed.sort();
            if removed.is_empty() {
                return Ok(());
            }
            let key: Box<[ComponentId]> = removed.clone().into_boxed_slice();
            if let Some(&target) = source.edges.remove.get(&key) {
                target
            } else {
                let remaining: Vec<ComponentId> = {
                    let mut ids: Vec<ComponentId> = source.components().collect();
                    ids.retain(|id| !removed.contains(id));
                    ids.sort();
                    ids
                };
                let target = self.archetypes.get_or_insert(remaining, &self.components);
                self.archetypes
                    .get_mut(location.archetype_id)
                    .edges
                    .remove
                    .insert(key, target);
                target
            }
        };
        if target_id == location.archetype_id {
            return Ok(());
        }

        let Self {
            entities,
            archetypes,
            sparse_sets,
            ..
        } = self;
        let (source, target) = archetypes.get_2_mut(location.archetype_id, target_id);
        let new_row = target.entities.len();
        target.entities.push(entity);
        for (id, column) in source.table.columns_mut() {
            if let Some(target_column) = target.table.column_mut(id) {
                // SAFETY: the entity's row is live; layouts match per id.
                unsafe { column.move_to(location.row, target_column) };
            } else {
                // SAFETY: the entity's row is live; the value is removed.
                unsafe { column.swap_remove_and_drop(location.row) };
            }
        }
        source.entities.swap_remove(location.row);
        if location.row < source.entities.len() {
            let moved = source.entities[location.row];
            entities.set_location(moved, Some(location));
        }
        let dropped_sparse: Vec<ComponentId> = source
            .sparse_components()
            .iter()
            .copied()
            .filter(|&id| !target.contains(id))
            .collect();
        for id in dropped_sparse {
            if let Some(set) = sparse_sets.get_mut(id) {
                set.remove(entity);
            }
        }
        entities.set_location(
            entity,
            Some(EntityLocation {
                archetype_id: target_id,
                row: new_row,
            }),
        );
        Ok(())
    }

    fn insert_internal<B: crate::bundle::Bundle>(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        bundle: B,
    ) {
        let bundle_id = self.bundles.register::<B>(&mut self.components);
        let change_tick = self.advance_tick();

        let target_id = {
            let source = self.archetypes.get(location.archetype_id);
            if let Some(&target) = source.edges.insert.get(&bundle_id) {
                target
            } else {
                let mut ids: Vec<ComponentId> = source.components().collect();
                for id in self.bundles.info(bundle_id).all_ids() {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids.sort();
                let target = self.archetypes.get_or_insert(ids, &self.components);
                self.archetypes
                    .get_mut(location.archetype_id)
                    .edges
                    .insert
                    .insert(bundle_id, target);
                target
            }
        };

        let Self {
            entities,
            components,
            archetypes,
            sparse_sets,
            bundles,
            ..
        } = self;
        let info = bundles.info(bundle_id);

        if target_id == location.archetype_id {
            // Nothing structural: replace values in place.
            let archetype = archetypes.get_mut(location.archetype_id);
            let mut index = 0;
            bundle.get_components(&mut |value| {
                let id = info.component_ids()[index];
                index += 1;
                match components.info(id).storage() {
                    StorageKind::Table => {
                        let column = archetype
                            .table
                            .column_mut(id)
                            .expect("archetype must contain its own component");
                        // SAFETY: ownership of `value` transfers here.
                        unsafe { column.replace(location.row, value, change_tick) };
                    }
                    StorageKind::SparseSet => {
                        let set = sparse_sets.get_or_insert(components.info(id));
                        // SAFETY: ownership of `value` transfers here.
                        unsafe { set.insert(entity, value, change_tick) };
                    }
                }
            });
            return;
        }

        let (source, target) = archetypes.get_2_mut(location.archetype_id, target_id);
        let new_row = target.entities.len();
        target.entities.push(entity);
        // The target has every component the source has; move the row over.
        for (id, column) in source.table.columns_mut() {
            let target_column = target
                .table
                .column_mut(id)
                .expect("insert target must be a superset of the source");
            // SAFETY: the entity's row is live; layouts match per id.
            unsafe { column.move_to(location.row, target_column) };
        }
        source.entities.swap_remove(location.row);
        if location.row < source.entities.len() {
            let moved = source.entities[location.row];
            entities.set_location(moved, Some(location));
        }

        let mut index = 0;
        bundle.get_components(&mut |value| {
            let id = info.component_ids()[index];
            index += 1;
            match components.info(id).storage() {
                StorageKind::Table => {
                    let column = target
                        .table
                        .column_mut(id)
                        .expect("insert target must contain bundle components");
                    if column.len() == new_row + 1 {
                        // The value came over from the source row; replace it.
                        // SAFETY: ownership of `value` transfers here.
                        unsafe { column.replace(new_row, value, change_tick) };
                    } else {
                        debug_assert_eq!(column.len(), new_row);
                        // SAFETY: ownership of `value` transfers here.
                        unsafe { column.push(value, ComponentTicks::new(change_tick)) };
                    }
                }
                StorageKind::SparseSet => {
                    let set = sparse_sets.get_or_insert(components.info(id));
                    // SAFETY: ownership of `value` transfers here.
                    unsafe { set.insert(entity, value, change_tick) };
                }
            }
        });

        for required in info.required() {
            match components.info(required.id).storage() {
                StorageKind::Table => {
                    let column = target
                        .table
                        .column_mut(required.id)
                        .expect("insert target must contain required components");
                    if column.len() == new_row {
                        // SAFETY: the constructor initializes the slot.
                        unsafe {
                            column.push_with(
                                required.constructor,
                                ComponentTicks::new(change_tick),
                            )
                        };
                    }
                }
                StorageKind::SparseSet => {
                    let set = sparse_sets.get_or_insert(components.info(required.id));
                    // SAFETY: the constructor initializes the slot.
                    unsafe { set.insert_with(entity, required.constructor, change_tick) };
                }
            }
        }

        entities.set_location(
            entity,
            Some(EntityLocation {
                archetype_id: target_id,
                row: new_row,
            }),
        );
    }

    /// Whether `entity` is live.
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Typed shared access to a component.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, ComponentAccessError> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EntityDoesNotExist(entity))?;
        let missing = ComponentAccessError::ComponentMissing {
            entity,
            component: core::any::type_name::<T>(),
        };
        let id = self.components.component_id::<T>().ok_or(missing)?;
        let (ptr, _) = self
            .get_component_ptr_ticks(id, entity, location)
            .ok_or(missing)?;
        // SAFETY: `&self` guarantees shared access; the pointer is `T`.
        Ok(unsafe { &*ptr.cast::<T>() })
    }

    /// Typed exclusive access to a component; writing through the handle
    /// advances its `changed` tick.
    pub fn get_mut<T: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<Mut<'_, T>, ComponentAccessError> {
        let location = self
            .entities
            .get(entity)
            .ok_or(EntityDoesNotExist(entity))?;
        let missing = ComponentAccessError::ComponentMissing {
            entity,
            component: core::any::type_name::<T>(),
        };
        let id = self.components.component_id::<T>().ok_or(missing)?;
        let last_run = self.last_change_tick;
        let this_run = self.tick();
        let (ptr, ticks) = self
            .get_component_ptr_ticks(id, entity, location)
            .ok_or(missing)?;
        // SAFETY: `&mut self` guarantees exclusive access.
        Ok(unsafe {
            Mut {
                value: &mut *ptr.cast::<T>(),
                ticks: TicksMut {
                    ticks: &mut *ticks.get(),
                    last_run,
                    this_run,
                },
            }
        })
    }

    /// Read-only view of an entity. Panics if the entity does not exist.
    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        self.get_entity(entity)
            .unwrap_or_else(|| panic!("entity {entity} does not exist"))
    }

    pub fn get_entity(&self, entity: Entity) -> Option<EntityRef<'_>> {
        self.entities.get(entity)?;
        Some(EntityRef::new(self, entity))
    }

    /// Mutable view of an entity. Panics if the entity does not exist.
    pub fn entity_mut(&mut self, entity: Entity) -> EntityMut<'_> {
        self.get_entity_mut(entity)
            .unwrap_or_else(|| panic!("entity {entity} does not exist"))
    }

    pub fn get_entity_mut(&mut self, entity: Entity) -> Option<EntityMut<'_>> {
        self.entities.get(entity)?;
        Some(EntityMut::new(self, entity))
    }

    /// A cached query against this world.
    pub fn query<D: QueryData + 'static>(&mut self) -> QueryState<D, ()> {
        QueryState::new(self)
    }

    /// A cached query with a filter.
    pub fn query_filtered<D: QueryData + 'static, F: crate::query::QueryFilter + 'static>(
        &mut self,
    ) -> QueryState<D, F> {
        QueryState::new(self)
    }

    /// Raw pointer and tick cell for a component, regardless of storage
    /// kind. Used by queries and system params under the access discipline.
    pub(crate) fn get_component_ptr_ticks(
        &self,
        id: ComponentId,
        entity: Entity,
        location: EntityLocation,
    ) -> Option<(*mut u8, &UnsafeCell<ComponentTicks>)> {
        match self.components.info(id).storage() {
            StorageKind::Table => {
                let archetype = self.archetypes.get(location.archetype_id);
                let column = archetype.table.column(id)?;
                if location.row >= column.len() {
                    return None;
                }
                // SAFETY: row bounds checked above.
                unsafe { Some((column.get_data(location.row), column.get_ticks(location.row))) }
            }
            StorageKind::SparseSet => self.sparse_sets.get(id)?.get_with_ticks(entity),
        }
    }

    // --- resources ---

    /// Inserts a resource, overwriting any previous value of the same type.
    pub fn insert_resource<R: Resource>(&mut self, value: R) {
        let id = self.components.register_resource::<R>();
        let change_tick = self.advance_tick();
        self.resources.insert(id, Box::new(value), change_tick);
    }

    /// Inserts `R`'s [`FromWorld`] value if the resource is absent.
    pub fn init_resource<R: Resource + FromWorld>(&mut self) {
        if !self.contains_resource::<R>() {
            let value = R::from_world(self);
            self.insert_resource(value);
        }
    }

    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.components
            .resource_id::<R>()
            .is_some_and(|id| self.resources.contains(id))
    }

    pub fn get_resource<R: Resource>(&self) -> Option<&R> {
        let id = self.components.resource_id::<R>()?;
        // SAFETY: `&self` guarantees shared access.
        unsafe { self.resources.get::<R>(id) }.map(|(value, _)| value)
    }

    /// Shared access, panicking when the resource is absent.
    pub fn resource<R: Resource>(&self) -> &R {
        self.get_resource::<R>().unwrap_or_else(|| {
            panic!(
                "requested resource {} does not exist in this world",
                core::any::type_name::<R>()
            )
        })
    }

    pub fn get_resource_mut<R: Resource>(&mut self) -> Option<ResMut<'_, R>> {
        let last_run = self.last_change_tick;
        let this_run = self.tick();
        let id = self.components.resource_id::<R>()?;
        // SAFETY: `&mut self` guarantees exclusive access.
        let (value, ticks) = unsafe { self.resources.get_mut::<R>(id) }?;
        Some(ResMut {
            value,
            ticks: TicksMut {
                ticks,
                last_run,
                this_run,
            },
        })
    }

    /// Exclusive access, panicking when the resource is absent.
    pub fn resource_mut<R: Resource>(&mut self) -> ResMut<'_, R> {
        match self.get_resource_mut::<R>() {
            Some(resource) => resource,
            None => panic!(
                "requested resource {} does not exist in this world",
                core::any::type_name::<R>()
            ),
        }
    }

    /// Removes and returns a resource.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        let id = self.components.resource_id::<R>()?;
        let boxed = self.resources.remove(id)?;
        match boxed.downcast::<R>() {
            Ok(value) => Some(*value),
            Err(_) => unreachable!("resource id is bound to its type"),
        }
    }

    // --- events ---

    /// Sends an event, if its channel is registered. Returns whether it was
    /// written.
    pub fn send_event<E: Event>(&mut self, event: E) -> bool {
        let Some(mut events) = self.get_resource_mut::<Events<E>>() else {
            log::error!(
                "tried to send event {} before its channel was registered",
                core::any::type_name::<E>()
            );
            return false;
        };
        events.send(event);
        true
    }

    // --- deferred commands ---

    /// Enqueues a deferred command. Works through `&self` so running systems
    /// can queue without world access.
    pub fn queue(&self, command: impl Command) {
        self.command_queue.push(command);
    }

    pub(crate) fn command_queue(&self) -> &CommandQueue {
        &self.command_queue
    }

    /// Materializes reserved entities into the empty archetype.
    pub(crate) fn flush_reserved(&mut self) {
        if !self.entities.needs_flush() {
            return;
        }
        let Self {
            entities,
            archetypes,
            ..
        } = self;
        let empty = archetypes.get_mut(ArchetypeId::EMPTY);
        entities.flush(|entity, location| {
            let row = empty.entities.len();
            empty.entities.push(entity);
            *location = Some(EntityLocation {
                archetype_id: ArchetypeId::EMPTY,
                row,
            });
        });
    }

    /// Drains the command queue to fixpoint: applying a command may enqueue
    /// further commands, which are applied in turn.
    pub fn flush_commands(&mut self) {
        self.flush_reserved();
        loop {
            let commands = self.command_queue.take();
            if commands.is_empty() {
                break;
            }
            for command in commands {
                command.apply(self);
                self.flush_reserved();
            }
        }
    }

    /// An [`UnsafeWorldCell`] for scheduler dispatch.
    pub(crate) fn as_unsafe_world_cell(&mut self) -> UnsafeWorldCell<'_> {
        UnsafeWorldCell::new(self)
    }
}

/// Creates `Self` using data from the given [`World`].
pub trait FromWorld {
    fn from_world(world: &mut World) -> Self;
}

impl<T: Default> FromWorld for T {
    fn from_world(_world: &mut World) -> Self {
        T::default()
    }
}
