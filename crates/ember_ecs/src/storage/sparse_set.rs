//! Sparse-set component storage.

use core::cell::UnsafeCell;
use std::collections::HashMap;

use crate::component::{ComponentId, ComponentInfo, ComponentTicks, Tick};
use crate::entity::Entity;
use crate::storage::blob_vec::BlobVec;

/// Storage for one sparse-set component across all entities.
///
/// A dense blob of values plus a sparse entity-index lookup. Entity
/// generations are not stored here; the entity allocator rejects stale
/// handles before storage is consulted.
#[derive(Debug)]
pub(crate) struct ComponentSparseSet {
    dense: BlobVec,
    ticks: Vec<UnsafeCell<ComponentTicks>>,
    /// dense row -> entity index
    entities: Vec<u32>,
    /// entity index -> dense row
    sparse: Vec<Option<u32>>,
}

// SAFETY: stored items are `Component` values (`Send + Sync`); interior tick
// mutation follows the scheduler's access-conflict discipline.
unsafe impl Send for ComponentSparseSet {}
unsafe impl Sync for ComponentSparseSet {}

impl ComponentSparseSet {
    pub fn new(info: &ComponentInfo) -> Self {
        ComponentSparseSet {
            dense: BlobVec::new(info.layout(), info.drop_fn()),
            ticks: Vec::new(),
            entities: Vec::new(),
            sparse: Vec::new(),
        }
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.sparse
            .get(entity.index() as usize)
            .is_some_and(Option::is_some)
    }

    /// Inserts or replaces the value for `entity`.
    ///
    /// # Safety
    /// `value` must be a valid item of this set's layout and must not be
    /// used afterwards.
    pub unsafe fn insert(&mut self, entity: Entity, value: *const u8, change_tick: Tick) {
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        if let Some(row) = self.sparse[index] {
            // SAFETY: `row` is a live dense slot.
            unsafe { self.dense.replace_unchecked(row as usize, value) };
            self.ticks[row as usize].get_mut().changed = change_tick;
        } else {
            self.sparse[index] = Some(self.dense.len() as u32);
            // SAFETY: forwarded caller contract.
            unsafe { self.dense.push(value) };
            self.ticks
                .push(UnsafeCell::new(ComponentTicks::new(change_tick)));
            self.entities.push(entity.index());
        }
    }

    /// Inserts a slot initialized by `constructor` if absent.
    ///
    /// # Safety
    /// `constructor` must fully initialize the slot with a valid item.
    pub unsafe fn insert_with(
        &mut self,
        entity: Entity,
        constructor: unsafe fn(*mut u8),
        change_tick: Tick,
    ) {
        if self.contains(entity) {
            return;
        }
        let index = entity.index() as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }
        self.sparse[index] = Some(self.dense.len() as u32);
        // SAFETY: the slot is written before any other use.
        unsafe {
            let slot = self.dense.push_uninit();
            constructor(slot);
        }
        self.ticks
            .push(UnsafeCell::new(ComponentTicks::new(change_tick)));
        self.entities.push(entity.index());
    }

    /// Removes and drops the value for `entity`. Returns whether a value was
    /// present.
    pub fn remove(&mut self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        let Some(row) = self.sparse.get_mut(index).and_then(Option::take) else {
            return false;
        };
        let row = row as usize;
        // SAFETY: `row` was a live dense slot.
        unsafe { self.dense.swap_remove_and_drop_unchecked(row) };
        self.ticks.swap_remove(row);
        self.entities.swap_remove(row);
        if row < self.entities.len() {
            // Re-point the entity that was moved into `row`.
            let moved = self.entities[row] as usize;
            self.sparse[moved] = Some(row as u32);
        }
        true
    }

    /// Value pointer and tick cell for `entity`.
    pub fn get_with_ticks(
        &self,
        entity: Entity,
    ) -> Option<(*mut u8, &UnsafeCell<ComponentTicks>)> {
        let row = (*self.sparse.get(entity.index() as usize)?)? as usize;
        // SAFETY: `row` is a live dense slot.
        let ptr = unsafe { self.dense.get_unchecked(row) };
        Some((ptr, &self.ticks[row]))
    }
}

/// All sparse-set storages of a world, keyed by component id.
#[derive(Default)]
pub(crate) struct SparseSets {
    sets: HashMap<ComponentId, ComponentSparseSet>,
}

impl SparseSets {
    pub fn get_or_insert(&mut self, info: &ComponentInfo) -> &mut ComponentSparseSet {
        self.sets
            .entry(info.id())
            .or_insert_with(|| ComponentSparseSet::new(info))
    }

    #[inline]
    pub fn get(&self, component_id: ComponentId) -> Option<&ComponentSparseSet> {
        self.sets.get(&component_id)
    }

    #[inline]
    pub fn get_mut(&mut self, component_id: ComponentId) -> Option<&mut ComponentSparseSet> {
        self.sets.get_mut(&component_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Components, StorageKind};

    #[derive(Debug, PartialEq)]
    struct Marker(u64);
    impl Component for Marker {
        const STORAGE: StorageKind = StorageKind::SparseSet;
    }

    #[test]
    fn insert_get_remove() {
        let mut components = Components::default();
        let id = components.register_component::<Marker>();
        let mut set = ComponentSparseSet::new(components.info(id));

        let a = Entity::new(0, 0);
        let b = Entity::new(5, 0);
        unsafe {
            let value = core::mem::ManuallyDrop::new(Marker(7));
            set.insert(a, (&raw const value).cast(), Tick::new(1));
            let value = core::mem::ManuallyDrop::new(Marker(9));
            set.insert(b, (&raw const value).cast(), Tick::new(1));
        }
        assert!(set.contains(a));
        assert!(set.contains(b));
        let (ptr, _) = set.get_with_ticks(b).unwrap();
        assert_eq!(unsafe { &*ptr.cast::<Marker>() }, &Marker(9));

        assert!(set.remove(a));
        assert!(!set.contains(a));
        assert!(!set.remove(a));
        // `b` survived the swap-remove.
        let (ptr, _) = set.get_with_ticks(b).unwrap();
        assert_eq!(unsafe { &*ptr.cast::<Marker>() }, &Marker(9));
    }
}
