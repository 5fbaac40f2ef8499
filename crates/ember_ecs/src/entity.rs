//! Entity identifiers and the entity allocator.

use core::fmt;
use core::sync::atomic::{AtomicI64, Ordering};

use crate::archetype::ArchetypeId;

/// A lightweight identifier for an entity in a [`World`](crate::world::World).
///
/// An `Entity` is an index paired with a generation. Indices are recycled
/// after despawn, but only with the generation advanced, so a stale handle
/// can never alias a newer entity that reuses the same index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    /// A placeholder handle that no live entity ever equals.
    pub const PLACEHOLDER: Entity = Entity {
        index: u32::MAX,
        generation: u32::MAX,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Entity { index, generation }
    }

    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where an entity's components currently live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype_id: ArchetypeId,
    pub row: usize,
}

#[derive(Clone, Copy, Debug)]
struct EntityMeta {
    generation: u32,
    location: Option<EntityLocation>,
}

impl EntityMeta {
    const EMPTY: EntityMeta = EntityMeta {
        generation: 0,
        location: None,
    };
}

/// The entity allocator of a [`World`](crate::world::World).
///
/// Freed indices are recycled with a bumped generation. Entities can also be
/// *reserved* from `&self` (used by [`Commands`](crate::system::Commands)
/// while systems are running); reservations are materialized by
/// [`Entities::flush`] before any structural change is applied.
#[derive(Debug)]
pub struct Entities {
    meta: Vec<EntityMeta>,
    pending: Vec<u32>,
    /// Cooperates with `pending`: while non-negative it is the number of
    /// usable entries at the front of `pending`; reservations move it down,
    /// below zero each step reserves a brand-new index past `meta.len()`.
    free_cursor: AtomicI64,
    len: u32,
}

impl Default for Entities {
    fn default() -> Self {
        Entities {
            meta: Vec::new(),
            pending: Vec::new(),
            free_cursor: AtomicI64::new(0),
            len: 0,
        }
    }
}

impl Entities {
    /// Reserves an entity id without structural world access. The entity is
    /// not live until [`Entities::flush`] runs.
    pub fn reserve_entity(&self) -> Entity {
        let n = self.free_cursor.fetch_sub(1, Ordering::Relaxed);
        if n > 0 {
            let index = self.pending[(n - 1) as usize];
            Entity::new(index, self.meta[index as usize].generation)
        } else {
            // Past the end of the freelist: hand out indices beyond `meta`.
            let index = self.meta.len() as i64 - n;
            Entity::new(
                u32::try_from(index).expect("too many entities"),
                0,
            )
        }
    }

    /// Allocates an entity immediately. Requires all reservations to have
    /// been flushed.
    pub(crate) fn alloc(&mut self) -> Entity {
        self.verify_flushed();
        self.len = self.len.checked_add(1).expect("too many entities");
        if let Some(index) = self.pending.pop() {
            *self.free_cursor.get_mut() = self.pending.len() as i64;
            Entity::new(index, self.meta[index as usize].generation)
        } else {
            let index = u32::try_from(self.meta.len()).expect("too many entities");
            self.meta.push(EntityMeta::EMPTY);
            Entity::new(index, 0)
        }
    }

    /// Frees an entity, bumping its generation. Returns the freed entity's
    /// location, or `None` if the handle was stale.
    pub(crate) fn free(&mut self, entity: Entity) -> Option<EntityLocation> {
        self.verify_flushed();
        let meta = self.meta.get_mut(entity.index() as usize)?;
        if meta.generation != entity.generation() {
            return None;
        }
        meta.generation = meta.generation.wrapping_add(1);
        let location = meta.location.take();
        self.pending.push(entity.index());
        *self.free_cursor.get_mut() = self.pending.len() as i64;
        self.len -= 1;
        location
    }

    /// Whether `entity` refers to a live (or reserved) entity.
    pub fn contains(&self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        if index < self.meta.len() {
            self.meta[index].generation == entity.generation()
        } else {
            // Freshly reserved beyond `meta`; generation is always 0 there.
            let free_cursor = self.free_cursor.load(Ordering::Relaxed);
            let num_reserved_new = (-free_cursor).max(0) as usize;
            entity.generation() == 0 && index < self.meta.len() + num_reserved_new
        }
    }

    /// The location of a live entity, or `None` for stale handles and
    /// reserved-but-unflushed entities.
    pub fn get(&self, entity: Entity) -> Option<EntityLocation> {
        let meta = self.meta.get(entity.index() as usize)?;
        if meta.generation != entity.generation() {
            return None;
        }
        meta.location
    }

    pub(crate) fn set_location(&mut self, entity: Entity, location: Option<EntityLocation>) {
        let meta = &mut self.meta[entity.index() as usize];
        debug_assert_eq!(meta.generation, entity.generation());
        meta.location = location;
    }

    /// Materializes all reserved entities, handing each to `init` so the
    /// caller can give it a storage location.
    pub(crate) fn flush(&mut self, mut init: impl FnMut(Entity, &mut Option<EntityLocation>)) {
        let free_cursor = self.free_cursor.get_mut();
        let current = *free_cursor;
        let new_free_cursor = if current >= 0 {
            current as usize
        } else {
            // Reserved entities past the end of `meta`.
            let old_len = self.meta.len();
            let new_len = old_len + (-current) as usize;
            self.meta.resize(new_len, EntityMeta::EMPTY);
            self.len += (-current) as u32;
            for (offset, meta) in self.meta[old_len..].iter_mut().enumerate() {
                init(
                    Entity::new((old_len + offset) as u32, meta.generation),
                    &mut meta.location,
                );
            }
            *free_cursor = 0;
            0
        };
        // Reserved entities taken from the freelist.
        self.len += (self.pending.len() - new_free_cursor) as u32;
        for index in self.pending.drain(new_free_cursor..) {
            let meta = &mut self.meta[index as usize];
            init(Entity::new(index, meta.generation), &mut meta.location);
        }
    }

    pub(crate) fn needs_flush(&self) -> bool {
        self.free_cursor.load(Ordering::Relaxed) != self.pending.len() as i64
    }

    fn verify_flushed(&mut self) {
        debug_assert!(
            !self.needs_flush(),
            "reserved entities must be flushed before structural changes"
        );
    }

    /// Number of live entities.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_recycles_with_new_generation() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        assert_eq!(a, Entity::new(0, 0));
        assert!(entities.contains(a));

        entities.free(a);
        assert!(!entities.contains(a));

        let b = entities.alloc();
        assert_eq!(b.index(), 0);
        assert_eq!(b.generation(), 1);
        assert!(entities.contains(b));
        assert!(!entities.contains(a));
    }

    #[test]
    fn stale_free_is_rejected() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        entities.free(a);
        assert!(entities.free(a).is_none());
    }

    #[test]
    fn reserve_then_flush() {
        let mut entities = Entities::default();
        let a = entities.alloc();
        entities.free(a);

        let reused = entities.reserve_entity();
        assert_eq!(reused.index(), 0);
        assert_eq!(reused.generation(), 1);
        let fresh = entities.reserve_entity();
        assert_eq!(fresh.index(), 1);
        assert!(entities.contains(reused));
        assert!(entities.contains(fresh));
        assert!(entities.get(fresh).is_none());

        let mut flushed = Vec::new();
        entities.flush(|entity, _location| flushed.push(entity));
        assert!(flushed.contains(&reused));
        assert!(flushed.contains(&fresh));
        assert_eq!(entities.len(), 2);
    }
}
