//! Convenience views over a single entity.

use crate::bundle::Bundle;
use crate::change_detection::Mut;
use crate::component::Component;
use crate::entity::Entity;
use crate::world::World;

/// Read-only view of one entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: Entity) -> Self {
        EntityRef { world, entity }
    }

    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.get::<T>().is_some()
    }

    pub fn get<T: Component>(&self) -> Option<&'w T> {
        self.world.get::<T>(self.entity).ok()
    }
}

/// Mutable view of one entity.
pub struct EntityMut<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl<'w> EntityMut<'w> {
    pub(crate) fn new(world: &'w mut World, entity: Entity) -> Self {
        EntityMut { world, entity }
    }

    #[inline]
    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn contains<T: Component>(&self) -> bool {
        self.world.get::<T>(self.entity).is_ok()
    }

    pub fn get<T: Component>(&self) -> Option<&T> {
        self.world.get::<T>(self.entity).ok()
    }

    pub fn get_mut<T: Component>(&mut self) -> Option<Mut<'_, T>> {
        self.world.get_mut::<T>(self.entity).ok()
    }

    pub fn insert<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        // The entity is validated on construction; a stale handle here is a
        // bug in this view, not the caller.
        let result: Result<(), _> = self.world.insert(self.entity, bundle);
        debug_assert!(result.is_ok());
        self
    }

    pub fn remove<B: Bundle>(&mut self) -> &mut Self {
        let result = self.world.remove::<B>(self.entity);
        debug_assert!(result.is_ok());
        self
    }

    /// Despawns the entity, consuming the view.
    pub fn despawn(self) {
        self.world.despawn(self.entity);
    }
}
