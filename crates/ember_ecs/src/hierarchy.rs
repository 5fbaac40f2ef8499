//! Parent/child relationships as ordinary components.
//!
//! Nothing in the runtime privileges these: despawning a parent does not
//! despawn its children, and keeping both sides consistent is up to the
//! systems that edit them.

use smallvec::SmallVec;

use crate::component::Component;
use crate::entity::Entity;

/// The entity this entity is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

impl Component for Parent {}

/// The entities attached to this entity, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Children(pub SmallVec<[Entity; 8]>);

impl Component for Children {}

impl Children {
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Children {
    type Item = &'a Entity;
    type IntoIter = core::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::World;

    #[test]
    fn hierarchy_components_are_ordinary() {
        let mut world = World::new();
        let parent = world.spawn(Children::default());
        let child = world.spawn(Parent(parent));
        world
            .get_mut::<Children>(parent)
            .unwrap()
            .0
            .push(child);

        assert_eq!(world.get::<Parent>(child).unwrap().0, parent);
        let children = world.get::<Children>(parent).unwrap();
        assert_eq!(children.iter().collect::<Vec<_>>(), vec![child]);

        // Despawning the parent leaves the child alone.
        world.despawn(parent);
        assert!(world.get::<Parent>(child).is_ok());
    }
}
