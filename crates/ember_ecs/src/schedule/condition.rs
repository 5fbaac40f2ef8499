//! Common run-conditions.
//!
//! Conditions are ordinary systems returning `bool`; they declare access
//! like any other system and take part in the scheduler's conflict checks.

use crate::change_detection::Res;
use crate::component::Resource;
use crate::event::Event;
use crate::system::EventReader;

/// Passes while the resource exists.
pub fn resource_exists<R: Resource>(resource: Option<Res<R>>) -> bool {
    resource.is_some()
}

/// Passes while the resource equals `value`.
pub fn resource_equals<R: Resource + PartialEq>(
    value: R,
) -> impl FnMut(Option<Res<R>>) -> bool {
    move |resource| resource.is_some_and(|resource| *resource == value)
}

/// Passes while the resource exists and `predicate` accepts it.
pub fn resource_matches<R: Resource>(
    mut predicate: impl FnMut(&R) -> bool + Send + Sync + 'static,
) -> impl FnMut(Option<Res<R>>) -> bool {
    move |resource| resource.is_some_and(|resource| predicate(&resource))
}

/// Passes when at least one `E` was written since the condition last ran.
pub fn on_event<E: Event>() -> impl FnMut(EventReader<E>) -> bool {
    |mut reader: EventReader<E>| reader.read().count() > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{IntoSystem, System};
    use crate::world::World;

    #[derive(PartialEq, Default)]
    struct Paused(bool);

    #[test]
    fn resource_conditions() {
        let mut world = World::new();
        let mut exists = IntoSystem::into_system(resource_exists::<Paused>);
        exists.initialize(&mut world);
        assert!(!exists.run(&mut world).unwrap());
        world.insert_resource(Paused(true));
        assert!(exists.run(&mut world).unwrap());

        let mut equals = IntoSystem::into_system(resource_equals(Paused(true)));
        equals.initialize(&mut world);
        assert!(equals.run(&mut world).unwrap());
        world.insert_resource(Paused(false));
        assert!(!equals.run(&mut world).unwrap());
    }
}
