//! World operations: entity lifecycle, bundles, storage kinds, queries, and
//! change detection.

use ember_ecs::component::{Components, RequiredComponents};
use ember_ecs::prelude::*;
use ember_ecs::world::ComponentAccessError;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}
impl Component for Velocity {}

#[derive(Debug, PartialEq)]
struct Frozen;
impl Component for Frozen {
    const STORAGE: StorageKind = StorageKind::SparseSet;
}

#[derive(Debug, PartialEq, Default)]
struct Transform(u32);
impl Component for Transform {}

struct Camera;
impl Component for Camera {
    fn register_required(components: &mut Components, required: &mut RequiredComponents) {
        required.add::<Transform>(components);
    }
}

#[test]
fn spawn_insert_remove_roundtrip() {
    let mut world = World::new();
    let entity = world.spawn((Position { x: 1.0, y: 2.0 }, Velocity { x: 0.0, y: 1.0 }));

    assert_eq!(
        world.get::<Position>(entity).unwrap(),
        &Position { x: 1.0, y: 2.0 }
    );
    world.insert(entity, Frozen).unwrap();
    assert!(world.get::<Frozen>(entity).is_ok());

    world.remove::<Velocity>(entity).unwrap();
    assert!(matches!(
        world.get::<Velocity>(entity),
        Err(ComponentAccessError::ComponentMissing { .. })
    ));
    // The rest is untouched by the archetype move.
    assert_eq!(
        world.get::<Position>(entity).unwrap(),
        &Position { x: 1.0, y: 2.0 }
    );
    assert!(world.get::<Frozen>(entity).is_ok());
}

/// P1: a despawned entity's handle never reaches anything again, even after
/// its index is reused.
#[test]
fn entity_freshness() {
    let mut world = World::new();
    let stale = world.spawn(Position { x: 5.0, y: 5.0 });
    assert!(world.despawn(stale));
    assert!(!world.despawn(stale));

    assert!(matches!(
        world.get::<Position>(stale),
        Err(ComponentAccessError::EntityDoesNotExist(_))
    ));

    let recycled = world.spawn(Position { x: 9.0, y: 9.0 });
    assert_eq!(recycled.index(), stale.index());
    assert_ne!(recycled.generation(), stale.generation());
    assert!(world.get::<Position>(stale).is_err());
    assert_eq!(
        world.get::<Position>(recycled).unwrap(),
        &Position { x: 9.0, y: 9.0 }
    );
}

#[test]
fn despawn_fixes_swapped_entity_location() {
    let mut world = World::new();
    let first = world.spawn(Position { x: 1.0, y: 0.0 });
    let second = world.spawn(Position { x: 2.0, y: 0.0 });
    let third = world.spawn(Position { x: 3.0, y: 0.0 });

    // Removing the first row swaps the last into its place.
    world.despawn(first);
    assert_eq!(world.get::<Position>(second).unwrap().x, 2.0);
    assert_eq!(world.get::<Position>(third).unwrap().x, 3.0);
}

#[test]
fn insert_overwrites_and_keeps_added_tick() {
    let mut world = World::new();
    let entity = world.spawn(Position { x: 0.0, y: 0.0 });
    world.insert(entity, Position { x: 4.0, y: 4.0 }).unwrap();
    assert_eq!(world.get::<Position>(entity).unwrap().x, 4.0);
}

#[test]
fn required_components_ride_along() {
    let mut world = World::new();
    let entity = world.spawn(Camera);
    assert_eq!(world.get::<Transform>(entity).unwrap(), &Transform(0));

    // An explicit value wins over the required default.
    let explicit = world.spawn((Camera, Transform(7)));
    assert_eq!(world.get::<Transform>(explicit).unwrap(), &Transform(7));
}

#[test]
fn sparse_components_survive_table_moves() {
    let mut world = World::new();
    let entity = world.spawn((Position { x: 0.0, y: 0.0 }, Frozen));
    // Moving archetypes (table side) must not disturb the sparse component.
    world.insert(entity, Velocity { x: 1.0, y: 1.0 }).unwrap();
    assert!(world.get::<Frozen>(entity).is_ok());
    world.remove::<Position>(entity).unwrap();
    assert!(world.get::<Frozen>(entity).is_ok());
    world.remove::<Frozen>(entity).unwrap();
    assert!(world.get::<Frozen>(entity).is_err());
}

#[test]
fn queries_iterate_matching_archetypes() {
    let mut world = World::new();
    world.spawn((Position { x: 1.0, y: 0.0 }, Velocity { x: 1.0, y: 0.0 }));
    world.spawn((Position { x: 2.0, y: 0.0 }, Velocity { x: 2.0, y: 0.0 }, Frozen));
    world.spawn(Position { x: 3.0, y: 0.0 });

    let mut moving = world.query_filtered::<(&Position, &Velocity), Without<Frozen>>();
    let mut seen: Vec<f32> = moving.iter(&world).map(|(position, _)| position.x).collect();
    seen.sort_by(f32::total_cmp);
    assert_eq!(seen, vec![1.0]);

    let mut all = world.query::<&Position>();
    assert_eq!(all.iter(&world).count(), 3);
}

#[test]
fn mutable_queries_move_entities() {
    let mut world = World::new();
    for i in 0..10 {
        world.spawn((
            Position { x: i as f32, y: 0.0 },
            Velocity { x: 1.0, y: 0.0 },
        ));
    }
    let mut query = world.query::<(&mut Position, &Velocity)>();
    for (mut position, velocity) in query.iter_mut(&mut world) {
        position.x += velocity.x;
    }
    let mut moved = world.query::<&Position>();
    assert!(moved.iter(&world).all(|position| position.x >= 1.0));
}

/// P6: a write through `Mut` advances the `changed` tick past everything
/// observed before it.
#[test]
fn change_detection_is_monotonic() {
    let mut world = World::new();
    let entity = world.spawn(Position { x: 0.0, y: 0.0 });
    world.clear_trackers();

    {
        let mut changed = world.query_filtered::<Entity, Changed<Position>>();
        assert_eq!(changed.iter(&world).count(), 0);
    }

    world.get_mut::<Position>(entity).unwrap().x = 1.0;

    {
        let mut changed = world.query_filtered::<Entity, Changed<Position>>();
        assert_eq!(changed.iter(&world).count(), 1);
    }

    // After the frame boundary the write is old news again.
    world.clear_trackers();
    let mut changed = world.query_filtered::<Entity, Changed<Position>>();
    assert_eq!(changed.iter(&world).count(), 0);
}

#[test]
fn added_filter_sees_fresh_components_only() {
    let mut world = World::new();
    world.spawn(Position { x: 0.0, y: 0.0 });
    world.clear_trackers();
    world.spawn(Position { x: 1.0, y: 0.0 });

    let mut added = world.query_filtered::<&Position, Added<Position>>();
    let fresh: Vec<f32> = added.iter(&world).map(|position| position.x).collect();
    assert_eq!(fresh, vec![1.0]);
}

#[test]
fn resources_roundtrip() {
    #[derive(Debug, PartialEq, Default)]
    struct Settings {
        volume: u8,
    }

    let mut world = World::new();
    assert!(world.get_resource::<Settings>().is_none());
    world.init_resource::<Settings>();
    world.resource_mut::<Settings>().volume = 11;
    assert_eq!(world.resource::<Settings>(), &Settings { volume: 11 });
    assert_eq!(world.remove_resource::<Settings>(), Some(Settings { volume: 11 }));
    assert!(world.get_resource::<Settings>().is_none());
}

/// P2: queued commands apply in enqueue order, starting from the pre-drain
/// state.
#[test]
fn command_order_is_preserved() {
    #[derive(Default)]
    struct Log(Vec<u32>);

    let mut world = World::new();
    world.insert_resource(Log::default());
    for i in 0..8 {
        world.queue(move |world: &mut World| {
            world.resource_mut::<Log>().0.push(i);
        });
    }
    world.flush_commands();
    assert_eq!(world.resource::<Log>().0, (0..8).collect::<Vec<_>>());
}

#[test]
fn entity_views() {
    let mut world = World::new();
    let entity = world.spawn(Position { x: 1.0, y: 1.0 });
    {
        let view = world.entity(entity);
        assert_eq!(view.id(), entity);
        assert!(view.contains::<Position>());
        assert!(!view.contains::<Velocity>());
    }
    {
        let mut view = world.entity_mut(entity);
        view.insert(Velocity { x: 2.0, y: 0.0 });
        view.get_mut::<Position>().unwrap().x = 5.0;
    }
    assert_eq!(world.get::<Position>(entity).unwrap().x, 5.0);
    assert_eq!(world.get::<Velocity>(entity).unwrap().x, 2.0);
}
