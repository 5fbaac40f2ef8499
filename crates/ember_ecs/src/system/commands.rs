//! Deferred world mutations.
//!
//! Commands describe structural changes that cannot happen while systems
//! share the world. Systems enqueue them through [`Commands`] (which needs
//! no world access beyond the sink) and the scheduler drains the queue once
//! the schedule completes. Applying a command may enqueue further commands;
//! draining repeats until the queue is empty.

use core::marker::PhantomData;
use std::sync::Mutex;

use crate::bundle::Bundle;
use crate::component::Tick;
use crate::entity::{Entities, Entity};
use crate::query::Access;
use crate::system::{SystemParam, SystemParamError};
use crate::world::{UnsafeWorldCell, World};

/// A deferred world mutation.
pub trait Command: Send + 'static {
    fn apply(self: Box<Self>, world: &mut World);
}

impl<F: FnOnce(&mut World) + Send + 'static> Command for F {
    fn apply(self: Box<Self>, world: &mut World) {
        self(world)
    }
}

/// The world's command sink. Pushing needs only a shared reference, so
/// concurrently running systems can enqueue freely; application order is
/// enqueue order.
#[derive(Default)]
pub struct CommandQueue {
    queue: Mutex<Vec<Box<dyn Command>>>,
}

impl CommandQueue {
    pub fn push(&self, command: impl Command) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Box::new(command));
    }

    pub(crate) fn take(&self) -> Vec<Box<dyn Command>> {
        core::mem::take(
            &mut *self
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

struct SpawnCommand<B: Bundle> {
    entity: Entity,
    bundle: B,
}

impl<B: Bundle> Command for SpawnCommand<B> {
    fn apply(self: Box<Self>, world: &mut World) {
        // The entity was reserved by `Commands::spawn` and materialized by
        // the flush preceding command application.
        if let Err(error) = world.insert(self.entity, self.bundle) {
            log::warn!("spawn command dropped: {error}");
        }
    }
}

struct DespawnCommand {
    entity: Entity,
}

impl Command for DespawnCommand {
    fn apply(self: Box<Self>, world: &mut World) {
        if !world.despawn(self.entity) {
            log::debug!("despawn command ignored stale entity {}", self.entity);
        }
    }
}

struct InsertCommand<B: Bundle> {
    entity: Entity,
    bundle: B,
}

impl<B: Bundle> Command for InsertCommand<B> {
    fn apply(self: Box<Self>, world: &mut World) {
        if let Err(error) = world.insert(self.entity, self.bundle) {
            log::warn!("insert command dropped: {error}");
        }
    }
}

struct RemoveCommand<B: Bundle> {
    entity: Entity,
    marker: PhantomData<fn() -> B>,
}

impl<B: Bundle> Command for RemoveCommand<B> {
    fn apply(self: Box<Self>, world: &mut World) {
        if let Err(error) = world.remove::<B>(self.entity) {
            log::debug!("remove command ignored: {error}");
        }
    }
}

struct InsertResourceCommand<R: crate::component::Resource> {
    value: R,
}

impl<R: crate::component::Resource> Command for InsertResourceCommand<R> {
    fn apply(self: Box<Self>, world: &mut World) {
        world.insert_resource(self.value);
    }
}

struct RemoveResourceCommand<R: crate::component::Resource> {
    marker: PhantomData<fn() -> R>,
}

impl<R: crate::component::Resource> Command for RemoveResourceCommand<R> {
    fn apply(self: Box<Self>, world: &mut World) {
        world.remove_resource::<R>();
    }
}

/// Enqueues deferred structural changes from inside a running system.
///
/// Spawned entities are reserved immediately (so their ids can be used and
/// stored right away) and materialized when the queue is drained.
pub struct Commands<'w, 's> {
    queue: &'w CommandQueue,
    entities: &'w Entities,
    marker: PhantomData<&'s ()>,
}

impl<'w> Commands<'w, '_> {
    pub(crate) fn new(queue: &'w CommandQueue, entities: &'w Entities) -> Self {
        Commands {
            queue,
            entities,
            marker: PhantomData,
        }
    }

    /// Reserves an entity and queues spawning it with `bundle`.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.entities.reserve_entity();
        self.queue.push(SpawnCommand { entity, bundle });
        entity
    }

    /// Reserves an empty entity.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.entities.reserve_entity();
        self.queue.push(SpawnCommand { entity, bundle: () });
        entity
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.queue.push(DespawnCommand { entity });
    }

    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) {
        self.queue.push(InsertCommand { entity, bundle });
    }

    pub fn remove<B: Bundle>(&mut self, entity: Entity) {
        self.queue.push(RemoveCommand::<B> {
            entity,
            marker: PhantomData,
        });
    }

    pub fn insert_resource<R: crate::component::Resource>(&mut self, value: R) {
        self.queue.push(InsertResourceCommand { value });
    }

    pub fn remove_resource<R: crate::component::Resource>(&mut self) {
        self.queue.push(RemoveResourceCommand::<R> {
            marker: PhantomData,
        });
    }

    /// Enqueues an arbitrary command.
    pub fn queue(&mut self, command: impl Command) {
        self.queue.push(command);
    }
}

// SAFETY: only touches the command sink and the atomic entity reservation;
// declares no access.
unsafe impl SystemParam for Commands<'_, '_> {
    type State = ();
    type Item<'world, 'state> = Commands<'world, 'state>;

    fn init_state(_world: &mut World, _access: &mut Access) -> Self::State {}

    unsafe fn get_param<'world, 'state>(
        _state: &'state mut Self::State,
        world: UnsafeWorldCell<'world>,
        _last_run: Tick,
        _this_run: Tick,
    ) -> Result<Self::Item<'world, 'state>, SystemParamError> {
        // SAFETY: the queue and the entity allocator are shared-access safe.
        let world = unsafe { world.world() };
        Ok(Commands::new(world.command_queue(), world.entities()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    #[derive(Debug, PartialEq)]
    struct Name(&'static str);
    impl Component for Name {}

    #[derive(Default, Debug, PartialEq)]
    struct Score(u32);

    #[test]
    fn commands_apply_in_enqueue_order() {
        let mut world = World::new();
        world.insert_resource(Score(0));
        world.queue(|world: &mut World| {
            world.resource_mut::<Score>().0 += 1;
        });
        world.queue(|world: &mut World| {
            let score = &mut world.resource_mut::<Score>().0;
            *score *= 10;
        });
        world.flush_commands();
        assert_eq!(world.resource::<Score>(), &Score(10));
    }

    #[test]
    fn applying_may_enqueue_more() {
        let mut world = World::new();
        world.insert_resource(Score(0));
        world.queue(|world: &mut World| {
            world.resource_mut::<Score>().0 += 1;
            world.queue(|world: &mut World| {
                world.resource_mut::<Score>().0 += 10;
            });
        });
        world.flush_commands();
        assert_eq!(world.resource::<Score>(), &Score(11));
    }

    #[test]
    fn reserved_spawn_is_visible_after_drain() {
        let mut world = World::new();
        let entity = {
            let queue = world.command_queue();
            let entities = world.entities();
            let mut commands = Commands::new(queue, entities);
            commands.spawn(Name("reserved"))
        };
        world.flush_commands();
        assert_eq!(world.get::<Name>(entity).unwrap(), &Name("reserved"));
    }
}
