//! Ember's entity component system and parallel scheduler.
//!
//! A [`World`](world::World) stores entities, components, resources, events,
//! and a deferred command queue. Work is organized into systems grouped into
//! [`Schedule`](schedule::Schedule)s; the scheduler resolves ordering,
//! hierarchy, and run-conditions between system sets and executes systems in
//! parallel on named worker pools, under a conservative access-conflict
//! model.

pub mod archetype;
pub mod bundle;
pub mod change_detection;
pub mod component;
pub mod entity;
pub mod event;
pub mod hierarchy;
pub mod query;
pub mod schedule;
pub mod storage;
pub mod system;
pub mod world;

/// The most common types, re-exported for convenience.
pub mod prelude {
    #[doc(hidden)]
    pub use crate::{
        bundle::Bundle,
        change_detection::{DetectChanges, Mut, Res, ResMut},
        component::{Component, Resource, StorageKind, Tick},
        entity::Entity,
        event::{Event, EventCursor, Events},
        hierarchy::{Children, Parent},
        query::{Added, Changed, With, Without},
        schedule::{
            AsExecutorLabel, AsScheduleLabel, AsSystemSetLabel, Executors, IntoSystemSetConfigs,
            MultiThread, Schedule, ScheduleLabel, Schedules, SingleThread, SystemSetLabel,
        },
        system::{
            Commands, EventReader, EventWriter, IntoSystem, Local, Query, System, WorldMut,
        },
        world::{EntityMut, EntityRef, FromWorld, World},
    };
}
