//! Type-keyed singleton storage.

use core::any::Any;
use core::cell::UnsafeCell;
use std::collections::HashMap;

use crate::component::{ComponentId, ComponentTicks, Resource, Tick};

struct ResourceData {
    value: UnsafeCell<Box<dyn Any + Send + Sync>>,
    ticks: UnsafeCell<ComponentTicks>,
}

// SAFETY: the boxed values are `Send + Sync`; interior mutation only happens
// under the scheduler's access-conflict discipline (or `&mut World`).
unsafe impl Sync for ResourceData {}

/// The resources of a world, keyed by their interned [`ComponentId`].
#[derive(Default)]
pub(crate) struct Resources {
    map: HashMap<ComponentId, ResourceData>,
}

impl Resources {
    /// Inserts or overwrites. Overwriting resets both ticks, matching a
    /// fresh insertion.
    pub fn insert(
        &mut self,
        id: ComponentId,
        value: Box<dyn Any + Send + Sync>,
        change_tick: Tick,
    ) {
        self.map.insert(
            id,
            ResourceData {
                value: UnsafeCell::new(value),
                ticks: UnsafeCell::new(ComponentTicks::new(change_tick)),
            },
        );
    }

    pub fn remove(&mut self, id: ComponentId) -> Option<Box<dyn Any + Send + Sync>> {
        self.map.remove(&id).map(|data| data.value.into_inner())
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        self.map.contains_key(&id)
    }

    /// Shared access to the value and its ticks.
    ///
    /// # Safety
    /// No exclusive access to this resource may be live.
    pub unsafe fn get<R: Resource>(&self, id: ComponentId) -> Option<(&R, &ComponentTicks)> {
        let data = self.map.get(&id)?;
        // SAFETY: shared access only, per the caller's discipline.
        let value = unsafe { &*data.value.get() };
        let ticks = unsafe { &*data.ticks.get() };
        value.downcast_ref::<R>().map(|value| (value, ticks))
    }

    /// Exclusive access to the value and its ticks.
    ///
    /// # Safety
    /// No other access to this resource may be live.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut<R: Resource>(
        &self,
        id: ComponentId,
    ) -> Option<(&mut R, &mut ComponentTicks)> {
        let data = self.map.get(&id)?;
        // SAFETY: exclusive access, per the caller's discipline.
        let value = unsafe { &mut *data.value.get() };
        let ticks = unsafe { &mut *data.ticks.get() };
        value.downcast_mut::<R>().map(|value| (value, ticks))
    }
}
