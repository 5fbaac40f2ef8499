//! Change-detection wrappers around component and resource borrows.
//!
//! Mutable borrows go through [`Mut`] / [`ResMut`], which advance the
//! `changed` tick the first time they are actually written through. Reads go
//! through [`Res`] (resources) or plain references (components), with
//! [`DetectChanges`] exposing the added/changed state relative to the
//! observing system's last run.

use core::ops::{Deref, DerefMut};

use crate::component::{ComponentTicks, Resource, Tick};

/// Read access to the change state of a borrow.
pub trait DetectChanges {
    /// Whether the value was added since the observer last ran.
    fn is_added(&self) -> bool;

    /// Whether the value was added or mutated since the observer last ran.
    fn is_changed(&self) -> bool;

    /// The tick recorded by the last mutation.
    fn last_changed(&self) -> Tick;
}

#[derive(Clone, Copy)]
pub(crate) struct Ticks<'w> {
    pub(crate) ticks: &'w ComponentTicks,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

pub(crate) struct TicksMut<'w> {
    pub(crate) ticks: &'w mut ComponentTicks,
    pub(crate) last_run: Tick,
    pub(crate) this_run: Tick,
}

/// Shared borrow of a resource.
pub struct Res<'w, T: Resource> {
    pub(crate) value: &'w T,
    pub(crate) ticks: Ticks<'w>,
}

impl<'w, T: Resource> Res<'w, T> {
    /// The wrapped reference with the full world lifetime.
    #[inline]
    pub fn into_inner(self) -> &'w T {
        self.value
    }
}

impl<T: Resource> Deref for Res<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: Resource> AsRef<T> for Res<'_, T> {
    #[inline]
    fn as_ref(&self) -> &T {
        self.value
    }
}

/// Exclusive borrow of a resource.
pub struct ResMut<'w, T: Resource> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

impl<'w, T: Resource> ResMut<'w, T> {
    /// Marks the resource changed and returns the wrapped reference with the
    /// full world lifetime.
    #[inline]
    pub fn into_inner(self) -> &'w mut T {
        self.ticks.ticks.changed = self.ticks.this_run;
        self.value
    }

    /// Mutable access without advancing the `changed` tick.
    #[inline]
    pub fn bypass_change_detection(&mut self) -> &mut T {
        self.value
    }

    /// Explicitly marks the value changed.
    #[inline]
    pub fn set_changed(&mut self) {
        self.ticks.ticks.changed = self.ticks.this_run;
    }
}

impl<T: Resource> Deref for ResMut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: Resource> DerefMut for ResMut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.ticks.changed = self.ticks.this_run;
        self.value
    }
}

/// Exclusive borrow of a component.
pub struct Mut<'w, T: ?Sized> {
    pub(crate) value: &'w mut T,
    pub(crate) ticks: TicksMut<'w>,
}

impl<'w, T: ?Sized> Mut<'w, T> {
    /// Marks the component changed and returns the wrapped reference with
    /// the full world lifetime.
    #[inline]
    pub fn into_inner(self) -> &'w mut T {
        self.ticks.ticks.changed = self.ticks.this_run;
        self.value
    }

    /// Mutable access without advancing the `changed` tick.
    #[inline]
    pub fn bypass_change_detection(&mut self) -> &mut T {
        self.value
    }

    /// Explicitly marks the value changed.
    #[inline]
    pub fn set_changed(&mut self) {
        self.ticks.ticks.changed = self.ticks.this_run;
    }
}

impl<T: ?Sized> Deref for Mut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: ?Sized> DerefMut for Mut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.ticks.ticks.changed = self.ticks.this_run;
        self.value
    }
}

impl<T: Resource> DetectChanges for Res<'_, T> {
    #[inline]
    fn is_added(&self) -> bool {
        self.ticks.ticks.is_added(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn is_changed(&self) -> bool {
        self.ticks.ticks.is_changed(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn last_changed(&self) -> Tick {
        self.ticks.ticks.changed
    }
}

impl<T: Resource> DetectChanges for ResMut<'_, T> {
    #[inline]
    fn is_added(&self) -> bool {
        self.ticks.ticks.is_added(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn is_changed(&self) -> bool {
        self.ticks.ticks.is_changed(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn last_changed(&self) -> Tick {
        self.ticks.ticks.changed
    }
}

impl<T: ?Sized> DetectChanges for Mut<'_, T> {
    #[inline]
    fn is_added(&self) -> bool {
        self.ticks.ticks.is_added(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn is_changed(&self) -> bool {
        self.ticks.ticks.is_changed(self.ticks.last_run, self.ticks.this_run)
    }

    #[inline]
    fn last_changed(&self) -> Tick {
        self.ticks.ticks.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentTicks;

    #[test]
    fn deref_mut_advances_changed_tick() {
        let mut ticks = ComponentTicks::new(Tick::new(1));
        let mut value = 0usize;
        let mut wrapped = Mut {
            value: &mut value,
            ticks: TicksMut {
                ticks: &mut ticks,
                last_run: Tick::new(2),
                this_run: Tick::new(5),
            },
        };
        assert!(!wrapped.is_changed());
        *wrapped = 7;
        assert!(wrapped.is_changed());
        assert_eq!(wrapped.last_changed(), Tick::new(5));
        assert_eq!(ticks.changed, Tick::new(5));
    }

    #[test]
    fn bypass_does_not_advance() {
        let mut ticks = ComponentTicks::new(Tick::new(1));
        let mut value = 0usize;
        let mut wrapped = Mut {
            value: &mut value,
            ticks: TicksMut {
                ticks: &mut ticks,
                last_run: Tick::new(2),
                this_run: Tick::new(5),
            },
        };
        *wrapped.bypass_change_detection() = 3;
        assert!(!wrapped.is_changed());
    }
}
