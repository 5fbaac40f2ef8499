//! Interior-mutable world pointer shared with running systems.

use core::cell::UnsafeCell;
use core::marker::PhantomData;

use crate::world::World;

/// A copyable pointer to a [`World`] that running systems use for their
/// declared accesses.
///
/// The scheduler creates one cell per schedule run from `&mut World` and
/// hands copies to every dispatched system. Safety rests on the conservative
/// access-conflict predicate: two systems holding the same cell never touch
/// overlapping data unless both declared compatible access.
#[derive(Clone, Copy)]
pub struct UnsafeWorldCell<'w>(*mut World, PhantomData<&'w UnsafeCell<World>>);

// SAFETY: the cell is only dereferenced under the scheduler's declared-access
// discipline; `World`'s storages are `Send + Sync`.
unsafe impl Send for UnsafeWorldCell<'_> {}
unsafe impl Sync for UnsafeWorldCell<'_> {}

impl<'w> UnsafeWorldCell<'w> {
    #[inline]
    pub(crate) fn new(world: &'w mut World) -> Self {
        UnsafeWorldCell(world, PhantomData)
    }

    /// A cell that must only ever be used for reads.
    #[inline]
    pub(crate) fn new_readonly(world: &'w World) -> Self {
        UnsafeWorldCell(core::ptr::from_ref(world).cast_mut(), PhantomData)
    }

    /// Rebuilds a cell from a raw pointer, typically on a worker thread.
    ///
    /// # Safety
    /// `ptr` must come from [`UnsafeWorldCell::raw`] of a cell that is still
    /// within its schedule run.
    #[inline]
    pub(crate) unsafe fn from_raw(ptr: *mut World) -> Self {
        UnsafeWorldCell(ptr, PhantomData)
    }

    #[inline]
    pub(crate) fn raw(self) -> *mut World {
        self.0
    }

    /// Shared access to the world.
    ///
    /// # Safety
    /// No conflicting exclusive access may be live, per the caller's declared
    /// access set.
    #[inline]
    pub unsafe fn world(self) -> &'w World {
        // SAFETY: forwarded caller contract.
        unsafe { &*self.0 }
    }

    /// Exclusive access to the world.
    ///
    /// # Safety
    /// The caller must have declared exclusive world access, so no other
    /// access of any kind is live.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn world_mut(self) -> &'w mut World {
        // SAFETY: forwarded caller contract.
        unsafe { &mut *self.0 }
    }
}
