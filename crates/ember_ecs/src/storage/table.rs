//! Dense, archetype-table storage.

use core::cell::UnsafeCell;

use crate::component::{ComponentId, ComponentInfo, ComponentTicks, Tick};
use crate::storage::blob_vec::BlobVec;

/// One component's values for every entity of an archetype, with their
/// change ticks stored alongside.
///
/// Tick cells are `UnsafeCell` so that concurrently running systems can
/// advance `changed` through a shared table reference; the scheduler's
/// access-conflict predicate is what makes those accesses disjoint.
#[derive(Debug)]
pub(crate) struct Column {
    data: BlobVec,
    ticks: Vec<UnsafeCell<ComponentTicks>>,
}

// SAFETY: all stored items come from `Component` types, which are
// `Send + Sync`; interior tick mutation is guarded by the scheduler's
// access-conflict discipline.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

impl Column {
    pub fn new(info: &ComponentInfo) -> Self {
        Column {
            data: BlobVec::new(info.layout(), info.drop_fn()),
            ticks: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Appends a value, taking ownership of the bytes at `value`.
    ///
    /// # Safety
    /// `value` must be a valid item of this column's layout and must not be
    /// used afterwards.
    pub unsafe fn push(&mut self, value: *const u8, ticks: ComponentTicks) {
        // SAFETY: forwarded caller contract.
        unsafe { self.data.push(value) };
        self.ticks.push(UnsafeCell::new(ticks));
    }

    /// Appends a slot initialized by `constructor`.
    ///
    /// # Safety
    /// `constructor` must fully initialize the slot with a valid item.
    pub unsafe fn push_with(&mut self, constructor: unsafe fn(*mut u8), ticks: ComponentTicks) {
        // SAFETY: the slot is written before any other use.
        unsafe {
            let slot = self.data.push_uninit();
            constructor(slot);
        }
        self.ticks.push(UnsafeCell::new(ticks));
    }

    /// Drops the value at `row` and writes `value` in its place, advancing
    /// the `changed` tick and keeping `added`.
    ///
    /// # Safety
    /// Same contract as [`Column::push`], with `row` in bounds.
    pub unsafe fn replace(&mut self, row: usize, value: *const u8, change_tick: Tick) {
        // SAFETY: forwarded caller contract.
        unsafe { self.data.replace_unchecked(row, value) };
        self.ticks[row].get_mut().changed = change_tick;
    }

    /// Moves the value at `row` (with its ticks) to the end of `target`,
    /// swap-removing it here.
    ///
    /// # Safety
    /// `row` must be in bounds and `target` must have the same item layout.
    pub unsafe fn move_to(&mut self, row: usize, target: &mut Column) {
        debug_assert_eq!(self.data.item_layout(), target.data.item_layout());
        let ticks = *self.ticks[row].get_mut();
        // SAFETY: the value's ownership transfers to `target` in one step.
        unsafe {
            target.data.push(self.data.get_unchecked(row));
            self.data.swap_remove_and_forget_unchecked(row);
        }
        target.ticks.push(UnsafeCell::new(ticks));
        self.ticks.swap_remove(row);
    }

    /// Drops the value at `row`, swap-removing it.
    ///
    /// # Safety
    /// `row` must be in bounds.
    pub unsafe fn swap_remove_and_drop(&mut self, row: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.data.swap_remove_and_drop_unchecked(row) };
        self.ticks.swap_remove(row);
    }

    /// Pointer to the value at `row`.
    ///
    /// # Safety
    /// `row` must be in bounds; access through the pointer must follow the
    /// declared-access discipline.
    #[inline]
    pub unsafe fn get_data(&self, row: usize) -> *mut u8 {
        // SAFETY: forwarded caller contract.
        unsafe { self.data.get_unchecked(row) }
    }

    /// The tick cell for `row`.
    ///
    /// # Safety
    /// `row` must be in bounds.
    #[inline]
    pub unsafe fn get_ticks(&self, row: usize) -> &UnsafeCell<ComponentTicks> {
        debug_assert!(row < self.ticks.len());
        &self.ticks[row]
    }
}

/// The table of one archetype: a column per table-stored component.
///
/// Columns are kept sorted by [`ComponentId`] for binary-search lookup. Row
/// indices are shared with the archetype's entity list.
#[derive(Debug, Default)]
pub(crate) struct Table {
    columns: Vec<(ComponentId, Column)>,
}

impl Table {
    pub fn with_columns<'a>(
        component_infos: impl Iterator<Item = &'a ComponentInfo>,
    ) -> Self {
        let mut columns: Vec<(ComponentId, Column)> = component_infos
            .map(|info| (info.id(), Column::new(info)))
            .collect();
        columns.sort_by_key(|(id, _)| *id);
        Table { columns }
    }

    #[inline]
    pub fn column(&self, component_id: ComponentId) -> Option<&Column> {
        self.columns
            .binary_search_by_key(&component_id, |(id, _)| *id)
            .ok()
            .map(|index| &self.columns[index].1)
    }

    #[inline]
    pub fn column_mut(&mut self, component_id: ComponentId) -> Option<&mut Column> {
        self.columns
            .binary_search_by_key(&component_id, |(id, _)| *id)
            .ok()
            .map(|index| &mut self.columns[index].1)
    }

    pub fn columns_mut(&mut self) -> impl Iterator<Item = (ComponentId, &mut Column)> {
        self.columns.iter_mut().map(|(id, column)| (*id, column))
    }

    /// Drops every value in `row` across all columns, swap-removing the row.
    ///
    /// # Safety
    /// `row` must be in bounds for every column.
    pub unsafe fn swap_remove_row(&mut self, row: usize) {
        for (_, column) in &mut self.columns {
            // SAFETY: forwarded caller contract.
            unsafe { column.swap_remove_and_drop(row) };
        }
    }
}
