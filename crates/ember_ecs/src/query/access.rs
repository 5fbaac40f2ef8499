//! Declared access sets and the conflict predicate.

use fixedbitset::FixedBitSet;

use crate::component::ComponentId;

/// The set of reads and writes a system declares over components and
/// resources (both live in the same interned id space).
///
/// This is the single source of truth for scheduling safety: two systems may
/// run concurrently iff their accesses are compatible. The predicate is
/// conservative; a false positive only costs parallelism, while a false
/// negative would be a data race and is forbidden. Adding access can only
/// add conflicts, never remove them.
#[derive(Clone, Default)]
pub struct Access {
    reads: FixedBitSet,
    writes: FixedBitSet,
    /// Reads everything (`&World`).
    read_all: bool,
    /// Exclusive world access; conflicts with everything, including
    /// access-free systems (they still share the world cell).
    write_all: bool,
}

impl Access {
    pub fn add_read(&mut self, id: ComponentId) {
        assert!(
            !self.write_all && !self.writes.contains(id.index()),
            "conflicting access within one system: id {id:?} is already written",
        );
        self.reads.grow(id.index() + 1);
        self.reads.insert(id.index());
    }

    pub fn add_write(&mut self, id: ComponentId) {
        assert!(
            !self.write_all
                && !self.read_all
                && !self.reads.contains(id.index())
                && !self.writes.contains(id.index()),
            "conflicting access within one system: id {id:?} is already accessed",
        );
        self.writes.grow(id.index() + 1);
        self.writes.insert(id.index());
    }

    pub fn read_all(&mut self) {
        assert!(
            !self.write_all && self.writes.is_clear(),
            "conflicting access within one system: world read over declared writes",
        );
        self.read_all = true;
    }

    pub fn write_all(&mut self) {
        assert!(
            self.is_empty(),
            "conflicting access within one system: exclusive world over other access",
        );
        self.write_all = true;
    }

    #[inline]
    pub fn has_write_all(&self) -> bool {
        self.write_all
    }

    pub fn is_empty(&self) -> bool {
        !self.read_all
            && !self.write_all
            && self.reads.is_clear()
            && self.writes.is_clear()
    }

    pub fn extend(&mut self, other: &Access) {
        self.reads.grow(other.reads.len());
        self.reads.union_with(&other.reads);
        self.writes.grow(other.writes.len());
        self.writes.union_with(&other.writes);
        self.read_all |= other.read_all;
        self.write_all |= other.write_all;
    }

    /// Whether two declared access sets may be exercised concurrently.
    pub fn is_compatible(&self, other: &Access) -> bool {
        if self.write_all || other.write_all {
            return false;
        }
        if self.read_all && !other.writes.is_clear() {
            return false;
        }
        if other.read_all && !self.writes.is_clear() {
            return false;
        }
        self.writes.is_disjoint(&other.reads)
            && self.writes.is_disjoint(&other.writes)
            && self.reads.is_disjoint(&other.writes)
    }

    /// Inverse of [`Access::is_compatible`].
    #[inline]
    pub fn conflicts_with(&self, other: &Access) -> bool {
        !self.is_compatible(other)
    }
}

impl core::fmt::Debug for Access {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Access")
            .field("reads", &self.reads.ones().collect::<Vec<_>>())
            .field("writes", &self.writes.ones().collect::<Vec<_>>())
            .field("read_all", &self.read_all)
            .field("write_all", &self.write_all)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: usize) -> ComponentId {
        ComponentId(index)
    }

    #[test]
    fn reads_are_compatible() {
        let mut a = Access::default();
        a.add_read(id(0));
        let mut b = Access::default();
        b.add_read(id(0));
        assert!(a.is_compatible(&b));
    }

    #[test]
    fn write_conflicts_with_read_and_write() {
        let mut a = Access::default();
        a.add_write(id(3));
        let mut read = Access::default();
        read.add_read(id(3));
        let mut write = Access::default();
        write.add_write(id(3));
        let mut other = Access::default();
        other.add_write(id(4));
        assert!(a.conflicts_with(&read));
        assert!(a.conflicts_with(&write));
        assert!(a.is_compatible(&other));
    }

    #[test]
    fn exclusive_world_conflicts_with_everything() {
        let mut exclusive = Access::default();
        exclusive.write_all();
        let empty = Access::default();
        assert!(exclusive.conflicts_with(&empty));
        assert!(empty.conflicts_with(&exclusive));
    }

    #[test]
    fn read_all_conflicts_only_with_writes() {
        let mut read_world = Access::default();
        read_world.read_all();
        let mut reader = Access::default();
        reader.add_read(id(1));
        let mut writer = Access::default();
        writer.add_write(id(1));
        assert!(read_world.is_compatible(&reader));
        assert!(read_world.conflicts_with(&writer));
    }

    #[test]
    fn conflicting_access_within_a_system_panics() {
        let result = std::panic::catch_unwind(|| {
            let mut access = Access::default();
            access.add_read(id(0));
            access.add_write(id(0));
        });
        assert!(result.is_err());
    }
}
