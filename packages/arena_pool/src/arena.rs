//! The one module that performs raw pointer arithmetic over pool memory.
//!
//! An [`Arena`] is a single contiguous region acquired from a memory source. Everything
//! else in the crate addresses memory as arena offsets and goes through the methods here
//! to convert between offsets and pointers.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::FaultHook;
use crate::mem_source::{MemorySource, MemorySourceFacade};

/// Minimum alignment, in bytes, of every arena base and of every element region placed
/// inside an arena. Item types with stricter alignment raise this per arena.
pub(crate) const ARENA_ALIGNMENT: usize = 16;

/// One contiguous raw memory region owned by a pool.
///
/// The region is acquired at construction, never moves or resizes, and is released
/// exactly once when the arena is dropped. Pointers into the region therefore stay
/// valid for the arena's whole lifetime.
#[derive(Debug)]
pub(crate) struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    source: MemorySourceFacade,
}

impl Arena {
    /// Acquires a new region of `layout` from `source`.
    ///
    /// # Panics
    ///
    /// Panics if the source cannot supply the region. The fault hook receives a
    /// description of the failure first. Acquisition is never retried.
    pub(crate) fn acquire(
        layout: Layout,
        source: MemorySourceFacade,
        fault_hook: FaultHook,
    ) -> Self {
        match source.allocate(layout) {
            Some(base) => Self {
                base,
                layout,
                source,
            },
            None => {
                let message = format!(
                    "failed to acquire a {} byte arena with {} byte alignment from the memory source",
                    layout.size(),
                    layout.align()
                );
                fault_hook(&message);
                panic!("{message}");
            }
        }
    }

    /// Pointer to the first byte of the region.
    pub(crate) fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Size of the region, in bytes.
    pub(crate) fn len(&self) -> usize {
        self.layout.size()
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is not within the region.
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        let len = self.len();
        assert!(
            offset < len,
            "offset {offset} is out of bounds for a {len} byte arena"
        );

        // SAFETY: The offset is within the region acquired in acquire(), as asserted above.
        unsafe { self.base.add(offset) }
    }

    /// The offset of `ptr` within the region, or `None` if `ptr` does not point into it.
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.addr().get();
        let base = self.base.addr().get();

        // Cannot overflow because the end is the one-past-the-end address of a live
        // allocation, which always fits in the address space.
        let end = base.wrapping_add(self.len());

        if addr < base || addr >= end {
            return None;
        }

        // Cannot underflow because addr >= base was just checked.
        Some(addr.wrapping_sub(base))
    }

    /// Whether `ptr` points into the region.
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.offset_of(ptr).is_some()
    }

    /// Reads a `T` stored at `offset`.
    ///
    /// # Safety
    ///
    /// The bytes at `offset..offset + size_of::<T>()` must have been initialized, either
    /// by [`write`](Self::write) or through a pointer into the region.
    pub(crate) unsafe fn read<T: Copy>(&self, offset: usize) -> T {
        let ptr = self.typed_ptr::<T>(offset);

        // SAFETY: typed_ptr() verified bounds and alignment; the caller guarantees the
        // bytes are initialized.
        unsafe { ptr.read() }
    }

    /// Writes a `T` at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset..offset + size_of::<T>()` is not within the region.
    #[expect(
        clippy::needless_pass_by_ref_mut,
        reason = "writing into the region requires exclusive access even though no field is assigned"
    )]
    pub(crate) fn write<T: Copy>(&mut self, offset: usize, value: T) {
        let ptr = self.typed_ptr::<T>(offset);

        // SAFETY: typed_ptr() verified that the target range is in bounds and aligned,
        // and we hold the arena exclusively.
        unsafe { ptr.write(value) };
    }

    /// Pointer to a `T`-sized range starting at `offset`, verified to be in bounds and
    /// aligned for `T`.
    fn typed_ptr<T>(&self, offset: usize) -> NonNull<T> {
        let end = offset
            .checked_add(size_of::<T>())
            .expect("offset plus value size overflowed usize");
        let len = self.len();
        assert!(
            end <= len,
            "a {} byte value at offset {offset} does not fit in a {len} byte arena",
            size_of::<T>()
        );

        // SAFETY: offset < end <= len, so the offset is within the region.
        let ptr = unsafe { self.base.add(offset) };
        let ptr = ptr.cast::<T>();

        debug_assert!(
            ptr.as_ptr().is_aligned(),
            "offset {offset} is not aligned for a value of alignment {}",
            align_of::<T>()
        );

        ptr
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: The base pointer was acquired from this source with this layout in
        // acquire() and is released exactly once, here.
        unsafe { self.source.deallocate(self.base, self.layout) };
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::items_after_statements,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::panic;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::default_fault_hook;
    use crate::mem_source::FakeMemorySource;

    fn test_arena(size: usize, fake: &Arc<FakeMemorySource>) -> Arena {
        let layout = Layout::from_size_align(size, ARENA_ALIGNMENT).unwrap();

        Arena::acquire(
            layout,
            MemorySourceFacade::from_fake(Arc::clone(fake)),
            default_fault_hook,
        )
    }

    #[test]
    fn acquire_and_drop_release_the_region() {
        let fake = Arc::new(FakeMemorySource::new());

        let arena = test_arena(128, &fake);

        assert_eq!(arena.len(), 128);
        assert_eq!(fake.live_regions(), 1);

        drop(arena);

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    fn offset_of_reports_membership() {
        let fake = Arc::new(FakeMemorySource::new());
        let arena = test_arena(64, &fake);

        let base = arena.base();

        assert_eq!(arena.offset_of(base), Some(0));

        let inside = unsafe { base.add(63) };
        assert_eq!(arena.offset_of(inside), Some(63));

        let one_past_end = unsafe { base.add(64) };
        assert_eq!(arena.offset_of(one_past_end), None);

        assert!(arena.contains(base));
        assert!(!arena.contains(one_past_end));
    }

    #[test]
    fn write_then_read_round_trips() {
        let fake = Arc::new(FakeMemorySource::new());
        let mut arena = test_arena(64, &fake);

        arena.write::<u64>(0, 0xDEAD_BEEF);
        arena.write::<u64>(8, 42);

        assert_eq!(unsafe { arena.read::<u64>(0) }, 0xDEAD_BEEF);
        assert_eq!(unsafe { arena.read::<u64>(8) }, 42);

        arena.write::<u8>(63, 7);

        assert_eq!(unsafe { arena.read::<u8>(63) }, 7);
    }

    #[test]
    #[should_panic]
    fn ptr_at_out_of_bounds_panics() {
        let fake = Arc::new(FakeMemorySource::new());
        let arena = test_arena(64, &fake);

        drop(arena.ptr_at(64));
    }

    #[test]
    #[should_panic]
    fn write_past_end_panics() {
        let fake = Arc::new(FakeMemorySource::new());
        let mut arena = test_arena(64, &fake);

        arena.write::<u64>(60, 1);
    }

    #[test]
    fn acquire_failure_invokes_hook_then_panics() {
        static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

        fn counting_hook(message: &str) {
            assert!(message.contains("failed to acquire a 64 byte arena"));
            HOOK_CALLS.fetch_add(1, Ordering::Relaxed);
        }

        let fake = Arc::new(FakeMemorySource::failing_after(0));
        let layout = Layout::from_size_align(64, ARENA_ALIGNMENT).unwrap();

        let outcome = panic::catch_unwind(|| {
            drop(Arena::acquire(
                layout,
                MemorySourceFacade::from_fake(fake),
                counting_hook,
            ));
        });

        assert!(outcome.is_err());
        assert_eq!(HOOK_CALLS.load(Ordering::Relaxed), 1);
    }
}
