//! A fixed-capacity run allocator over a bitmap of equally sized slots.

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ops::Range;
use std::ptr::NonNull;
use std::thread;

use crate::arena::{ARENA_ALIGNMENT, Arena};
use crate::mem_source::MemorySourceFacade;
use crate::raw_pool::DEFAULT_CAPACITY;
use crate::{FaultHook, RawPool, default_fault_hook};

/// Layout calculations for the arena behind a [`SlotSlab`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct SlotLayoutInfo {
    /// Distance between the starts of consecutive slots, in bytes.
    stride: usize,

    /// Bytes reserved at the head of the arena for the slot bitmap, padded so the first
    /// slot starts on an element alignment boundary.
    flags_region: usize,

    /// Layout of the whole arena: the bitmap followed by the slot region.
    arena_layout: Layout,
}

impl SlotLayoutInfo {
    fn calculate(item_layout: Layout, capacity: NonZero<usize>) -> Self {
        assert!(
            item_layout.size() > 0,
            "SlotSlab cannot be created for zero-sized items"
        );

        let stride = item_layout.pad_to_align().size();
        let element_alignment = item_layout.align().max(ARENA_ALIGNMENT);

        // One bit per slot.
        let flags_bytes = capacity.get().div_ceil(8);

        let flags_region = flags_bytes
            .checked_next_multiple_of(element_alignment)
            .expect("bitmap padding cannot overflow for a capacity that fits in memory");

        let slots_size = stride
            .checked_mul(capacity.get())
            .expect("slot region size overflowed usize");

        let total_size = flags_region
            .checked_add(slots_size)
            .expect("arena size overflowed usize");

        let arena_layout = Layout::from_size_align(total_size, element_alignment)
            .expect("a padded size and a power of two alignment always form a valid layout");

        Self {
            stride,
            flags_region,
            arena_layout,
        }
    }
}

/// A fixed-capacity pool that reserves runs of consecutive equally sized slots.
///
/// The slab owns one arena. The arena starts with a bitmap holding one bit per slot
/// (set means reserved), padded so the slot region begins on a 16 byte boundary, or on
/// the item alignment if that is stricter. [`allocate`](Self::allocate) reserves the
/// first run of consecutive free slots long enough for the request and
/// [`deallocate`](Self::deallocate) releases a run. The slab never grows; use a
/// [`SlotPool`](crate::SlotPool) when growth on exhaustion is wanted.
///
/// # Example
///
/// ```
/// use arena_pool::SlotSlab;
/// use new_zealand::nz;
///
/// let mut slab = SlotSlab::builder()
///     .layout_of::<u64>()
///     .capacity(nz!(32))
///     .build();
///
/// let run = slab.allocate(nz!(4)).expect("a fresh slab has room for four slots");
/// assert_eq!(slab.len(), 4);
///
/// // The storage stays ours until released; write the first item through the pointer.
/// // SAFETY: The run covers four u64 slots and nothing else aliases it.
/// unsafe { run.cast::<u64>().write(1) };
///
/// // SAFETY: The run came from this slab with this count and is released once.
/// unsafe { slab.deallocate(run, nz!(4)) };
/// assert!(slab.is_empty());
/// ```
#[derive(Debug)]
pub struct SlotSlab {
    item_layout: Layout,
    capacity: NonZero<usize>,
    layout_info: SlotLayoutInfo,
    arena: Arena,

    /// Slot index where the next free run scan starts. This is a locality hint, not
    /// ground truth; the bitmap is the ground truth.
    next_free_hint: usize,

    /// Number of slots currently reserved.
    len: usize,
}

impl SlotSlab {
    /// Starts building a new slab. The item layout is mandatory.
    pub fn builder() -> SlotSlabBuilder {
        SlotSlabBuilder::new()
    }

    pub(crate) fn new_inner(
        item_layout: Layout,
        capacity: NonZero<usize>,
        fault_hook: FaultHook,
        source: MemorySourceFacade,
    ) -> Self {
        let layout_info = SlotLayoutInfo::calculate(item_layout, capacity);
        let mut arena = Arena::acquire(layout_info.arena_layout, source, fault_hook);

        // All slots start free.
        for byte_offset in 0..capacity.get().div_ceil(8) {
            arena.write::<u8>(byte_offset, 0);
        }

        Self {
            item_layout,
            capacity,
            layout_info,
            arena,
            next_free_hint: 0,
            len: 0,
        }
    }

    /// The maximum number of slots the slab can hold.
    #[must_use]
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// The number of slots currently reserved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no slots are currently reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The layout of a single item, as given at construction.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// Whether `ptr` points into this slab's slot region.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.arena
            .offset_of(ptr)
            .is_some_and(|offset| offset >= self.layout_info.flags_region)
    }

    /// Reserves a run of `count` consecutive free slots.
    ///
    /// The scan starts at the slot where the previous operation left off and wraps
    /// around once, so recently released regions are favored for reuse. Returns a
    /// pointer to the first slot of the run, or `None` when no run of `count`
    /// consecutive free slots exists anywhere in the slab.
    #[must_use]
    pub fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        let run = count.get();

        if run > self.capacity.get() {
            return None;
        }

        let hint = self.next_free_hint;

        // A run that starts before the hint may still cross it, so the wrapped window
        // overlaps the first window by up to run - 1 slots.
        let start = self.find_free_run(hint..self.capacity.get(), run).or_else(|| {
            // Cannot overflow or underflow because hint and run are bounded by the
            // capacity and run is at least 1.
            let wrapped_end = hint.wrapping_add(run).wrapping_sub(1).min(self.capacity.get());

            self.find_free_run(0..wrapped_end, run)
        })?;

        self.mark_run(start, run, true);

        // Cannot overflow because the run ends within the capacity.
        self.next_free_hint = start.wrapping_add(run);

        // Cannot overflow because len is bounded by the capacity.
        self.len = self.len.wrapping_add(run);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Some(self.slot_ptr(start))
    }

    /// Releases the run of `count` slots starting at `ptr`.
    ///
    /// The next allocation scan restarts at the released run, so a matching request
    /// that follows reuses the same storage.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this slab with
    /// this same `count`, and the run must not have been released already. The slab does
    /// not record run lengths, so a wrong `count` silently corrupts neighboring runs.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at a slot of this slab or if any slot of the run
    /// is already free.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>) {
        let start = self.slot_index_of(ptr);
        let run = count.get();

        assert!(
            start.checked_add(run).is_some_and(|end| end <= self.capacity.get()),
            "a run of {run} slots starting at slot {start} extends past the end of the slab"
        );

        self.mark_run(start, run, false);

        // Cannot underflow because every slot of the run was verified to be reserved.
        self.len = self.len.wrapping_sub(run);

        // Favor reusing the region that was just released.
        self.next_free_hint = start;

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// Finds the first run of `run` consecutive free slots within `window`.
    fn find_free_run(&self, window: Range<usize>, run: usize) -> Option<usize> {
        let mut run_start = 0_usize;
        let mut run_len = 0_usize;

        for index in window {
            if self.is_slot_free(index) {
                if run_len == 0 {
                    run_start = index;
                }

                // Cannot overflow because the run length is bounded by the capacity.
                run_len = run_len.wrapping_add(1);

                if run_len == run {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }

        None
    }

    fn is_slot_free(&self, index: usize) -> bool {
        debug_assert!(index < self.capacity.get());

        // SAFETY: Every bitmap byte was initialized in new_inner() and mutations always
        // rewrite whole bytes, so the byte is an initialized u8.
        let byte: u8 = unsafe { self.arena.read(index >> 3) };

        (byte & (1_u8 << (index & 7))) == 0
    }

    /// Flips `run` slots starting at `start` to reserved or free.
    ///
    /// # Panics
    ///
    /// Panics when releasing a slot that is already free. Reserving an already reserved
    /// slot is a bookkeeping bug, caught in debug builds.
    fn mark_run(&mut self, start: usize, run: usize, reserve: bool) {
        // Cannot overflow because the run was verified to end within the capacity.
        for index in start..start.wrapping_add(run) {
            if reserve {
                debug_assert!(
                    self.is_slot_free(index),
                    "reserving slot {index} which is already reserved"
                );
            } else {
                assert!(
                    !self.is_slot_free(index),
                    "double free of slot {index}; the run was already released"
                );
            }

            let byte_offset = index >> 3;
            let mask = 1_u8 << (index & 7);

            // SAFETY: Initialized in new_inner(); see is_slot_free().
            let byte: u8 = unsafe { self.arena.read(byte_offset) };

            let updated = if reserve { byte | mask } else { byte & !mask };
            self.arena.write(byte_offset, updated);
        }
    }

    /// Pointer to the first byte of the slot at `index`.
    fn slot_ptr(&self, index: usize) -> NonNull<u8> {
        debug_assert!(index < self.capacity.get());

        // Cannot overflow because the whole slot region fits in the arena.
        let offset = self
            .layout_info
            .flags_region
            .wrapping_add(index.wrapping_mul(self.layout_info.stride));

        self.arena.ptr_at(offset)
    }

    /// Recovers the slot index behind a pointer returned by [`allocate`](Self::allocate).
    ///
    /// # Panics
    ///
    /// Panics if the pointer is outside the slab, inside the bitmap, or not on a slot
    /// boundary.
    fn slot_index_of(&self, ptr: NonNull<u8>) -> usize {
        let Some(offset) = self.arena.offset_of(ptr) else {
            panic!("pointer {ptr:p} does not belong to this slab");
        };

        assert!(
            offset >= self.layout_info.flags_region,
            "pointer {ptr:p} points into the slot bitmap, not at a slot"
        );

        // Cannot underflow because the offset was just verified to be past the bitmap.
        let relative = offset.wrapping_sub(self.layout_info.flags_region);

        let misalignment = relative
            .checked_rem(self.layout_info.stride)
            .expect("stride is non-zero because zero-sized items are rejected at construction");
        assert_eq!(
            misalignment, 0,
            "pointer {ptr:p} is not on a slot boundary"
        );

        relative
            .checked_div(self.layout_info.stride)
            .expect("stride is non-zero because zero-sized items are rejected at construction")
    }

    /// Verifies that the bookkeeping fields agree with the bitmap.
    #[cfg(debug_assertions)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutating it is meaningless.
    fn integrity_check(&self) {
        let mut reserved = 0_usize;

        for index in 0..self.capacity.get() {
            if !self.is_slot_free(index) {
                reserved = reserved.wrapping_add(1);
            }
        }

        assert!(
            reserved == self.len,
            "bitmap has {reserved} reserved slots but the slab believes {}",
            self.len
        );
        assert!(
            self.next_free_hint <= self.capacity.get(),
            "scan hint {} is past the capacity {}",
            self.next_free_hint,
            self.capacity
        );
    }
}

impl RawPool for SlotSlab {
    fn item_layout(&self) -> Layout {
        self.item_layout
    }

    fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        self.allocate(count)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>) {
        // SAFETY: Forwarding the caller's guarantee.
        unsafe { self.deallocate(ptr, count) }
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.contains(ptr)
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }
}

impl Drop for SlotSlab {
    fn drop(&mut self) {
        // If the thread is already panicking we skip the check, as a second panic would
        // turn the unwind into an abort and hide the original message.
        if !thread::panicking() {
            assert!(
                self.is_empty(),
                "dropped a SlotSlab with {} slots still reserved; every run must be \
                 deallocated before the slab is dropped",
                self.len
            );
        }
    }
}

// SAFETY: The raw pointers all point into the arena that the slab itself exclusively
// owns, so moving the slab to another thread moves the storage with it.
unsafe impl Send for SlotSlab {}

/// Builder for [`SlotSlab`].
///
/// The item layout is mandatory. Capacity defaults to 128 slots and faults are reported
/// to standard output unless a [`FaultHook`] is installed.
///
/// # Example
///
/// ```
/// use std::alloc::Layout;
///
/// use arena_pool::SlotSlab;
/// use new_zealand::nz;
///
/// let slab = SlotSlab::builder()
///     .layout(Layout::new::<[u8; 24]>())
///     .capacity(nz!(64))
///     .build();
///
/// assert_eq!(slab.capacity().get(), 64);
/// ```
#[derive(Debug)]
#[must_use]
pub struct SlotSlabBuilder {
    item_layout: Option<Layout>,
    capacity: NonZero<usize>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,

    _not_sync: PhantomData<Cell<()>>,
}

impl SlotSlabBuilder {
    pub(crate) fn new() -> Self {
        Self {
            item_layout: None,
            capacity: DEFAULT_CAPACITY,
            fault_hook: default_fault_hook,
            source: MemorySourceFacade::system(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the layout of the items the slab will hold.
    ///
    /// # Panics
    ///
    /// Panics if the layout is zero-sized.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        assert!(
            layout.size() > 0,
            "SlotSlab requires a non-zero item size"
        );

        self.item_layout = Some(layout);
        self
    }

    /// Sets the item layout to that of `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[inline]
    pub fn layout_of<T>(self) -> Self {
        self.layout(Layout::new::<T>())
    }

    /// Sets the number of slots the slab will hold.
    #[inline]
    pub fn capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.capacity = capacity;
        self
    }

    /// Installs the hook invoked when backing memory cannot be acquired.
    #[inline]
    pub fn fault_hook(mut self, hook: FaultHook) -> Self {
        self.fault_hook = hook;
        self
    }

    #[cfg(test)]
    pub(crate) fn memory_source(mut self, source: MemorySourceFacade) -> Self {
        self.source = source;
        self
    }

    /// Builds the slab, acquiring its arena.
    ///
    /// # Panics
    ///
    /// Panics if no item layout was set or if the arena cannot be acquired.
    #[must_use]
    pub fn build(self) -> SlotSlab {
        let item_layout = self
            .item_layout
            .expect("item layout must be set via .layout() or .layout_of::<T>() before .build()");

        SlotSlab::new_inner(item_layout, self.capacity, self.fault_hook, self.source)
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::items_after_statements,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::sync::Arc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::mem_source::FakeMemorySource;

    assert_impl_all!(SlotSlab: Send);
    assert_not_impl_any!(SlotSlab: Sync);
    assert_impl_all!(SlotSlabBuilder: Send);
    assert_not_impl_any!(SlotSlabBuilder: Sync);

    fn u64_slab(capacity: NonZero<usize>) -> SlotSlab {
        SlotSlab::builder().layout_of::<u64>().capacity(capacity).build()
    }

    #[test]
    fn reserves_and_releases_runs() {
        let mut slab = u64_slab(nz!(8));

        let first = slab.allocate(nz!(3)).unwrap();
        let second = slab.allocate(nz!(3)).unwrap();

        assert_ne!(first, second);
        assert_eq!(slab.len(), 6);
        assert!(slab.contains(first));
        assert!(slab.contains(second));

        unsafe { slab.deallocate(first, nz!(3)) };
        unsafe { slab.deallocate(second, nz!(3)) };

        assert!(slab.is_empty());
    }

    #[test]
    fn storage_holds_written_values() {
        let mut slab = u64_slab(nz!(8));

        let run = slab.allocate(nz!(2)).unwrap();
        let items = run.cast::<u64>();

        unsafe {
            items.write(0xAAAA);
            items.add(1).write(0xBBBB);
        }

        assert_eq!(unsafe { items.read() }, 0xAAAA);
        assert_eq!(unsafe { items.add(1).read() }, 0xBBBB);

        unsafe { slab.deallocate(run, nz!(2)) };
    }

    #[test]
    fn slots_are_stride_apart() {
        let mut slab = u64_slab(nz!(8));

        let first = slab.allocate(nz!(1)).unwrap();
        let second = slab.allocate(nz!(1)).unwrap();

        let stride = second.addr().get() - first.addr().get();
        assert_eq!(stride, size_of::<u64>());

        unsafe { slab.deallocate(first, nz!(1)) };
        unsafe { slab.deallocate(second, nz!(1)) };
    }

    #[test]
    fn slot_region_is_at_least_16_byte_aligned() {
        let mut slab = u64_slab(nz!(8));

        let first = slab.allocate(nz!(1)).unwrap();
        assert_eq!(first.addr().get() % 16, 0);

        unsafe { slab.deallocate(first, nz!(1)) };
    }

    #[test]
    fn strict_item_alignment_is_honored_for_every_slot() {
        #[repr(align(32))]
        struct Aligned([u8; 4]);

        let mut slab = SlotSlab::builder()
            .layout_of::<Aligned>()
            .capacity(nz!(4))
            .build();

        let mut runs = Vec::new();
        for _ in 0..4 {
            let run = slab.allocate(nz!(1)).unwrap();
            assert_eq!(run.addr().get() % 32, 0);
            runs.push(run);
        }

        for run in runs {
            unsafe { slab.deallocate(run, nz!(1)) };
        }
    }

    #[test]
    fn fills_to_exact_capacity() {
        let mut slab = u64_slab(nz!(8));

        let mut runs = Vec::new();
        for _ in 0..8 {
            runs.push(slab.allocate(nz!(1)).unwrap());
        }

        assert_eq!(slab.len(), 8);
        assert!(slab.allocate(nz!(1)).is_none());

        for run in runs {
            unsafe { slab.deallocate(run, nz!(1)) };
        }
    }

    #[test]
    fn rejects_runs_longer_than_any_gap() {
        let mut slab = u64_slab(nz!(8));

        let first = slab.allocate(nz!(3)).unwrap();
        let second = slab.allocate(nz!(3)).unwrap();

        unsafe { slab.deallocate(first, nz!(3)) };

        // Five slots are free in total (three at the front, two at the back), but no
        // four of them are consecutive.
        assert!(slab.allocate(nz!(4)).is_none());

        let reused = slab.allocate(nz!(3)).unwrap();
        assert_eq!(reused, first);

        let tail = slab.allocate(nz!(2)).unwrap();
        assert_ne!(tail, reused);

        unsafe { slab.deallocate(reused, nz!(3)) };
        unsafe { slab.deallocate(second, nz!(3)) };
        unsafe { slab.deallocate(tail, nz!(2)) };
    }

    #[test]
    fn rejects_count_beyond_capacity() {
        let mut slab = u64_slab(nz!(4));

        assert!(slab.allocate(nz!(5)).is_none());
        assert!(slab.is_empty());
    }

    #[test]
    fn released_run_is_reused_first() {
        let mut slab = u64_slab(nz!(8));

        let first = slab.allocate(nz!(3)).unwrap();
        let second = slab.allocate(nz!(2)).unwrap();

        unsafe { slab.deallocate(first, nz!(3)) };

        // The scan restarts at the released run, so an equal request lands there.
        let reused = slab.allocate(nz!(3)).unwrap();
        assert_eq!(reused, first);

        unsafe { slab.deallocate(reused, nz!(3)) };
        unsafe { slab.deallocate(second, nz!(2)) };
    }

    #[test]
    fn scan_wraps_to_find_runs_straddling_the_hint() {
        let mut slab = u64_slab(nz!(8));

        let head = slab.allocate(nz!(2)).unwrap();
        let tail = slab.allocate(nz!(6)).unwrap();

        unsafe { slab.deallocate(head, nz!(2)) };
        unsafe { slab.deallocate(tail, nz!(6)) };

        // The hint now sits at slot 2, in the middle of the only full-length run. The
        // wrapped window must still find the run starting at slot 0.
        let whole = slab.allocate(nz!(8)).unwrap();
        assert_eq!(whole, head);

        unsafe { slab.deallocate(whole, nz!(8)) };
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut slab = u64_slab(nz!(8));

        let run = slab.allocate(nz!(2)).unwrap();

        unsafe { slab.deallocate(run, nz!(2)) };
        unsafe { slab.deallocate(run, nz!(2)) };
    }

    #[test]
    #[should_panic(expected = "does not belong to this slab")]
    fn foreign_pointer_panics() {
        let mut home = u64_slab(nz!(8));
        let mut away = u64_slab(nz!(8));

        let run = away.allocate(nz!(1)).unwrap();

        unsafe { home.deallocate(run, nz!(1)) };
    }

    #[test]
    #[should_panic(expected = "not on a slot boundary")]
    fn misaligned_pointer_panics() {
        let mut slab = u64_slab(nz!(8));

        let run = slab.allocate(nz!(1)).unwrap();
        let inside = unsafe { run.add(1) };

        unsafe { slab.deallocate(inside, nz!(1)) };
    }

    #[test]
    #[should_panic(expected = "points into the slot bitmap")]
    fn bitmap_pointer_panics() {
        let mut slab = u64_slab(nz!(8));

        let run = slab.allocate(nz!(1)).unwrap();
        let before = unsafe { run.sub(1) };

        unsafe { slab.deallocate(before, nz!(1)) };
    }

    #[test]
    #[should_panic(expected = "extends past the end")]
    fn count_extending_past_capacity_panics() {
        let mut slab = u64_slab(nz!(4));

        let run = slab.allocate(nz!(4)).unwrap();

        unsafe { slab.deallocate(run, nz!(5)) };
    }

    #[test]
    #[should_panic(expected = "still reserved")]
    fn dropping_nonempty_slab_panics() {
        let mut slab = u64_slab(nz!(8));

        let _run = slab.allocate(nz!(1)).unwrap();

        drop(slab);
    }

    #[test]
    fn arena_is_released_on_drop() {
        let fake = Arc::new(FakeMemorySource::new());

        let mut slab = SlotSlab::builder()
            .layout_of::<u64>()
            .capacity(nz!(8))
            .memory_source(MemorySourceFacade::from_fake(Arc::clone(&fake)))
            .build();

        assert_eq!(fake.live_regions(), 1);

        let run = slab.allocate(nz!(4)).unwrap();
        unsafe { slab.deallocate(run, nz!(4)) };

        drop(slab);

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    #[should_panic(expected = "failed to acquire")]
    fn arena_acquisition_failure_panics() {
        let fake = Arc::new(FakeMemorySource::failing_after(0));

        drop(
            SlotSlab::builder()
                .layout_of::<u64>()
                .memory_source(MemorySourceFacade::from_fake(fake))
                .build(),
        );
    }

    #[test]
    #[should_panic(expected = "item layout must be set")]
    fn building_without_layout_panics() {
        drop(SlotSlab::builder().build());
    }

    #[test]
    #[should_panic(expected = "non-zero item size")]
    fn zero_sized_layout_panics() {
        drop(SlotSlab::builder().layout_of::<()>());
    }

    #[test]
    fn default_capacity_is_used_when_unset() {
        let slab = SlotSlab::builder().layout_of::<u64>().build();

        assert_eq!(slab.capacity(), DEFAULT_CAPACITY);
        assert_eq!(slab.item_layout(), Layout::new::<u64>());
    }
}
