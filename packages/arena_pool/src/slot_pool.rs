//! A growing pool of equally sized slots, built from [`SlotSlab`] arenas.

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::NonNull;

use new_zealand::nz;

use crate::mem_source::MemorySourceFacade;
use crate::raw_pool::{DEFAULT_CAPACITY, next_pool_id};
use crate::slot_slab::SlotSlab;
use crate::{FaultHook, RawPool, default_fault_hook};

/// A pool of equally sized slots that grows by appending ever larger [`SlotSlab`]
/// arenas.
///
/// The pool starts without any backing memory. The first allocation creates a slab of
/// the configured initial capacity, and every later allocation that no existing slab
/// can satisfy appends one more slab with twice the capacity of the newest one. Slabs
/// are never released while the pool lives, so every pointer handed out stays valid
/// until it is deallocated.
///
/// # Example
///
/// ```
/// use arena_pool::SlotPool;
/// use new_zealand::nz;
///
/// let mut pool = SlotPool::builder()
///     .layout_of::<u64>()
///     .initial_capacity(nz!(4))
///     .build();
///
/// // The pool grows on demand, so much more than the initial capacity fits.
/// let runs: Vec<_> = (0..10)
///     .map(|_| pool.allocate(nz!(1)).expect("the pool grows until memory runs out"))
///     .collect();
///
/// assert_eq!(pool.len(), 10);
///
/// for run in runs {
///     // SAFETY: Each run came from this pool with this count and is released once.
///     unsafe { pool.deallocate(run, nz!(1)) };
/// }
/// assert!(pool.is_empty());
/// ```
#[derive(Debug)]
pub struct SlotPool {
    item_layout: Layout,
    initial_capacity: NonZero<usize>,
    slabs: Vec<SlotSlab>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,
    pool_id: u64,
}

impl SlotPool {
    /// Starts building a new pool. The item layout is mandatory.
    pub fn builder() -> SlotPoolBuilder {
        SlotPoolBuilder::new()
    }

    pub(crate) fn new_inner(
        item_layout: Layout,
        initial_capacity: NonZero<usize>,
        fault_hook: FaultHook,
        source: MemorySourceFacade,
    ) -> Self {
        Self {
            item_layout,
            initial_capacity,
            slabs: Vec::new(),
            fault_hook,
            source,
            pool_id: next_pool_id(),
        }
    }

    /// The total number of slots across all slabs.
    ///
    /// A fresh pool reports zero; its first slab only materializes on the first
    /// allocation.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slabs
            .iter()
            .map(|slab| slab.capacity().get())
            .sum()
    }

    /// The number of slots currently reserved across all slabs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slabs.iter().map(SlotSlab::len).sum()
    }

    /// Whether no slots are currently reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slabs.iter().all(SlotSlab::is_empty)
    }

    /// The number of slab arenas the pool has created so far.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// The layout of a single item, as given at construction.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// The capacity the first slab is created with.
    #[must_use]
    pub fn initial_capacity(&self) -> NonZero<usize> {
        self.initial_capacity
    }

    /// Whether `ptr` points into storage owned by any slab of this pool.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.slabs.iter().any(|slab| slab.contains(ptr))
    }

    /// Reserves a run of `count` consecutive slots, growing the pool if no existing
    /// slab has room.
    ///
    /// Existing slabs are tried in creation order, so storage released back to an older
    /// slab is reused before newer slabs are touched. On exhaustion one slab is
    /// appended with twice the capacity of the newest slab and the request is retried
    /// against it alone; growth happens at most once per call. The appended slab is
    /// kept even when the retry fails, so the added capacity serves later requests.
    ///
    /// Returns `None` when even the appended slab cannot hold a run of `count` slots.
    #[must_use]
    pub fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        if self.slabs.is_empty() {
            let capacity = self.initial_capacity;
            self.append_slab(capacity);
        }

        for slab in &mut self.slabs {
            if let Some(run) = slab.allocate(count) {
                return Some(run);
            }
        }

        let newest_capacity = self
            .slabs
            .last()
            .expect("the pool holds at least one slab once the first allocation seeded it")
            .capacity();
        let doubled = newest_capacity
            .checked_mul(nz!(2))
            .expect("slab capacity doubling overflowed usize");
        self.append_slab(doubled);

        self.slabs
            .last_mut()
            .expect("a slab was appended just above")
            .allocate(count)
    }

    /// Releases the run of `count` slots starting at `ptr` back to its owning slab.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this pool with
    /// this same `count`, and the run must not have been released already.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not belong to any slab of this pool or if the run is
    /// already free.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>) {
        let pool_id = self.pool_id;

        let Some(slab) = self.slabs.iter_mut().find(|slab| slab.contains(ptr)) else {
            panic!("pointer {ptr:p} does not belong to any slab of pool {pool_id}");
        };

        // SAFETY: Forwarding the caller's guarantee; the owning slab was just identified.
        unsafe { slab.deallocate(ptr, count) };
    }

    fn append_slab(&mut self, capacity: NonZero<usize>) {
        let slab = SlotSlab::new_inner(
            self.item_layout,
            capacity,
            self.fault_hook,
            self.source.clone(),
        );

        self.slabs.push(slab);
    }
}

impl RawPool for SlotPool {
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

/// Builder for [`SlotPool`].
///
/// The item layout is mandatory. The initial capacity defaults to 128 slots and faults
/// are reported to standard output unless a [`FaultHook`] is installed.
///
/// # Example
///
/// ```
/// use arena_pool::SlotPool;
/// use new_zealand::nz;
///
/// let pool = SlotPool::builder()
///     .layout_of::<[u8; 48]>()
///     .initial_capacity(nz!(16))
///     .build();
///
/// // No arena exists yet; the first allocation creates it.
/// assert_eq!(pool.capacity(), 0);
/// ```
#[derive(Debug)]
#[must_use]
pub struct SlotPoolBuilder {
    item_layout: Option<Layout>,
    initial_capacity: NonZero<usize>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,

    _not_sync: PhantomData<Cell<()>>,
}

impl SlotPoolBuilder {
    pub(crate) fn new() -> Self {
        Self {
            item_layout: None,
            initial_capacity: DEFAULT_CAPACITY,
            fault_hook: default_fault_hook,
            source: MemorySourceFacade::system(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the layout of the items the pool will hold.
    ///
    /// # Panics
    ///
    /// Panics if the layout is zero-sized.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        assert!(
            layout.size() > 0,
            "SlotPool requires a non-zero item size"
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

    /// Sets the capacity of the first slab, which later slabs double from.
    #[inline]
    pub fn initial_capacity(mut self, capacity: NonZero<usize>) -> Self {
        self.initial_capacity = capacity;
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

    /// Builds the pool. No memory is acquired until the first allocation.
    ///
    /// # Panics
    ///
    /// Panics if no item layout was set.
    #[must_use]
    pub fn build(self) -> SlotPool {
        let item_layout = self
            .item_layout
            .expect("item layout must be set via .layout() or .layout_of::<T>() before .build()");

        SlotPool::new_inner(
            item_layout,
            self.initial_capacity,
            self.fault_hook,
            self.source,
        )
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
    use std::sync::Arc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::mem_source::FakeMemorySource;

    assert_impl_all!(SlotPool: Send);
    assert_not_impl_any!(SlotPool: Sync);
    assert_impl_all!(SlotPoolBuilder: Send);
    assert_not_impl_any!(SlotPoolBuilder: Sync);

    fn u64_pool(initial_capacity: NonZero<usize>) -> SlotPool {
        SlotPool::builder()
            .layout_of::<u64>()
            .initial_capacity(initial_capacity)
            .build()
    }

    #[test]
    fn first_allocation_seeds_the_pool() {
        let mut pool = u64_pool(nz!(4));

        assert_eq!(pool.slab_count(), 0);
        assert_eq!(pool.capacity(), 0);

        let run = pool.allocate(nz!(1)).unwrap();

        assert_eq!(pool.slab_count(), 1);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.len(), 1);

        unsafe { pool.deallocate(run, nz!(1)) };

        // Empty slabs are kept; the capacity remains available.
        assert_eq!(pool.slab_count(), 1);
        assert_eq!(pool.capacity(), 4);
        assert!(pool.is_empty());
    }

    #[test]
    fn growth_doubles_the_newest_slab() {
        let mut pool = u64_pool(nz!(4));

        let first = pool.allocate(nz!(4)).unwrap();

        let second = pool.allocate(nz!(1)).unwrap();
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.capacity(), 12);

        // The second slab has seven slots left, so this fits without growth.
        let third = pool.allocate(nz!(7)).unwrap();
        assert_eq!(pool.slab_count(), 2);

        let fourth = pool.allocate(nz!(1)).unwrap();
        assert_eq!(pool.slab_count(), 3);
        assert_eq!(pool.capacity(), 28);

        unsafe { pool.deallocate(first, nz!(4)) };
        unsafe { pool.deallocate(second, nz!(1)) };
        unsafe { pool.deallocate(third, nz!(7)) };
        unsafe { pool.deallocate(fourth, nz!(1)) };

        assert!(pool.is_empty());
    }

    #[test]
    fn oversized_request_grows_once_and_keeps_the_slab() {
        let mut pool = u64_pool(nz!(4));

        assert!(pool.allocate(nz!(32)).is_none());

        // The failed request still left behind one doubled slab.
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.capacity(), 12);
        assert!(pool.is_empty());

        // The added capacity serves later, smaller requests.
        let run = pool.allocate(nz!(8)).unwrap();
        assert_eq!(pool.slab_count(), 2);

        unsafe { pool.deallocate(run, nz!(8)) };
    }

    #[test]
    fn released_storage_is_reused_in_creation_order() {
        let mut pool = u64_pool(nz!(4));

        let first = pool.allocate(nz!(4)).unwrap();
        let second = pool.allocate(nz!(4)).unwrap();
        assert_eq!(pool.slab_count(), 2);

        unsafe { pool.deallocate(first, nz!(4)) };

        // The second slab still has room, but the first slab is scanned first.
        let reused = pool.allocate(nz!(2)).unwrap();
        assert_eq!(reused, first);

        unsafe { pool.deallocate(reused, nz!(2)) };
        unsafe { pool.deallocate(second, nz!(4)) };
    }

    #[test]
    fn pointers_survive_growth() {
        let mut pool = u64_pool(nz!(2));

        let stable = pool.allocate(nz!(2)).unwrap();
        let items = stable.cast::<u64>();

        unsafe {
            items.write(0x1111);
            items.add(1).write(0x2222);
        }

        let mut later = Vec::new();
        for _ in 0..5 {
            later.push(pool.allocate(nz!(2)).unwrap());
        }
        assert!(pool.slab_count() > 1);

        assert!(pool.contains(stable));
        assert_eq!(unsafe { items.read() }, 0x1111);
        assert_eq!(unsafe { items.add(1).read() }, 0x2222);

        unsafe { pool.deallocate(stable, nz!(2)) };
        for run in later {
            unsafe { pool.deallocate(run, nz!(2)) };
        }
    }

    #[test]
    fn deallocate_routes_to_the_owning_slab() {
        let mut pool = u64_pool(nz!(2));

        let in_first = pool.allocate(nz!(2)).unwrap();
        let in_second = pool.allocate(nz!(2)).unwrap();
        assert_eq!(pool.slab_count(), 2);
        assert_eq!(pool.len(), 4);

        unsafe { pool.deallocate(in_second, nz!(2)) };
        assert_eq!(pool.len(), 2);

        unsafe { pool.deallocate(in_first, nz!(2)) };
        assert!(pool.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not belong to any slab of pool")]
    fn foreign_pointer_panics() {
        let mut home = u64_pool(nz!(4));
        let mut away = u64_pool(nz!(4));

        let run = away.allocate(nz!(1)).unwrap();

        unsafe { home.deallocate(run, nz!(1)) };
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut pool = u64_pool(nz!(4));

        let run = pool.allocate(nz!(2)).unwrap();

        unsafe { pool.deallocate(run, nz!(2)) };
        unsafe { pool.deallocate(run, nz!(2)) };
    }

    #[test]
    fn arenas_are_released_on_drop() {
        let fake = Arc::new(FakeMemorySource::new());

        let mut pool = SlotPool::builder()
            .layout_of::<u64>()
            .initial_capacity(nz!(2))
            .memory_source(MemorySourceFacade::from_fake(Arc::clone(&fake)))
            .build();

        let first = pool.allocate(nz!(2)).unwrap();
        let second = pool.allocate(nz!(2)).unwrap();
        assert_eq!(fake.live_regions(), 2);

        unsafe { pool.deallocate(first, nz!(2)) };
        unsafe { pool.deallocate(second, nz!(2)) };

        drop(pool);

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    #[should_panic(expected = "failed to acquire")]
    fn growth_failure_panics() {
        let fake = Arc::new(FakeMemorySource::failing_after(1));

        let mut pool = SlotPool::builder()
            .layout_of::<u64>()
            .initial_capacity(nz!(2))
            .memory_source(MemorySourceFacade::from_fake(fake))
            .build();

        let seeded = pool.allocate(nz!(2)).unwrap();

        // The seed slab is full, so this forces a growth attempt that the source denies.
        let outcome = pool.allocate(nz!(1));

        drop(outcome);
        unsafe { pool.deallocate(seeded, nz!(2)) };
    }

    #[test]
    fn reports_configuration() {
        let pool = u64_pool(nz!(4));

        assert_eq!(pool.item_layout(), Layout::new::<u64>());
        assert_eq!(pool.initial_capacity(), nz!(4));
    }
}
