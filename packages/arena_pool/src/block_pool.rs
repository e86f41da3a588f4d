//! A growing pool of variable-size blocks, built from [`BlockArena`] allocators.

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::NonNull;

use crate::block_arena::BlockArena;
use crate::mem_source::MemorySourceFacade;
use crate::raw_pool::{DEFAULT_CAPACITY, next_pool_id};
use crate::{FaultHook, RawPool, default_fault_hook};

/// A pool of variable-length item runs that grows by appending ever larger
/// [`BlockArena`] allocators.
///
/// The pool starts without any backing memory. The first allocation creates an arena
/// budgeted for the configured initial capacity. Whenever no owned arena can serve a
/// request, the pool appends one more arena budgeted for the running total of all
/// capacity requested so far, request included, and retries against it. The new arena
/// is therefore never smaller than the request, so exhaustion surfaces as a memory
/// source fault rather than as a `None`.
///
/// Arenas are tried newest first, as the newest is the largest and the most likely to
/// have room. Arenas are never released while the pool lives, so every pointer handed
/// out stays valid until it is deallocated.
///
/// # Example
///
/// ```
/// use arena_pool::BlockPool;
/// use new_zealand::nz;
///
/// let mut pool = BlockPool::builder()
///     .layout_of::<u64>()
///     .initial_capacity(nz!(8))
///     .build();
///
/// let short = pool.allocate(nz!(3)).expect("the pool grows until memory runs out");
/// let long = pool.allocate(nz!(40)).expect("larger than the budget, so the pool grows");
///
/// // SAFETY: Each run came from this pool and is released once.
/// unsafe { pool.deallocate(short) };
/// // SAFETY: Same as above.
/// unsafe { pool.deallocate(long) };
///
/// assert!(pool.is_empty());
/// ```
#[derive(Debug)]
pub struct BlockPool {
    item_layout: Layout,
    initial_capacity: NonZero<usize>,

    /// Sum of the initial capacity and every element count requested through this
    /// pool. Each appended arena is budgeted at this total.
    cumulative_capacity: NonZero<usize>,

    arenas: Vec<BlockArena>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,
    pool_id: u64,
}

impl BlockPool {
    /// Starts building a new pool. The item layout is mandatory.
    pub fn builder() -> BlockPoolBuilder {
        BlockPoolBuilder::new()
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
            cumulative_capacity: initial_capacity,
            arenas: Vec::new(),
            fault_hook,
            source,
            pool_id: next_pool_id(),
        }
    }

    /// Total size of all owned arenas, in bytes.
    #[must_use]
    pub fn byte_capacity(&self) -> usize {
        self.arenas.iter().map(BlockArena::byte_capacity).sum()
    }

    /// The number of blocks currently reserved across all arenas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arenas.iter().map(BlockArena::len).sum()
    }

    /// Whether no blocks are currently reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arenas.iter().all(BlockArena::is_empty)
    }

    /// The number of arenas the pool has created so far.
    #[must_use]
    pub fn arena_count(&self) -> usize {
        self.arenas.len()
    }

    /// The layout of a single item, as given at construction.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// The element budget the first arena is created with.
    #[must_use]
    pub fn initial_capacity(&self) -> NonZero<usize> {
        self.initial_capacity
    }

    /// Whether `ptr` points into storage owned by any arena of this pool.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.arenas.iter().any(|arena| arena.contains(ptr))
    }

    /// Reserves one block holding storage for `count` consecutive items, growing the
    /// pool if no owned arena has room.
    ///
    /// Owned arenas are tried newest first. On exhaustion the request count joins the
    /// running cumulative total, one arena budgeted at that total is appended, and the
    /// request is retried against it alone.
    #[must_use]
    pub fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        if self.arenas.is_empty() {
            let budget = self.initial_capacity;
            self.append_arena(budget);
        }

        for arena in self.arenas.iter_mut().rev() {
            if let Some(run) = arena.allocate(count) {
                return Some(run);
            }
        }

        let grown = self
            .cumulative_capacity
            .checked_add(count.get())
            .expect("cumulative pool capacity overflowed usize");
        self.cumulative_capacity = grown;
        self.append_arena(grown);

        self.arenas
            .last_mut()
            .expect("an arena was appended just above")
            .allocate(count)
    }

    /// Releases the block whose payload starts at `ptr` back to its owning arena.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this pool, and
    /// the block must not have been released already.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not belong to any arena of this pool or if the block is
    /// already free.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let pool_id = self.pool_id;

        let Some(arena) = self.arenas.iter_mut().find(|arena| arena.contains(ptr)) else {
            panic!("pointer {ptr:p} does not belong to any arena of pool {pool_id}");
        };

        // SAFETY: Forwarding the caller's guarantee; the owning arena was just
        // identified.
        unsafe { arena.deallocate(ptr) };
    }

    fn append_arena(&mut self, budget: NonZero<usize>) {
        let arena = BlockArena::new_inner(
            self.item_layout,
            budget,
            self.fault_hook,
            self.source.clone(),
        );

        self.arenas.push(arena);
    }
}

impl RawPool for BlockPool {
    fn item_layout(&self) -> Layout {
        self.item_layout
    }

    fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        self.allocate(count)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>) {
        // Block sizes live in the headers, so the count is not consulted.
        _ = count;

        // SAFETY: Forwarding the caller's guarantee.
        unsafe { self.deallocate(ptr) }
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

/// Builder for [`BlockPool`].
///
/// The item layout is mandatory. The initial element budget defaults to 128 and faults
/// are reported to standard output unless a [`FaultHook`] is installed.
///
/// # Example
///
/// ```
/// use arena_pool::BlockPool;
/// use new_zealand::nz;
///
/// let pool = BlockPool::builder()
///     .layout_of::<u64>()
///     .initial_capacity(nz!(32))
///     .build();
///
/// // No arena exists yet; the first allocation creates it.
/// assert_eq!(pool.byte_capacity(), 0);
/// ```
#[derive(Debug)]
#[must_use]
pub struct BlockPoolBuilder {
    item_layout: Option<Layout>,
    initial_capacity: NonZero<usize>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,

    _not_sync: PhantomData<Cell<()>>,
}

impl BlockPoolBuilder {
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
            "BlockPool requires a non-zero item size"
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

    /// Sets the element budget of the first arena, which the cumulative budgets of
    /// later arenas start from.
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
    pub fn build(self) -> BlockPool {
        let item_layout = self
            .item_layout
            .expect("item layout must be set via .layout() or .layout_of::<T>() before .build()");

        BlockPool::new_inner(
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

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::mem_source::FakeMemorySource;

    assert_impl_all!(BlockPool: Send);
    assert_not_impl_any!(BlockPool: Sync);
    assert_impl_all!(BlockPoolBuilder: Send);
    assert_not_impl_any!(BlockPoolBuilder: Sync);

    /// For 16 byte items the numbers are round: a header takes 32 bytes, so every
    /// single-item block takes 48 bytes.
    type Wide = [u8; 16];

    fn wide_pool(initial_capacity: NonZero<usize>) -> BlockPool {
        BlockPool::builder()
            .layout_of::<Wide>()
            .initial_capacity(initial_capacity)
            .build()
    }

    #[test]
    fn first_allocation_seeds_the_pool() {
        let mut pool = wide_pool(nz!(4));

        assert_eq!(pool.arena_count(), 0);
        assert_eq!(pool.byte_capacity(), 0);

        let run = pool.allocate(nz!(1)).unwrap();

        assert_eq!(pool.arena_count(), 1);
        assert_eq!(pool.byte_capacity(), 192);
        assert_eq!(pool.len(), 1);

        unsafe { pool.deallocate(run) };

        // Empty arenas are kept; the capacity remains available.
        assert_eq!(pool.arena_count(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn exhaustion_appends_cumulatively_sized_arenas() {
        let mut pool = wide_pool(nz!(4));

        let mut singles = Vec::new();
        for _ in 0..4 {
            singles.push(pool.allocate(nz!(1)).unwrap());
        }
        assert_eq!(pool.arena_count(), 1);

        // The first arena is full, so the fifth request adds 1 to the running total
        // of 4 and brings a new arena budgeted for 5 elements.
        singles.push(pool.allocate(nz!(1)).unwrap());
        assert_eq!(pool.arena_count(), 2);
        assert_eq!(pool.byte_capacity(), 192 + 240);

        for _ in 0..4 {
            singles.push(pool.allocate(nz!(1)).unwrap());
        }
        assert_eq!(pool.arena_count(), 2);

        // Both arenas are now full; a two-element request grows the total to 7.
        let pair = pool.allocate(nz!(2)).unwrap();
        assert_eq!(pool.arena_count(), 3);
        assert_eq!(pool.byte_capacity(), 192 + 240 + 336);
        assert_eq!(pool.len(), 10);

        unsafe { pool.deallocate(pair) };
        for single in singles {
            unsafe { pool.deallocate(single) };
        }

        assert!(pool.is_empty());
    }

    #[test]
    fn newest_arena_is_tried_first() {
        let mut pool = wide_pool(nz!(2));

        let first = pool.allocate(nz!(1)).unwrap();
        let second = pool.allocate(nz!(1)).unwrap();
        assert_eq!(pool.arena_count(), 1);

        let third = pool.allocate(nz!(1)).unwrap();
        assert_eq!(pool.arena_count(), 2);

        unsafe { pool.deallocate(first) };

        // The new arena still has room, so the released block in the old arena is
        // not touched yet.
        let fourth = pool.allocate(nz!(1)).unwrap();
        assert_ne!(fourth, first);

        let fifth = pool.allocate(nz!(1)).unwrap();
        assert_ne!(fifth, first);
        assert_eq!(pool.arena_count(), 2);

        // Now the new arena is full too, and the old arena's free block is next in
        // line, before any further growth.
        let sixth = pool.allocate(nz!(1)).unwrap();
        assert_eq!(sixth, first);
        assert_eq!(pool.arena_count(), 2);

        unsafe { pool.deallocate(second) };
        unsafe { pool.deallocate(third) };
        unsafe { pool.deallocate(fourth) };
        unsafe { pool.deallocate(fifth) };
        unsafe { pool.deallocate(sixth) };
    }

    #[test]
    fn pointers_survive_growth() {
        let mut pool = wide_pool(nz!(2));

        let stable = pool.allocate(nz!(2)).unwrap();
        let bytes = stable.cast::<[u8; 32]>();

        unsafe { bytes.write([7; 32]) };

        let mut later = Vec::new();
        for _ in 0..6 {
            later.push(pool.allocate(nz!(2)).unwrap());
        }
        assert!(pool.arena_count() > 1);

        assert!(pool.contains(stable));
        assert_eq!(unsafe { bytes.read() }, [7; 32]);

        unsafe { pool.deallocate(stable) };
        for run in later {
            unsafe { pool.deallocate(run) };
        }
    }

    #[test]
    fn request_larger_than_any_arena_grows_to_fit() {
        let mut pool = wide_pool(nz!(2));

        let long = pool.allocate(nz!(10)).unwrap();

        // The seed arena cannot hold the run; the appended arena is budgeted for the
        // cumulative 12 elements and takes it.
        assert_eq!(pool.arena_count(), 2);
        assert_eq!(pool.byte_capacity(), 96 + 576);
        assert_eq!(pool.len(), 1);

        unsafe { pool.deallocate(long) };
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut pool = wide_pool(nz!(4));

        let run = pool.allocate(nz!(1)).unwrap();

        unsafe { pool.deallocate(run) };
        unsafe { pool.deallocate(run) };
    }

    #[test]
    #[should_panic(expected = "does not belong to any arena of pool")]
    fn foreign_pointer_panics() {
        let mut home = wide_pool(nz!(4));
        let mut away = wide_pool(nz!(4));

        let run = away.allocate(nz!(1)).unwrap();

        unsafe { home.deallocate(run) };
    }

    #[test]
    fn arenas_are_released_on_drop() {
        let fake = Arc::new(FakeMemorySource::new());

        let mut pool = BlockPool::builder()
            .layout_of::<Wide>()
            .initial_capacity(nz!(1))
            .memory_source(MemorySourceFacade::from_fake(Arc::clone(&fake)))
            .build();

        let first = pool.allocate(nz!(1)).unwrap();
        let second = pool.allocate(nz!(1)).unwrap();
        assert_eq!(fake.live_regions(), 2);

        unsafe { pool.deallocate(first) };
        unsafe { pool.deallocate(second) };

        drop(pool);

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    #[should_panic(expected = "failed to acquire")]
    fn growth_failure_panics() {
        let fake = Arc::new(FakeMemorySource::failing_after(1));

        let mut pool = BlockPool::builder()
            .layout_of::<Wide>()
            .initial_capacity(nz!(1))
            .memory_source(MemorySourceFacade::from_fake(fake))
            .build();

        let seeded = pool.allocate(nz!(1)).unwrap();

        // The seed arena is full, so this forces a growth attempt that the source
        // denies.
        let outcome = pool.allocate(nz!(1));

        drop(outcome);
        unsafe { pool.deallocate(seeded) };
    }

    #[test]
    fn reports_configuration() {
        let pool = wide_pool(nz!(4));

        assert_eq!(pool.item_layout(), Layout::new::<Wide>());
        assert_eq!(pool.initial_capacity(), nz!(4));
    }
}
