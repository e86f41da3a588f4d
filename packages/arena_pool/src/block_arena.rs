//! A variable-size block allocator over one arena, with header-linked free blocks.

use std::alloc::Layout;
use std::cell::Cell;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::NonNull;
use std::thread;

use crate::arena::{ARENA_ALIGNMENT, Arena};
use crate::mem_source::MemorySourceFacade;
use crate::raw_pool::DEFAULT_CAPACITY;
use crate::{FaultHook, RawPool, default_fault_hook};

const STATE_FREE: usize = 0;
const STATE_IN_USE: usize = 1;

/// Sentinel offset marking the absence of a neighbor in the free list.
const NO_BLOCK: usize = usize::MAX;

/// Bookkeeping stored at the start of every block, before the payload.
///
/// All offsets are relative to the arena base. Free blocks form a doubly linked list
/// through `prev_free` and `next_free`; in reserved blocks both hold [`NO_BLOCK`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
struct BlockHeader {
    /// Total size of the block in bytes, including this header.
    size: usize,

    /// [`STATE_FREE`] or [`STATE_IN_USE`].
    state: usize,

    prev_free: usize,
    next_free: usize,
}

impl BlockHeader {
    fn is_free(&self) -> bool {
        self.state == STATE_FREE
    }
}

/// A fixed-size arena that serves variable-length item runs from header-prefixed
/// blocks.
///
/// Every block starts with a [`BlockHeader`] and carries its payload directly after
/// it, so releasing needs nothing but the payload pointer. Free blocks are kept on a
/// doubly linked list threaded through the headers; released blocks append at the
/// tail, so distinct recently released blocks are recycled oldest first. When no
/// single free block can serve a request, physically adjacent free blocks are merged
/// until a large enough one emerges. The arena never grows; use a
/// [`BlockPool`](crate::BlockPool) when growth on exhaustion is wanted.
///
/// The arena is sized as `capacity` times the space of one header plus one aligned
/// item, so `capacity` single-item blocks always fit, and fewer, longer blocks fit
/// with room to spare.
///
/// # Example
///
/// ```
/// use arena_pool::BlockArena;
/// use new_zealand::nz;
///
/// let mut arena = BlockArena::builder()
///     .layout_of::<u64>()
///     .capacity(nz!(16))
///     .build();
///
/// let run = arena.allocate(nz!(4)).expect("a fresh arena has room");
/// assert_eq!(arena.len(), 1);
///
/// // SAFETY: The run covers four u64 items and nothing else aliases it.
/// unsafe { run.cast::<u64>().write(7) };
///
/// // SAFETY: The run came from this arena and is released once.
/// unsafe { arena.deallocate(run) };
/// assert!(arena.is_empty());
/// ```
#[derive(Debug)]
pub struct BlockArena {
    item_layout: Layout,
    capacity: NonZero<usize>,

    /// Distance between consecutive items inside one payload, in bytes.
    stride: usize,

    /// Alignment of every block offset, block size, and payload start.
    alignment: usize,

    /// Bytes from a block's start to its payload, a multiple of `alignment`.
    header_size: usize,

    arena: Arena,

    /// Offsets of the first and last free blocks, or [`NO_BLOCK`] when none are free.
    free_head: usize,
    free_tail: usize,

    /// Number of blocks currently reserved.
    live_blocks: usize,
}

impl BlockArena {
    /// Starts building a new arena. The item layout is mandatory.
    pub fn builder() -> BlockArenaBuilder {
        BlockArenaBuilder::new()
    }

    pub(crate) fn new_inner(
        item_layout: Layout,
        capacity: NonZero<usize>,
        fault_hook: FaultHook,
        source: MemorySourceFacade,
    ) -> Self {
        assert!(
            item_layout.size() > 0,
            "BlockArena cannot be created for zero-sized items"
        );

        let stride = item_layout.pad_to_align().size();
        let alignment = item_layout.align().max(ARENA_ALIGNMENT);

        let header_size = size_of::<BlockHeader>()
            .checked_next_multiple_of(alignment)
            .expect("header padding overflowed usize");

        // Budget one header plus one aligned item per element of capacity. That covers
        // the worst case where every element is reserved in a block of its own.
        let padded_stride = stride
            .checked_next_multiple_of(alignment)
            .expect("aligned item stride overflowed usize");
        let per_element = header_size
            .checked_add(padded_stride)
            .expect("per element budget overflowed usize");
        let total_size = per_element
            .checked_mul(capacity.get())
            .expect("arena size overflowed usize");

        let arena_layout = Layout::from_size_align(total_size, alignment)
            .expect("a padded size and a power of two alignment always form a valid layout");

        let mut arena = Arena::acquire(arena_layout, source, fault_hook);

        // The whole arena starts out as one free block.
        arena.write(
            0,
            BlockHeader {
                size: total_size,
                state: STATE_FREE,
                prev_free: NO_BLOCK,
                next_free: NO_BLOCK,
            },
        );

        Self {
            item_layout,
            capacity,
            stride,
            alignment,
            header_size,
            arena,
            free_head: 0,
            free_tail: 0,
            live_blocks: 0,
        }
    }

    /// The element budget the arena was sized for.
    #[must_use]
    pub fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// Total size of the arena in bytes, including all block headers.
    #[must_use]
    pub fn byte_capacity(&self) -> usize {
        self.arena.len()
    }

    /// The number of blocks currently reserved.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_blocks
    }

    /// Whether no blocks are currently reserved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_blocks == 0
    }

    /// The layout of a single item, as given at construction.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.item_layout
    }

    /// Whether `ptr` points into this arena.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.arena.contains(ptr)
    }

    /// Reserves one block holding storage for `count` consecutive items.
    ///
    /// The free list is searched front to back and the first block large enough is
    /// taken. When no listed block fits, runs of physically adjacent free blocks are
    /// merged in address order and the first run that reaches the needed size is taken
    /// instead. A taken block larger than the request is split, with the tail
    /// remainder returned to the free list as a block of its own; a remainder too
    /// small to hold a header stays attached to the reserved block.
    ///
    /// Returns a pointer to the payload of the block, aligned for the item layout, or
    /// `None` when no combination of adjacent free blocks can serve the request.
    #[must_use]
    pub fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        let need = self.block_size_for(count);

        let offset = self
            .take_first_fit(need)
            .or_else(|| self.coalesce_for(need))?;

        self.place_block(offset, need);

        #[cfg(debug_assertions)]
        self.integrity_check();

        // Cannot overflow because the payload starts within the arena.
        Some(self.arena.ptr_at(offset.wrapping_add(self.header_size)))
    }

    /// Releases the block whose payload starts at `ptr`.
    ///
    /// The block joins the tail of the free list in one piece. Adjacent free blocks
    /// are not merged here; merging happens inside [`allocate`](Self::allocate) once a
    /// request needs a larger contiguous block.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`](Self::allocate) on this arena,
    /// and the block must not have been released already.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` does not point at the payload of a reserved block of this
    /// arena.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let Some(payload_offset) = self.arena.offset_of(ptr) else {
            panic!("pointer {ptr:p} does not belong to this arena");
        };

        assert!(
            payload_offset >= self.header_size,
            "pointer {ptr:p} is not the payload of any block"
        );

        // Cannot underflow because the offset was just verified.
        let block_offset = payload_offset.wrapping_sub(self.header_size);

        let misalignment = block_offset
            .checked_rem(self.alignment)
            .expect("alignment is non-zero by construction");
        assert_eq!(misalignment, 0, "pointer {ptr:p} is not on a block boundary");

        let header = self.header(block_offset);
        assert_eq!(
            header.state, STATE_IN_USE,
            "pointer {ptr:p} does not point at a reserved block (double free or stray pointer)"
        );

        self.push_free_tail(block_offset, header.size);

        // Cannot underflow because a reserved block was just verified to exist.
        self.live_blocks = self.live_blocks.wrapping_sub(1);

        #[cfg(debug_assertions)]
        self.integrity_check();
    }

    /// The total block size that serves `count` items: one header plus the payload,
    /// rounded up to the block alignment.
    fn block_size_for(&self, count: NonZero<usize>) -> usize {
        let payload = count
            .get()
            .checked_mul(self.stride)
            .expect("payload size overflowed usize")
            .checked_next_multiple_of(self.alignment)
            .expect("aligned payload size overflowed usize");

        self.header_size
            .checked_add(payload)
            .expect("block size overflowed usize")
    }

    /// Reads the header of the block at `offset`.
    fn header(&self, offset: usize) -> BlockHeader {
        debug_assert!(
            offset.checked_rem(self.alignment) == Some(0),
            "block offset {offset} is not aligned"
        );

        // SAFETY: A header is written at every block offset before that offset is ever
        // exposed: new_inner() writes the initial one and splits write the remainder's
        // before linking it.
        let header: BlockHeader = unsafe { self.arena.read(offset) };

        debug_assert!(
            header.state == STATE_FREE || header.state == STATE_IN_USE,
            "block header at offset {offset} is corrupt"
        );
        debug_assert!(
            header.size >= self.header_size && header.size <= self.arena.len(),
            "block header at offset {offset} has an implausible size {}",
            header.size
        );

        header
    }

    fn set_header(&mut self, offset: usize, header: BlockHeader) {
        self.arena.write(offset, header);
    }

    /// Takes the first block on the free list with at least `need` bytes, unlinking it.
    fn take_first_fit(&mut self, need: usize) -> Option<usize> {
        let mut cursor = self.free_head;

        while cursor != NO_BLOCK {
            let header = self.header(cursor);

            if header.size >= need {
                self.unlink_free(cursor);
                return Some(cursor);
            }

            cursor = header.next_free;
        }

        None
    }

    /// Merges physically adjacent free blocks until a run of at least `need` bytes
    /// emerges, returning it as one unlinked block.
    ///
    /// The arena is walked in address order. Consecutive free blocks accumulate into a
    /// run and a reserved block resets it. The first run to reach `need` is merged and
    /// returned; the walk does not continue past it.
    fn coalesce_for(&mut self, need: usize) -> Option<usize> {
        let mut run_start = NO_BLOCK;
        let mut run_size = 0_usize;
        let mut cursor = 0_usize;

        while cursor < self.arena.len() {
            let header = self.header(cursor);

            if header.is_free() {
                if run_start == NO_BLOCK {
                    run_start = cursor;
                    run_size = 0;
                }

                // Cannot overflow because the run lies within the arena.
                run_size = run_size.wrapping_add(header.size);

                if run_size >= need {
                    self.merge_run(run_start, cursor);
                    return Some(run_start);
                }
            } else {
                run_start = NO_BLOCK;
                run_size = 0;
            }

            // Cannot overflow because block sizes tile the arena exactly.
            cursor = cursor.wrapping_add(header.size);
        }

        None
    }

    /// Collapses the physically adjacent free blocks from `first` through `last` into
    /// one block at `first`, leaving it off the free list.
    fn merge_run(&mut self, first: usize, last: usize) {
        let mut merged_size = 0_usize;
        let mut cursor = first;

        loop {
            let header = self.header(cursor);
            debug_assert!(header.is_free(), "merging a reserved block at offset {cursor}");

            self.unlink_free(cursor);

            // Cannot overflow because the merged run lies within the arena.
            merged_size = merged_size.wrapping_add(header.size);

            if cursor == last {
                break;
            }

            cursor = cursor.wrapping_add(header.size);
        }

        self.set_header(
            first,
            BlockHeader {
                size: merged_size,
                state: STATE_FREE,
                prev_free: NO_BLOCK,
                next_free: NO_BLOCK,
            },
        );
    }

    /// Reserves `need` bytes of the unlinked free block at `offset`, splitting off any
    /// tail remainder that can stand alone as a free block.
    fn place_block(&mut self, offset: usize, need: usize) {
        let available = self.header(offset).size;
        debug_assert!(available >= need, "placing a block into insufficient space");

        // Cannot underflow because the block was selected to fit the request.
        let remainder = available.wrapping_sub(need);

        let block_size = if remainder > self.header_size {
            // Cannot overflow because the remainder block ends within the arena.
            let remainder_offset = offset.wrapping_add(need);
            self.push_free_tail(remainder_offset, remainder);

            need
        } else {
            // A remainder with no room for payload stays attached to the block.
            available
        };

        self.set_header(
            offset,
            BlockHeader {
                size: block_size,
                state: STATE_IN_USE,
                prev_free: NO_BLOCK,
                next_free: NO_BLOCK,
            },
        );

        // Cannot overflow because the arena holds far fewer than usize::MAX blocks.
        self.live_blocks = self.live_blocks.wrapping_add(1);
    }

    /// Removes the free block at `offset` from the free list.
    fn unlink_free(&mut self, offset: usize) {
        let header = self.header(offset);
        debug_assert!(header.is_free(), "unlinking a reserved block at offset {offset}");

        match header.prev_free {
            NO_BLOCK => self.free_head = header.next_free,
            prev => {
                let mut prev_header = self.header(prev);
                prev_header.next_free = header.next_free;
                self.set_header(prev, prev_header);
            }
        }

        match header.next_free {
            NO_BLOCK => self.free_tail = header.prev_free,
            next => {
                let mut next_header = self.header(next);
                next_header.prev_free = header.prev_free;
                self.set_header(next, next_header);
            }
        }
    }

    /// Writes a free header of `size` bytes at `offset` and appends the block to the
    /// tail of the free list.
    fn push_free_tail(&mut self, offset: usize, size: usize) {
        self.set_header(
            offset,
            BlockHeader {
                size,
                state: STATE_FREE,
                prev_free: self.free_tail,
                next_free: NO_BLOCK,
            },
        );

        match self.free_tail {
            NO_BLOCK => self.free_head = offset,
            tail => {
                let mut tail_header = self.header(tail);
                tail_header.next_free = offset;
                self.set_header(tail, tail_header);
            }
        }

        self.free_tail = offset;
    }

    /// Verifies that block sizes tile the arena and that the free list matches the
    /// free blocks found by a physical walk.
    #[cfg(debug_assertions)]
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    fn integrity_check(&self) {
        let mut cursor = 0_usize;
        let mut walked_free = 0_usize;
        let mut walked_reserved = 0_usize;

        while cursor < self.arena.len() {
            let header = self.header(cursor);

            assert!(
                header.size.checked_rem(self.alignment) == Some(0),
                "block at offset {cursor} has a misaligned size {}",
                header.size
            );

            if header.is_free() {
                walked_free = walked_free.wrapping_add(1);
            } else {
                walked_reserved = walked_reserved.wrapping_add(1);
            }

            cursor = cursor
                .checked_add(header.size)
                .expect("block sizes overflowed while walking the arena");
        }

        assert!(
            cursor == self.arena.len(),
            "physical block walk ended at {cursor} instead of the arena end {}",
            self.arena.len()
        );
        assert!(
            walked_reserved == self.live_blocks,
            "the walk found {walked_reserved} reserved blocks but the arena believes {}",
            self.live_blocks
        );

        let mut listed_free = 0_usize;
        let mut cursor = self.free_head;
        let mut prev = NO_BLOCK;

        while cursor != NO_BLOCK {
            let header = self.header(cursor);

            assert!(
                header.is_free(),
                "reserved block at offset {cursor} is on the free list"
            );
            assert!(
                header.prev_free == prev,
                "free block at offset {cursor} has a broken back link"
            );

            listed_free = listed_free.wrapping_add(1);
            assert!(
                listed_free <= walked_free,
                "the free list is longer than the number of free blocks, so it must be cyclic"
            );

            prev = cursor;
            cursor = header.next_free;
        }

        assert!(
            prev == self.free_tail,
            "the free list ends at offset {prev} but the tail points at {}",
            self.free_tail
        );
        assert!(
            listed_free == walked_free,
            "the free list holds {listed_free} blocks but the walk found {walked_free} free blocks"
        );
    }
}

impl RawPool for BlockArena {
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

impl Drop for BlockArena {
    fn drop(&mut self) {
        // If the thread is already panicking we skip the check, as a second panic would
        // turn the unwind into an abort and hide the original message.
        if !thread::panicking() {
            assert!(
                self.is_empty(),
                "dropped a BlockArena with {} blocks still reserved; every block must be \
                 deallocated before the arena is dropped",
                self.live_blocks
            );
        }
    }
}

// SAFETY: The raw pointers all point into the arena that the allocator itself
// exclusively owns, so moving it to another thread moves the storage with it.
unsafe impl Send for BlockArena {}

/// Builder for [`BlockArena`].
///
/// The item layout is mandatory. The element budget defaults to 128 and faults are
/// reported to standard output unless a [`FaultHook`] is installed.
#[derive(Debug)]
#[must_use]
pub struct BlockArenaBuilder {
    item_layout: Option<Layout>,
    capacity: NonZero<usize>,
    fault_hook: FaultHook,
    source: MemorySourceFacade,

    _not_sync: PhantomData<Cell<()>>,
}

impl BlockArenaBuilder {
    pub(crate) fn new() -> Self {
        Self {
            item_layout: None,
            capacity: DEFAULT_CAPACITY,
            fault_hook: default_fault_hook,
            source: MemorySourceFacade::system(),
            _not_sync: PhantomData,
        }
    }

    /// Sets the layout of the items the arena will hold.
    ///
    /// # Panics
    ///
    /// Panics if the layout is zero-sized.
    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        assert!(
            layout.size() > 0,
            "BlockArena requires a non-zero item size"
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

    /// Sets the element budget the arena is sized for.
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

    /// Builds the arena, acquiring its backing region.
    ///
    /// # Panics
    ///
    /// Panics if no item layout was set or if the region cannot be acquired.
    #[must_use]
    pub fn build(self) -> BlockArena {
        let item_layout = self
            .item_layout
            .expect("item layout must be set via .layout() or .layout_of::<T>() before .build()");

        BlockArena::new_inner(item_layout, self.capacity, self.fault_hook, self.source)
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

    assert_impl_all!(BlockArena: Send);
    assert_not_impl_any!(BlockArena: Sync);
    assert_impl_all!(BlockArenaBuilder: Send);
    assert_not_impl_any!(BlockArenaBuilder: Sync);

    /// For 16 byte items the numbers are round: a header takes 32 bytes, so every
    /// single-item block takes 48 bytes.
    type Wide = [u8; 16];

    fn wide_arena(capacity: NonZero<usize>) -> BlockArena {
        BlockArena::builder()
            .layout_of::<Wide>()
            .capacity(capacity)
            .build()
    }

    fn u64_arena(capacity: NonZero<usize>) -> BlockArena {
        BlockArena::builder()
            .layout_of::<u64>()
            .capacity(capacity)
            .build()
    }

    #[test]
    fn reserves_and_releases_blocks() {
        let mut arena = wide_arena(nz!(4));

        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(1)).unwrap();

        assert_ne!(first, second);
        assert_eq!(arena.len(), 2);
        assert!(arena.contains(first));
        assert!(arena.contains(second));

        // Each single-item block is 48 bytes: a 32 byte header plus one 16 byte item.
        assert_eq!(second.addr().get() - first.addr().get(), 48);

        unsafe { arena.deallocate(first) };
        unsafe { arena.deallocate(second) };

        assert!(arena.is_empty());
    }

    #[test]
    fn sizes_the_arena_per_element() {
        let arena = wide_arena(nz!(10));

        assert_eq!(arena.capacity(), nz!(10));
        assert_eq!(arena.byte_capacity(), 480);
    }

    #[test]
    fn payloads_are_aligned() {
        #[repr(align(64))]
        struct Aligned([u8; 8]);

        let mut arena = BlockArena::builder()
            .layout_of::<Aligned>()
            .capacity(nz!(4))
            .build();

        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(2)).unwrap();

        assert_eq!(first.addr().get() % 64, 0);
        assert_eq!(second.addr().get() % 64, 0);

        unsafe { arena.deallocate(first) };
        unsafe { arena.deallocate(second) };
    }

    #[test]
    fn storage_holds_written_values() {
        let mut arena = u64_arena(nz!(8));

        let run = arena.allocate(nz!(3)).unwrap();
        let items = run.cast::<u64>();

        unsafe {
            items.write(10);
            items.add(1).write(20);
            items.add(2).write(30);
        }

        assert_eq!(unsafe { items.read() }, 10);
        assert_eq!(unsafe { items.add(1).read() }, 20);
        assert_eq!(unsafe { items.add(2).read() }, 30);

        unsafe { arena.deallocate(run) };
    }

    #[test]
    fn fills_to_exact_capacity_with_single_items() {
        let mut arena = wide_arena(nz!(10));

        let mut blocks = Vec::new();
        for _ in 0..10 {
            blocks.push(arena.allocate(nz!(1)).unwrap());
        }

        assert_eq!(arena.len(), 10);
        assert!(arena.allocate(nz!(1)).is_none());

        for block in blocks {
            unsafe { arena.deallocate(block) };
        }

        // After releasing everything, ten single-item blocks merge into one run that
        // can serve a ten-item request.
        let whole = arena.allocate(nz!(10)).unwrap();
        assert_eq!(arena.len(), 1);

        unsafe { arena.deallocate(whole) };
    }

    #[test]
    fn adjacent_blocks_coalesce_when_no_single_block_fits() {
        let mut arena = wide_arena(nz!(4));

        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(1)).unwrap();
        let third = arena.allocate(nz!(1)).unwrap();
        let fourth = arena.allocate(nz!(1)).unwrap();

        unsafe { arena.deallocate(first) };

        // One released item is not enough for a two-item run.
        assert!(arena.allocate(nz!(2)).is_none());

        unsafe { arena.deallocate(second) };

        // No single free block holds two items, but the two released neighbors merge.
        let merged = arena.allocate(nz!(2)).unwrap();
        assert_eq!(merged, first);
        assert_eq!(arena.len(), 3);

        unsafe { arena.deallocate(merged) };
        unsafe { arena.deallocate(third) };
        unsafe { arena.deallocate(fourth) };
    }

    #[test]
    fn first_fit_wins_over_merging() {
        let mut arena = wide_arena(nz!(10));

        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(1)).unwrap();
        let third = arena.allocate(nz!(1)).unwrap();

        unsafe { arena.deallocate(first) };
        unsafe { arena.deallocate(second) };

        // The untouched tail of the arena already fits two items, so the two released
        // neighbors are left unmerged.
        let run = arena.allocate(nz!(2)).unwrap();
        assert_eq!(run.addr().get() - first.addr().get(), 144);

        unsafe { arena.deallocate(run) };
        unsafe { arena.deallocate(third) };

        let reclaimed_first = arena.allocate(nz!(1)).unwrap();
        assert_eq!(reclaimed_first, first);

        unsafe { arena.deallocate(reclaimed_first) };
    }

    #[test]
    fn distinct_free_blocks_recycle_oldest_first() {
        let mut arena = wide_arena(nz!(4));

        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(1)).unwrap();
        let third = arena.allocate(nz!(1)).unwrap();
        let fourth = arena.allocate(nz!(1)).unwrap();

        unsafe { arena.deallocate(third) };
        unsafe { arena.deallocate(first) };

        // The block released first sits closer to the head of the free list.
        let recycled = arena.allocate(nz!(1)).unwrap();
        assert_eq!(recycled, third);

        unsafe { arena.deallocate(second) };
        unsafe { arena.deallocate(fourth) };
        unsafe { arena.deallocate(recycled) };
    }

    #[test]
    fn release_two_runs_then_reserve_their_combined_length() {
        let mut arena = u64_arena(nz!(10));

        let first = arena.allocate(nz!(4)).unwrap();
        let second = arena.allocate(nz!(4)).unwrap();

        unsafe { arena.deallocate(first) };
        unsafe { arena.deallocate(second) };

        let combined = arena.allocate(nz!(8)).unwrap();
        let items = combined.cast::<u64>();

        for index in 0..8 {
            unsafe { items.add(index).write(u64::try_from(index).unwrap()) };
        }
        for index in 0..8 {
            assert_eq!(unsafe { items.add(index).read() }, u64::try_from(index).unwrap());
        }

        unsafe { arena.deallocate(combined) };
        assert!(arena.is_empty());
    }

    #[test]
    fn blocks_never_overlap() {
        let mut arena = u64_arena(nz!(8));

        let counts = [1_usize, 3, 2, 5, 1];
        let mut spans = Vec::new();

        for count in counts {
            let run = arena
                .allocate(NonZero::new(count).unwrap())
                .expect("the budget covers these requests");
            let start = run.addr().get();
            spans.push((run, start, start + count * size_of::<u64>()));
        }

        for (index, (_, start, end)) in spans.iter().enumerate() {
            for (other_index, (_, other_start, other_end)) in spans.iter().enumerate() {
                if index == other_index {
                    continue;
                }

                assert!(
                    end <= other_start || other_end <= start,
                    "payload {index} overlaps payload {other_index}"
                );
            }
        }

        for (run, _, _) in spans {
            unsafe { arena.deallocate(run) };
        }
    }

    #[test]
    fn remainder_too_small_for_a_header_stays_with_the_block() {
        let mut arena = wide_arena(nz!(2));

        // The arena holds 96 bytes. A two-item block needs 64, leaving 32, which is
        // exactly one header and no payload, so the block absorbs it.
        let run = arena.allocate(nz!(2)).unwrap();
        assert!(arena.allocate(nz!(1)).is_none());

        unsafe { arena.deallocate(run) };

        // Once released, the full 96 bytes serve two single-item blocks again.
        let first = arena.allocate(nz!(1)).unwrap();
        let second = arena.allocate(nz!(1)).unwrap();

        unsafe { arena.deallocate(first) };
        unsafe { arena.deallocate(second) };
    }

    #[test]
    fn released_block_is_reused_exactly() {
        let mut arena = wide_arena(nz!(1));

        let only = arena.allocate(nz!(1)).unwrap();
        assert!(arena.allocate(nz!(1)).is_none());

        unsafe { arena.deallocate(only) };

        let again = arena.allocate(nz!(1)).unwrap();
        assert_eq!(again, only);

        unsafe { arena.deallocate(again) };
    }

    #[test]
    fn rejects_requests_beyond_the_arena() {
        let mut arena = wide_arena(nz!(2));

        assert!(arena.allocate(nz!(5)).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut arena = wide_arena(nz!(4));

        let run = arena.allocate(nz!(1)).unwrap();

        unsafe { arena.deallocate(run) };
        unsafe { arena.deallocate(run) };
    }

    #[test]
    #[should_panic(expected = "does not belong to this arena")]
    fn foreign_pointer_panics() {
        let mut home = wide_arena(nz!(4));
        let mut away = wide_arena(nz!(4));

        let run = away.allocate(nz!(1)).unwrap();

        unsafe { home.deallocate(run) };
    }

    #[test]
    #[should_panic(expected = "not on a block boundary")]
    fn unaligned_pointer_panics() {
        let mut arena = wide_arena(nz!(4));

        let run = arena.allocate(nz!(1)).unwrap();
        let inside = unsafe { run.add(1) };

        unsafe { arena.deallocate(inside) };
    }

    #[test]
    #[should_panic(expected = "is not the payload of any block")]
    fn header_pointer_panics() {
        let mut arena = wide_arena(nz!(4));

        let run = arena.allocate(nz!(1)).unwrap();
        let header_byte = unsafe { run.sub(32) };

        unsafe { arena.deallocate(header_byte) };
    }

    #[test]
    #[should_panic]
    fn pointer_at_wrong_block_boundary_panics() {
        let mut arena = wide_arena(nz!(4));

        let run = arena.allocate(nz!(2)).unwrap();
        unsafe { run.cast::<[u8; 32]>().write([0; 32]) };

        // Aligned like a payload, but pointing into the middle of the block.
        let inside = unsafe { run.add(16) };

        unsafe { arena.deallocate(inside) };
    }

    #[test]
    #[should_panic(expected = "still reserved")]
    fn dropping_nonempty_arena_panics() {
        let mut arena = wide_arena(nz!(4));

        let _run = arena.allocate(nz!(1)).unwrap();

        drop(arena);
    }

    #[test]
    fn arena_is_released_on_drop() {
        let fake = Arc::new(FakeMemorySource::new());

        let mut arena = BlockArena::builder()
            .layout_of::<u64>()
            .capacity(nz!(8))
            .memory_source(MemorySourceFacade::from_fake(Arc::clone(&fake)))
            .build();

        assert_eq!(fake.live_regions(), 1);

        let run = arena.allocate(nz!(4)).unwrap();
        unsafe { arena.deallocate(run) };

        drop(arena);

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    #[should_panic(expected = "failed to acquire")]
    fn arena_acquisition_failure_panics() {
        let fake = Arc::new(FakeMemorySource::failing_after(0));

        drop(
            BlockArena::builder()
                .layout_of::<u64>()
                .memory_source(MemorySourceFacade::from_fake(fake))
                .build(),
        );
    }

    #[test]
    #[should_panic(expected = "item layout must be set")]
    fn building_without_layout_panics() {
        drop(BlockArena::builder().build());
    }

    #[test]
    fn default_capacity_is_used_when_unset() {
        let arena = BlockArena::builder().layout_of::<u64>().build();

        assert_eq!(arena.capacity(), DEFAULT_CAPACITY);
        assert_eq!(arena.item_layout(), Layout::new::<u64>());
    }
}
