//! The allocation capability shared by every pool tier.

use std::alloc::Layout;
use std::fmt::Debug;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use new_zealand::nz;

/// Initial capacity, in items, used by pool builders when none is specified.
#[cfg(not(miri))]
pub(crate) const DEFAULT_CAPACITY: NonZero<usize> = nz!(128);

/// Miri executes the pool bookkeeping slowly, so default to small pools there.
#[cfg(miri)]
pub(crate) const DEFAULT_CAPACITY: NonZero<usize> = nz!(16);

/// Issues a process-unique identifier for a newly created pool.
pub(crate) fn next_pool_id() -> u64 {
    static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

/// Untyped storage reservation, shared by every pool in this crate.
///
/// A pool hands out storage for runs of consecutive items of the layout fixed at pool
/// construction and later takes the same storage back. The caller owns initialization
/// of the storage; the pool only tracks which bytes are reserved.
///
/// The trait is object-safe. Hold a `&mut dyn RawPool` where the pool kind must be
/// swappable at runtime and a generic parameter where it is fixed at compile time.
///
/// # Example
///
/// ```
/// use std::num::NonZero;
///
/// use arena_pool::{RawPool, SlotPool};
///
/// fn fill_and_drain(pool: &mut dyn RawPool) {
///     let count = NonZero::new(4).unwrap();
///
///     let run = pool.allocate(count).expect("pool has room for four items");
///     assert!(pool.contains(run));
///
///     // SAFETY: The run came from this pool with this count and is released once.
///     unsafe { pool.deallocate(run, count) };
///     assert!(pool.is_empty());
/// }
///
/// let mut pool = SlotPool::builder().layout_of::<u64>().build();
/// fill_and_drain(&mut pool);
/// ```
pub trait RawPool: Debug {
    /// The layout of a single item, as fixed at pool construction.
    fn item_layout(&self) -> Layout;

    /// Reserves storage for `count` consecutive items.
    ///
    /// Returns a pointer to the storage of the first item, or `None` when the pool,
    /// including any growth it is allowed to perform, cannot satisfy the request.
    fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>>;

    /// Releases storage previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this same pool with this same
    /// `count`, and the storage must not have been released already.
    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>);

    /// Whether `ptr` points into storage owned by this pool.
    fn contains(&self, ptr: NonNull<u8>) -> bool;

    /// The number of reservations the pool currently tracks.
    ///
    /// Slot pools count individual item slots, block pools count whole blocks, so the
    /// exact meaning depends on the pool kind. Zero always means empty.
    fn len(&self) -> usize;

    /// Whether the pool currently has no reserved storage.
    fn is_empty(&self) -> bool;
}

impl<P> RawPool for &mut P
where
    P: RawPool + ?Sized,
{
    fn item_layout(&self) -> Layout {
        (**self).item_layout()
    }

    fn allocate(&mut self, count: NonZero<usize>) -> Option<NonNull<u8>> {
        (**self).allocate(count)
    }

    unsafe fn deallocate(&mut self, ptr: NonNull<u8>, count: NonZero<usize>) {
        // SAFETY: Forwarding the caller's guarantee to the underlying pool.
        unsafe { (**self).deallocate(ptr, count) }
    }

    fn contains(&self, ptr: NonNull<u8>) -> bool {
        (**self).contains(ptr)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use super::*;
    use crate::{BlockPool, SlotPool};

    fn exercise_via_generic<P: RawPool>(mut pool: P) {
        let count = nz!(3);

        let run = pool.allocate(count).expect("fresh pool has room");
        assert!(pool.contains(run));
        assert!(!pool.is_empty());

        unsafe { pool.deallocate(run, count) };
        assert!(pool.is_empty());
    }

    fn exercise_via_object(pool: &mut dyn RawPool) {
        let count = nz!(2);

        let run = pool.allocate(count).expect("fresh pool has room");
        assert_eq!(pool.item_layout(), Layout::new::<u64>());

        unsafe { pool.deallocate(run, count) };
    }

    #[test]
    fn slot_pool_satisfies_the_contract() {
        let mut pool = SlotPool::builder().layout_of::<u64>().build();

        exercise_via_generic(&mut pool);
        exercise_via_object(&mut pool);
    }

    #[test]
    fn block_pool_satisfies_the_contract() {
        let mut pool = BlockPool::builder().layout_of::<u64>().build();

        exercise_via_generic(&mut pool);
        exercise_via_object(&mut pool);
    }
}
