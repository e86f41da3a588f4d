//! Typed construct/destroy semantics atop an untyped pool engine.

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;
use std::ptr::NonNull;

use arena_pool::{BlockPool, RawPool};

/// A typed facade that turns raw storage reservations into live `T` values.
///
/// The pool reserves storage from an untyped engine and constructs elements in place
/// only once the reservation has succeeded, so a failed reservation constructs
/// nothing. Destruction is the mirror image: each element is dropped in place, then
/// the storage goes back to the engine.
///
/// The engine defaults to [`BlockPool`], which keeps growing until backing memory
/// runs out. Any other [`RawPool`] works through [`over`](Self::over), with the usual
/// engine-specific exhaustion behavior.
///
/// The pool does not record how many elements each reservation holds. The caller
/// passes the same count to [`destroy`](Self::destroy) that was used at creation,
/// exactly as with the untyped engines underneath.
///
/// # Example
///
/// ```
/// use new_zealand::nz;
/// use typed_pool::ObjectPool;
///
/// let mut pool = ObjectPool::<String>::new();
///
/// let greetings = pool
///     .create(nz!(3), &"hello".to_string())
///     .expect("the default engine grows until memory runs out");
///
/// // SAFETY: Three strings were just constructed at this address.
/// let first = unsafe { greetings.as_ref() };
/// assert_eq!(first, "hello");
///
/// // SAFETY: Same pool, same count, all three elements still live.
/// unsafe { pool.destroy(greetings, nz!(3)) };
///
/// assert!(pool.is_empty());
/// ```
pub struct ObjectPool<T, P = BlockPool> {
    pool: P,

    _items: PhantomData<T>,
}

impl<T> ObjectPool<T, BlockPool> {
    /// Creates a pool over a default-sized [`BlockPool`] engine for `T`'s layout.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn new() -> Self {
        Self::over(BlockPool::builder().layout_of::<T>().build())
    }

    /// Creates a pool over a [`BlockPool`] engine budgeted for `initial_capacity`
    /// elements before its first growth.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    #[must_use]
    pub fn with_capacity(initial_capacity: NonZero<usize>) -> Self {
        Self::over(
            BlockPool::builder()
                .layout_of::<T>()
                .initial_capacity(initial_capacity)
                .build(),
        )
    }
}

impl<T, P> ObjectPool<T, P>
where
    P: RawPool,
{
    /// Wraps a caller-built engine.
    ///
    /// # Panics
    ///
    /// Panics if the engine's item layout does not match `T`.
    #[must_use]
    pub fn over(pool: P) -> Self {
        assert_eq!(
            pool.item_layout(),
            Layout::new::<T>(),
            "the engine's item layout must match the object type"
        );

        Self {
            pool,
            _items: PhantomData,
        }
    }

    /// Reserves storage for `count` consecutive elements and clone-constructs each
    /// one from `value`.
    ///
    /// Returns `None` without constructing anything when the engine, including any
    /// growth it is allowed to perform, cannot satisfy the reservation.
    ///
    /// If a clone panics, the reservation and the elements constructed so far are
    /// leaked and the engine keeps reporting them as reserved.
    #[must_use]
    pub fn create(&mut self, count: NonZero<usize>, value: &T) -> Option<NonNull<T>>
    where
        T: Clone,
    {
        self.create_with(count, |_| value.clone())
    }

    /// Reserves storage for `count` consecutive elements and constructs each one from
    /// `factory`, called with indexes `0..count`.
    ///
    /// Returns `None` without calling `factory` when the engine, including any growth
    /// it is allowed to perform, cannot satisfy the reservation.
    ///
    /// If `factory` panics, the reservation and the elements constructed so far are
    /// leaked and the engine keeps reporting them as reserved.
    #[must_use]
    pub fn create_with(
        &mut self,
        count: NonZero<usize>,
        mut factory: impl FnMut(usize) -> T,
    ) -> Option<NonNull<T>> {
        let storage = self.pool.allocate(count)?;
        let items = storage.cast::<T>();

        for index in 0..count.get() {
            let value = factory(index);

            // SAFETY: The reservation covers `count` elements and `index` stays
            // below it.
            let slot = unsafe { items.add(index) };

            // SAFETY: The slot is reserved for this run and holds no live value yet.
            unsafe { slot.write(value) };
        }

        Some(items)
    }

    /// Drops each of `count` elements in place, then releases their storage back to
    /// the engine.
    ///
    /// # Safety
    ///
    /// `ptr` must have come from [`create`](Self::create) or
    /// [`create_with`](Self::create_with) on this pool with this same `count`, all
    /// `count` elements must still be live, and the run must not be used afterwards.
    /// No size is recorded per reservation, so a mismatched `count` corrupts or leaks
    /// adjacent storage.
    ///
    /// # Panics
    ///
    /// The engine panics if `ptr` does not point at storage it has handed out.
    pub unsafe fn destroy(&mut self, ptr: NonNull<T>, count: NonZero<usize>) {
        for index in 0..count.get() {
            // SAFETY: The run covers `count` elements and `index` stays below it.
            let item = unsafe { ptr.add(index) };

            // SAFETY: The caller guarantees the element is live and unaliased; it is
            // not touched again after this drop.
            unsafe { item.drop_in_place() };
        }

        // SAFETY: Forwarding the caller's guarantee that the run came from this
        // engine with this count.
        unsafe { self.pool.deallocate(ptr.cast::<u8>(), count) };
    }

    /// The number of reservations the engine currently tracks.
    ///
    /// Block engines count whole runs, slot engines count individual elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether no elements are currently live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Whether `ptr` points into storage owned by the engine.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.pool.contains(ptr.cast::<u8>())
    }

    /// The layout of a single element.
    #[must_use]
    pub fn item_layout(&self) -> Layout {
        self.pool.item_layout()
    }
}

impl<T> Default for ObjectPool<T, BlockPool> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P> fmt::Debug for ObjectPool<T, P>
where
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::arithmetic_side_effects,
    clippy::items_after_statements,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use arena_pool::{SlotPool, SlotSlab};
    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(ObjectPool<String>: Send);
    assert_not_impl_any!(ObjectPool<String>: Sync);
    assert_not_impl_any!(ObjectPool<Rc<u8>>: Send);

    #[test]
    fn clones_the_prototype_into_every_element() {
        let mut pool = ObjectPool::<String>::new();

        let run = pool
            .create(nz!(3), &"hello".to_string())
            .expect("the default engine grows on demand");

        for index in 0..3 {
            let text = unsafe { run.add(index).as_ref() };
            assert_eq!(text, "hello");
        }

        unsafe { pool.destroy(run, nz!(3)) };

        assert!(pool.is_empty());
    }

    #[test]
    fn factory_receives_each_index() {
        let mut pool = ObjectPool::<u64>::new();

        let run = pool
            .create_with(nz!(5), |index| u64::try_from(index).unwrap() * 10)
            .expect("the default engine grows on demand");

        for index in 0..5 {
            let value = unsafe { run.add(index).read() };
            assert_eq!(value, u64::try_from(index).unwrap() * 10);
        }

        unsafe { pool.destroy(run, nz!(5)) };
    }

    #[test]
    fn destroy_drops_every_element() {
        struct DropCounter {
            drops: Rc<Cell<usize>>,
        }

        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));

        let mut pool = ObjectPool::<DropCounter>::new();

        let run = pool
            .create_with(nz!(4), |_| DropCounter {
                drops: Rc::clone(&drops),
            })
            .expect("the default engine grows on demand");

        assert_eq!(drops.get(), 0);

        unsafe { pool.destroy(run, nz!(4)) };

        assert_eq!(drops.get(), 4);
        assert_eq!(Rc::strong_count(&drops), 1);
    }

    #[test]
    fn failed_reservation_constructs_nothing() {
        struct CountedClone {
            clones: Rc<Cell<usize>>,
        }

        impl Clone for CountedClone {
            fn clone(&self) -> Self {
                self.clones.set(self.clones.get() + 1);

                Self {
                    clones: Rc::clone(&self.clones),
                }
            }
        }

        let clones = Rc::new(Cell::new(0));
        let prototype = CountedClone {
            clones: Rc::clone(&clones),
        };

        let slab = SlotSlab::builder()
            .layout_of::<CountedClone>()
            .capacity(nz!(2))
            .build();
        let mut pool = ObjectPool::over(slab);

        // The slab tops out at two elements, so this reservation fails before any
        // element is constructed.
        let outcome = pool.create(nz!(4), &prototype);

        assert!(outcome.is_none());
        assert_eq!(clones.get(), 0);
        assert!(pool.is_empty());
    }

    #[test]
    fn block_engine_counts_whole_runs() {
        let mut pool = ObjectPool::<u64>::with_capacity(nz!(8));

        let pair = pool.create(nz!(2), &1).expect("the engine grows on demand");
        let trio = pool.create(nz!(3), &2).expect("the engine grows on demand");

        assert_eq!(pool.len(), 2);
        assert!(pool.contains(pair));
        assert!(pool.contains(trio));

        unsafe { pool.destroy(pair, nz!(2)) };
        unsafe { pool.destroy(trio, nz!(3)) };

        assert!(pool.is_empty());
    }

    #[test]
    fn slot_engine_reuses_released_storage() {
        let engine = SlotPool::builder()
            .layout_of::<u64>()
            .initial_capacity(nz!(8))
            .build();
        let mut pool = ObjectPool::<u64, _>::over(engine);

        let first = pool.create(nz!(2), &7).expect("the engine grows on demand");
        unsafe { pool.destroy(first, nz!(2)) };

        let second = pool.create(nz!(2), &8).expect("the engine grows on demand");
        assert_eq!(second, first);

        unsafe { pool.destroy(second, nz!(2)) };
    }

    #[test]
    #[should_panic(expected = "item layout must match")]
    fn mismatched_engine_layout_panics() {
        let engine = BlockPool::builder().layout_of::<u32>().build();

        drop(ObjectPool::<u64, _>::over(engine));
    }

    #[test]
    #[should_panic(expected = "non-zero item size")]
    fn zero_sized_items_panic() {
        drop(ObjectPool::<()>::new());
    }

    #[test]
    fn reports_item_layout() {
        let pool = ObjectPool::<u64>::new();

        assert_eq!(pool.item_layout(), Layout::new::<u64>());
    }
}
