//! A type-keyed registry of slot pools.

use std::any::{TypeId, type_name};
use std::fmt;
use std::num::NonZero;
use std::ptr::NonNull;

use arena_pool::SlotPool;
use foldhash::{HashMap, HashMapExt};

/// A registry that gives every registered type its own dedicated [`SlotPool`].
///
/// Many unrelated types share one facility without per-type wiring: the registry maps
/// each type's [`TypeId`] to a pool created on first registration. Entries are never
/// removed while the registry lives, so storage handed out for one type stays valid
/// and never aliases storage handed out for another.
///
/// Registration is explicit. Allocating or releasing through an unregistered type is
/// a caller error and panics; it is not a recoverable condition.
///
/// # Example
///
/// ```
/// use new_zealand::nz;
/// use typed_pool::PoolRegistry;
///
/// let mut registry = PoolRegistry::new();
///
/// registry.register::<u64>(nz!(16));
/// registry.register::<String>(nz!(4));
///
/// let number = registry
///     .allocate::<u64>(nz!(1))
///     .expect("the per-type pool grows until memory runs out");
///
/// // The registry hands out raw storage; the caller decides what lives in it.
/// unsafe { number.write(42) };
/// assert_eq!(unsafe { number.read() }, 42);
///
/// // SAFETY: The storage came from this registry under u64 with this count.
/// unsafe { registry.deallocate::<u64>(number, nz!(1)) };
/// ```
pub struct PoolRegistry {
    /// One pool per registered type.
    /// We use foldhash for better performance with small hash tables.
    pools: HashMap<TypeId, SlotPool>,
}

impl PoolRegistry {
    /// Creates a registry with no registered types.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Registers `T`, creating a pool seeded for `capacity` elements.
    ///
    /// Registration is idempotent: when `T` is already registered the call has no
    /// effect and the existing pool, including everything reserved from it, stays as
    /// it is. The capacity of a repeated registration is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    pub fn register<T>(&mut self, capacity: NonZero<usize>)
    where
        T: 'static,
    {
        self.pools.entry(TypeId::of::<T>()).or_insert_with(|| {
            SlotPool::builder()
                .layout_of::<T>()
                .initial_capacity(capacity)
                .build()
        });
    }

    /// Whether a pool for `T` exists.
    #[must_use]
    pub fn is_registered<T>(&self) -> bool
    where
        T: 'static,
    {
        self.pools.contains_key(&TypeId::of::<T>())
    }

    /// The number of types registered so far.
    #[must_use]
    pub fn registered_type_count(&self) -> usize {
        self.pools.len()
    }

    /// The number of elements currently reserved across all per-type pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.values().map(SlotPool::len).sum()
    }

    /// Whether no elements are currently reserved under any type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.values().all(SlotPool::is_empty)
    }

    /// Reserves storage for `count` consecutive `T` elements from `T`'s pool.
    ///
    /// Returns `None` when the pool, including any growth it is allowed to perform,
    /// cannot satisfy the request. The storage is uninitialized; the caller decides
    /// what lives in it.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered.
    #[must_use]
    pub fn allocate<T>(&mut self, count: NonZero<usize>) -> Option<NonNull<T>>
    where
        T: 'static,
    {
        let Some(pool) = self.pools.get_mut(&TypeId::of::<T>()) else {
            panic!(
                "type {} was not registered with this registry before use",
                type_name::<T>()
            );
        };

        pool.allocate(count).map(NonNull::cast)
    }

    /// Releases storage previously returned by [`allocate`](Self::allocate) for `T`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate::<T>` on this registry with this
    /// same `count`, and the storage must not have been released already.
    ///
    /// # Panics
    ///
    /// Panics if `T` was never registered or if `ptr` does not belong to `T`'s pool.
    pub unsafe fn deallocate<T>(&mut self, ptr: NonNull<T>, count: NonZero<usize>)
    where
        T: 'static,
    {
        let Some(pool) = self.pools.get_mut(&TypeId::of::<T>()) else {
            panic!(
                "type {} was not registered with this registry before use",
                type_name::<T>()
            );
        };

        // SAFETY: Forwarding the caller's guarantee; the pool was selected by the
        // same type key that served the allocation.
        unsafe { pool.deallocate(ptr.cast::<u8>(), count) };
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolRegistry: Send);
    assert_not_impl_any!(PoolRegistry: Sync);

    #[test]
    fn registration_is_idempotent() {
        let mut registry = PoolRegistry::new();

        registry.register::<u64>(nz!(4));
        assert!(registry.is_registered::<u64>());
        assert_eq!(registry.registered_type_count(), 1);

        let slot = registry.allocate::<u64>(nz!(1)).unwrap();
        unsafe { slot.write(42) };

        // Registering again changes nothing; the reservation stays live.
        registry.register::<u64>(nz!(99));

        assert_eq!(registry.registered_type_count(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(unsafe { slot.read() }, 42);

        unsafe { registry.deallocate::<u64>(slot, nz!(1)) };
    }

    #[test]
    fn each_type_gets_its_own_pool() {
        let mut registry = PoolRegistry::new();

        registry.register::<u64>(nz!(4));
        registry.register::<u32>(nz!(4));
        assert_eq!(registry.registered_type_count(), 2);

        let wide = registry.allocate::<u64>(nz!(1)).unwrap();
        let narrow = registry.allocate::<u32>(nz!(1)).unwrap();

        // Writes through one type never disturb the other.
        unsafe { wide.write(u64::MAX) };
        unsafe { narrow.write(7) };

        assert_eq!(unsafe { wide.read() }, u64::MAX);
        assert_eq!(unsafe { narrow.read() }, 7);
        assert_eq!(registry.len(), 2);

        unsafe { registry.deallocate::<u64>(wide, nz!(1)) };
        unsafe { registry.deallocate::<u32>(narrow, nz!(1)) };

        assert!(registry.is_empty());
    }

    #[test]
    fn released_elements_are_reused_before_growth() {
        let mut registry = PoolRegistry::new();

        registry.register::<i32>(nz!(100));

        let first = registry.allocate::<i32>(nz!(10)).unwrap();
        unsafe { registry.deallocate::<i32>(first, nz!(10)) };

        let second = registry.allocate::<i32>(nz!(10)).unwrap();
        assert_eq!(second, first);

        unsafe { registry.deallocate::<i32>(second, nz!(10)) };
    }

    #[test]
    fn per_type_pools_grow_past_their_seed() {
        let mut registry = PoolRegistry::new();

        registry.register::<u64>(nz!(2));

        let slots: Vec<_> = (0..10)
            .map(|_| registry.allocate::<u64>(nz!(1)).unwrap())
            .collect();

        assert_eq!(registry.len(), 10);

        for slot in slots {
            unsafe { registry.deallocate::<u64>(slot, nz!(1)) };
        }

        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "was not registered")]
    fn allocating_an_unregistered_type_panics() {
        let mut registry = PoolRegistry::new();

        _ = registry.allocate::<u64>(nz!(1));
    }

    #[test]
    #[should_panic(expected = "was not registered")]
    fn releasing_an_unregistered_type_panics() {
        let mut registry = PoolRegistry::new();

        registry.register::<u64>(nz!(4));

        let slot = registry.allocate::<u64>(nz!(1)).unwrap();

        // The element type is the registry key, so a different type is a different,
        // unregistered pool even at the same address.
        unsafe { registry.deallocate::<i64>(slot.cast(), nz!(1)) };
    }

    #[test]
    fn debug_output_names_the_registry() {
        let registry = PoolRegistry::new();

        let rendered = format!("{registry:?}");
        assert!(rendered.contains("PoolRegistry"));
    }

    #[test]
    fn non_send_types_can_be_registered() {
        // The registry itself stays Send; what the caller stores behind the raw
        // storage is the caller's concern.
        let mut registry = PoolRegistry::new();

        registry.register::<Rc<u8>>(nz!(4));
        assert!(registry.is_registered::<Rc<u8>>());
        assert!(!registry.is_registered::<u8>());
    }
}
