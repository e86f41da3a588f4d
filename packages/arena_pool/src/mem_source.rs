//! Acquisition and release of the raw memory regions that back pool arenas.
//!
//! Pools never call the global allocator directly. They go through a memory source, so
//! tests can observe region traffic and make acquisition fail on demand.

use std::alloc::{self, Layout};
use std::ptr::NonNull;
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// Supplies raw memory regions with allocate/release semantics.
///
/// Implementations return `None` when a region cannot be supplied. Ordinary exhaustion is
/// reported through the return value, never through a panic.
pub(crate) trait MemorySource {
    /// Acquires a region matching `layout`, or `None` if the source cannot supply one.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a region previously returned by [`allocate`](Self::allocate).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this same source with this same
    /// `layout` and must not have been released already.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The production memory source, backed by the global allocator.
#[derive(Debug)]
pub(crate) struct SystemSource;

/// The instance behind every [`MemorySourceFacade::system()`].
static SYSTEM_SOURCE: SystemSource = SystemSource;

impl MemorySource for SystemSource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        assert!(
            layout.size() > 0,
            "a memory source cannot supply zero-sized regions"
        );

        // SAFETY: The layout has a non-zero size, as asserted above.
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Forwarding the caller's guarantee that ptr came from alloc() with this
        // layout and has not been released yet.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

/// A test memory source that counts region traffic and can be told to start failing
/// after a set number of successful acquisitions.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct FakeMemorySource {
    /// Acquisitions still allowed to succeed. `usize::MAX` means unlimited.
    remaining_grants: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

#[cfg(test)]
impl FakeMemorySource {
    pub(crate) fn new() -> Self {
        Self {
            remaining_grants: AtomicUsize::new(usize::MAX),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// A source whose first `successes` acquisitions succeed and all later ones fail.
    pub(crate) fn failing_after(successes: usize) -> Self {
        Self {
            remaining_grants: AtomicUsize::new(successes),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Total regions acquired over the lifetime of the source.
    pub(crate) fn acquired_regions(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    /// Regions currently held (acquired and not yet released).
    pub(crate) fn live_regions(&self) -> usize {
        // Cannot underflow - a region is only released after it was acquired.
        self.acquired
            .load(Ordering::Relaxed)
            .wrapping_sub(self.released.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
impl MemorySource for FakeMemorySource {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        let granted = self
            .remaining_grants
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |grants| match grants {
                usize::MAX => Some(usize::MAX),
                grants => grants.checked_sub(1),
            })
            .is_ok();

        if !granted {
            return None;
        }

        let region = SYSTEM_SOURCE.allocate(layout)?;
        self.acquired.fetch_add(1, Ordering::Relaxed);
        Some(region)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.released.fetch_add(1, Ordering::Relaxed);

        // SAFETY: Forwarding the caller's guarantee - the region was acquired from the
        // system source in our allocate().
        unsafe { SYSTEM_SOURCE.deallocate(ptr, layout) };
    }
}

/// Routes memory source calls to either the real system source or a test fake.
///
/// Pools and arenas hold one of these instead of a generic parameter, so the fake does
/// not infect public type signatures.
#[derive(Clone, Debug)]
pub(crate) enum MemorySourceFacade {
    System(&'static SystemSource),
    #[cfg(test)]
    Fake(Arc<FakeMemorySource>),
}

impl MemorySourceFacade {
    /// The facade used by all builders unless a test substitutes a fake.
    pub(crate) fn system() -> Self {
        Self::System(&SYSTEM_SOURCE)
    }

    #[cfg(test)]
    pub(crate) fn from_fake(fake: Arc<FakeMemorySource>) -> Self {
        Self::Fake(fake)
    }
}

impl MemorySource for MemorySourceFacade {
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        match self {
            Self::System(source) => source.allocate(layout),
            #[cfg(test)]
            Self::Fake(fake) => fake.allocate(layout),
        }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        match self {
            // SAFETY: Forwarding the caller's guarantee to the underlying source.
            Self::System(source) => unsafe { source.deallocate(ptr, layout) },
            #[cfg(test)]
            // SAFETY: Forwarding the caller's guarantee to the underlying source.
            Self::Fake(fake) => unsafe { fake.deallocate(ptr, layout) },
        }
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

    #[test]
    fn system_source_round_trip() {
        let layout = Layout::from_size_align(64, 16).unwrap();

        let region = SYSTEM_SOURCE
            .allocate(layout)
            .expect("system allocator should grant a small region");

        unsafe { SYSTEM_SOURCE.deallocate(region, layout) };
    }

    #[test]
    fn fake_source_counts_regions() {
        let fake = FakeMemorySource::new();
        let layout = Layout::from_size_align(32, 16).unwrap();

        let first = fake.allocate(layout).unwrap();
        let second = fake.allocate(layout).unwrap();

        assert_eq!(fake.acquired_regions(), 2);
        assert_eq!(fake.live_regions(), 2);

        unsafe { fake.deallocate(first, layout) };

        assert_eq!(fake.live_regions(), 1);

        unsafe { fake.deallocate(second, layout) };

        assert_eq!(fake.acquired_regions(), 2);
        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    fn fake_source_fails_after_grant_limit() {
        let fake = FakeMemorySource::failing_after(1);
        let layout = Layout::from_size_align(32, 16).unwrap();

        let only = fake.allocate(layout).expect("first grant is allowed");

        assert!(fake.allocate(layout).is_none());
        assert!(fake.allocate(layout).is_none());

        unsafe { fake.deallocate(only, layout) };

        assert_eq!(fake.live_regions(), 0);
    }

    #[test]
    fn facade_routes_to_fake() {
        let fake = Arc::new(FakeMemorySource::failing_after(0));
        let facade = MemorySourceFacade::from_fake(Arc::clone(&fake));
        let layout = Layout::from_size_align(32, 16).unwrap();

        assert!(facade.allocate(layout).is_none());
        assert_eq!(fake.acquired_regions(), 0);
    }
}
