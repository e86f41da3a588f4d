//! Typed facades over the untyped pools of `arena_pool`.
//!
//! The engines in `arena_pool` reserve and release raw storage without knowing what
//! lives in it. This crate adds two typed layers on top of them:
//!
//! - [`ObjectPool`] turns reservations into live values: elements are constructed in
//!   place only after a reservation succeeds and dropped in place before the storage
//!   is returned. The engine defaults to [`arena_pool::BlockPool`] and can be any
//!   [`arena_pool::RawPool`].
//! - [`PoolRegistry`] maps each registered type's [`std::any::TypeId`] to a dedicated
//!   [`arena_pool::SlotPool`], so arbitrarily many unrelated types share one facility
//!   at the cost of one identity-keyed lookup per call.
//!
//! # Example
//!
//! ```rust
//! use new_zealand::nz;
//! use typed_pool::ObjectPool;
//!
//! let mut pool = ObjectPool::<String>::new();
//!
//! // Reserve and construct in one call; nothing is constructed on failure.
//! let words = pool
//!     .create(nz!(2), &"ready".to_string())
//!     .expect("the default engine grows until memory runs out");
//!
//! // SAFETY: Two strings were just constructed at this address.
//! assert_eq!(unsafe { words.as_ref() }, "ready");
//!
//! // SAFETY: Same pool, same count, both elements still live.
//! unsafe { pool.destroy(words, nz!(2)) };
//! ```
//!
//! ```rust
//! use new_zealand::nz;
//! use typed_pool::PoolRegistry;
//!
//! let mut registry = PoolRegistry::new();
//!
//! // Each registered type gets its own pool, created once.
//! registry.register::<u32>(nz!(64));
//! registry.register::<[u8; 48]>(nz!(8));
//!
//! let counter = registry
//!     .allocate::<u32>(nz!(1))
//!     .expect("the per-type pool grows until memory runs out");
//!
//! unsafe { counter.write(1) };
//!
//! // SAFETY: The storage came from this registry under u32 with this count.
//! unsafe { registry.deallocate::<u32>(counter, nz!(1)) };
//! ```

mod object_pool;
mod registry;

pub use object_pool::ObjectPool;
pub use registry::PoolRegistry;
