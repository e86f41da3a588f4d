//! Deterministic arena-backed memory pools with bitmap and block-header bookkeeping.
//!
//! This crate provides two families of fixed-layout allocators. Both hand out stable
//! raw pointers into arenas acquired from the global allocator in large pieces, keep
//! all bookkeeping inside the pool itself, and never move or release storage while
//! items are reserved.
//!
//! The slot family stores items of one layout in equally sized slots:
//!
//! - [`SlotSlab`] is a single fixed-capacity arena with a reservation bitmap and a
//!   rotating scan position, so consecutive allocations sweep the arena instead of
//!   piling onto recently freed slots.
//! - [`SlotPool`] chains slabs together and doubles the slab capacity on each growth,
//!   so the pool keeps accepting items until backing memory runs out.
//!
//! The block family stores variable-length runs of one item layout:
//!
//! - [`BlockArena`] is a single fixed-capacity arena carved into blocks, each preceded
//!   by an in-place header. Free blocks form a queue that is recycled in release order
//!   and coalesced when fragmentation blocks an allocation.
//! - [`BlockPool`] chains arenas together, budgeting each new arena for the running
//!   total of all capacity requested so far, so a request is never larger than the
//!   arena appended for it.
//!
//! # Key Features
//!
//! - **Layout-defined storage**: Every pool serves one [`std::alloc::Layout`] fixed at
//!   creation; callers choose which type to put behind it.
//! - **Stable addresses**: Reserved storage never moves, even while the pool grows.
//! - **Deterministic bookkeeping**: No dependence on allocator state or randomness,
//!   so identical call sequences produce identical placement.
//! - **Uniform access**: The [`RawPool`] trait lets code reserve and release storage
//!   without caring which pool family backs it.
//! - **Explicit fault reporting**: When backing memory cannot be acquired, a
//!   [`FaultHook`] receives a description before the pool panics.
//! - **Thread mobility**: Pools can move between threads but cannot be shared without
//!   synchronization.
//!
//! # Examples
//!
//! Equally sized slots through [`SlotPool`]:
//!
//! ```rust
//! use arena_pool::SlotPool;
//! use new_zealand::nz;
//!
//! let mut pool = SlotPool::builder().layout_of::<u64>().build();
//!
//! let slot = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");
//!
//! // The pool hands out raw storage; the caller decides what lives in it.
//! unsafe { slot.cast::<u64>().write(42) };
//! assert_eq!(unsafe { slot.cast::<u64>().read() }, 42);
//!
//! // SAFETY: The slot came from this pool with this count and is released once.
//! unsafe { pool.deallocate(slot, nz!(1)) };
//! ```
//!
//! Variable-length runs through [`BlockPool`]:
//!
//! ```rust
//! use arena_pool::BlockPool;
//! use new_zealand::nz;
//!
//! let mut pool = BlockPool::builder().layout_of::<u64>().build();
//!
//! // One contiguous run of ten items.
//! let run = pool.allocate(nz!(10)).expect("the pool grows until memory runs out");
//!
//! for index in 0..10 {
//!     // SAFETY: The run holds ten u64 items and `index` stays in bounds.
//!     unsafe { run.cast::<u64>().add(index).write(index as u64) };
//! }
//!
//! // SAFETY: The run came from this pool and is released once.
//! unsafe { pool.deallocate(run) };
//! ```
//!
//! Pool-agnostic code through [`RawPool`]:
//!
//! ```rust
//! use arena_pool::{BlockPool, RawPool, SlotPool};
//! use new_zealand::nz;
//!
//! fn reserve_and_release(pool: &mut impl RawPool) {
//!     let item = pool.allocate(nz!(1)).expect("the pool grows until memory runs out");
//!
//!     // SAFETY: The item came from this pool with this count and is released once.
//!     unsafe { pool.deallocate(item, nz!(1)) };
//! }
//!
//! reserve_and_release(&mut SlotPool::builder().layout_of::<u64>().build());
//! reserve_and_release(&mut BlockPool::builder().layout_of::<u64>().build());
//! ```

mod arena;
mod block_arena;
mod block_pool;
mod fault;
mod mem_source;
mod raw_pool;
mod slot_pool;
mod slot_slab;

pub use block_arena::{BlockArena, BlockArenaBuilder};
pub use block_pool::{BlockPool, BlockPoolBuilder};
pub use fault::{FaultHook, default_fault_hook};
pub use raw_pool::RawPool;
pub use slot_pool::{SlotPool, SlotPoolBuilder};
pub use slot_slab::{SlotSlab, SlotSlabBuilder};
