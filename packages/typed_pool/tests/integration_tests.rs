//! Integration tests for the `typed_pool` package.
//!
//! These tests drive the typed facades through their public APIs, combining them
//! with the engines from `arena_pool` the way calling code would.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::thread;

use arena_pool::{SlotPool, SlotSlab};
use new_zealand::nz;
use typed_pool::{ObjectPool, PoolRegistry};

#[derive(Clone, Debug, Eq, PartialEq)]
struct Payload {
    id: u64,
    name: String,
}

#[test]
fn object_pool_round_trips_heap_owning_values() {
    let mut pool = ObjectPool::<Payload>::new();

    let prototype = Payload {
        id: 7,
        name: "seven".to_string(),
    };

    let run = pool
        .create(nz!(4), &prototype)
        .expect("the default engine grows on demand");

    for index in 0..4 {
        let element = unsafe { run.add(index).as_ref() };
        assert_eq!(element, &prototype);
    }

    assert_eq!(pool.len(), 1);
    assert!(pool.contains(run));

    unsafe { pool.destroy(run, nz!(4)) };

    assert!(pool.is_empty());
}

#[test]
fn object_pool_factories_build_distinct_values() {
    let mut pool = ObjectPool::<Payload>::new();

    let run = pool
        .create_with(nz!(3), |index| Payload {
            id: u64::try_from(index).unwrap(),
            name: format!("element {index}"),
        })
        .expect("the default engine grows on demand");

    for index in 0..3 {
        let element = unsafe { run.add(index).as_ref() };
        assert_eq!(element.id, u64::try_from(index).unwrap());
        assert_eq!(element.name, format!("element {index}"));
    }

    unsafe { pool.destroy(run, nz!(3)) };
}

#[test]
fn object_pool_accepts_any_engine() {
    let engine = SlotPool::builder()
        .layout_of::<String>()
        .initial_capacity(nz!(4))
        .build();
    let mut pool = ObjectPool::over(engine);

    let run = pool
        .create(nz!(2), &"slot backed".to_string())
        .expect("the engine grows on demand");

    assert_eq!(unsafe { run.as_ref() }, "slot backed");

    unsafe { pool.destroy(run, nz!(2)) };

    // A fixed-capacity engine reports exhaustion as None instead of growing.
    let slab = SlotSlab::builder()
        .layout_of::<String>()
        .capacity(nz!(1))
        .build();
    let mut bounded = ObjectPool::over(slab);

    assert!(bounded.create(nz!(2), &"too big".to_string()).is_none());

    let single = bounded
        .create(nz!(1), &"fits".to_string())
        .expect("the slab has one slot");

    unsafe { bounded.destroy(single, nz!(1)) };
}

#[test]
fn registry_serves_many_types_at_once() {
    let mut registry = PoolRegistry::new();

    registry.register::<u64>(nz!(8));
    registry.register::<[u8; 32]>(nz!(2));
    registry.register::<Payload>(nz!(4));

    assert_eq!(registry.registered_type_count(), 3);

    let number = registry.allocate::<u64>(nz!(1)).unwrap();
    let buffer = registry.allocate::<[u8; 32]>(nz!(1)).unwrap();
    let payload_slot = registry.allocate::<Payload>(nz!(1)).unwrap();

    unsafe { number.write(u64::MAX) };
    unsafe { buffer.write([0xAB; 32]) };
    unsafe {
        payload_slot.write(Payload {
            id: 1,
            name: "registered".to_string(),
        });
    }

    assert_eq!(unsafe { number.read() }, u64::MAX);
    assert_eq!(unsafe { buffer.read() }, [0xAB; 32]);
    assert_eq!(unsafe { payload_slot.as_ref() }.name, "registered");
    assert_eq!(registry.len(), 3);

    // The payload owns heap memory, so it is dropped in place before release.
    unsafe { payload_slot.drop_in_place() };

    unsafe { registry.deallocate::<u64>(number, nz!(1)) };
    unsafe { registry.deallocate::<[u8; 32]>(buffer, nz!(1)) };
    unsafe { registry.deallocate::<Payload>(payload_slot, nz!(1)) };

    assert!(registry.is_empty());
}

#[test]
fn registry_pools_grow_independently() {
    let mut registry = PoolRegistry::new();

    registry.register::<u64>(nz!(2));
    registry.register::<u32>(nz!(2));

    let wide: Vec<_> = (0..20)
        .map(|_| registry.allocate::<u64>(nz!(1)).unwrap())
        .collect();
    let narrow = registry.allocate::<u32>(nz!(1)).unwrap();

    assert_eq!(registry.len(), 21);

    for slot in wide {
        unsafe { registry.deallocate::<u64>(slot, nz!(1)) };
    }
    unsafe { registry.deallocate::<u32>(narrow, nz!(1)) };

    assert!(registry.is_empty());
}

#[test]
fn facades_move_between_threads() {
    let mut pool = ObjectPool::<u64>::new();
    let mut registry = PoolRegistry::new();
    registry.register::<u64>(nz!(4));

    thread::spawn(move || {
        let run = pool
            .create(nz!(2), &11)
            .expect("the default engine grows on demand");
        unsafe { pool.destroy(run, nz!(2)) };

        let slot = registry.allocate::<u64>(nz!(1)).unwrap();
        unsafe { registry.deallocate::<u64>(slot, nz!(1)) };
    })
    .join()
    .unwrap();
}
