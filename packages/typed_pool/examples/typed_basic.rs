//! Basic usage example for `ObjectPool` and `PoolRegistry`.
//!
//! This example demonstrates typed construct/destroy semantics over pooled storage
//! and a registry that gives each type its own pool.

use new_zealand::nz;
use typed_pool::{ObjectPool, PoolRegistry};

fn main() {
    // An object pool constructs values in place inside pooled storage.
    let mut pool = ObjectPool::<String>::new();

    let greetings = pool
        .create(nz!(3), &"hello".to_string())
        .expect("the default engine grows until memory runs out");

    println!("Constructed 3 strings in pooled storage");

    for index in 0..3 {
        // SAFETY: Three strings were constructed above and `index` stays in bounds.
        let text = unsafe { greetings.add(index).as_ref() };
        println!("Element {index}: {text}");
    }

    // A factory builds each element individually.
    let numbered = pool
        .create_with(nz!(2), |index| format!("element number {index}"))
        .expect("the default engine grows until memory runs out");

    // SAFETY: Two strings were constructed above.
    let first_numbered = unsafe { numbered.as_ref() };
    println!("Factory built: {first_numbered}");

    println!("Pool tracks {} reservations", pool.len());

    // Destruction drops each element, then returns the storage to the pool.
    // SAFETY: Same pool, same count, all elements still live.
    unsafe { pool.destroy(greetings, nz!(3)) };
    // SAFETY: Same as above.
    unsafe { pool.destroy(numbered, nz!(2)) };

    assert!(pool.is_empty());
    println!("All objects destroyed, pool is empty");

    // A registry serves many unrelated types from one facility.
    let mut registry = PoolRegistry::new();

    registry.register::<u64>(nz!(16));
    registry.register::<[u8; 16]>(nz!(8));

    println!("Registered {} types", registry.registered_type_count());

    let counter = registry
        .allocate::<u64>(nz!(1))
        .expect("the per-type pool grows until memory runs out");
    let scratch = registry
        .allocate::<[u8; 16]>(nz!(1))
        .expect("the per-type pool grows until memory runs out");

    // The registry hands out raw storage; the caller decides what lives in it.
    // SAFETY: The slot holds storage for one u64.
    unsafe { counter.write(42) };
    // SAFETY: The slot holds storage for one 16 byte array.
    unsafe { scratch.write([7; 16]) };

    // SAFETY: The slot was initialized above and stays reserved.
    let counted = unsafe { counter.read() };
    println!("Registry-backed counter holds {counted}");

    // Registration is idempotent; the existing pool and its contents are kept.
    registry.register::<u64>(nz!(999));
    // SAFETY: The slot is still reserved and still holds its value.
    assert_eq!(unsafe { counter.read() }, 42);

    // SAFETY: Each slot came from this registry under its type with this count.
    unsafe { registry.deallocate::<u64>(counter, nz!(1)) };
    // SAFETY: Same as above.
    unsafe { registry.deallocate::<[u8; 16]>(scratch, nz!(1)) };

    assert!(registry.is_empty());
    println!("typed_pool example completed successfully!");
}
