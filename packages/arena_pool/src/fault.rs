//! Diagnostic reporting for unrecoverable pool faults.

/// A diagnostic sink invoked when a pool cannot obtain backing memory for a new arena.
///
/// The hook receives one formatted message describing the failed acquisition and is called
/// exactly once per failure, immediately before the failure escalates to a panic. Install a
/// custom hook through a pool builder to route the message into the host application's own
/// diagnostics.
///
/// # Example
///
/// ```
/// use arena_pool::{FaultHook, SlotPool};
///
/// fn quiet_hook(_message: &str) {}
///
/// let hook: FaultHook = quiet_hook;
///
/// let pool = SlotPool::builder()
///     .layout_of::<u64>()
///     .fault_hook(hook)
///     .build();
/// # drop(pool);
/// ```
pub type FaultHook = fn(&str);

/// The default [`FaultHook`], which writes the message to standard output.
pub fn default_fault_hook(message: &str) {
    println!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hook_accepts_any_message() {
        let hook: FaultHook = default_fault_hook;

        hook("test diagnostic message");
    }
}
