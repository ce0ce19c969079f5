#[cfg(not(target_pointer_width = "64"))]
compile_error!("guardheap supports only 64-bit targets.");

pub(crate) mod sync;

// public module: contains implementation details (hidden via pub(crate))
// and TEST_MUTEX (public for tests)
pub mod memory;

// the heap
pub use memory::heap::DebugHeap;

// diagnostics
pub use memory::stats::MemoryStats;

// errors
pub use memory::vm::VmError;
