// Synchronization primitives, switchable between std and loom.
//
// Everything in the crate that synchronizes goes through this module so the
// loom build (`RUSTFLAGS="--cfg loom"`) sees every atomic and lock. A direct
// `use std::sync::atomic::*` anywhere else would hide that site from loom's
// scheduler and silently weaken the model tests.
//
// Only the primitives this crate actually uses are re-exported: the
// reentrancy counter (AtomicU32), the stats gauges (AtomicIsize), the heap
// state cell, and what the test suites need on top.
#![allow(unused_imports, unused_macros)]

// ---------------------------------------------------------------------------
// atomic
// ---------------------------------------------------------------------------
pub(crate) mod atomic {
    #[cfg(loom)]
    pub(crate) use loom::sync::atomic::{AtomicIsize, AtomicU32, Ordering};

    #[cfg(not(loom))]
    pub(crate) use std::sync::atomic::{AtomicIsize, AtomicU32, Ordering};
}

// ---------------------------------------------------------------------------
// sync (Mutex, Arc, RwLock)
// ---------------------------------------------------------------------------
#[cfg(loom)]
pub(crate) use loom::sync::{Arc, Mutex, RwLock};

#[cfg(not(loom))]
pub(crate) use std::sync::{Arc, Mutex, RwLock};

// Barrier is only needed by the std test suite (the guard-trip race test);
// the loom models build their orderings out of spawn/join edges instead, so
// no loom-side shim is carried.
#[cfg(not(loom))]
pub(crate) use std::sync::Barrier;

// ---------------------------------------------------------------------------
// cell (UnsafeCell)
// ---------------------------------------------------------------------------
pub(crate) mod cell {
    #[cfg(loom)]
    pub(crate) use loom::cell::UnsafeCell;

    #[cfg(not(loom))]
    pub(crate) use std::cell::UnsafeCell;
}

/// Exclusive access to an `UnsafeCell`'s contents as `&mut T`.
///
/// std's `UnsafeCell::get` hands back `*mut T`; loom's returns a tracked
/// wrapper that only exposes the pointer inside `with_mut`. This macro papers
/// over the difference so the heap reads the same under both.
///
/// # Safety
/// Caller must guarantee exclusive access (same as `UnsafeCell::get`).
macro_rules! unsafe_cell_get_mut {
    ($cell:expr) => {{
        #[cfg(not(loom))]
        {
            // Safety: upheld by caller.
            unsafe { &mut *$cell.get() }
        }
        #[cfg(loom)]
        {
            // Safety: upheld by caller.
            unsafe { $cell.with_mut(|p| &mut *p) }
        }
    }};
}
pub(crate) use unsafe_cell_get_mut;

// ---------------------------------------------------------------------------
// thread
// ---------------------------------------------------------------------------
pub(crate) mod thread {
    #[cfg(loom)]
    pub(crate) use loom::thread::spawn;

    #[cfg(not(loom))]
    pub(crate) use std::thread::spawn;
}

// ---------------------------------------------------------------------------
// Static initialisation
// ---------------------------------------------------------------------------

/// Declare a `static` holding an atomic or lock.
///
/// Under std the constructors are `const`, so a plain static works. loom's
/// are not, and its statics must be re-created for every model run, which
/// `loom::lazy_static!` takes care of. One macro covers both the gauge
/// counters and the test lock; this crate has no other statics.
///
/// Usage: `static_sync! { [pub] static NAME: Type = init_expr; }`
#[allow(unused_macro_rules)]
macro_rules! static_sync {
    (pub static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        pub static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            pub static ref $NAME: $Ty = $init;
        }
    };
    (static $NAME:ident : $Ty:ty = $init:expr ;) => {
        #[cfg(not(loom))]
        static $NAME: $Ty = $init;

        #[cfg(loom)]
        loom::lazy_static! {
            static ref $NAME: $Ty = $init;
        }
    };
}
pub(crate) use static_sync;
