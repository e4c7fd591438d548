#![no_std]
//! # rcblock: shared and weak pointers with a separate control block
//!
//! rcblock provides a single-threaded reference-counting pointer pair built
//! around an explicit control block, in the spirit of C++'s `shared_ptr` and
//! `weak_ptr`:
//!
//! - [`Shared<T>`] is an owning handle. The managed object lives as long as
//!   at least one `Shared` referencing it is alive.
//! - [`Weak<T>`] is an observer handle. It never keeps the object alive, but
//!   it can tell whether the object is gone and [`lock`](Weak::lock) it into
//!   a new `Shared` while it is not.
//!
//! Unlike the standard library's `Rc`, the object does not have to live in
//! the same allocation as the counters. A control block comes in two shapes:
//!
//! - **in-place**: [`Shared::new`] and [`make_shared`] allocate the counters
//!   and the object together, one allocation in total.
//! - **separate**: [`Shared::from_box`] and [`Shared::from_raw_with`] adopt an
//!   object that was allocated somewhere else, together with a disposer that
//!   is invoked exactly once when the last owner goes away.
//!
//! Both shapes are erased behind the same handle type, and every handle caches
//! the address of the object it points at. That makes it possible to build a
//! `Shared<U>` that views a part of, or a trait object over, a `Shared<T>`
//! while sharing its counts (see [`Shared::map`]).
//!
//! ## Handles can be null
//!
//! Both handles have a null state ([`Shared::null`], [`Weak::new`]). A null
//! `Shared` reports a [`use_count`](Shared::use_count) of zero and panics when
//! dereferenced; use [`Shared::get`] to borrow without panicking.
//!
//! ## Lifetimes
//!
//! - the object is destroyed when the strong count drops to zero,
//! - the control block is freed when both the strong and the weak count are
//!   zero, whichever of the two reaches zero last.
//!
//! ### Features
//!
//! The counter width follows the pointer width. With the default
//! `usize-for-small-platforms` feature 64-bit targets use 32-bit counters and
//! every other target uses `usize`. Disabling default features selects 16-bit
//! counters on 32-bit platforms and 8-bit counters on 16-bit platforms.
//!
//! The `log` feature emits `trace` records through the [`log`] facade when a
//! managed object is destroyed and when a control block is freed.
//!
//! [`log`]: https://docs.rs/log

#![warn(missing_docs, missing_debug_implementations)]
extern crate alloc;

#[cfg(target_pointer_width = "64")]
pub(crate) use u32 as ucount;

#[cfg(all(
    not(target_pointer_width = "64"),
    feature = "usize-for-small-platforms"
))]
pub(crate) use usize as ucount;

#[cfg(all(
    target_pointer_width = "32",
    not(feature = "usize-for-small-platforms")
))]
pub(crate) use u16 as ucount;

#[cfg(all(
    target_pointer_width = "16",
    not(feature = "usize-for-small-platforms")
))]
pub(crate) use u8 as ucount;

#[cfg(all(target_pointer_width = "8", not(feature = "usize-for-small-platforms")))]
pub(crate) use usize as ucount;

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        {
            log::trace!($($arg)*);
        }
    };
}

mod block;
mod error;
mod shared;
mod weak;

pub use error::AllocError;
pub use shared::*;
pub use weak::*;
