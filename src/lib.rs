//! Siper: hazard-pointer memory reclamation for lock-free data structures.
//!
//! A thread announces the address it is about to dereference in a fixed,
//! process-wide registry; unlinked nodes go to the unlinking thread's retire
//! list and are freed only once a registry scan shows no announcement names
//! them. This trades a bounded per-thread publication cost for reclamation
//! safety without reference counting, without blocking readers, and without
//! the ABA hazard of naive reuse.
//!
//! # Key properties
//!
//! - **Lock-free**: operations may retry under contention, but some thread
//!   always makes progress; nothing blocks or sleeps.
//! - **Bounded registration**: at most [`MAX_THREADS`] threads participate
//!   at once; slots are recycled when threads exit.
//! - **Amortized scans**: retirements are batched, so the registry is
//!   scanned once per threshold-many retirements.
//!
//! # Example
//!
//! ```rust,ignore
//! use siper::{pin, retire, Atomic};
//! use std::sync::atomic::Ordering;
//!
//! let atomic = Atomic::new(Box::into_raw(Box::new(42)));
//!
//! let guard = pin();
//! // Publish-and-revalidate; safe to dereference afterwards.
//! let ptr = atomic.protect(&guard, 0);
//! if let Some(value) = unsafe { ptr.as_ref() } {
//!     assert_eq!(*value, 42);
//! }
//! drop(guard);
//!
//! // Unlink, then hand to the reclamation system.
//! let guard = pin();
//! let old = atomic.swap(siper::Shared::null(), Ordering::AcqRel, &guard);
//! unsafe { retire(old.as_raw()) };
//! ```

#![warn(missing_docs)]

mod atomic;
mod guard;
mod registry;
mod retired;

pub use atomic::{Atomic, Shared};
pub use guard::{collect, pin, retire, Guard};
pub use registry::{HAZARDS_PER_THREAD, MAX_THREADS};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
