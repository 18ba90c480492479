//! Thread handles, guards, and retirement.
//!
//! Each thread lazily claims one registry record on its first operation and
//! keeps it until the thread exits, at which point the record is recycled.
//! A [`Guard`] represents the thread's active use of its hazard cells; while
//! one exists, any [`Shared`] pointer protected through it stays valid.

use core::marker::PhantomData;
use std::cell::{Cell, RefCell};

use crate::atomic::Shared;
use crate::registry::{self, HAZARDS_PER_THREAD};
use crate::retired::{Retired, RetireList};

/// Number of retired nodes a thread accumulates before it scans the
/// registry. Amortizes the snapshot cost over many retirements.
const SCAN_THRESHOLD: usize = 64;

/// Per-thread state: the claimed registry slot and the retire list.
struct Handle {
    slot: usize,
    pinned: Cell<bool>,
    retired: RefCell<RetireList>,
}

impl Handle {
    fn new() -> Self {
        Self {
            slot: registry::global().claim(),
            pinned: Cell::new(false),
            retired: RefCell::new(RetireList::new()),
        }
    }

    fn pin(&self) -> Guard {
        assert!(
            !self.pinned.replace(true),
            "siper: a guard is already active on this thread; \
             guards share the thread's hazard cells and must not nest"
        );
        Guard {
            slot: self.slot,
            _not_send: PhantomData,
        }
    }

    fn retire(&self, node: Retired) {
        let mut retired = self.retired.borrow_mut();
        retired.push(node);
        if retired.len() >= SCAN_THRESHOLD {
            retired.scan(registry::global());
        }
    }

    fn collect(&self) {
        self.retired.borrow_mut().scan(registry::global());
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // Final scan first; whatever survives it is freed unconditionally
        // by `RetireList::drop` once this handle unwinds.
        self.retired.get_mut().scan(registry::global());
        registry::global().release(self.slot);
    }
}

std::thread_local! {
    static HANDLE: Handle = Handle::new();
}

/// RAII token for the calling thread's hazard cells.
///
/// At most one guard may be live per thread at a time; [`pin`] panics
/// otherwise. Dropping the guard clears every cell it may have published.
pub struct Guard {
    slot: usize,
    _not_send: PhantomData<*mut ()>,
}

impl Guard {
    #[inline]
    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    /// Publish a raw protection for `ptr` in hazard cell `hp`.
    ///
    /// This alone does not make the pointer safe to dereference: the caller
    /// must revalidate that the node is still reachable after publishing
    /// (for the common load-and-validate loop, use
    /// [`Atomic::protect`](crate::Atomic::protect) instead).
    #[inline]
    pub fn publish<'g, T>(&'g self, ptr: Shared<'_, T>, hp: usize) -> Shared<'g, T> {
        assert!(
            hp < HAZARDS_PER_THREAD,
            "siper: hazard cell index {hp} out of range (HAZARDS_PER_THREAD = {HAZARDS_PER_THREAD})"
        );
        registry::global().publish(self.slot, hp, ptr.as_raw() as usize);
        // SAFETY: same raw pointer, rebound to this guard's lifetime.
        unsafe { Shared::from_raw(ptr.as_raw()) }
    }

    /// Clear hazard cell `hp`, equivalent to publishing null.
    #[inline]
    pub fn clear(&self, hp: usize) {
        assert!(
            hp < HAZARDS_PER_THREAD,
            "siper: hazard cell index {hp} out of range (HAZARDS_PER_THREAD = {HAZARDS_PER_THREAD})"
        );
        registry::global().clear(self.slot, hp);
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let registry = registry::global();
        for hp in 0..HAZARDS_PER_THREAD {
            registry.clear(self.slot, hp);
        }
        // The handle may already be gone if the guard is dropped during
        // thread teardown.
        let _ = HANDLE.try_with(|handle| handle.pinned.set(false));
    }
}

/// Bind the calling thread's hazard cells to a new [`Guard`].
///
/// Claims a registry slot on the thread's first call. Panics if the registry
/// is exhausted or if another guard is already live on this thread.
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|handle| handle.pin())
}

/// Hand an unlinked allocation to the calling thread's retire list.
///
/// Once the list reaches its threshold a reclamation scan runs synchronously
/// before this call returns.
///
/// # Safety
///
/// `ptr` must come from `Box::into_raw`, must already be unreachable from
/// shared memory, and must not be accessed again except through a hazard
/// published before it was unlinked.
#[inline]
pub unsafe fn retire<T: 'static>(ptr: *mut T) {
    // SAFETY: forwarded from the caller.
    let node = unsafe { Retired::new(ptr) };
    HANDLE.with(|handle| handle.retire(node));
}

/// Force a reclamation pass on the calling thread's retire list.
///
/// Frees every retired node no hazard currently names. Not required for
/// correctness; the threshold in [`retire`] triggers scans automatically.
#[inline]
pub fn collect() {
    HANDLE.with(|handle| handle.collect());
}
