//! Atomic pointer types for hazard-protected structures.
//!
//! [`Atomic<T>`] is a shared link mutated only through atomic operations;
//! [`Shared<'g, T>`] is a loaded pointer whose validity is tied to a
//! [`Guard`]. [`Atomic::protect`] runs the publish-then-revalidate loop that
//! makes a loaded pointer safe to dereference.

use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::guard::Guard;
use crate::registry;

/// An atomic pointer to a heap-allocated `T`.
pub struct Atomic<T> {
    data: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for Atomic<T> {}
unsafe impl<T: Send + Sync> Sync for Atomic<T> {}

impl<T> Atomic<T> {
    /// Creates an atomic pointer holding `ptr`.
    #[inline]
    pub fn new(ptr: *mut T) -> Self {
        Self {
            data: AtomicUsize::new(ptr as usize),
            _marker: PhantomData,
        }
    }

    /// Creates a null atomic pointer.
    #[inline]
    pub fn null() -> Self {
        Self::new(ptr::null_mut())
    }

    /// Loads the pointer.
    ///
    /// The result is **not** protected; dereferencing it is only sound if
    /// the node is pinned through some other published hazard. Use
    /// [`protect`](Self::protect) when the node itself must stay alive.
    #[inline]
    pub fn load<'g>(&self, order: Ordering, _guard: &'g Guard) -> Shared<'g, T> {
        Shared {
            data: self.data.load(order) as *mut T,
            _marker: PhantomData,
        }
    }

    /// Loads the pointer and publishes it in hazard cell `hp`, retrying
    /// until the publication is validated against a re-read.
    ///
    /// On return the pointed-to node cannot be freed while the guard lives
    /// (or until the cell is overwritten), so dereferencing it is safe as
    /// long as it was reachable when loaded.
    pub fn protect<'g>(&self, guard: &'g Guard, hp: usize) -> Shared<'g, T> {
        assert!(
            hp < crate::HAZARDS_PER_THREAD,
            "siper: hazard cell index {hp} out of range (HAZARDS_PER_THREAD = {})",
            crate::HAZARDS_PER_THREAD
        );
        let registry = registry::global();
        let mut cur = self.data.load(Ordering::Acquire);
        loop {
            registry.publish(guard.slot(), hp, cur);
            let again = self.data.load(Ordering::Acquire);
            if again == cur {
                return Shared {
                    data: cur as *mut T,
                    _marker: PhantomData,
                };
            }
            // The published address may already be stale; re-announce.
            cur = again;
        }
    }

    /// Loads the raw pointer without a guard.
    ///
    /// For paths that hold exclusive access to the structure (construction,
    /// drop), where the hazard protocol is unnecessary.
    #[inline]
    pub fn load_unprotected(&self, order: Ordering) -> *mut T {
        self.data.load(order) as *mut T
    }

    /// Stores `ptr` into the atomic.
    #[inline]
    pub fn store(&self, ptr: Shared<'_, T>, order: Ordering) {
        self.data.store(ptr.data as usize, order);
    }

    /// Swaps the pointer, returning the previous value.
    #[inline]
    pub fn swap<'g>(&self, new: Shared<'_, T>, order: Ordering, _guard: &Guard) -> Shared<'g, T> {
        Shared {
            data: self.data.swap(new.data as usize, order) as *mut T,
            _marker: PhantomData,
        }
    }

    /// Compares and exchanges the pointer.
    #[inline]
    pub fn compare_exchange<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _guard: &'g Guard,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        match self.data.compare_exchange(
            current.data as usize,
            new.data as usize,
            success,
            failure,
        ) {
            Ok(prev) => Ok(Shared {
                data: prev as *mut T,
                _marker: PhantomData,
            }),
            Err(prev) => Err(Shared {
                data: prev as *mut T,
                _marker: PhantomData,
            }),
        }
    }

    /// Weak variant of [`compare_exchange`](Self::compare_exchange); may
    /// fail spuriously.
    #[inline]
    pub fn compare_exchange_weak<'g>(
        &self,
        current: Shared<'_, T>,
        new: Shared<'_, T>,
        success: Ordering,
        failure: Ordering,
        _guard: &'g Guard,
    ) -> Result<Shared<'g, T>, Shared<'g, T>> {
        match self.data.compare_exchange_weak(
            current.data as usize,
            new.data as usize,
            success,
            failure,
        ) {
            Ok(prev) => Ok(Shared {
                data: prev as *mut T,
                _marker: PhantomData,
            }),
            Err(prev) => Err(Shared {
                data: prev as *mut T,
                _marker: PhantomData,
            }),
        }
    }
}

impl<T> Default for Atomic<T> {
    fn default() -> Self {
        Self::null()
    }
}

/// A pointer loaded under a guard.
///
/// Carries the guard's lifetime; whether it may be dereferenced depends on
/// how it was obtained (see [`Atomic::protect`] versus [`Atomic::load`]).
pub struct Shared<'g, T> {
    data: *mut T,
    _marker: PhantomData<(&'g Guard, *mut T)>,
}

impl<'g, T> Shared<'g, T> {
    /// Creates a shared pointer from a raw pointer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the pointer stays valid for as long as it is
    /// dereferenced through this value.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            data: ptr,
            _marker: PhantomData,
        }
    }

    /// The null shared pointer.
    #[inline]
    pub fn null() -> Self {
        Self {
            data: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Returns the raw pointer.
    #[inline]
    pub fn as_raw(&self) -> *mut T {
        self.data
    }

    /// Returns true if the pointer is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// Converts to an optional reference.
    ///
    /// # Safety
    ///
    /// The pointed-to node must be protected by a published hazard (or
    /// otherwise guaranteed alive) for the reference's lifetime.
    #[inline]
    pub unsafe fn as_ref(&self) -> Option<&'g T> {
        if self.is_null() {
            None
        } else {
            // SAFETY: forwarded from the caller.
            unsafe { Some(&*self.data) }
        }
    }

    /// Dereferences without a null check.
    ///
    /// # Safety
    ///
    /// The pointer must be non-null and the node protected, as for
    /// [`as_ref`](Self::as_ref).
    #[inline]
    pub unsafe fn deref(&self) -> &'g T {
        // SAFETY: forwarded from the caller.
        unsafe { &*self.data }
    }
}

impl<'g, T> Clone for Shared<'g, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'g, T> Copy for Shared<'g, T> {}

impl<'g, T> PartialEq for Shared<'g, T> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<'g, T> Eq for Shared<'g, T> {}

impl<'g, T> core::fmt::Debug for Shared<'g, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Shared({:p})", self.data)
    }
}
