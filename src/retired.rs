//! Per-thread lists of retired nodes awaiting safe reclamation.
//!
//! A retired node has been unlinked from its structure but may still be
//! referenced by another thread's published hazard. The list is owned by a
//! single thread; it grows on that thread's retirements and shrinks only
//! during that thread's own scans.

use crate::registry::Registry;

/// An unlinked allocation with its type-erased free function.
pub(crate) struct Retired {
    addr: usize,
    free_fn: unsafe fn(usize),
}

impl Retired {
    /// Wrap an unlinked pointer for deferred deallocation.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must already be unreachable
    /// from shared memory. Subsumes the requirements of [`Box::from_raw`].
    pub(crate) unsafe fn new<T: 'static>(ptr: *mut T) -> Self {
        unsafe fn free<T>(addr: usize) {
            // SAFETY: `addr` was produced by `Retired::new` from a
            // `Box<T>` and is freed exactly once, by this call.
            unsafe { drop(Box::from_raw(addr as *mut T)) }
        }
        Self {
            addr: ptr as usize,
            free_fn: free::<T>,
        }
    }
}

/// The owning thread's buffer of retired nodes.
pub(crate) struct RetireList {
    nodes: Vec<Retired>,
    scratch: Vec<usize>,
}

impl RetireList {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, node: Retired) {
        self.nodes.push(node);
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// One reclamation pass: snapshot the registry, free every node whose
    /// address is not published, keep the rest for the next pass.
    ///
    /// Never blocks and never fails; under sustained protection a node can
    /// survive any number of passes.
    pub(crate) fn scan(&mut self, registry: &Registry) {
        let RetireList { nodes, scratch } = self;
        registry.snapshot(scratch);
        nodes.retain(|node| {
            if scratch.binary_search(&node.addr).is_ok() {
                return true;
            }
            // SAFETY: the node is unreachable from shared memory (retired)
            // and no hazard names it at scan time.
            unsafe { (node.free_fn)(node.addr) };
            false
        });
    }
}

impl Drop for RetireList {
    /// Teardown frees survivors without consulting the registry. By the time
    /// the owning thread unwinds its locals, the structures these nodes came
    /// from must no longer be concurrently reachable.
    fn drop(&mut self) {
        for node in self.nodes.drain(..) {
            // SAFETY: retired nodes are freed exactly once; no concurrent
            // readers remain at teardown.
            unsafe { (node.free_fn)(node.addr) };
        }
    }
}
