//! Unbounded lock-free MPMC FIFO queue (Michael–Scott).
//!
//! A singly-linked list with atomic `head` and `tail`. `head` always points
//! at a sentinel node carrying no data; `tail` points at or one node behind
//! the true end and is helped forward by whichever operation notices the
//! lag. Unlinked nodes go through the hazard-pointer retire path.

use std::mem::MaybeUninit;
use std::sync::atomic::Ordering;

use crossbeam_utils::{Backoff, CachePadded};
use siper::{pin, retire, Atomic, Shared};

/// Hazard cell protecting the node an operation starts from.
const HP_PRIMARY: usize = 0;
/// Hazard cell protecting that node's successor across the unlink CAS.
const HP_SUCCESSOR: usize = 1;

struct Node<T> {
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Node {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }))
    }
}

/// Unbounded multi-producer multi-consumer FIFO queue.
///
/// Linearizable: FIFO order of completed pushes matches the order in which
/// their nodes were linked. Non-blocking but not wait-free: an operation may
/// retry indefinitely under contention, while some thread always completes.
///
/// The hazard registry bounds how many distinct threads may operate on any
/// queue at the same time; see [`siper::MAX_THREADS`].
pub struct MsQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T: 'static> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> MsQueue<T> {
    /// Creates an empty queue: a single sentinel node.
    pub fn new() -> MsQueue<T> {
        let sentinel = Node::sentinel();
        MsQueue {
            head: CachePadded::new(Atomic::new(sentinel)),
            tail: CachePadded::new(Atomic::new(sentinel)),
        }
    }

    /// Appends `value` at the back of the queue.
    pub fn push(&self, value: T) {
        // Allocated once; retries relink the same node.
        let node = Box::into_raw(Box::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        }));

        let guard = pin();
        let backoff = Backoff::new();
        loop {
            // The tail must be protected before `last.next` is read: a stale
            // tail may already have been unlinked and retired by a consumer.
            let last = self.tail.protect(&guard, HP_PRIMARY);
            // SAFETY: `last` is protected and was reachable when validated.
            let l = unsafe { last.deref() };
            let next = l.next.load(Ordering::Acquire, &guard);
            if self.tail.load(Ordering::Acquire, &guard) != last {
                continue;
            }

            if next.is_null() {
                // `last` is the true end; try to link the new node.
                // SAFETY: `node` is private until the CAS below publishes it.
                let new = unsafe { Shared::from_raw(node) };
                if l.next
                    .compare_exchange(
                        Shared::null(),
                        new,
                        Ordering::Release,
                        Ordering::Relaxed,
                        &guard,
                    )
                    .is_ok()
                {
                    // Best effort: a failure means someone else advanced it.
                    let _ = self.tail.compare_exchange(
                        last,
                        new,
                        Ordering::Release,
                        Ordering::Relaxed,
                        &guard,
                    );
                    return;
                }
                backoff.spin();
            } else {
                // Tail lagged behind a fully linked node; help it forward.
                let _ = self.tail.compare_exchange(
                    last,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
            }
        }
    }

    /// Removes the value at the front of the queue, or `None` if the queue
    /// is observably empty at the moment of the attempt.
    pub fn pop(&self) -> Option<T> {
        let guard = pin();
        let backoff = Backoff::new();
        loop {
            let first = self.head.protect(&guard, HP_PRIMARY);
            // SAFETY: `first` is protected and was re-read from `head` after
            // publishing.
            let f = unsafe { first.deref() };
            let last = self.tail.load(Ordering::Acquire, &guard);
            let next = f.next.load(Ordering::Acquire, &guard);
            if self.head.load(Ordering::Acquire, &guard) != first {
                continue;
            }

            if next.is_null() {
                return None;
            }

            // Protect the successor before touching its payload. Keeping
            // `first` in HP_PRIMARY through the CAS below makes the unlink
            // ABA-safe: the address cannot be freed and recycled while
            // published.
            let next = guard.publish(next, HP_SUCCESSOR);
            if self.head.load(Ordering::Acquire, &guard) != first {
                continue;
            }

            if first == last {
                // Tail points at the sentinel of a non-empty list; help it
                // forward before consuming.
                let _ = self.tail.compare_exchange(
                    last,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                continue;
            }

            if self
                .head
                .compare_exchange(first, next, Ordering::AcqRel, Ordering::Relaxed, &guard)
                .is_ok()
            {
                // SAFETY: exactly one thread wins the CAS above, and it
                // alone moves the value out of the new sentinel, which
                // HP_SUCCESSOR keeps alive.
                let value = unsafe { next.deref().value.as_ptr().read() };
                // SAFETY: `first` is unlinked and unreachable from `head`.
                unsafe { retire(first.as_raw()) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Advisory emptiness check: the result may be stale by the time the
    /// caller acts on it.
    pub fn is_empty(&self) -> bool {
        let guard = pin();
        let first = self.head.protect(&guard, HP_PRIMARY);
        // SAFETY: `first` is protected; the list always has the sentinel.
        let f = unsafe { first.deref() };
        f.next.load(Ordering::Acquire, &guard).is_null()
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the list directly, no hazard protocol.
        let mut curr = self.head.load_unprotected(Ordering::Relaxed);
        let mut is_sentinel = true;
        while !curr.is_null() {
            // SAFETY: nodes past the retire path were freed by their
            // consumers; every node still linked here is freed exactly once.
            let mut node = unsafe { Box::from_raw(curr) };
            let next = node.next.load_unprotected(Ordering::Relaxed);
            if !is_sentinel {
                // SAFETY: only the sentinel's value slot is uninitialized
                // (or already moved out by the pop that made it sentinel).
                unsafe { node.value.assume_init_drop() };
            }
            is_sentinel = false;
            curr = next;
        }
    }
}
