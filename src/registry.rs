//! Process-wide hazard pointer registry.
//!
//! A fixed table of cache-padded thread records. Each record carries a claim
//! word and a small group of hazard cells. A thread claims one record on its
//! first operation and publishes the address it is about to dereference into
//! one of its cells; the reclamation scan reads every claimed record to
//! decide which retired nodes must survive the pass.

use core::sync::atomic::{fence, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use once_cell::race::OnceBox;

/// Maximum number of threads that may hold a registry slot at the same time.
///
/// This is a hard capacity limit: [`claim`](Registry::claim) panics once the
/// table is exhausted. Slots are recycled when their owning thread exits.
pub const MAX_THREADS: usize = 128;

/// Hazard cells per thread record.
///
/// Two are needed by list-based structures: one for the node an operation
/// starts from, one for its successor while the first is being unlinked.
/// Protecting both across the unlink CAS is what keeps that CAS ABA-safe.
pub const HAZARDS_PER_THREAD: usize = 2;

/// Claim word sentinel: record is unclaimed.
const FREE: usize = usize::MAX;
/// Claim word value while a thread owns the record.
const CLAIMED: usize = 1;

struct ThreadRecord {
    active: AtomicUsize,
    hazards: [AtomicUsize; HAZARDS_PER_THREAD],
}

impl ThreadRecord {
    fn new() -> Self {
        Self {
            active: AtomicUsize::new(FREE),
            hazards: core::array::from_fn(|_| AtomicUsize::new(0)),
        }
    }
}

/// The fixed hazard table.
pub(crate) struct Registry {
    records: Box<[CachePadded<ThreadRecord>]>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        let mut records = Vec::with_capacity(MAX_THREADS);
        for _ in 0..MAX_THREADS {
            records.push(CachePadded::new(ThreadRecord::new()));
        }
        Self {
            records: records.into_boxed_slice(),
        }
    }

    /// Claim an unowned record and return its index.
    ///
    /// Called once per thread, lazily. Panics when every record is claimed:
    /// the table size bounds the number of concurrently participating
    /// threads, and running out of slots is a configuration error, not a
    /// recoverable condition.
    pub(crate) fn claim(&self) -> usize {
        for (idx, record) in self.records.iter().enumerate() {
            if record
                .active
                .compare_exchange(FREE, CLAIMED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                for hazard in &record.hazards {
                    hazard.store(0, Ordering::Release);
                }
                return idx;
            }
        }
        panic!("siper: hazard registry exhausted (MAX_THREADS = {MAX_THREADS})");
    }

    /// Return a record to the free pool when its owning thread tears down.
    pub(crate) fn release(&self, slot: usize) {
        let record = &self.records[slot];
        for hazard in &record.hazards {
            hazard.store(0, Ordering::Release);
        }
        record.active.store(FREE, Ordering::Release);
    }

    /// Announce that the owning thread is about to dereference `addr`.
    ///
    /// The release store makes the publication visible to scanners; the
    /// trailing fence pairs with the fence in [`snapshot`](Self::snapshot) so
    /// that either the scanner observes this hazard or the publisher's
    /// revalidating load observes the unlink.
    #[inline]
    pub(crate) fn publish(&self, slot: usize, hp: usize, addr: usize) {
        self.records[slot].hazards[hp].store(addr, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Equivalent to publishing the null address.
    #[inline]
    pub(crate) fn clear(&self, slot: usize, hp: usize) {
        self.records[slot].hazards[hp].store(0, Ordering::Release);
    }

    /// Collect every published non-null address into `out`, sorted so the
    /// caller can binary-search it.
    ///
    /// A publication racing with the scan may be missed; that is handled by
    /// the publisher's own revalidation protocol, not here.
    pub(crate) fn snapshot(&self, out: &mut Vec<usize>) {
        fence(Ordering::SeqCst);
        out.clear();
        for record in self.records.iter() {
            if record.active.load(Ordering::Acquire) == FREE {
                continue;
            }
            for hazard in &record.hazards {
                let addr = hazard.load(Ordering::Acquire);
                if addr != 0 {
                    out.push(addr);
                }
            }
        }
        out.sort_unstable();
    }
}

static REGISTRY: OnceBox<Registry> = OnceBox::new();

/// The process-wide registry, initialized on first use.
#[inline]
pub(crate) fn global() -> &'static Registry {
    REGISTRY.get_or_init(|| Box::new(Registry::new()))
}
