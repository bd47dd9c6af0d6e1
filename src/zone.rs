//! Epoch-based quiescence detection.
//!
//! An [`RcuZone`] is one synchronization unit: readers bracket their access
//! to zone-protected pointers with [`RcuZone::reader_enter`] /
//! [`RcuZone::reader_exit`] (or the RAII [`RcuZone::enter`]), and the writer
//! calls [`RcuZone::synchronize`] to wait until every critical section that
//! was open at the start of the call has closed. Once `synchronize` returns,
//! anything the writer unlinked before the call can be reclaimed.
//!
//! Reader presence is counted in a two-row ring of cache-line-padded
//! counters. A reader picks one cell per critical section: registered
//! threads own a private cell, everyone else shares a pool indexed by a hash
//! of the thread id. The writer never blocks readers; readers never block
//! each other.

use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::OnceLock;

use crossbeam_utils::CachePadded;

#[cfg(loom)]
use loom::{
    sync::atomic::{self, Ordering},
    thread,
};
#[cfg(not(loom))]
use std::{
    sync::atomic::{self, Ordering},
    thread,
};

/// Two epoch rows: the one being drained and the one new readers land in.
const MAX_EPOCHS: usize = 2;
const EPOCH_MASK: i64 = MAX_EPOCHS as i64 - 1;

/// Hash-bucket count used by [`RcuZone::default`], per hardware thread.
const BUCKETS_PER_HARDWARE_THREAD: usize = 64;

// The slot counter is process-global bookkeeping that outlives any loom
// iteration, so it stays on a std atomic even under loom.
static NEXT_SLOT_ID: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

// Per-thread state must follow loom's notion of a thread: the model checker
// reuses OS threads across explored permutations, so a std thread-local
// would leak slot ids between logically distinct threads.
#[cfg(loom)]
loom::thread_local! {
    /// Slot id of the current thread, or -1 if it never registered.
    static TLS_SLOT_ID: Cell<isize> = Cell::new(-1);
}
#[cfg(not(loom))]
std::thread_local! {
    /// Slot id of the current thread, or -1 if it never registered.
    static TLS_SLOT_ID: Cell<isize> = const { Cell::new(-1) };
}

/// Upper bound on concurrently registered reader threads, fixed for the
/// life of the process: the hardware concurrency rounded up to a power of
/// two. Every zone allocates this many private reader cells per epoch row.
pub fn nr_registered_slots() -> usize {
    static SLOTS: OnceLock<usize> = OnceLock::new();
    *SLOTS.get_or_init(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .next_power_of_two()
    })
}

/// Claim a private reader cell for the calling thread.
///
/// Registered threads never contend with other readers on their counter
/// cell; unregistered threads share a hashed pool. Returns `false` if this
/// thread already registered or the registry is full; that is a soft signal
/// either way, reads keep working through the shared pool.
///
/// Registration is permanent: slot ids are handed out monotonically and are
/// not recycled when a thread exits. Do not call this between
/// [`RcuZone::reader_enter`] and [`RcuZone::reader_exit`]; the exit must
/// pick the same cell the enter did.
pub fn try_register_reader() -> bool {
    TLS_SLOT_ID.with(|slot| {
        if slot.get() != -1 {
            return false;
        }
        // Relaxed: ids only need to be unique, nothing is published through
        // this counter.
        let id = NEXT_SLOT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if id >= nr_registered_slots() {
            return false;
        }
        slot.set(id as isize);
        true
    })
}

/// One epoch-based RCU synchronization unit.
///
/// What a zone protects is up to the caller; typically it guards pointers
/// that a single writer republishes and retires. Multiple zones are
/// independent; nesting the read sides of distinct zones follows the same
/// deadlock discipline as nested reader-writer locks. Within one zone, a
/// thread must not nest `reader_enter` nor call `synchronize` from inside
/// its own critical section.
///
/// `synchronize` is a writer-side operation and callers must serialize it
/// externally, exactly like the write side of a reader-writer lock.
pub struct RcuZone {
    nr_hash_buckets: usize,
    cells_per_epoch: usize,
    /// `MAX_EPOCHS` rows of `cells_per_epoch` counters, flattened.
    cells: Box<[CachePadded<atomic::AtomicI64>]>,
    epoch_latest: atomic::AtomicI64,
    /// Only the synchronizing writer touches this; it is atomic so that a
    /// misused (unserialized) writer corrupts timing, not memory.
    epoch_oldest: atomic::AtomicI64,
}

impl RcuZone {
    /// Create a zone with `nr_hash_buckets` shared cells for unregistered
    /// reader threads, rounded up to a power of two (minimum 1).
    pub fn new(nr_hash_buckets: usize) -> RcuZone {
        let nr_hash_buckets = nr_hash_buckets.max(1).next_power_of_two();
        let cells_per_epoch = nr_registered_slots() + nr_hash_buckets;
        let cells = (0..MAX_EPOCHS * cells_per_epoch)
            .map(|_| CachePadded::new(atomic::AtomicI64::new(0)))
            .collect();
        RcuZone {
            nr_hash_buckets,
            cells_per_epoch,
            cells,
            epoch_latest: atomic::AtomicI64::new(0),
            epoch_oldest: atomic::AtomicI64::new(0),
        }
    }

    fn cell(&self, epoch: i64, index: usize) -> &atomic::AtomicI64 {
        let row = (epoch & EPOCH_MASK) as usize;
        &self.cells[row * self.cells_per_epoch + index]
    }

    /// Cell index for the calling thread: its private slot if registered,
    /// otherwise one of the shared cells picked by hashing the thread id.
    fn reader_cell_index(&self) -> usize {
        let slot = TLS_SLOT_ID.with(Cell::get);
        if slot >= 0 {
            return slot as usize;
        }
        // TODO: cache the hashed id in a thread-local instead of rehashing
        // the thread id on every enter/exit.
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        nr_registered_slots() + (hasher.finish() as usize & (self.nr_hash_buckets - 1))
    }

    /// Open a read-side critical section and return the epoch token that
    /// must be handed back to [`reader_exit`](RcuZone::reader_exit) on the
    /// same thread. Prefer [`enter`](RcuZone::enter) unless the section
    /// cannot be scoped.
    ///
    /// Lock-free: the loop only retries when the writer advanced the epoch
    /// between our load and our increment, and each epoch advance is a
    /// one-shot event per `synchronize`.
    pub fn reader_enter(&self) -> i64 {
        let index = self.reader_cell_index();
        loop {
            // Relaxed is fine here: the revalidation below does the acquire.
            let epoch = self.epoch_latest.load(Ordering::Relaxed);
            let cell = self.cell(epoch, index);
            cell.fetch_add(1, Ordering::AcqRel);

            if self.epoch_latest.load(Ordering::Acquire) == epoch {
                return epoch;
            }
            // The writer bumped the epoch after our first load; our count
            // sits in a row synchronize may already have stopped watching.
            // Back out and count ourselves in the fresh row instead.
            cell.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Close the critical section opened by the [`reader_enter`] that
    /// returned `epoch`. Must run on the entering thread.
    ///
    /// [`reader_enter`]: RcuZone::reader_enter
    pub fn reader_exit(&self, epoch: i64) {
        let index = self.reader_cell_index();
        let prev = self.cell(epoch, index).fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "reader_exit without a matching reader_enter");
    }

    /// Open a scoped critical section; the section closes when the guard
    /// drops.
    pub fn enter(&self) -> ZoneGuard<'_> {
        ZoneGuard {
            zone: self,
            epoch: self.reader_enter(),
            _not_send: PhantomData,
        }
    }

    /// Wait until every reader critical section that was open when this
    /// call began has closed.
    ///
    /// Writer-side; callers serialize it externally. Spins (yielding) while
    /// draining, bounded by the longest concurrent reader critical section;
    /// a reader that never exits will stall this forever.
    pub fn synchronize(&self) {
        // Publishes "a new epoch begins": readers entering after this point
        // count in the other row and are none of our business.
        let last_epoch = self.epoch_latest.fetch_add(1, Ordering::Release);

        let mut oldest = self.epoch_oldest.load(Ordering::Relaxed);
        while oldest <= last_epoch {
            let row = (oldest & EPOCH_MASK) as usize;
            let base = row * self.cells_per_epoch;
            for cell in &self.cells[base..base + self.cells_per_epoch] {
                while cell.load(Ordering::Acquire) > 0 {
                    thread::yield_now();
                }
            }
            oldest += 1;
            self.epoch_oldest.store(oldest, Ordering::Relaxed);
        }
    }
}

impl Default for RcuZone {
    /// A zone sized for the current machine:
    /// `hardware concurrency * 64` shared cells for unregistered threads.
    fn default() -> RcuZone {
        let nr_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        RcuZone::new(nr_threads * BUCKETS_PER_HARDWARE_THREAD)
    }
}

/// A read-side critical section, closed on drop.
///
/// Not `Send`: the exit must decrement the same per-thread cell the enter
/// incremented.
pub struct ZoneGuard<'a> {
    zone: &'a RcuZone,
    epoch: i64,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ZoneGuard<'_> {
    fn drop(&mut self) {
        self.zone.reader_exit(self.epoch);
    }
}
