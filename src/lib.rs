//! Relativistic hash table: many lock-free readers, one serialized writer,
//! and a bucket array that grows and shrinks by powers of two without ever
//! blocking the readers.
//!
//! Readers and the writer can disagree about which bucket array is current
//! during a resize; both views stay traversable and complete the whole
//! time. That is the "relativistic" part, and it rests on a userspace RCU
//! scheme: readers announce critical sections on an epoch counter ring, and
//! the writer waits for older epochs to drain before it reuses or frees
//! anything a reader might still hold.
//!
//! - Reading is lock-free and allocation-free: one epoch-cell increment on
//!   entry, acquire loads along the chain, one decrement on exit. Threads
//!   that call [`try_register_reader`] get a contention-free counter cell.
//! - Writing (insert/detach/resize) assumes a single writer. One
//!   [`TableWriter`] exists per table and its mutating methods take
//!   `&mut self`; wrap it in a mutex if several threads must write.
//! - The table is intrusive: callers embed a [`NodeHeader`] in their own
//!   records and supply the hash. The table performs no hashing, owns no
//!   nodes, and never allocates on the hot path.
//! - Reclamation is deferred: a detached node may be freed or reused only
//!   after a grace period ([`TableWriter::synchronize`], or the
//!   `*_and_synchronize` / auto-shrink conveniences).
//!
//! A standalone [`RcuZone`] is also exported for protecting other
//! single-writer data with the same enter/exit/synchronize discipline.
//!
//! # Example
//!
//! ```
//! use relativistic_ht::{table, NodeHeader};
//! use std::mem::offset_of;
//! use std::ptr::NonNull;
//!
//! struct Entry {
//!     value: u64,
//!     node: NodeHeader,
//! }
//!
//! fn entry_of(node: &NodeHeader) -> &Entry {
//!     // SAFETY: every node in this table is embedded in an `Entry`.
//!     unsafe {
//!         &*(node as *const NodeHeader)
//!             .byte_sub(offset_of!(Entry, node))
//!             .cast::<Entry>()
//!     }
//! }
//!
//! // Caller-owned records; they must outlive their table membership.
//! let entries: Vec<Entry> = (0..4)
//!     .map(|value| Entry { value, node: NodeHeader::new() })
//!     .collect();
//!
//! let (mut writer, reader) = table();
//! for entry in &entries {
//!     // SAFETY: `entries` outlives the handles and is never moved.
//!     let inserted = unsafe {
//!         writer.try_insert(NonNull::from(&entry.node), entry.value, |n| {
//!             entry_of(n).value == entry.value
//!         })
//!     };
//!     assert!(inserted);
//! }
//!
//! let guard = reader.read();
//! let found = guard.find(3, |n| entry_of(n).value == 3).unwrap();
//! assert_eq!(entry_of(found).value, 3);
//! drop(guard);
//!
//! // Detach plus grace period: the record could now be reclaimed.
//! let detached = writer.try_detach_and_synchronize(3, |n| entry_of(n).value == 3);
//! assert!(detached.is_some());
//! ```

#[cfg(loom)]
use loom::sync::Arc;
#[cfg(not(loom))]
use std::sync::Arc;

mod table;
mod zone;

pub use table::{Detached, NodeHeader, ReadGuard, TableConfig, TableReader, TableWriter};
pub use zone::{nr_registered_slots, try_register_reader, RcuZone, ZoneGuard};

/// Create a table with the default [`TableConfig`].
pub fn table() -> (TableWriter, TableReader) {
    table_with(TableConfig::default())
}

/// Create a table with explicit configuration, returning its unique write
/// handle and a first read handle.
pub fn table_with(conf: TableConfig) -> (TableWriter, TableReader) {
    let shared = Arc::new(table::Shared {
        core: table::TableCore::new(&conf),
        zone: RcuZone::new(conf.nr_rcu_buckets_for_unregistered_threads),
    });
    (
        TableWriter {
            shared: shared.clone(),
        },
        TableReader { shared },
    )
}
