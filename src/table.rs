//! The relativistic hash table: a chained hash table whose bucket array can
//! be doubled or halved without ever blocking readers.
//!
//! Readers walk bucket chains with plain acquire loads; there is no lock and
//! no allocation on the read path. The single serialized writer mutates
//! chains in place with release stores and republishes the bucket array
//! wholesale on resize, retiring the previous array only after the zone has
//! drained every reader that could still be walking it.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

#[cfg(loom)]
use loom::sync::{
    atomic::{self, Ordering},
    Arc,
};
#[cfg(not(loom))]
use std::sync::{
    atomic::{self, Ordering},
    Arc,
};

use crate::zone::RcuZone;

/// Auto-shrink is suppressed below this many elements; halving a nearly
/// empty table buys nothing and invites expand/shrink oscillation.
const SHRINK_FLOOR: usize = 128;

/// Intrusive list header embedded in a caller record.
///
/// The table stores borrowed pointers to these headers and nothing else; it
/// never allocates or frees nodes. The caller recovers its record from a
/// header reference by offset arithmetic:
///
/// ```
/// use relativistic_ht::NodeHeader;
/// use std::mem::offset_of;
///
/// struct Entry {
///     value: u64,
///     node: NodeHeader,
/// }
///
/// fn entry_of(node: &NodeHeader) -> &Entry {
///     // SAFETY: every node in this table is embedded in an `Entry`.
///     unsafe {
///         &*(node as *const NodeHeader)
///             .byte_sub(offset_of!(Entry, node))
///             .cast::<Entry>()
///     }
/// }
/// ```
///
/// Both fields are atomics, so everything the table does to a linked node
/// is interior mutation: callers may derive the insert pointer from a
/// shared reference.
pub struct NodeHeader {
    hash: atomic::AtomicU64,
    next: atomic::AtomicPtr<NodeHeader>,
}

impl NodeHeader {
    pub fn new() -> NodeHeader {
        NodeHeader {
            hash: atomic::AtomicU64::new(0),
            next: atomic::AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// The hash value this node was inserted under.
    pub fn hash(&self) -> u64 {
        self.hash.load(Ordering::Relaxed)
    }
}

impl Default for NodeHeader {
    fn default() -> NodeHeader {
        NodeHeader::new()
    }
}

/// Construction options for [`table_with`](crate::table_with).
#[derive(Clone, Debug)]
pub struct TableConfig {
    /// Initial bucket count, rounded up to a power of two.
    pub nr_buckets: usize,
    /// Shared reader-counter cells for threads that never called
    /// [`try_register_reader`](crate::try_register_reader); power-of-two
    /// rounded.
    pub nr_rcu_buckets_for_unregistered_threads: usize,
    /// Load factor (elements per bucket) above which an insert doubles the
    /// bucket array.
    pub expand_factor: f32,
    /// Load factor below which a detach halves the bucket array, once the
    /// table holds more than 128 elements.
    pub shrink_factor: f32,
}

impl Default for TableConfig {
    fn default() -> TableConfig {
        TableConfig {
            nr_buckets: 64,
            nr_rcu_buckets_for_unregistered_threads: 128,
            expand_factor: 1.1,
            shrink_factor: 0.25,
        }
    }
}

/// One immutable-size generation of the bucket array. Resizing builds and
/// publishes a whole new `BucketArray`; a published array is never grown or
/// shrunk in place.
struct BucketArray {
    mask: u64,
    buckets: Box<[atomic::AtomicPtr<NodeHeader>]>,
}

impl BucketArray {
    /// `nr_buckets` must be a power of two.
    fn alloc(nr_buckets: usize) -> Box<BucketArray> {
        debug_assert!(nr_buckets.is_power_of_two());
        Box::new(BucketArray {
            mask: nr_buckets as u64 - 1,
            buckets: (0..nr_buckets)
                .map(|_| atomic::AtomicPtr::new(ptr::null_mut()))
                .collect(),
        })
    }

    fn len(&self) -> usize {
        self.buckets.len()
    }

    fn bucket_for(&self, hash: u64) -> &atomic::AtomicPtr<NodeHeader> {
        &self.buckets[(hash & self.mask) as usize]
    }
}

/// Bucket index of a linked node under `mask`.
///
/// # Safety
///
/// `p` must point to a live `NodeHeader`.
unsafe fn hash_bucket(p: *mut NodeHeader, mask: u64) -> usize {
    ((*p).hash.load(Ordering::Relaxed) & mask) as usize
}

/// Seed the two child buckets of `src` in the doubled array: each gets the
/// first node of `src`'s chain that belongs to it, without touching any
/// `next` pointer. A reader starting from either child head reaches every
/// node of its bucket, interleaved with nodes of the sibling bucket that its
/// hash check skips.
unsafe fn init_twin_buckets(
    src: &atomic::AtomicPtr<NodeHeader>,
    dst0: &atomic::AtomicPtr<NodeHeader>,
    dst1: &atomic::AtomicPtr<NodeHeader>,
    id0: usize,
    id1: usize,
    mask: u64,
) {
    let mut first0: *mut NodeHeader = ptr::null_mut();
    let mut first1: *mut NodeHeader = ptr::null_mut();
    let mut p = src.load(Ordering::Relaxed);
    while !p.is_null() {
        let id = hash_bucket(p, mask);
        debug_assert!(id == id0 || id == id1);
        if first0.is_null() && id == id0 {
            first0 = p;
        } else if first1.is_null() && id == id1 {
            first1 = p;
        }
        if !first0.is_null() && !first1.is_null() {
            break;
        }
        p = (*p).next.load(Ordering::Relaxed);
    }
    dst0.store(first0, Ordering::Release);
    dst1.store(first1, Ordering::Release);
}

/// Position `src`'s head (writer-private scratch by now) on the last node of
/// its chain's first same-bucket run, i.e. the node whose successor is the
/// first to hash elsewhere under `mask`. Returns `false` when the whole
/// chain already lands in one bucket and needs no unzipping.
unsafe fn find_first_unzip_point(src: &atomic::AtomicPtr<NodeHeader>, mask: u64) -> bool {
    let mut p = src.load(Ordering::Relaxed);
    let initial = hash_bucket(p, mask);
    loop {
        let next = (*p).next.load(Ordering::Relaxed);
        if next.is_null() {
            p = ptr::null_mut();
            break;
        }
        if hash_bucket(next, mask) != initial {
            break;
        }
        p = next;
    }
    src.store(p, Ordering::Release);
    !p.is_null()
}

/// Set up the unzip cursor of every non-empty old bucket. Returns whether
/// any bucket actually needs unzipping.
unsafe fn find_first_unzip_starts(old: &BucketArray, mask_new: u64) -> bool {
    let mut any = false;
    for src in old.buckets.iter() {
        if !src.load(Ordering::Relaxed).is_null() && find_first_unzip_point(src, mask_new) {
            any = true;
        }
    }
    any
}

/// Detach one foreign run from the chain behind `src`'s cursor.
///
/// A pre-split chain is a zipper of runs that alternate between the two
/// child buckets, e.g. (a/A to one bucket, b/B to the other, capitals mark
/// run ends):
///
/// ```text
///   a a A b b B a a ...
/// ```
///
/// The cursor sits on `A`, the last node still reached only through `A`'s
/// own child head. `A`'s successors `b b B` belong to the sibling bucket.
/// This step finds the end of that foreign run (`B`) and the node after it
/// (the next `a`, the boundary), then:
///
/// 1. advances the cursor to `B`, and
/// 2. points `A.next` at the boundary, so walkers from `A`'s head skip the
///    foreign run.
///
/// After this store, a reader that came through the sibling head may still
/// be inside `b b B`; the caller must let a grace period elapse before the
/// next step rewrites pointers further down, or such a reader could miss
/// nodes it owns. When the chain tail is reached instead of a boundary, the
/// bucket's unzipping is complete and its cursor is cleared.
unsafe fn unzip_one_segment(src: &atomic::AtomicPtr<NodeHeader>, mask: u64) {
    let seg_end = src.load(Ordering::Relaxed);
    debug_assert!(!seg_end.is_null());
    let seg_bucket = hash_bucket(seg_end, mask);

    let mut other_end = (*seg_end).next.load(Ordering::Relaxed);
    debug_assert!(!other_end.is_null());
    debug_assert_ne!(hash_bucket(other_end, mask), seg_bucket);

    let mut boundary;
    loop {
        boundary = (*other_end).next.load(Ordering::Relaxed);
        if boundary.is_null() {
            other_end = ptr::null_mut();
            break;
        }
        if hash_bucket(boundary, mask) == seg_bucket {
            break;
        }
        other_end = boundary;
    }

    src.store(other_end, Ordering::Release);
    (*seg_end).next.store(boundary, Ordering::Release);
}

/// Iteratively separate every old chain into its two child chains, one
/// segment per bucket per pass, with one grace period between passes.
unsafe fn unzip(old: &BucketArray, mask_new: u64, zone: &RcuZone) {
    loop {
        let mut all_finished = true;
        for src in old.buckets.iter() {
            if !src.load(Ordering::Relaxed).is_null() {
                all_finished = false;
                unzip_one_segment(src, mask_new);
            }
        }
        if all_finished {
            break;
        }
        // Readers that entered through a sibling head may still be walking
        // a run we just unlinked; they must drain before the next pass
        // rewrites pointers downstream of it.
        zone.synchronize();
    }
}

/// Merge the chains of `src0` and `src1` into `dst`: splice `src1`'s chain
/// onto `src0`'s tail. Readers mid-walk in chain 0 simply continue into
/// chain 1's nodes, which are hash-valid for the coarser mask.
unsafe fn splice_buckets(
    src0: &atomic::AtomicPtr<NodeHeader>,
    src1: &atomic::AtomicPtr<NodeHeader>,
    dst: &atomic::AtomicPtr<NodeHeader>,
) {
    let first0 = src0.load(Ordering::Relaxed);
    let first1 = src1.load(Ordering::Relaxed);

    if first1.is_null() {
        dst.store(first0, Ordering::Release);
        return;
    }
    if first0.is_null() {
        dst.store(first1, Ordering::Release);
        return;
    }

    let mut last0 = first0;
    loop {
        let next = (*last0).next.load(Ordering::Relaxed);
        if next.is_null() {
            break;
        }
        last0 = next;
    }
    (*last0).next.store(first1, Ordering::Release);
    dst.store(first0, Ordering::Release);
}

/// The table proper: current bucket array plus resize bookkeeping.
///
/// Reads are safe from any thread inside a reader critical section of the
/// associated zone. All other methods assume the caller is the one
/// serialized writer; the public [`TableWriter`] enforces that with `&mut`
/// receivers.
pub(crate) struct TableCore {
    size: atomic::AtomicUsize,
    expand_factor: f32,
    shrink_factor: f32,
    buckets: atomic::AtomicPtr<BucketArray>,
}

impl TableCore {
    pub(crate) fn new(conf: &TableConfig) -> TableCore {
        let nr_buckets = conf.nr_buckets.max(1).next_power_of_two();
        TableCore {
            size: atomic::AtomicUsize::new(0),
            expand_factor: conf.expand_factor,
            shrink_factor: conf.shrink_factor,
            buckets: atomic::AtomicPtr::new(Box::into_raw(BucketArray::alloc(nr_buckets))),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// # Safety
    ///
    /// Caller is inside a reader critical section of the table's zone, or
    /// is the serialized writer.
    pub(crate) unsafe fn nr_buckets(&self) -> usize {
        (*self.buckets.load(Ordering::Acquire)).len()
    }

    /// Walk the bucket chain for `hash` and return the first node matching
    /// both the hash and `eq`.
    ///
    /// # Safety
    ///
    /// Caller is inside a reader critical section of the table's zone (or
    /// is the serialized writer); the returned pointer is valid until that
    /// section closes.
    pub(crate) unsafe fn find(
        &self,
        hash: u64,
        mut eq: impl FnMut(&NodeHeader) -> bool,
    ) -> Option<NonNull<NodeHeader>> {
        let arr = &*self.buckets.load(Ordering::Acquire);
        let mut p = arr.bucket_for(hash).load(Ordering::Acquire);
        while !p.is_null() {
            let node = &*p;
            if node.hash.load(Ordering::Relaxed) == hash && eq(node) {
                return NonNull::new(p);
            }
            p = node.next.load(Ordering::Acquire);
        }
        None
    }

    /// Prepend `node` to its bucket unless `eq` finds a duplicate there.
    /// Does not expand.
    ///
    /// # Safety
    ///
    /// Serialized writer; `node` satisfies the insert contract spelled out
    /// on [`crate::TableWriter::try_insert`].
    pub(crate) unsafe fn try_insert(
        &self,
        node: NonNull<NodeHeader>,
        hash: u64,
        mut eq: impl FnMut(&NodeHeader) -> bool,
    ) -> bool {
        // Relaxed: only the writer replaces the array, and that writer is us.
        let arr = &*self.buckets.load(Ordering::Relaxed);
        let head = arr.bucket_for(hash);
        let first = head.load(Ordering::Relaxed);

        let mut p = first;
        while !p.is_null() {
            let existing = &*p;
            if existing.hash.load(Ordering::Relaxed) == hash && eq(existing) {
                return false;
            }
            p = existing.next.load(Ordering::Relaxed);
        }

        self.link_front(node, hash, head, first);
        true
    }

    /// Unchecked prepend: the caller asserts no duplicate exists. Does not
    /// expand.
    ///
    /// # Safety
    ///
    /// As [`TableCore::try_insert`].
    pub(crate) unsafe fn insert_unchecked(&self, node: NonNull<NodeHeader>, hash: u64) {
        let arr = &*self.buckets.load(Ordering::Relaxed);
        let head = arr.bucket_for(hash);
        let first = head.load(Ordering::Relaxed);
        self.link_front(node, hash, head, first);
    }

    unsafe fn link_front(
        &self,
        node: NonNull<NodeHeader>,
        hash: u64,
        head: &atomic::AtomicPtr<NodeHeader>,
        first: *mut NodeHeader,
    ) {
        let node_ref = node.as_ref();
        node_ref.hash.store(hash, Ordering::Relaxed);
        // Release on both stores: a reader that observes the new head must
        // also observe the node's hash and next.
        node_ref.next.store(first, Ordering::Release);
        head.store(node.as_ptr(), Ordering::Release);
        self.size.fetch_add(1, Ordering::Relaxed);
    }

    /// Unlink and return the first node matching `hash` and `pred`.
    ///
    /// The unlinked node's `next` may still be observed by in-flight
    /// readers until the next grace period.
    ///
    /// # Safety
    ///
    /// Serialized writer.
    pub(crate) unsafe fn try_detach(
        &self,
        hash: u64,
        mut pred: impl FnMut(&NodeHeader) -> bool,
    ) -> Option<NonNull<NodeHeader>> {
        let arr = &*self.buckets.load(Ordering::Acquire);
        let mut prev = arr.bucket_for(hash);
        let mut p = prev.load(Ordering::Relaxed);
        while !p.is_null() {
            let node = &*p;
            let next = node.next.load(Ordering::Relaxed);
            if node.hash.load(Ordering::Relaxed) == hash && pred(node) {
                prev.store(next, Ordering::Release);
                self.size.fetch_sub(1, Ordering::Relaxed);
                return NonNull::new(p);
            }
            prev = &node.next;
            p = next;
        }
        None
    }

    /// Double the bucket array.
    ///
    /// Publishes a pre-linked doubled array, drains readers off the old
    /// one, then unzips the shared chains in place, one grace period per
    /// pass. The old array is retired once fully unzipped.
    ///
    /// # Safety
    ///
    /// Serialized writer.
    pub(crate) unsafe fn expand2x(&self, zone: &RcuZone) {
        let old_ptr = self.buckets.load(Ordering::Relaxed);
        let old = &*old_ptr;
        let nr_old = old.len();
        let mask_new = (nr_old as u64 * 2) - 1;

        let new_arr = BucketArray::alloc(nr_old * 2);
        for i in 0..nr_old {
            init_twin_buckets(
                &old.buckets[i],
                &new_arr.buckets[i],
                &new_arr.buckets[i + nr_old],
                i,
                i + nr_old,
                mask_new,
            );
        }

        self.buckets.store(Box::into_raw(new_arr), Ordering::Release);
        // The old heads become writer-private unzip cursors next; no reader
        // may still be starting walks from them.
        zone.synchronize();

        if find_first_unzip_starts(old, mask_new) {
            unzip(old, mask_new, zone);
        }

        // SAFETY: allocated by `BucketArray::alloc`, unpublished since the
        // store above, and the chains no longer thread through its heads.
        drop(Box::from_raw(old_ptr));
    }

    /// Halve the bucket array by splicing sibling chains. Returns `false`
    /// at one bucket. Synchronizes once before retiring the old array.
    ///
    /// # Safety
    ///
    /// Serialized writer.
    pub(crate) unsafe fn shrink2x(&self, zone: &RcuZone) -> bool {
        let old_ptr = self.buckets.load(Ordering::Relaxed);
        let old = &*old_ptr;
        let nr_new = old.len() / 2;
        if nr_new == 0 {
            return false;
        }

        let new_arr = BucketArray::alloc(nr_new);
        for i in 0..nr_new {
            splice_buckets(
                &old.buckets[i],
                &old.buckets[i + nr_new],
                &new_arr.buckets[i],
            );
        }

        self.buckets.store(Box::into_raw(new_arr), Ordering::Release);
        zone.synchronize();
        // SAFETY: as in `expand2x`; the spliced chains bypass the old heads.
        drop(Box::from_raw(old_ptr));
        true
    }

    /// # Safety
    ///
    /// Serialized writer.
    pub(crate) unsafe fn expand_if_necessary(&self, zone: &RcuZone) {
        let size = self.size.load(Ordering::Relaxed);
        let nr_buckets = (*self.buckets.load(Ordering::Relaxed)).len();
        if size as f32 > self.expand_factor * nr_buckets as f32 {
            self.expand2x(zone);
        }
    }

    /// Returns whether a shrink (and therefore a grace period) happened.
    ///
    /// # Safety
    ///
    /// Serialized writer.
    pub(crate) unsafe fn shrink_if_necessary(&self, zone: &RcuZone) -> bool {
        let size = self.size.load(Ordering::Relaxed);
        let nr_buckets = (*self.buckets.load(Ordering::Relaxed)).len();
        if (size as f32) < self.shrink_factor * nr_buckets as f32 && size > SHRINK_FLOOR {
            self.shrink2x(zone)
        } else {
            false
        }
    }
}

impl Drop for TableCore {
    fn drop(&mut self) {
        // SAFETY: no readers or writer can exist once drop runs; the array
        // was allocated by `BucketArray::alloc` and never freed elsewhere.
        let p = self.buckets.load(Ordering::Relaxed);
        if !p.is_null() {
            drop(unsafe { Box::from_raw(p) });
        }
    }
}

pub(crate) struct Shared {
    pub(crate) core: TableCore,
    pub(crate) zone: RcuZone,
}

/// Write handle for a table. Exactly one exists per table.
///
/// Mutating methods take `&mut self`, so a single handle cannot race with
/// itself; if multiple writer threads are needed, wrap this in a mutex.
pub struct TableWriter {
    pub(crate) shared: Arc<Shared>,
}

/// Read handle for a table; clone one per reader thread, or share it.
#[derive(Clone)]
pub struct TableReader {
    pub(crate) shared: Arc<Shared>,
}

/// Result of [`TableWriter::try_detach_auto_shrink`].
pub struct Detached {
    /// The unlinked node.
    pub node: NonNull<NodeHeader>,
    /// Whether a grace period already elapsed (because the detach triggered
    /// a shrink); if `true` the node is immediately safe to reclaim.
    pub synchronized: bool,
}

impl TableWriter {
    /// Obtain another read handle for this table.
    pub fn reader(&self) -> TableReader {
        TableReader {
            shared: self.shared.clone(),
        }
    }

    /// Open a read critical section from the writer's side.
    ///
    /// While the guard lives, `&mut self` methods cannot be called, so the
    /// "never synchronize inside your own read section" rule is enforced by
    /// the borrow checker.
    pub fn read(&self) -> ReadGuard<'_> {
        ReadGuard::open(&self.shared)
    }

    /// Insert `node` under `hash` unless `eq` accepts an existing node in
    /// the same bucket (only nodes with an equal stored hash are offered to
    /// `eq`). Returns `false` on duplicate. May double the bucket array when
    /// the load factor crosses the configured expand factor.
    ///
    /// # Safety
    ///
    /// The node must stay alive and pinned until it has been detached *and*
    /// a subsequent grace period has elapsed; it must not be linked into any
    /// table already; while linked, the caller must not access its header
    /// other than through this crate.
    pub unsafe fn try_insert(
        &mut self,
        node: NonNull<NodeHeader>,
        hash: u64,
        eq: impl FnMut(&NodeHeader) -> bool,
    ) -> bool {
        if !self.shared.core.try_insert(node, hash, eq) {
            return false;
        }
        self.shared.core.expand_if_necessary(&self.shared.zone);
        true
    }

    /// Prepend `node` without a duplicate scan; the caller asserts
    /// uniqueness. Never expands.
    ///
    /// # Safety
    ///
    /// As [`try_insert`](TableWriter::try_insert), plus: no node equal to
    /// this one is present.
    pub unsafe fn insert_unchecked(&mut self, node: NonNull<NodeHeader>, hash: u64) {
        self.shared.core.insert_unchecked(node, hash);
    }

    /// Unlink and return the first node matching `hash` and `pred`, without
    /// shrinking or synchronizing. The node may only be reclaimed after a
    /// later [`synchronize`](TableWriter::synchronize); batching several
    /// detaches before one synchronize is the intended use.
    pub fn try_detach(
        &mut self,
        hash: u64,
        pred: impl FnMut(&NodeHeader) -> bool,
    ) -> Option<NonNull<NodeHeader>> {
        // SAFETY: `&mut self` is the serialized writer.
        unsafe { self.shared.core.try_detach(hash, pred) }
    }

    /// As [`try_detach`](TableWriter::try_detach), but may halve the bucket
    /// array when the load factor falls under the configured shrink factor.
    /// The returned [`Detached::synchronized`] reports whether that shrink's
    /// grace period already makes the node safe to reclaim.
    pub fn try_detach_auto_shrink(
        &mut self,
        hash: u64,
        pred: impl FnMut(&NodeHeader) -> bool,
    ) -> Option<Detached> {
        let node = self.try_detach(hash, pred)?;
        // SAFETY: `&mut self` is the serialized writer.
        let synchronized = unsafe { self.shared.core.shrink_if_necessary(&self.shared.zone) };
        Some(Detached { node, synchronized })
    }

    /// Detach plus a guaranteed grace period: when this returns a node, the
    /// caller may reclaim it immediately.
    pub fn try_detach_and_synchronize(
        &mut self,
        hash: u64,
        pred: impl FnMut(&NodeHeader) -> bool,
    ) -> Option<NonNull<NodeHeader>> {
        let Detached { node, synchronized } = self.try_detach_auto_shrink(hash, pred)?;
        if !synchronized {
            self.shared.zone.synchronize();
        }
        Some(node)
    }

    /// Double the bucket array now, regardless of load factor.
    pub fn expand2x(&mut self) {
        // SAFETY: `&mut self` is the serialized writer.
        unsafe { self.shared.core.expand2x(&self.shared.zone) }
    }

    /// Halve the bucket array now, regardless of load factor. Returns
    /// `false` if the table is already at one bucket.
    pub fn shrink2x(&mut self) -> bool {
        // SAFETY: `&mut self` is the serialized writer.
        unsafe { self.shared.core.shrink2x(&self.shared.zone) }
    }

    /// Wait out every reader critical section currently open on this
    /// table's zone; afterwards, all previously detached nodes are safe to
    /// reclaim.
    pub fn synchronize(&mut self) {
        self.shared.zone.synchronize();
    }

    /// Advisory element count (relaxed counter; transiently drifts).
    pub fn len(&self) -> usize {
        self.shared.core.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bucket-array width.
    pub fn nr_buckets(&self) -> usize {
        // SAFETY: only `&mut self` methods replace the array, and they
        // cannot run concurrently with this borrow.
        unsafe { self.shared.core.nr_buckets() }
    }
}

impl TableReader {
    /// Open a read critical section. All lookups happen through the
    /// returned guard.
    pub fn read(&self) -> ReadGuard<'_> {
        ReadGuard::open(&self.shared)
    }
}

/// A read critical section on a table.
///
/// Found nodes borrow the guard, so they cannot outlive it:
///
/// ```compile_fail
/// let (writer, reader) = relativistic_ht::table();
/// let stale = {
///     let guard = reader.read();
///     guard.find(1, |_| true)
/// }; // error: `guard` does not live long enough
/// ```
///
/// Not `Send`: the section must be closed on the thread that opened it.
pub struct ReadGuard<'a> {
    shared: &'a Shared,
    epoch: i64,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ReadGuard<'a> {
    fn open(shared: &'a Shared) -> ReadGuard<'a> {
        ReadGuard {
            shared,
            epoch: shared.zone.reader_enter(),
            _not_send: PhantomData,
        }
    }

    /// Return the first node whose stored hash equals `hash` and which
    /// `eq` accepts. Lock-free; never allocates.
    pub fn find(&self, hash: u64, eq: impl FnMut(&NodeHeader) -> bool) -> Option<&NodeHeader> {
        // SAFETY: this guard holds a read critical section open for the
        // table's zone; the node stays reachable until the guard drops.
        unsafe { self.shared.core.find(hash, eq).map(|p| &*p.as_ptr()) }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.shared.zone.reader_exit(self.epoch);
    }
}
