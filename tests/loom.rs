#![cfg(loom)]

use loom::cell::UnsafeCell;
use loom::sync::atomic::{AtomicUsize, Ordering};
use loom::sync::Arc;
use loom::thread;

use relativistic_ht::RcuZone;

#[test]
fn loom_synchronize_idles_without_readers() {
    loom::model(|| {
        let zone = RcuZone::new(1);
        zone.synchronize();
        zone.synchronize();
    });
}

/// The classic RCU shape: unpublish a cell, synchronize, then mutate it.
/// Loom's `UnsafeCell` access tracking fails the model if a reader's access
/// to the retired cell can overlap the writer's post-grace-period mutation,
/// i.e. if `synchronize` can return while a pre-existing critical section
/// is still open.
#[test]
fn loom_drained_reader_never_overlaps_retirement() {
    loom::model(|| {
        let zone = Arc::new(RcuZone::new(1));
        let active = Arc::new(AtomicUsize::new(0));
        let cells = Arc::new([UnsafeCell::new(0u64), UnsafeCell::new(0u64)]);

        let reader = {
            let zone = Arc::clone(&zone);
            let active = Arc::clone(&active);
            let cells = Arc::clone(&cells);
            thread::spawn(move || {
                for _ in 0..2 {
                    let token = zone.reader_enter();
                    let i = active.load(Ordering::Acquire);
                    cells[i].with(|p| unsafe { p.read() });
                    zone.reader_exit(token);
                }
            })
        };

        // retire cell 0: unpublish it, wait out the readers, then reuse it
        active.store(1, Ordering::Release);
        zone.synchronize();
        cells[0].with_mut(|p| unsafe { p.write(1) });

        reader.join().unwrap();
    });
}
