use relativistic_ht::{nr_registered_slots, try_register_reader, RcuZone};
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn synchronize_without_readers() {
    let zone = RcuZone::new(8);
    zone.synchronize();
    zone.synchronize();

    let token = zone.reader_enter();
    zone.reader_exit(token);
    zone.synchronize();
}

#[test]
fn interleaved_sections_and_grace_periods() {
    let zone = RcuZone::new(4);
    for _ in 0..100 {
        let token = zone.reader_enter();
        zone.reader_exit(token);
        zone.synchronize();
    }
}

#[test]
fn synchronize_waits_for_open_section() {
    let zone = RcuZone::new(8);
    let entered = AtomicBool::new(false);
    let exit = AtomicBool::new(false);
    let synced = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let guard = zone.enter();
            entered.store(true, Ordering::Release);
            while !exit.load(Ordering::Acquire) {
                thread::yield_now();
            }
            drop(guard);
        });
        s.spawn(|| {
            while !entered.load(Ordering::Acquire) {
                thread::yield_now();
            }
            zone.synchronize();
            synced.store(true, Ordering::Release);
        });

        while !entered.load(Ordering::Acquire) {
            thread::yield_now();
        }
        // give the synchronizer ample time to (wrongly) slip past the reader
        thread::sleep(Duration::from_millis(50));
        assert!(
            !synced.load(Ordering::Acquire),
            "synchronize returned while a reader was still inside"
        );
        exit.store(true, Ordering::Release);
    });
    assert!(synced.load(Ordering::Acquire));
}

/// The writer rotates a published pointer, synchronizes, then poisons and
/// frees the retired value. Readers dereference through critical sections
/// and must never observe the poison.
#[test]
fn pointer_rotation_under_readers() {
    const POISON: u64 = u64::MAX;
    const ROUNDS: u64 = 400;

    let zone = RcuZone::new(64);
    let current = AtomicPtr::new(Box::into_raw(Box::new(0u64)));
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        for i in 0..4 {
            let zone = &zone;
            let current = &current;
            let done = &done;
            s.spawn(move || {
                // half the readers through private cells, half hashed
                if i % 2 == 0 {
                    try_register_reader();
                }
                while !done.load(Ordering::Acquire) {
                    let token = zone.reader_enter();
                    let p = current.load(Ordering::Acquire);
                    // SAFETY: published values are only freed after a grace
                    // period; our critical section is open.
                    let v = unsafe { *p };
                    assert_ne!(v, POISON, "dereferenced a retired value");
                    zone.reader_exit(token);
                }
            });
        }

        for k in 1..=ROUNDS {
            let fresh = Box::into_raw(Box::new(k));
            let old = current.load(Ordering::Relaxed);
            current.store(fresh, Ordering::Release);
            zone.synchronize();
            // SAFETY: the grace period drained every reader that could
            // still hold `old`.
            unsafe {
                *old = POISON;
                drop(Box::from_raw(old));
            }
        }
        done.store(true, Ordering::Release);
    });

    // SAFETY: all readers joined; the last published value is unreferenced.
    unsafe { drop(Box::from_raw(current.load(Ordering::Relaxed))) };
}

#[test]
fn registry_overflow_falls_back_to_hashed_cells() {
    let zone = RcuZone::new(16);
    // more threads than the registry can ever hold
    let total = nr_registered_slots() + 8;
    let successes = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..total {
            let zone = &zone;
            let successes = &successes;
            s.spawn(move || {
                if try_register_reader() {
                    successes.fetch_add(1, Ordering::Relaxed);
                }
                // a second attempt on the same thread is always refused
                assert!(!try_register_reader());
                // registered or not, read sections work
                for _ in 0..100 {
                    drop(zone.enter());
                }
            });
        }
    });

    assert!(successes.load(Ordering::Relaxed) <= nr_registered_slots());
    // everyone exited, so this must return promptly
    zone.synchronize();
}

#[test]
fn zones_are_independent() {
    let zone_a = RcuZone::new(4);
    let zone_b = RcuZone::new(4);

    // distinct zones may nest...
    let guard_a = zone_a.enter();
    let guard_b = zone_b.enter();
    drop(guard_b);

    // ...and a reader inside zone A must not stall zone B's writer
    zone_b.synchronize();
    drop(guard_a);
    zone_a.synchronize();
}

#[test]
fn default_zone_is_machine_sized() {
    let zone = RcuZone::default();
    let token = zone.reader_enter();
    zone.reader_exit(token);
    zone.synchronize();
}
