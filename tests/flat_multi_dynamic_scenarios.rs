use dynbar::FlatMultiDynamic;
use std::sync::Arc;
use std::thread;

#[test]
fn two_phase_cycle_no_deadlock_over_many_rounds() {
    let barrier = Arc::new(FlatMultiDynamic::new(2, 4, 4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    barrier.arrive(0);
                    barrier.arrive(1);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(barrier.index(), 0);
    assert_eq!(barrier.waiting(), 0);
}

#[test]
fn single_phase_matches_flat_dynamic_behavior() {
    let barrier = Arc::new(FlatMultiDynamic::new(1, 4, 4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let barrier = barrier.clone();
            thread::spawn(move || barrier.arrive(0))
        })
        .collect();

    let mut orders: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![0, 1, 2, 3]);
    assert_eq!(barrier.index(), 0);
}

#[test]
fn higher_phase_waits_for_lower_phase_to_drain() {
    let barrier = Arc::new(FlatMultiDynamic::new(2, 2, 2));

    let watcher_barrier = barrier.clone();
    let watcher = thread::spawn(move || {
        for _ in 0..500 {
            // Nobody has arrived at phase 0 yet, so the cycle cannot have
            // advanced to phase 1 regardless of how this thread interleaves.
            assert_eq!(watcher_barrier.index(), 0);
            thread::yield_now();
        }
    });
    watcher.join().unwrap();

    let b1 = barrier.clone();
    let b2 = barrier.clone();
    let h1 = thread::spawn(move || {
        b1.arrive(0);
        b1.arrive(1);
    });
    let h2 = thread::spawn(move || {
        b2.arrive(0);
        b2.arrive(1);
    });
    h1.join().unwrap();
    h2.join().unwrap();

    assert_eq!(barrier.index(), 0);
    assert_eq!(barrier.waiting(), 0);
}
