//! Exhaustive interleaving check for `FlatDynamic`'s packed-word CAS loop.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test --release --test loom_flat_dynamic`.
//! Loom enumerates every legal thread interleaving rather than sampling a
//! handful at random, so it catches lost updates that would show up as a
//! rare flake under a normal `cargo test` run.

#[cfg(loom)]
mod tests {
    use dynbar::FlatDynamic;
    use loom::sync::Arc;
    use loom::thread;

    #[test]
    fn two_threads_arrive_without_losing_an_update() {
        loom::model(|| {
            let barrier = Arc::new(FlatDynamic::new(2, 2));

            let b1 = barrier.clone();
            let h1 = thread::spawn(move || b1.arrive());
            let h2 = thread::spawn(move || barrier.arrive());

            let mut orders = vec![h1.join().unwrap(), h2.join().unwrap()];
            orders.sort_unstable();
            assert_eq!(orders, vec![0, 1]);
        });
    }

    #[test]
    fn opt_out_racing_arrival_never_leaves_waiting_stuck() {
        loom::model(|| {
            let barrier = Arc::new(FlatDynamic::new(2, 2));

            let b1 = barrier.clone();
            let arriver = thread::spawn(move || b1.arrive());
            let opter = thread::spawn(move || barrier.opt_out());

            arriver.join().unwrap();
            opter.join().unwrap();
        });
    }
}
