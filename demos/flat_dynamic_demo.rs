//! Drives a [`dynbar::FlatDynamic`] with threads that randomly opt out for a
//! while and opt back in, mirroring the upstream `Dynamicity` driver.

use std::sync::Arc;
use std::thread;

use dynbar::FlatDynamic;
use rand::Rng;

const THREAD_COUNT: u32 = 4;
const ITERATIONS: u32 = 10_000;
const FREQUENCY: u32 = 100;
const UNBARRIERED_LENGTH: u32 = 5;

fn main() {
    let barrier = Arc::new(FlatDynamic::new(THREAD_COUNT, 0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|tid| {
            let barrier = barrier.clone();
            thread::spawn(move || run(tid, &barrier))
        })
        .collect();

    for handle in handles {
        handle.join().expect("demo thread panicked");
    }
}

fn run(tid: u32, barrier: &FlatDynamic) {
    let mut rng = rand::thread_rng();
    let mut using_barrier = true;
    let mut unbarriered_remaining = 0u32;

    barrier.opt_in();
    for iteration in 0..ITERATIONS {
        if using_barrier {
            if rng.gen_range(0..FREQUENCY) == 0 {
                barrier.opt_out();
                using_barrier = false;
                unbarriered_remaining = UNBARRIERED_LENGTH;
                println!("thread {tid} iteration {iteration} opted out");
            } else {
                let arrival = barrier.arrive();
                println!("thread {tid} iteration {iteration} arrived {arrival}");
            }
        } else {
            unbarriered_remaining -= 1;
            if unbarriered_remaining == 0 {
                barrier.opt_in();
                using_barrier = true;
            }
            println!("thread {tid} iteration {iteration} unbarriered");
        }
    }

    if using_barrier {
        barrier.opt_out();
    }
}
