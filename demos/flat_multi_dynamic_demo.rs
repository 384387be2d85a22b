//! Drives a [`dynbar::FlatMultiDynamic`] through a repeating two-phase
//! cycle, with threads occasionally opting out between cycles.

use std::sync::Arc;
use std::thread;

use dynbar::FlatMultiDynamic;
use rand::Rng;

const THREAD_COUNT: u32 = 4;
const PHASES: u8 = 2;
const ITERATIONS: u32 = 5_000;
const FREQUENCY: u32 = 100;
const UNBARRIERED_LENGTH: u32 = 5;

fn main() {
    let barrier = Arc::new(FlatMultiDynamic::new(PHASES, THREAD_COUNT, 0));

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

fn run(tid: u32, barrier: &FlatMultiDynamic) {
    let mut rng = rand::thread_rng();
    let mut using_barrier = true;
    let mut unbarriered_remaining = 0u32;

    barrier.opt_in();
    for iteration in 0..ITERATIONS {
        if using_barrier {
            if rng.gen_range(0..FREQUENCY) == 0 && barrier.index() == 0 {
                barrier.opt_out();
                using_barrier = false;
                unbarriered_remaining = UNBARRIERED_LENGTH;
                println!("thread {tid} iteration {iteration} opted out");
            } else {
                for phase in 0..barrier.max_phases() {
                    let arrival = barrier.arrive(phase);
                    println!("thread {tid} iteration {iteration} phase {phase} arrived {arrival}");
                }
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
