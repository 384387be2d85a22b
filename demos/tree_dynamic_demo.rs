//! Drives a [`dynbar::TreeDynamic`] with a configurable thread count and
//! iteration count, mirroring the upstream `TreeDynamicity` driver.
//!
//! Usage: `tree_dynamic_demo <thread_count> <iterations>`

use std::sync::Arc;
use std::thread;

use dynbar::TreeDynamic;
use rand::Rng;

const NODE_SIZE: u32 = 2;
const FREQUENCY: u32 = 100;
const UNBARRIERED_LENGTH: u32 = 5;

fn main() {
    let mut args = std::env::args().skip(1);
    let thread_count: u32 = args
        .next()
        .expect("usage: tree_dynamic_demo <thread_count> <iterations>")
        .parse()
        .expect("thread_count must be an integer");
    let iterations: u32 = args
        .next()
        .expect("usage: tree_dynamic_demo <thread_count> <iterations>")
        .parse()
        .expect("iterations must be an integer");

    let barrier = Arc::new(
        TreeDynamic::new_empty(thread_count, NODE_SIZE).expect("invalid tree barrier parameters"),
    );

    let handles: Vec<_> = (0..thread_count)
        .map(|tid| {
            let barrier = barrier.clone();
            thread::spawn(move || run(tid, iterations, &barrier))
        })
        .collect();

    for handle in handles {
        handle.join().expect("demo thread panicked");
    }
}

fn run(tid: u32, iterations: u32, barrier: &TreeDynamic) {
    let mut rng = rand::thread_rng();
    let mut using_barrier = true;
    let mut unbarriered_remaining = 0u32;

    barrier.opt_in(tid);
    for iteration in 0..iterations {
        if using_barrier {
            if rng.gen_range(0..FREQUENCY) == 0 {
                barrier.opt_out(tid);
                using_barrier = false;
                unbarriered_remaining = UNBARRIERED_LENGTH;
                println!("thread {tid} iteration {iteration} opted out");
            } else {
                barrier.arrive(tid);
                println!("thread {tid} iteration {iteration} arrived");
            }
        } else {
            unbarriered_remaining -= 1;
            if unbarriered_remaining == 0 {
                barrier.opt_in(tid);
                using_barrier = true;
            }
            println!("thread {tid} iteration {iteration} unbarriered");
        }
    }

    if using_barrier {
        barrier.opt_out(tid);
    }
}
