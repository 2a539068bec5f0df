//! Heap report demo for heapwatch
//!
//! Two worker threads share a small heap. One of them forgets to release a
//! buffer every few rounds; the periodic report shows which site is growing,
//! and the heap eventually runs out.
//!
//! Run with: RUST_LOG=info cargo run --example heap_report

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use heapwatch::{kb, site, LogSink, StderrSink, SystemHeap, TrackerConfig, TrackingShim};

fn main() {
    env_logger::init();

    let config = TrackerConfig::default().with_env_overrides();
    let shim = Arc::new(TrackingShim::with_sink(
        SystemHeap::with_limit(kb(16)),
        config,
        LogSink::default(),
    ));

    let exhausted = Arc::new(AtomicBool::new(false));
    let flag = exhausted.clone();
    shim.set_oom_handler(move |event| {
        eprintln!("heap exhausted by a {} byte request", event.size);
        flag.store(true, Ordering::Relaxed);
    });

    // Well-behaved worker: every buffer is released.
    let rx = {
        let shim = shim.clone();
        let exhausted = exhausted.clone();
        thread::spawn(move || {
            while !exhausted.load(Ordering::Relaxed) {
                if let Ok(frame) = shim.allocate_at(512, site!()) {
                    thread::sleep(Duration::from_millis(1));
                    unsafe { shim.release(frame) };
                }
            }
        })
    };

    // Leaky worker: every third buffer is dropped on the floor.
    let tx = {
        let shim = shim.clone();
        let exhausted = exhausted.clone();
        thread::spawn(move || {
            let mut round = 0u32;
            while !exhausted.load(Ordering::Relaxed) {
                if let Ok(packet) = shim.allocate_at(256, site!()) {
                    if round % 3 != 0 {
                        unsafe { shim.release(packet) };
                    }
                }
                round += 1;
                thread::sleep(Duration::from_millis(2));
            }
        })
    };

    while !exhausted.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(25));
        println!("{}", shim.stats());
        shim.print_report();
    }

    let _ = rx.join();
    let _ = tx.join();

    println!("\nLeaked at shutdown:");
    let leaks = shim.leak_report(&StderrSink);
    println!("{} blocks never released", leaks);
}
