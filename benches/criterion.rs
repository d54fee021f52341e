// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use workpool::PoolBuilder;

const CAPACITIES: &[isize] = &[1, 4, 16];
const NUM_TASKS: usize = 1000;

fn submit(c: &mut Criterion) {
    let _ = env_logger::try_init();

    let mut group = c.benchmark_group("submit");
    group.throughput(Throughput::Elements(NUM_TASKS as u64));

    for &capacity in CAPACITIES {
        group.bench_with_input(
            BenchmarkId::new("pool", capacity),
            &capacity,
            |bencher, &capacity| {
                let pool = PoolBuilder::new(capacity).build().unwrap();
                let (done_sender, done_receiver) = crossbeam_channel::unbounded();
                bencher.iter(|| {
                    for _ in 0..NUM_TASKS {
                        let done = done_sender.clone();
                        pool.submit(move || {
                            done.send(()).unwrap();
                        })
                        .unwrap();
                    }
                    for _ in 0..NUM_TASKS {
                        done_receiver.recv().unwrap();
                    }
                });
                pool.release();
            },
        );
    }

    // Baseline: spawning one thread per task.
    group.bench_function("thread-per-task", |bencher| {
        bencher.iter(|| {
            let handles: Vec<_> = (0..NUM_TASKS)
                .map(|_| std::thread::spawn(|| {}))
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, submit);
criterion_main!(benches);
