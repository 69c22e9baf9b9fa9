//! Performance benchmarks for the two splice-queue algorithms
//!
//! Both queues are compared against `crossbeam::queue::SegQueue`, the
//! usual unbounded MPMC baseline:
//! - single-threaded push/pop pairs
//! - balanced producers and consumers sharing one queue
//! - every thread alternating push and pop (the hot-tail case the tagged
//!   queue's splicing targets)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use crossbeam::queue::SegQueue;
use splice_queue::{ConcurrentQueue, MsQueue, TaggedQueue};
use std::sync::{Arc, Barrier};
use std::thread;

const OPERATIONS_PER_THREAD: usize = 20_000;
const THREAD_COUNTS: &[usize] = &[2, 4, 8, 16];

/// Lets `SegQueue` run through the same harness as our queues.
struct SegQueueAdapter<T>(SegQueue<T>);

impl<T: Send> ConcurrentQueue<T> for SegQueueAdapter<T> {
    fn push(&self, value: T) {
        self.0.push(value);
    }

    fn pop(&self) -> Option<T> {
        self.0.pop()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

type Contender = (&'static str, fn() -> Arc<dyn ConcurrentQueue<u64>>);

fn ms_queue() -> Arc<dyn ConcurrentQueue<u64>> {
    Arc::new(MsQueue::new())
}

fn tagged_queue() -> Arc<dyn ConcurrentQueue<u64>> {
    Arc::new(TaggedQueue::new())
}

fn seg_queue() -> Arc<dyn ConcurrentQueue<u64>> {
    Arc::new(SegQueueAdapter(SegQueue::new()))
}

fn contenders() -> [Contender; 3] {
    [
        ("ms_queue", ms_queue),
        ("tagged_queue", tagged_queue),
        ("seg_queue", seg_queue),
    ]
}

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_push_pop");
    group.throughput(Throughput::Elements(OPERATIONS_PER_THREAD as u64));

    for (name, make) in contenders() {
        group.bench_function(name, |b| {
            let queue = make();
            b.iter(|| {
                for i in 0..OPERATIONS_PER_THREAD as u64 {
                    queue.push(black_box(i));
                }
                for _ in 0..OPERATIONS_PER_THREAD {
                    black_box(queue.pop());
                }
            });
        });
    }
    group.finish();
}

fn run_producers_consumers(queue: &Arc<dyn ConcurrentQueue<u64>>, pairs: usize) {
    let barrier = Arc::new(Barrier::new(pairs * 2));
    let mut handles = Vec::with_capacity(pairs * 2);

    for _ in 0..pairs {
        let queue = Arc::clone(queue);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..OPERATIONS_PER_THREAD as u64 {
                queue.push(i);
            }
        }));

        let queue = Arc::clone(queue);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let mut taken = 0;
            while taken < OPERATIONS_PER_THREAD {
                if black_box(queue.pop()).is_some() {
                    taken += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_producers_consumers(c: &mut Criterion) {
    let mut group = c.benchmark_group("producers_consumers");
    group.sample_size(10);

    for &threads in THREAD_COUNTS {
        let pairs = threads / 2;
        group.throughput(Throughput::Elements((pairs * OPERATIONS_PER_THREAD * 2) as u64));
        for (name, make) in contenders() {
            group.bench_with_input(BenchmarkId::new(name, threads), &pairs, |b, &pairs| {
                b.iter(|| run_producers_consumers(&make(), pairs));
            });
        }
    }
    group.finish();
}

fn run_alternating(queue: &Arc<dyn ConcurrentQueue<u64>>, threads: usize) {
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..OPERATIONS_PER_THREAD as u64 {
                    queue.push(i);
                    black_box(queue.pop());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_alternating(c: &mut Criterion) {
    let mut group = c.benchmark_group("alternating_push_pop");
    group.sample_size(10);

    for &threads in THREAD_COUNTS {
        group.throughput(Throughput::Elements((threads * OPERATIONS_PER_THREAD * 2) as u64));
        for (name, make) in contenders() {
            group.bench_with_input(BenchmarkId::new(name, threads), &threads, |b, &threads| {
                b.iter(|| run_alternating(&make(), threads));
            });
        }
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread,
    bench_producers_consumers,
    bench_alternating
);
criterion_main!(benches);
