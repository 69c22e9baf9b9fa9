//! Popper, pusher, popper
//!
//! Three threads share one `TaggedQueue`: a popper that starts before any
//! value exists, a pusher, and a second popper. The main thread drains the
//! rest and checks nothing was lost.
//!
//! ```bash
//! RUST_LOG=splice_queue=trace cargo run --example three_threads
//! ```

use splice_queue::metrics::{MetricsCollector, TracingObserver};
use splice_queue::{QueueConfig, TaggedQueue};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

const OPERATIONS: u64 = 10_000;

fn main() -> splice_queue::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let queue = TaggedQueue::with_config(QueueConfig::default().metrics_enabled(true))?
        .with_observer(Arc::new(TracingObserver::default()));
    let queue = Arc::new(queue);

    let popper = |name: &'static str, queue: Arc<TaggedQueue<u64>>| {
        thread::spawn(move || {
            let popped = (0..OPERATIONS).filter_map(|_| queue.pop()).count();
            tracing::info!(thread = name, popped, "popper finished");
            popped
        })
    };

    let first = popper("first", Arc::clone(&queue));
    let pusher = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for value in 0..OPERATIONS {
                queue.push(value);
            }
            tracing::info!(pushed = OPERATIONS, "pusher finished");
        })
    };
    let second = popper("second", Arc::clone(&queue));

    let mut popped = 0;
    for handle in [first, second] {
        popped += handle.join().unwrap_or(0);
    }
    if pusher.join().is_err() {
        tracing::error!("pusher panicked");
    }

    let drained = queue.pop_batch(usize::MAX).len();
    let metrics = queue.metrics();
    tracing::info!(
        popped,
        drained,
        total = popped + drained,
        local_inserts = metrics.local_inserts,
        empty_pops = metrics.failed_operations,
        "queue drained"
    );
    assert_eq!((popped + drained) as u64, OPERATIONS);
    Ok(())
}
