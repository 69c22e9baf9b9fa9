//! Classical Lock-Free Queue
//!
//! The Michael-Scott queue: a singly-linked chain with a sentinel at `head`
//! and a `tail` hint that may lag the true last node by one.
//!
//! ## Algorithm
//!
//! ```text
//!  head                         tail
//!   |                            |
//!   v                            v
//! [sentinel] -> [a] -> [b] -> [c] -> null
//! ```
//!
//! - **push** links a new node with one CAS on the last node's `next`, then
//!   tries once to swing `tail` to it. A thread that finds `tail.next`
//!   non-null finishes that swing for whoever linked it ("helping").
//! - **pop** swings `head` to the sentinel's successor and returns the
//!   successor's value; the old sentinel is retired.
//!
//! ## Memory Ordering
//!
//! - Loads of `head`, `tail` and `next` use `Acquire`
//! - The linking CAS and the `head` CAS use `AcqRel`, making each the single
//!   point at which a node enters or leaves the queue
//! - `tail` swings are `Release`; they are hints and may fail freely
//!
//! ## Ordering Guarantee
//!
//! Linearizable FIFO: values leave in the order their linking CAS succeeded.
//!
//! `LoomMsQueue` in `loom_tests.rs` models `push` and `pop`; keep the two
//! in step.

use crate::metrics::{
    Instrumentation, MetricsCollector, PerformanceMetrics, QueueEvent, QueueObserver,
};
use crate::queue::config::{QueueConfig, RetryStrategy};
use crate::queue::node::Node;
use crate::util::CachePadded;
use crate::{ConcurrentQueue, Error, Result};
use core::fmt;
use core::marker::PhantomData;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A lock-free, unbounded, multi-producer multi-consumer FIFO queue
///
/// # Examples
///
/// ```rust
/// use splice_queue::MsQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(MsQueue::new());
///
/// let producer = thread::spawn({
///     let queue = Arc::clone(&queue);
///     move || {
///         for i in 0..1000 {
///             queue.push(i);
///         }
///     }
/// });
///
/// let consumer = thread::spawn({
///     let queue = Arc::clone(&queue);
///     move || {
///         let mut expected = 0;
///         while expected < 1000 {
///             if let Some(value) = queue.pop() {
///                 assert_eq!(value, expected);
///                 expected += 1;
///             }
///         }
///     }
/// });
///
/// producer.join().unwrap();
/// consumer.join().unwrap();
/// assert!(queue.is_empty());
/// ```
///
/// # Thread Safety
///
/// Every operation is lock-free: some thread always completes its operation
/// in a bounded number of steps, but an individual thread may retry
/// indefinitely under adversarial scheduling.
pub struct MsQueue<T> {
    /// Current sentinel; its value is never a queued item
    head: CachePadded<Atomic<Node<T>>>,
    /// At or one behind the last node
    tail: CachePadded<Atomic<Node<T>>>,
    /// Approximate size, for monitoring only
    size: AtomicIsize,
    retry: RetryStrategy,
    instrumentation: Instrumentation,
    _marker: PhantomData<T>,
}

// SAFETY: values are moved between threads through the queue, and each one
// is read by exactly one popping thread.
unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> MsQueue<T> {
    /// Create an empty queue holding only the sentinel
    ///
    /// # Examples
    ///
    /// ```rust
    /// use splice_queue::MsQueue;
    ///
    /// let queue: MsQueue<i32> = MsQueue::new();
    /// assert!(queue.is_empty());
    /// assert_eq!(queue.pop(), None);
    /// ```
    pub fn new() -> Self {
        Self::build(&QueueConfig::default())
    }

    /// Create an empty queue with explicit tunables
    ///
    /// Only `retry` and `metrics_enabled` apply here, and any value of
    /// either is valid, so unlike [`TaggedQueue::with_config`] this cannot
    /// fail.
    ///
    /// [`TaggedQueue::with_config`]: crate::TaggedQueue::with_config
    pub fn with_config(config: QueueConfig) -> Self {
        Self::build(&config)
    }

    fn build(config: &QueueConfig) -> Self {
        let sentinel = Owned::new(Node::sentinel());
        // SAFETY: the queue is not shared yet.
        let guard = unsafe { epoch::unprotected() };
        let sentinel = sentinel.into_shared(guard);

        Self {
            head: CachePadded::new(Atomic::from(sentinel)),
            tail: CachePadded::new(Atomic::from(sentinel)),
            size: AtomicIsize::new(0),
            retry: config.retry,
            instrumentation: Instrumentation::new(config.metrics_enabled),
            _marker: PhantomData,
        }
    }

    /// Attach an observer that receives every [`QueueEvent`]
    pub fn with_observer(mut self, observer: Arc<dyn QueueObserver>) -> Self {
        self.instrumentation.set_observer(observer);
        self
    }

    /// Push a value onto the back of the queue
    ///
    /// Never fails; returns once the value's node has been linked.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use splice_queue::MsQueue;
    ///
    /// let queue = MsQueue::new();
    /// queue.push(1);
    /// queue.push(2);
    /// assert_eq!(queue.len(), 2);
    /// ```
    pub fn push(&self, value: T) {
        let started = self.instrumentation.start();
        let guard = &epoch::pin();
        let new = Owned::new(Node::new(value)).into_shared(guard);

        // Modelled by `LoomMsQueue::push` in loom_tests.rs.
        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `tail` never falls behind `head`, so the node it points
            // at has not been retired and stays alive while we are pinned.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Ordering::Acquire, guard);

            if tail != self.tail.load(Ordering::Acquire, guard) {
                continue;
            }

            if next.is_null() {
                match tail_ref.next.compare_exchange(
                    Shared::null(),
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(_) => {
                        // Best effort; a failure means someone already helped.
                        let _ = self.tail.compare_exchange(
                            tail,
                            new,
                            Ordering::Release,
                            Ordering::Relaxed,
                            guard,
                        );
                        break;
                    }
                    Err(_) => {
                        self.instrumentation.emit(QueueEvent::CasRetry);
                        self.retry.relax();
                    }
                }
            } else {
                self.help_tail(tail, next, guard);
            }
        }

        self.size.fetch_add(1, Ordering::Relaxed);
        self.instrumentation.success(started);
    }

    /// Pop the value at the front of the queue
    ///
    /// Returns `None` if the queue held no value when it was inspected.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use splice_queue::MsQueue;
    ///
    /// let queue = MsQueue::new();
    /// queue.push("a");
    /// assert_eq!(queue.pop(), Some("a"));
    /// assert_eq!(queue.pop(), None);
    /// ```
    pub fn pop(&self) -> Option<T> {
        let started = self.instrumentation.start();
        let guard = &epoch::pin();

        // Modelled by `LoomMsQueue::pop` in loom_tests.rs.
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `head` is only retired by the thread that moves it, and
            // retirement waits for every pinned thread.
            let next = unsafe { head.deref() }.next.load(Ordering::Acquire, guard);

            if head != self.head.load(Ordering::Acquire, guard) {
                continue;
            }

            if head == tail {
                if next.is_null() {
                    self.instrumentation.empty(started);
                    return None;
                }
                self.help_tail(tail, next, guard);
                continue;
            }

            // SAFETY: as for `head`; `next` is reachable from it.
            let Some(next_ref) = (unsafe { next.as_ref() }) else {
                debug_assert!(false, "head differs from tail but has no successor");
                continue;
            };

            match self.head.compare_exchange(
                head,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: winning the head CAS makes this thread the only
                    // reader of `next`'s value; `next` is now the sentinel and
                    // its value slot is never read again.
                    let value = unsafe { next_ref.value.assume_init_read() };
                    // SAFETY: `head` is unreachable from the queue roots.
                    unsafe { guard.defer_destroy(head) };
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    self.instrumentation.success(started);
                    return Some(value);
                }
                Err(_) => {
                    self.instrumentation.emit(QueueEvent::CasRetry);
                    self.retry.relax();
                }
            }
        }
    }

    /// Swing a lagging `tail` forward to `next`
    #[inline]
    fn help_tail<'g>(
        &self,
        tail: Shared<'g, Node<T>>,
        next: Shared<'g, Node<T>>,
        guard: &'g Guard,
    ) {
        if self
            .tail
            .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed, guard)
            .is_ok()
        {
            self.instrumentation.emit(QueueEvent::TailHelped);
        }
    }

    /// Alias for [`pop`](Self::pop)
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.pop()
    }

    /// Keep popping until a value arrives or `timeout` elapses
    ///
    /// Uses the same adaptive sleep backoff as a polling consumer would.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the queue stayed empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use splice_queue::{Error, MsQueue};
    /// use std::time::Duration;
    ///
    /// let queue: MsQueue<i32> = MsQueue::new();
    /// assert_eq!(queue.pop_with_timeout(Duration::from_millis(10)), Err(Error::Timeout));
    /// ```
    pub fn pop_with_timeout(&self, timeout: Duration) -> Result<T> {
        let start = Instant::now();
        let mut backoff = Duration::from_nanos(50);

        loop {
            if let Some(value) = self.pop() {
                return Ok(value);
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            std::thread::sleep(backoff.min(remaining));
            backoff = core::cmp::min(backoff * 2, Duration::from_millis(1));
        }
    }

    /// Push every value from `values`, returning how many were pushed
    pub fn push_batch<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        values.into_iter().fold(0, |pushed, value| {
            self.push(value);
            pushed + 1
        })
    }

    /// Pop up to `max_values` values, stopping early if the queue runs dry
    pub fn pop_batch(&self, max_values: usize) -> Vec<T> {
        let mut values = Vec::with_capacity(max_values.min(self.len()));
        while values.len() < max_values {
            match self.pop() {
                Some(value) => values.push(value),
                None => break,
            }
        }
        values
    }

    /// Point-in-time emptiness check
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: see `pop`.
        unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, guard)
            .is_null()
    }

    /// Approximate number of queued values
    ///
    /// May be stale under contention.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }
}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for MsQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsQueue")
            .field("len", &self.len())
            .field("retry", &self.retry)
            .field("metrics_enabled", &self.instrumentation.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the chain.
        unsafe {
            let guard = epoch::unprotected();
            let head = self.head.load(Ordering::Relaxed, guard);
            let mut cur = head.deref().next.load(Ordering::Relaxed, guard);
            drop(head.into_owned());

            // Everything after the sentinel still owns its value.
            while let Some(node) = cur.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard);
                let mut owned = cur.into_owned();
                owned.value.assume_init_drop();
                drop(owned);
                cur = next;
            }
        }
    }
}

impl<T: Send> ConcurrentQueue<T> for MsQueue<T> {
    fn push(&self, value: T) {
        MsQueue::push(self, value);
    }

    fn pop(&self) -> Option<T> {
        MsQueue::pop(self)
    }

    fn is_empty(&self) -> bool {
        MsQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        MsQueue::len(self)
    }
}

impl<T> MetricsCollector for MsQueue<T> {
    fn metrics(&self) -> PerformanceMetrics {
        self.instrumentation.metrics()
    }

    fn reset_metrics(&self) {
        self.instrumentation.reset_metrics();
    }

    fn set_metrics_enabled(&self, enabled: bool) {
        self.instrumentation.set_metrics_enabled(enabled);
    }

    fn is_metrics_enabled(&self) -> bool {
        self.instrumentation.is_metrics_enabled()
    }
}
