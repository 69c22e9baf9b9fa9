//! Tagged-Deletion Queue
//!
//! A variant of the classical queue in which consumption is recorded as a
//! *deletion tag* on the consumed node's own `next` pointer, instead of by
//! moving `head` alone. Because the tag and the successor address share one
//! atomic word, any CAS on a node's `next` fails if the node was consumed in
//! the meantime. That lets a producer that lost the race at the tail splice
//! its node in directly after the winner rather than starting over.
//!
//! ## Chain Shape
//!
//! ```text
//!  head                 tail
//!   |                    |
//!   v                    v
//! [s] -> [a]* -> [b] -> [c] -> null        * = next pointer tagged DELETED
//! ```
//!
//! `head` always points at a consumed node (or the initial sentinel).
//! Consumed nodes form a prefix of the chain; everything after the first
//! untagged node is still queued.
//!
//! ## Push
//!
//! 1. If `tail` has no successor, CAS the new node into `tail.next`,
//!    keeping whatever tag was there, then swing `tail`.
//! 2. Otherwise swing `tail` to its successor (the *anchor*) and try up to
//!    `local_insert_attempts` times to splice the new node in right after
//!    the anchor: `new.next = anchor.next; CAS(anchor.next, new)`.
//! 3. A tagged anchor, or running out of attempts, restarts from step 1.
//! 4. Once linked, help `tail` forward until it is at or past the new node.
//!
//! ## Pop
//!
//! 1. The candidate is `head`'s successor. If it is already tagged, a
//!    concurrent pop consumed it; move `head` onto it and retry.
//! 2. Otherwise CAS the candidate's `next` from untagged to tagged. The
//!    winner owns the value and tries once to move `head` onto the
//!    candidate.
//!
//! ## Ordering Guarantee
//!
//! Weaker than FIFO across threads: splicing after the tail-race winner
//! means pushes from different threads racing each other may be linked in
//! either order. Each thread's own pushes keep their order. Step 4 is what
//! guarantees this: when `push` returns, `tail` is at or past its node, so
//! the thread's next push anchors behind it.
//!
//! The loom model `LoomTaggedQueue` in `loom_tests.rs` mirrors `push` and
//! `pop` step for step; change both together.

use crate::metrics::{
    Instrumentation, MetricsCollector, PerformanceMetrics, QueueEvent, QueueObserver,
};
use crate::queue::config::{QueueConfig, RetryStrategy};
use crate::queue::node::{is_deleted, mark, strip, Node};
use crate::util::CachePadded;
use crate::{ConcurrentQueue, Error, Result};
use core::fmt;
use core::marker::PhantomData;
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A lock-free, unbounded, multi-producer multi-consumer queue with
/// deletion tags and splice-in inserts
///
/// # Examples
///
/// ```rust
/// use splice_queue::TaggedQueue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let queue = Arc::new(TaggedQueue::new());
///
/// let producers: Vec<_> = (0..4)
///     .map(|id| {
///         let queue = Arc::clone(&queue);
///         thread::spawn(move || {
///             for i in 0..250 {
///                 queue.push(id * 250 + i);
///             }
///         })
///     })
///     .collect();
/// for producer in producers {
///     producer.join().unwrap();
/// }
///
/// let mut values = Vec::new();
/// while let Some(value) = queue.pop() {
///     values.push(value);
/// }
/// values.sort_unstable();
/// assert_eq!(values, (0..1000).collect::<Vec<_>>());
/// ```
pub struct TaggedQueue<T> {
    /// A consumed node, or the initial sentinel
    head: CachePadded<Atomic<Node<T>>>,
    /// Always stored untagged; at or behind the last node
    tail: CachePadded<Atomic<Node<T>>>,
    size: AtomicIsize,
    local_insert_attempts: usize,
    retry: RetryStrategy,
    instrumentation: Instrumentation,
    _marker: PhantomData<T>,
}

// SAFETY: as for `MsQueue`; a value is read only by the pop that tagged it.
unsafe impl<T: Send> Send for TaggedQueue<T> {}
unsafe impl<T: Send> Sync for TaggedQueue<T> {}

impl<T> TaggedQueue<T> {
    /// Create an empty queue: one sentinel, untagged, no successor
    ///
    /// # Examples
    ///
    /// ```rust
    /// use splice_queue::TaggedQueue;
    ///
    /// let queue: TaggedQueue<i32> = TaggedQueue::new();
    /// assert_eq!(queue.pop(), None);
    /// ```
    pub fn new() -> Self {
        Self::build(&QueueConfig::default())
    }

    /// Create an empty queue with explicit tunables
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config.local_insert_attempts` is 0.
    pub fn with_config(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(&config))
    }

    fn build(config: &QueueConfig) -> Self {
        // SAFETY: the queue is not shared yet.
        let guard = unsafe { epoch::unprotected() };
        let sentinel = Owned::new(Node::sentinel()).into_shared(guard);

        Self {
            head: CachePadded::new(Atomic::from(sentinel)),
            tail: CachePadded::new(Atomic::from(sentinel)),
            size: AtomicIsize::new(0),
            local_insert_attempts: config.local_insert_attempts,
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

    /// Splice attempts a losing producer makes before restarting
    pub fn local_insert_attempts(&self) -> usize {
        self.local_insert_attempts
    }

    /// Push a value into the queue
    ///
    /// Never fails. Under contention the node may be spliced in after a
    /// node other than the one that was last when the call began, but never
    /// in front of a node this thread pushed earlier.
    pub fn push(&self, value: T) {
        let started = self.instrumentation.start();
        let guard = &epoch::pin();
        let new = Owned::new(Node::new(value)).into_shared(guard);
        // SAFETY: `new` is ours until a CAS publishes it.
        let new_ref = unsafe { new.deref() };

        // Modelled by `LoomTaggedQueue::push` in loom_tests.rs.
        'restart: loop {
            new_ref.next.store(Shared::null(), Ordering::Relaxed);

            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `tail` never falls behind `head`, so it is not retired.
            let tail_ref = unsafe { tail.deref() };
            let mut next = tail_ref.next.load(Ordering::Acquire, guard);

            if tail != self.tail.load(Ordering::Acquire, guard) {
                continue;
            }

            if strip(next).is_null() {
                // Carry the observed tag so a consumed tail stays consumed.
                match tail_ref.next.compare_exchange(
                    next,
                    new.with_tag(next.tag()),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(_) => {
                        self.settle_tail(tail, new, guard);
                        break;
                    }
                    Err(err) => {
                        debug_assert!(
                            !is_deleted(next) || is_deleted(err.current),
                            "deletion tag was cleared"
                        );
                        self.instrumentation.emit(QueueEvent::CasRetry);
                        next = err.current;
                        if strip(next).is_null() {
                            // Only the tag changed; the end is still here.
                            self.retry.relax();
                            continue;
                        }
                    }
                }
            }

            // `tail` is stale: advance it to the node that won, then try to
            // land right after that node.
            let anchor = strip(next);
            if self
                .tail
                .compare_exchange(tail, anchor, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok()
            {
                self.instrumentation.emit(QueueEvent::TailHelped);
            }
            // SAFETY: `anchor` was linked after `tail`, which is live.
            let anchor_ref = unsafe { anchor.deref() };

            for _ in 0..self.local_insert_attempts {
                let current = anchor_ref.next.load(Ordering::Acquire, guard);
                if is_deleted(current) {
                    self.instrumentation.emit(QueueEvent::DeletedInsertionPoint);
                    self.retry.relax();
                    continue 'restart;
                }

                new_ref.next.store(current, Ordering::Relaxed);
                match anchor_ref.next.compare_exchange(
                    current,
                    new,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    guard,
                ) {
                    Ok(_) => {
                        self.settle_tail(anchor, new, guard);
                        self.instrumentation.emit(QueueEvent::LocalInsert);
                        break 'restart;
                    }
                    Err(_) => {
                        self.instrumentation.emit(QueueEvent::CasRetry);
                        self.retry.relax();
                    }
                }
            }

            self.instrumentation.emit(QueueEvent::LocalInsertExhausted);
        }

        self.size.fetch_add(1, Ordering::Relaxed);
        self.instrumentation.success(started);
    }

    /// Pop a value from the queue
    ///
    /// Returns `None` if no unconsumed node existed when the queue was
    /// inspected.
    pub fn pop(&self) -> Option<T> {
        let started = self.instrumentation.start();
        let guard = &epoch::pin();

        // Modelled by `LoomTaggedQueue::pop` in loom_tests.rs.
        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: `head` is retired only by the thread that moves it past.
            let candidate = strip(unsafe { head.deref() }.next.load(Ordering::Acquire, guard));

            if head != self.head.load(Ordering::Acquire, guard) {
                continue;
            }

            if head == tail {
                if candidate.is_null() {
                    self.instrumentation.empty(started);
                    return None;
                }
                if self
                    .tail
                    .compare_exchange(tail, candidate, Ordering::Release, Ordering::Relaxed, guard)
                    .is_ok()
                {
                    self.instrumentation.emit(QueueEvent::TailHelped);
                }
                continue;
            }

            // SAFETY: reachable from `head`, which we validated above.
            let Some(candidate_ref) = (unsafe { candidate.as_ref() }) else {
                debug_assert!(false, "head differs from tail but has no successor");
                continue;
            };
            let succ = candidate_ref.next.load(Ordering::Acquire, guard);

            if is_deleted(succ) {
                // Left behind by a pop that tagged it but has not moved head.
                if self.advance_head(head, candidate, guard) {
                    self.instrumentation.emit(QueueEvent::StaleHeadSkipped);
                }
                continue;
            }

            match candidate_ref.next.compare_exchange(
                succ,
                mark(succ),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    // SAFETY: only the thread that tags a node reads its value,
                    // and tags are never cleared.
                    let value = unsafe { candidate_ref.value.assume_init_read() };
                    // Losing this CAS is fine; a later pop skips the node.
                    let _ = self.advance_head(head, candidate, guard);
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

    /// Help `tail` forward until it is at or past `new`, which this thread
    /// just linked somewhere after `prev`
    ///
    /// Other pushes may splice nodes in between `prev` and `new`, and a
    /// stale `tail` may stop on one of them. Returning before `tail` passes
    /// `new` would let this thread's next push anchor in front of `new`.
    // Modelled by `LoomTaggedQueue::settle_tail` in loom_tests.rs.
    fn settle_tail<'g>(
        &self,
        prev: Shared<'g, Node<T>>,
        new: Shared<'g, Node<T>>,
        guard: &'g Guard,
    ) {
        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            if tail == new || !Self::tail_precedes(prev, tail, new, guard) {
                return;
            }

            // SAFETY: `tail` never falls behind `head`, so it is not retired.
            let next = strip(unsafe { tail.deref() }.next.load(Ordering::Acquire, guard));
            if next.is_null() {
                debug_assert!(false, "tail in front of a linked node has no successor");
                return;
            }
            if self
                .tail
                .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed, guard)
                .is_ok()
            {
                self.instrumentation.emit(QueueEvent::TailHelped);
            } else {
                self.retry.relax();
            }
        }
    }

    /// Whether `tail` sits in front of `new` in chain order
    ///
    /// Nodes are never unlinked behind `prev`, so every node at or past
    /// `prev` is reachable from it; a `tail` that is not must be in front.
    fn tail_precedes<'g>(
        prev: Shared<'g, Node<T>>,
        tail: Shared<'g, Node<T>>,
        new: Shared<'g, Node<T>>,
        guard: &'g Guard,
    ) -> bool {
        let mut passed_new = false;
        let mut cur = prev;
        // SAFETY: `prev` was reachable from `tail` when read, so neither it
        // nor any node after it was retired before this pin.
        while let Some(node) = unsafe { cur.as_ref() } {
            if cur == tail {
                return !passed_new;
            }
            if cur == new {
                passed_new = true;
            }
            cur = strip(node.next.load(Ordering::Acquire, guard));
        }
        true
    }

    /// Move `head` from `head` onto the consumed `candidate`, retiring the
    /// old head if this thread's CAS is the one that moved it
    #[inline]
    fn advance_head<'g>(
        &self,
        head: Shared<'g, Node<T>>,
        candidate: Shared<'g, Node<T>>,
        guard: &'g Guard,
    ) -> bool {
        if self
            .head
            .compare_exchange(head, candidate, Ordering::AcqRel, Ordering::Acquire, guard)
            .is_ok()
        {
            // SAFETY: `head` is now unreachable from the queue roots, and a
            // tagged predecessor can never be spliced into again.
            unsafe { guard.defer_destroy(head) };
            return true;
        }
        false
    }

    /// Alias for [`pop`](Self::pop)
    #[inline]
    pub fn try_pop(&self) -> Option<T> {
        self.pop()
    }

    /// Keep popping until a value arrives or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if the queue stayed empty.
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

    /// Point-in-time emptiness check: true if every node after `head` is
    /// tagged deleted
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        // SAFETY: see `pop`; nodes past `head` outlive our pin.
        let mut cur = strip(unsafe { head.deref() }.next.load(Ordering::Acquire, guard));
        // SAFETY: every node reachable from a loaded `head` outlives the pin.
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load(Ordering::Acquire, guard);
            if !is_deleted(next) {
                return false;
            }
            cur = strip(next);
        }
        true
    }

    /// Approximate number of queued values
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed).max(0) as usize
    }

    /// Deletion flags of every node after `head`, front to back.
    ///
    /// Only meaningful while no other thread is operating on the queue.
    #[cfg(test)]
    pub(crate) fn deletion_flags(&self) -> Vec<bool> {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        let mut flags = Vec::new();
        let mut cur = strip(unsafe { head.deref() }.next.load(Ordering::Acquire, guard));
        while let Some(node) = unsafe { cur.as_ref() } {
            let next = node.next.load(Ordering::Acquire, guard);
            flags.push(is_deleted(next));
            cur = strip(next);
        }
        flags
    }

    /// Link `value` straight after `prev` without touching `tail`, as a
    /// push would just after its CAS and before anything else.
    #[cfg(test)]
    pub(crate) fn link_after<'g>(
        &self,
        prev: Shared<'g, Node<T>>,
        value: T,
        guard: &'g Guard,
    ) -> Shared<'g, Node<T>> {
        let new = Owned::new(Node::new(value)).into_shared(guard);
        let prev_ref = unsafe { prev.deref() };
        let succ = prev_ref.next.load(Ordering::Acquire, guard);
        assert!(!is_deleted(succ), "linking after a consumed node");
        unsafe { new.deref() }.next.store(succ, Ordering::Relaxed);
        prev_ref.next.store(new, Ordering::Release);
        self.size.fetch_add(1, Ordering::Relaxed);
        new
    }
}

impl<T> Default for TaggedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TaggedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedQueue")
            .field("len", &self.len())
            .field("local_insert_attempts", &self.local_insert_attempts)
            .field("retry", &self.retry)
            .field("metrics_enabled", &self.instrumentation.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<T> Drop for TaggedQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no other thread can reach the chain.
        unsafe {
            let guard = epoch::unprotected();
            let head = self.head.load(Ordering::Relaxed, guard);
            let mut cur = strip(head.deref().next.load(Ordering::Relaxed, guard));
            drop(head.into_owned());

            while let Some(node) = cur.as_ref() {
                let next = node.next.load(Ordering::Relaxed, guard);
                let mut owned = cur.into_owned();
                if !is_deleted(next) {
                    owned.value.assume_init_drop();
                }
                drop(owned);
                cur = strip(next);
            }
        }
    }
}

impl<T: Send> ConcurrentQueue<T> for TaggedQueue<T> {
    fn push(&self, value: T) {
        TaggedQueue::push(self, value);
    }

    fn pop(&self) -> Option<T> {
        TaggedQueue::pop(self)
    }

    fn is_empty(&self) -> bool {
        TaggedQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        TaggedQueue::len(self)
    }
}

impl<T> MetricsCollector for TaggedQueue<T> {
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
