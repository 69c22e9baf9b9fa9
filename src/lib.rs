//! # splice-queue
//!
//! Lock-free, unbounded, multi-producer multi-consumer FIFO queues built on
//! compare-and-swap over a singly-linked node chain.
//!
//! ## Queues
//!
//! - [`MsQueue`]: the classical helping queue. Producers and consumers
//!   cooperate to advance a lagging tail pointer.
//! - [`TaggedQueue`]: marks consumed nodes with a deletion tag carried in the
//!   successor pointer. A producer that loses the race at the tail splices its
//!   node in right after the winner instead of restarting from scratch.
//!
//! Both implement [`ConcurrentQueue`], so harness code can drive either one
//! through the same interface.
//!
//! ## Quick Start
//!
//! ```rust
//! use splice_queue::{MsQueue, TaggedQueue};
//!
//! let queue = MsQueue::new();
//! queue.push(42);
//! assert_eq!(queue.pop(), Some(42));
//! assert_eq!(queue.pop(), None);
//!
//! let tagged = TaggedQueue::new();
//! tagged.push("hello");
//! assert_eq!(tagged.pop(), Some("hello"));
//! ```
//!
//! ## Ordering
//!
//! [`MsQueue`] is linearizable FIFO. [`TaggedQueue`] trades that for fewer
//! restarts under write contention: values pushed by different threads at the
//! same time may be linked in either order. Each producer's own values still
//! come out in the order it pushed them, however many producers race.
//!
//! ## Memory
//!
//! Nodes are retired through `crossbeam-epoch` once `head` moves past them,
//! so a node address is never reused while another thread may still compare
//! against it.
//!
//! Queues are deliberately not `Clone`:
//!
//! ```compile_fail
//! let queue = splice_queue::MsQueue::<i32>::new();
//! let copy = queue.clone();
//! ```

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod metrics;
pub mod queue;

pub use crate::metrics::{MetricsCollector, PerformanceMetrics, QueueEvent, QueueObserver};
pub use crate::queue::{MsQueue, QueueConfig, RetryStrategy, TaggedQueue};

/// Common utilities and helper types
pub mod util {
    use core::ops::{Deref, DerefMut};

    /// Cache line size for alignment purposes
    pub const CACHE_LINE_SIZE: usize = 64;

    /// Pads and aligns a value to the length of a cache line so that `head`
    /// and `tail` never share one.
    #[derive(Default)]
    #[repr(align(64))]
    pub struct CachePadded<T> {
        value: T,
    }

    impl<T> CachePadded<T> {
        /// Create a new cache-padded value
        #[inline]
        pub const fn new(value: T) -> Self {
            Self { value }
        }

        /// Get the inner value
        #[inline]
        pub fn into_inner(self) -> T {
            self.value
        }
    }

    impl<T> Deref for CachePadded<T> {
        type Target = T;

        #[inline]
        fn deref(&self) -> &T {
            &self.value
        }
    }

    impl<T> DerefMut for CachePadded<T> {
        #[inline]
        fn deref_mut(&mut self) -> &mut T {
            &mut self.value
        }
    }

    impl<T: core::fmt::Debug> core::fmt::Debug for CachePadded<T> {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            core::fmt::Debug::fmt(&self.value, f)
        }
    }
}

/// Error types for queue operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No value became available before the deadline
    #[error("operation timed out")]
    Timeout,
    /// A configuration value was rejected
    #[error("invalid queue configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result type for queue operations
pub type Result<T> = core::result::Result<T, Error>;

/// The push/pop contract shared by every queue in this crate.
///
/// `push` never fails. `pop` returns `None` when no unconsumed value existed
/// at the moment it looked; that is a snapshot, not a promise that the queue
/// stays empty.
pub trait ConcurrentQueue<T>: Send + Sync {
    /// Links `value` into the queue exactly once.
    fn push(&self, value: T);

    /// Removes and returns the next value, or `None` if the queue was empty.
    fn pop(&self) -> Option<T>;

    /// Point-in-time emptiness check.
    fn is_empty(&self) -> bool;

    /// Approximate number of queued values.
    fn len(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_padded() {
        let padded = util::CachePadded::new(42);
        assert_eq!(*padded, 42);
        assert_eq!(core::mem::align_of_val(&padded), util::CACHE_LINE_SIZE);

        let mut padded = padded;
        *padded = 100;
        assert_eq!(padded.into_inner(), 100);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::Timeout.to_string(), "operation timed out");
        assert_eq!(
            Error::InvalidConfig("local_insert_attempts must be at least 1").to_string(),
            "invalid queue configuration: local_insert_attempts must be at least 1"
        );
    }

    #[test]
    fn test_trait_objects() {
        let queues: Vec<Box<dyn ConcurrentQueue<u32>>> =
            vec![Box::new(MsQueue::new()), Box::new(TaggedQueue::new())];

        for queue in &queues {
            assert!(queue.is_empty());
            queue.push(7);
            queue.push(8);
            assert_eq!(queue.len(), 2);
            assert_eq!(queue.pop(), Some(7));
            assert_eq!(queue.pop(), Some(8));
            assert_eq!(queue.pop(), None);
        }
    }
}
