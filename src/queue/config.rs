//! Queue configuration

use crate::{Error, Result};

/// Fan-out limit for the tagged queue's local splice loop: one attempt per
/// contending thread on a sixteen-thread machine.
pub const DEFAULT_LOCAL_INSERT_ATTEMPTS: usize = 15;

/// What a thread does after losing a CAS round, before trying again.
///
/// None of these change correctness; they only trade latency for less
/// pressure on the contended cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Retry straight away.
    Immediate,
    /// Issue a spin-loop hint, then retry.
    #[default]
    Spin,
    /// Yield the thread to the OS scheduler, then retry.
    Yield,
}

impl RetryStrategy {
    #[inline]
    pub(crate) fn relax(self) {
        match self {
            RetryStrategy::Immediate => {}
            RetryStrategy::Spin => core::hint::spin_loop(),
            RetryStrategy::Yield => std::thread::yield_now(),
        }
    }
}

/// Tunables shared by [`MsQueue`](crate::MsQueue) and
/// [`TaggedQueue`](crate::TaggedQueue).
///
/// # Examples
///
/// ```rust
/// use splice_queue::{QueueConfig, RetryStrategy, TaggedQueue};
///
/// let config = QueueConfig::default()
///     .local_insert_attempts(4)
///     .retry(RetryStrategy::Yield)
///     .metrics_enabled(true);
/// let queue: TaggedQueue<u64> = TaggedQueue::with_config(config)?;
/// assert_eq!(queue.local_insert_attempts(), 4);
/// # Ok::<(), splice_queue::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Splice attempts a losing producer makes after the tail-race winner
    /// before restarting from the tail. Ignored by `MsQueue`.
    pub local_insert_attempts: usize,
    /// Behaviour between failed CAS rounds.
    pub retry: RetryStrategy,
    /// Whether operation counters and timings are collected from the start.
    pub metrics_enabled: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            local_insert_attempts: DEFAULT_LOCAL_INSERT_ATTEMPTS,
            retry: RetryStrategy::default(),
            metrics_enabled: false,
        }
    }
}

impl QueueConfig {
    /// Set the splice fan-out limit.
    pub fn local_insert_attempts(mut self, attempts: usize) -> Self {
        self.local_insert_attempts = attempts;
        self
    }

    /// Set the retry strategy.
    pub fn retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Enable or disable metrics collection.
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Reject configurations the tagged queue cannot run with. `MsQueue`
    /// does not read the checked field and skips this.
    pub fn validate(&self) -> Result<()> {
        if self.local_insert_attempts == 0 {
            return Err(Error::InvalidConfig(
                "local_insert_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}
