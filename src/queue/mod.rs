//! Queue implementations
//!
//! This module provides two unbounded lock-free MPMC FIFO queues built on the
//! same singly linked list of heap nodes with a leading sentinel.
//!
//! ## Available Queues
//!
//! - [`MsQueue`]: Classical helping queue. A stale tail is advanced before
//!   anyone links behind it.
//! - [`TaggedQueue`]: Tagged-deletion queue. Consumers mark a node consumed
//!   with a tag bit on its own `next` word, and producers that lose the
//!   race for the tail splice their node in right behind the winner.
//!
//! ## Choosing a Queue
//!
//! - **Ordering**: `MsQueue` is linearizable FIFO for any number of
//!   producers. `TaggedQueue` keeps FIFO per producer for any number of
//!   producers, but concurrent pushes from different threads may be linked
//!   in either order.
//! - **Contention**: `TaggedQueue` spreads losing producers over successive
//!   links instead of having all of them fight for the tail again.
//! - **Reclamation**: both retire unlinked nodes through `crossbeam-epoch`.
//!
//! ## Performance Characteristics
//!
//! | Queue Type | Push | Pop | Memory | Contention |
//! |------------|------|-----|---------|------------|
//! | MsQueue | O(1) amortised | O(1) | Dynamic | Medium-High |
//! | TaggedQueue | O(1) amortised | O(1) | Dynamic | Medium |
//!
//! ## Examples
//!
//! ```rust
//! use splice_queue::queue::{MsQueue, TaggedQueue};
//!
//! let classical = MsQueue::new();
//! classical.push(42);
//! assert_eq!(classical.pop(), Some(42));
//!
//! let tagged = TaggedQueue::new();
//! tagged.push("hello");
//! assert_eq!(tagged.pop(), Some("hello"));
//! assert_eq!(tagged.pop(), None);
//! ```
pub mod config;
pub mod ms;
pub(crate) mod node;
pub mod tagged;

// Re-export main types for convenience
pub use config::{QueueConfig, RetryStrategy, DEFAULT_LOCAL_INSERT_ATTEMPTS};
pub use ms::MsQueue;
pub use tagged::TaggedQueue;


#[cfg(test)]
mod proptests;
