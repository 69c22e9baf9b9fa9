//! Property-based tests for both queues using proptest
//!
//! Single-threaded operation sequences are replayed against a `VecDeque`
//! model; the queues must agree with it after every step.

use super::*;
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Pop,
    PushBatch(Vec<i32>),
    PopBatch(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => any::<i32>().prop_map(Op::Push),
        3 => Just(Op::Pop),
        1 => prop::collection::vec(any::<i32>(), 0..8).prop_map(Op::PushBatch),
        1 => (0usize..8).prop_map(Op::PopBatch),
    ]
}

/// Applies `op` to the model and returns what the queue should have produced.
fn apply_model(model: &mut VecDeque<i32>, op: &Op) -> Vec<i32> {
    match op {
        Op::Push(value) => {
            model.push_back(*value);
            Vec::new()
        }
        Op::Pop => model.pop_front().into_iter().collect(),
        Op::PushBatch(values) => {
            model.extend(values.iter().copied());
            Vec::new()
        }
        Op::PopBatch(max) => {
            let take = (*max).min(model.len());
            model.drain(..take).collect()
        }
    }
}

macro_rules! model_properties {
    ($module:ident, $queue:ident) => {
        mod $module {
            use super::*;

            fn apply(queue: &$queue<i32>, op: &Op) -> Vec<i32> {
                match op {
                    Op::Push(value) => {
                        queue.push(*value);
                        Vec::new()
                    }
                    Op::Pop => queue.pop().into_iter().collect(),
                    Op::PushBatch(values) => {
                        let pushed = queue.push_batch(values.iter().copied());
                        assert_eq!(pushed, values.len());
                        Vec::new()
                    }
                    Op::PopBatch(max) => queue.pop_batch(*max),
                }
            }

            proptest! {
                #[test]
                fn test_matches_fifo_model(
                    ops in prop::collection::vec(op_strategy(), 1..200)
                ) {
                    let queue = $queue::new();
                    let mut model = VecDeque::new();

                    for op in &ops {
                        let expected = apply_model(&mut model, op);
                        prop_assert_eq!(apply(&queue, op), expected);
                        prop_assert_eq!(queue.len(), model.len());
                        prop_assert_eq!(queue.is_empty(), model.is_empty());
                    }
                }

                #[test]
                fn test_empty_pop_leaves_queue_usable(
                    before in prop::collection::vec(any::<i32>(), 0..20),
                    after in prop::collection::vec(any::<i32>(), 1..20)
                ) {
                    let queue = $queue::new();
                    for &value in &before {
                        queue.push(value);
                    }
                    for &value in &before {
                        prop_assert_eq!(queue.pop(), Some(value));
                    }
                    prop_assert_eq!(queue.pop(), None);
                    prop_assert_eq!(queue.pop(), None);

                    for &value in &after {
                        queue.push(value);
                    }
                    prop_assert_eq!(queue.pop_batch(after.len() + 1), after);
                }

                #[test]
                fn test_drop_releases_every_unconsumed_value(
                    pushes in 0usize..64,
                    pops in 0usize..64
                ) {
                    let live = Arc::new(AtomicUsize::new(0));
                    let expected_left = pushes.saturating_sub(pops);
                    {
                        let queue = $queue::new();
                        for _ in 0..pushes {
                            queue.push(Counted::new(&live));
                        }
                        for _ in 0..pops {
                            drop(queue.pop());
                        }
                        prop_assert_eq!(live.load(Ordering::SeqCst), expected_left);
                    }
                    prop_assert_eq!(live.load(Ordering::SeqCst), 0);
                }
            }
        }
    };
}

/// Tracks how many instances are alive.
#[derive(Debug)]
struct Counted(Arc<AtomicUsize>);

impl Counted {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Counted(Arc::clone(live))
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

model_properties!(ms_queue_properties, MsQueue);
model_properties!(tagged_queue_properties, TaggedQueue);

mod tagged_chain_properties {
    use super::*;

    proptest! {
        #[test]
        fn test_consumed_nodes_form_a_prefix(
            ops in prop::collection::vec(op_strategy(), 1..120)
        ) {
            let queue = TaggedQueue::new();
            for op in &ops {
                match op {
                    Op::Push(value) => queue.push(*value),
                    Op::Pop => {
                        let _ = queue.pop();
                    }
                    Op::PushBatch(values) => {
                        queue.push_batch(values.iter().copied());
                    }
                    Op::PopBatch(max) => {
                        queue.pop_batch(*max);
                    }
                }

                let flags = queue.deletion_flags();
                let live = flags.iter().skip_while(|deleted| **deleted);
                prop_assert!(
                    live.clone().all(|deleted| !deleted),
                    "consumed node after a live one: {:?}",
                    flags
                );
                prop_assert_eq!(live.count(), queue.len());
            }
        }

        #[test]
        fn test_attempt_limit_does_not_change_single_thread_order(
            attempts in 1usize..32,
            values in prop::collection::vec(any::<u16>(), 0..64)
        ) {
            let queue = TaggedQueue::with_config(
                QueueConfig::default().local_insert_attempts(attempts),
            ).unwrap();
            prop_assert_eq!(queue.push_batch(values.iter().copied()), values.len());
            prop_assert_eq!(queue.pop_batch(values.len()), values);
            prop_assert!(queue.is_empty());
        }
    }
}
