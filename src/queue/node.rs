//! Linked-list node shared by both queue algorithms.
//!
//! A node's `next` word is a `crossbeam_epoch::Atomic`, so the address and
//! a small tag travel together through every load and CAS. The tagged queue
//! uses tag bit [`DELETED`] to mean "the node owning this `next` field has
//! been consumed". The tag lives in the low alignment bits the pointer type
//! reserves for it; no address bits are borrowed.

use core::mem::MaybeUninit;
use crossbeam_epoch::{Atomic, Shared};

/// Tag bit marking the owning node as consumed.
pub(crate) const DELETED: usize = 1;

/// One cell of the queue.
///
/// `value` is uninitialised in the sentinel and has been moved out of every
/// node a pop returned; only the thread that won the node's removal CAS
/// ever reads it.
#[repr(align(64))] // Cache-line aligned
pub(crate) struct Node<T> {
    pub(crate) value: MaybeUninit<T>,
    pub(crate) next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    pub(crate) fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }

    pub(crate) fn new(value: T) -> Self {
        Self {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        }
    }
}

#[inline]
pub(crate) fn is_deleted<T>(ptr: Shared<'_, Node<T>>) -> bool {
    ptr.tag() & DELETED != 0
}

#[inline]
pub(crate) fn mark<T>(ptr: Shared<'_, Node<T>>) -> Shared<'_, Node<T>> {
    ptr.with_tag(ptr.tag() | DELETED)
}

#[inline]
pub(crate) fn strip<T>(ptr: Shared<'_, Node<T>>) -> Shared<'_, Node<T>> {
    ptr.with_tag(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_epoch::{self as epoch, Owned};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_node_alignment_leaves_room_for_tag() {
        assert_eq!(core::mem::align_of::<Node<u8>>(), 64);
        assert!(core::mem::align_of::<Node<u8>>() > DELETED);
    }

    #[test]
    fn test_mark_and_strip_preserve_address() {
        let guard = &epoch::pin();
        let node = Owned::new(Node::new(5_i64)).into_shared(guard);

        let marked = mark(node);
        assert!(is_deleted(marked));
        assert!(!is_deleted(node));
        assert_eq!(strip(marked), node);
        assert_eq!(marked.as_raw(), node.as_raw());

        let null = Shared::<Node<i64>>::null();
        assert!(is_deleted(mark(null)));
        assert!(strip(mark(null)).is_null());

        // SAFETY: the node was never published.
        unsafe {
            let owned = node.into_owned();
            assert_eq!(owned.value.assume_init_read(), 5);
        }
    }

    #[test]
    fn test_tag_survives_atomic_round_trip() {
        let guard = &epoch::pin();
        let sentinel = Node::<u32>::sentinel();
        sentinel.next.store(mark(Shared::null()), Ordering::Relaxed);
        let loaded = sentinel.next.load(Ordering::Relaxed, guard);
        assert!(is_deleted(loaded));
        assert!(strip(loaded).is_null());
    }
}
