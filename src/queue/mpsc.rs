//! Unbounded lock-free multi-producer single-consumer linked queue.
//!
//! Producers claim the insertion point with an atomic tail swap and then
//! publish the previous tail's link as a second, separate step. The consumer
//! owns the head. Each value is boxed into a dedicated node that carries the
//! link, so payload types know nothing about queue internals and a node can
//! never be enqueued while still linked elsewhere.
//!
//! Correctness property: every value passed to [`QueueSender::send`] is
//! returned by exactly one [`QueueReceiver::take_next`], in the total order
//! established by successful tail swaps. For a single producer that order is
//! FIFO; between racing producers it is whichever wins the swap.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

/// Spins before the consumer starts yielding while waiting for a producer to
/// publish its link.
const SPIN_LIMIT: u32 = 64;

struct Node<T> {
    value: T,
    next: AtomicPtr<Node<T>>,
}

struct Inner<T> {
    /// Consumer-private except for the one store a producer makes when it
    /// observes the empty→non-empty transition.
    head: AtomicPtr<Node<T>>,
    /// Shared insertion point, contended by producers. Null means empty.
    tail: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Sole owner at this point; reclaim whatever was never consumed.
        let mut cursor = *self.head.get_mut();
        while !cursor.is_null() {
            let node = unsafe { Box::from_raw(cursor) };
            cursor = node.next.load(Ordering::Relaxed);
        }
    }
}

/// Create a connected sender/receiver pair over a fresh empty queue.
pub fn channel<T: Send>() -> (QueueSender<T>, QueueReceiver<T>) {
    let inner = Arc::new(Inner {
        head: AtomicPtr::new(ptr::null_mut()),
        tail: AtomicPtr::new(ptr::null_mut()),
    });
    (
        QueueSender {
            inner: Arc::clone(&inner),
        },
        QueueReceiver { inner },
    )
}

/// Producer handle. Cheap to clone; any number of threads may send.
pub struct QueueSender<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> QueueSender<T> {
    /// Publish `value` as the new tail.
    ///
    /// Returns `true` exactly when the queue transitioned from empty to
    /// non-empty, which is the caller's cue to raise the consumer signal
    /// once. Returns `false` when a backlog already existed.
    pub fn send(&self, value: T) -> bool {
        let node = Box::into_raw(Box::new(Node {
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }));

        let prev = self.inner.tail.swap(node, Ordering::AcqRel);
        if prev.is_null() {
            // Queue was empty: this node is also the new head.
            self.inner.head.store(node, Ordering::Release);
            true
        } else {
            // Deferred link publication: the swap above claimed the slot,
            // this store makes the node reachable from the old tail.
            unsafe { (*prev).next.store(node, Ordering::Release) };
            false
        }
    }
}

/// Consumer handle. Exactly one logical consumer must drive it; the `&mut`
/// receivers enforce that at compile time.
pub struct QueueReceiver<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Send> QueueReceiver<T> {
    /// Whether the queue currently has no published head. Never blocks.
    pub fn is_empty(&self) -> bool {
        self.inner.head.load(Ordering::Acquire).is_null()
    }

    /// Borrow the current head without removing it, or `None` when empty.
    /// Never blocks.
    pub fn peek(&mut self) -> Option<&T> {
        let head = self.inner.head.load(Ordering::Acquire);
        if head.is_null() {
            None
        } else {
            // Nodes are only freed by take_next, which needs &mut self, so
            // this borrow keeps the node alive.
            Some(unsafe { &(*head).value })
        }
    }

    /// Remove and return the current head, or `None` when empty.
    ///
    /// When the head has no published successor but is not the tail, a
    /// producer has swapped the tail and not yet stored the link; this spins
    /// (with a yield backoff past [`SPIN_LIMIT`]) until the link appears.
    /// The spin is intrinsic to the tail-swap/deferred-link design and must
    /// not be turned into a blocking wait.
    pub fn take_next(&mut self) -> Option<T> {
        let head = self.inner.head.load(Ordering::Acquire);
        if head.is_null() {
            return None;
        }

        let mut next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            self.inner.head.store(ptr::null_mut(), Ordering::Release);
            if self
                .inner
                .tail
                .compare_exchange(head, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Head was also the tail: queue is now empty and no producer
                // can still hold a reference to this node.
                let node = unsafe { Box::from_raw(head) };
                return Some(node.value);
            }

            // A producer won the tail in between; wait out its link store.
            let mut spins = 0u32;
            loop {
                next = unsafe { (*head).next.load(Ordering::Acquire) };
                if !next.is_null() {
                    break;
                }
                spins = spins.wrapping_add(1);
                if spins < SPIN_LIMIT {
                    std::hint::spin_loop();
                } else {
                    std::thread::yield_now();
                }
            }
        }

        self.inner.head.store(next, Ordering::Release);
        let node = unsafe { Box::from_raw(head) };
        Some(node.value)
    }
}
