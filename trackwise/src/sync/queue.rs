//! Priority queue for pending sync items.
//!
//! Items are ordered by priority (higher first), then by enqueue order
//! (FIFO within the same priority). An item put back after a failed delivery
//! keeps its original sequence number, so it returns to its original place
//! rather than the back of its tier.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::item::{SyncItem, SyncPriority};

/// A sync item with its ordering key.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub item: SyncItem,
    sequence: u64,
}

impl QueuedItem {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn priority(&self) -> SyncPriority {
        self.item.priority
    }
}

// Max-heap: higher priority first, then lower sequence (older) first
impl PartialEq for QueuedItem {
    fn eq(&self, other: &Self) -> bool {
        self.item.priority == other.item.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedItem {}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.item.priority.cmp(&other.item.priority) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            other_ordering => other_ordering,
        }
    }
}

/// Priority queue of pending items.
///
/// Not thread-safe; the pipeline wraps it in a mutex.
#[derive(Debug, Default)]
pub struct SyncQueue {
    heap: BinaryHeap<QueuedItem>,
    next_sequence: u64,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new item behind everything already queued at its priority.
    ///
    /// A lower-priority item still queued for the same fix is dropped, so a
    /// fix re-sent at higher urgency goes out once. Returns whether that
    /// happened.
    pub fn push(&mut self, item: SyncItem) -> bool {
        let before = self.heap.len();
        self.heap
            .retain(|queued| !(queued.item.priority < item.priority && queued.item.payload.same_fix(&item.payload)));
        let superseded = self.heap.len() < before;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(QueuedItem { item, sequence });
        superseded
    }

    /// Puts back an item taken by [`pop_batch`](Self::pop_batch).
    pub fn requeue(&mut self, queued: QueuedItem) {
        self.heap.push(queued);
    }

    pub fn pop(&mut self) -> Option<QueuedItem> {
        self.heap.pop()
    }

    /// Removes up to `max` items in delivery order.
    pub fn pop_batch(&mut self, max: usize) -> Vec<QueuedItem> {
        let take = max.min(self.heap.len());
        let mut batch = Vec::with_capacity(take);
        while batch.len() < take {
            match self.heap.pop() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        batch
    }

    pub fn peek(&self) -> Option<&QueuedItem> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of queued items at each priority, lowest priority first.
    pub fn priority_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for queued in self.heap.iter() {
            counts[queued.item.priority as usize] += 1;
        }
        counts
    }
}
