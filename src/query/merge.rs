//! K-way time-ordered merge
//!
//! The cursor heap keeps block cursors ordered by their current timestamp:
//! ascending queries surface the smallest, descending the largest. Ties
//! between cursors resolve by push order, so merge output is deterministic
//! for a fixed scan layout. Merging stops at the requested limit or when
//! every cursor is exhausted.

use crate::query::cursor::BlockCursor;
use crate::query::QueryRow;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

struct HeapEntry {
    cursor: BlockCursor,
    asc: bool,
    seq: u64,
}

impl HeapEntry {
    fn key(&self) -> (i64, u64) {
        (self.cursor.current_ts(), self.seq)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap is a max-heap: the "greatest" entry is the next row of the
    // merge. Ascending queries invert the timestamp order; equal timestamps
    // fall back to earliest push first.
    fn cmp(&self, other: &Self) -> Ordering {
        let ts = if self.asc {
            other.cursor.current_ts().cmp(&self.cursor.current_ts())
        } else {
            self.cursor.current_ts().cmp(&other.cursor.current_ts())
        };
        ts.then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Heap of block cursors, ordered by current timestamp.
pub(crate) struct CursorHeap {
    entries: BinaryHeap<HeapEntry>,
    asc: bool,
    next_seq: u64,
}

impl CursorHeap {
    pub fn new(asc: bool) -> Self {
        Self {
            entries: BinaryHeap::new(),
            asc,
            next_seq: 0,
        }
    }

    pub fn push(&mut self, cursor: BlockCursor) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(HeapEntry {
            cursor,
            asc: self.asc,
            seq,
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
    }

    /// Pop rows in query order into `out` until `limit` rows are present
    /// or the heap drains. Exhausted cursors drop out of the heap;
    /// advanced cursors re-sift in place.
    pub fn merge(&mut self, limit: usize, out: &mut Vec<QueryRow>) {
        while out.len() < limit {
            let Some(mut top) = self.entries.peek_mut() else {
                break;
            };
            if let Some(row) = top.cursor.take_current() {
                out.push(row);
            }
            let asc = top.asc;
            if !top.cursor.advance(asc) {
                std::collections::binary_heap::PeekMut::pop(top);
            }
        }
    }
}

/// Reduce row lists that are each already sorted in query order into one
/// bounded, ordered list. Ties across lists resolve by list position.
pub(crate) fn merge_sorted_rows(
    lists: Vec<Vec<QueryRow>>,
    limit: usize,
    asc: bool,
) -> Vec<QueryRow> {
    struct Head {
        ts: i64,
        list: usize,
        asc: bool,
    }

    impl Head {
        fn key(&self) -> (i64, usize) {
            (self.ts, self.list)
        }
    }

    impl PartialEq for Head {
        fn eq(&self, other: &Self) -> bool {
            self.key() == other.key()
        }
    }
    impl Eq for Head {}
    impl PartialOrd for Head {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Head {
        fn cmp(&self, other: &Self) -> Ordering {
            let ts = if self.asc {
                other.ts.cmp(&self.ts)
            } else {
                self.ts.cmp(&other.ts)
            };
            ts.then_with(|| other.list.cmp(&self.list))
        }
    }

    let mut queues: Vec<VecDeque<QueryRow>> =
        lists.into_iter().map(VecDeque::from).collect();
    let mut heap = BinaryHeap::new();
    for (list, queue) in queues.iter().enumerate() {
        if let Some(front) = queue.front() {
            heap.push(Head {
                ts: front.timestamp,
                list,
                asc,
            });
        }
    }

    let mut out = Vec::new();
    while out.len() < limit {
        let Some(head) = heap.pop() else {
            break;
        };
        let queue = &mut queues[head.list];
        if let Some(row) = queue.pop_front() {
            out.push(row);
        }
        if let Some(front) = queue.front() {
            heap.push(Head {
                ts: front.timestamp,
                list: head.list,
                asc,
            });
        }
    }
    out
}
