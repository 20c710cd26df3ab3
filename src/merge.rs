//! Merge (spec.md §4.F): combine the sorted runs received from each source
//! rank into one sorted output buffer. Each run arrives already sorted by
//! key (it was locally sorted before the exchange), so a k-way merge
//! suffices; ties are broken by source rank, then by position within that
//! rank's run, which is exactly the global (rank, local index) stability
//! contract.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::record::RecordLayout;

struct HeapItem {
    key: Vec<u8>,
    src: usize,
    pos: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.src == other.src
    }
}
impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap`, a max-heap, pops the smallest key first;
        // ties broken by source rank ascending.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.src.cmp(&self.src))
    }
}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merge `recv`, a buffer holding one sorted run per source rank
/// concatenated in rank order with lengths `recv_counts`, into a single
/// sorted output buffer.
pub fn merge_runs(layout: &RecordLayout, recv: &[u8], recv_counts: &[usize]) -> Vec<u8> {
    let total: usize = recv_counts.iter().sum();
    let mut out = vec![0u8; total * layout.element_bytes];
    if total == 0 {
        return out;
    }

    let mut run_starts = Vec::with_capacity(recv_counts.len());
    let mut running = 0usize;
    for &c in recv_counts {
        run_starts.push(running);
        running += c;
    }

    let mut heap = BinaryHeap::with_capacity(recv_counts.len());
    for (src, (&count, &start)) in recv_counts.iter().zip(run_starts.iter()).enumerate() {
        if count > 0 {
            heap.push(HeapItem {
                key: layout.key(recv, start).to_vec(),
                src,
                pos: start,
            });
        }
    }

    let mut out_idx = 0usize;
    while let Some(item) = heap.pop() {
        layout.copy_record(&mut out, out_idx, recv, item.pos);
        out_idx += 1;

        let next_pos = item.pos + 1;
        let run_end = run_starts[item.src] + recv_counts[item.src];
        if next_pos < run_end {
            heap.push(HeapItem {
                key: layout.key(recv, next_pos).to_vec(),
                src: item.src,
                pos: next_pos,
            });
        }
    }

    debug_assert_eq!(out_idx, total);
    out
}
