//! Local sort (spec.md §4.B): a stable sort of a local buffer of records by
//! key. Rust's `[T]::sort_by` is already a stable merge sort, so correctness
//! of stability only depends on comparing keys (never incidental payload
//! bytes) and never reordering records that compare equal.

use crate::record::RecordLayout;
use bumpalo::Bump;

/// Sort `records` in place by key, stably. Allocates one scratch buffer the
/// size of `records` out of a fresh arena and releases it before returning
/// (spec.md §3 "Lifecycle": no hidden state persists).
pub fn sort_local(layout: &RecordLayout, records: &mut [u8]) {
    let n = layout.len_of(records);
    if n < 2 {
        return;
    }

    let mut order: Vec<u32> = (0..n as u32).collect();
    order.sort_by(|&a, &b| {
        layout.cmp_keys(
            layout.key(records, a as usize),
            layout.key(records, b as usize),
        )
    });

    apply_permutation(layout, records, &order);
}

/// Rewrite `records` so that `records[i] == old_records[order[i]]`. The
/// scratch copy lives in a bump arena scoped to this call; it is dropped in
/// one shot instead of record-by-record.
pub fn apply_permutation(layout: &RecordLayout, records: &mut [u8], order: &[u32]) {
    let n = layout.len_of(records);
    debug_assert_eq!(order.len(), n);

    let arena = Bump::with_capacity(records.len());
    let scratch = arena.alloc_slice_fill_copy(records.len(), 0u8);
    for (dst, &src) in order.iter().enumerate() {
        layout.copy_record(scratch, dst, records, src as usize);
    }
    records.copy_from_slice(scratch);
}
