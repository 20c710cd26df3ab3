//! Bucket assignment (spec.md §4.D): map each local record to a destination
//! rank using the resolved splitters, respecting the stability tie-breaks
//! derived from each splitter's `less_count`/`equal_count`.

use crate::group::Group;
use crate::record::RecordLayout;
use crate::splitter::{local_equal_count, Splitter};

/// For every boundary whose `equal_count` is nonzero, learn how many of
/// *each* rank's local records equal that splitter's key. A plain
/// `allreduce_sum` would collapse this into a global total (already known
/// as `equal_count`); we need the per-rank breakdown to compute each rank's
/// exclusive prefix within the globally-ordered run of equal keys, which is
/// what the stability contract ("rank, then local index") pins down.
fn gather_tie_offsets(
    group: &dyn Group,
    layout: &RecordLayout,
    sorted: &[u8],
    splitters: &[Splitter],
) -> Vec<u64> {
    let tie_boundaries: Vec<usize> = splitters
        .iter()
        .enumerate()
        .filter(|(_, s)| s.equal_count > 0)
        .map(|(i, _)| i)
        .collect();

    let mut before_local = vec![0u64; splitters.len()];
    if tie_boundaries.is_empty() {
        return before_local;
    }

    let local_counts: Vec<u64> = tie_boundaries
        .iter()
        .map(|&i| local_equal_count(layout, sorted, &splitters[i].key))
        .collect();

    let gathered = group.all_gather_u64(&local_counts);
    let my_rank = group.rank();

    for (col, &boundary) in tie_boundaries.iter().enumerate() {
        let before: u64 = gathered[..my_rank].iter().map(|row| row[col]).sum();
        before_local[boundary] = before;
    }

    before_local
}

/// First splitter index `i` with `splitters[i].key >= key`.
fn lower_bound_splitter(splitters: &[Splitter], key: &[u8]) -> usize {
    let mut lo = 0usize;
    let mut hi = splitters.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if splitters[mid].key.as_slice() < key {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// `r` such that `target_prefix[r] <= pos < target_prefix[r + 1]`.
fn rank_of_position(target_prefix: &[u64], pos: u64) -> usize {
    let mut lo = 0usize;
    let mut hi = target_prefix.len() - 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if target_prefix[mid + 1] <= pos {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Assign each of this rank's local records (already sorted by key) to a
/// destination rank. Returns one destination per local record index.
pub fn assign(
    group: &dyn Group,
    layout: &RecordLayout,
    sorted: &[u8],
    splitters: &[Splitter],
    target_prefix: &[u64],
) -> Vec<usize> {
    let n = layout.len_of(sorted);
    let mut dest = vec![0usize; n];
    if splitters.is_empty() {
        return dest;
    }

    let before_local = gather_tie_offsets(group, layout, sorted, splitters);

    let mut i = 0usize;
    while i < n {
        let key_i = layout.key(sorted, i);
        let mut j = i + 1;
        while j < n && layout.key(sorted, j) == key_i {
            j += 1;
        }

        let tie_pos = lower_bound_splitter(splitters, key_i);
        let is_tied = tie_pos < splitters.len() && splitters[tie_pos].key.as_slice() == key_i;

        if !is_tied {
            // `tie_pos` is exactly the count of splitters strictly less than
            // this key, i.e. the single destination rank for the whole run.
            for idx in dest.iter_mut().take(j).skip(i) {
                *idx = tie_pos;
            }
        } else {
            let boundary = tie_pos;
            let base = splitters[boundary].less_count;
            let run_len = (j - i) as u64;
            let mut pos = base + before_local[boundary];
            let end = pos + run_len;

            let mut r = rank_of_position(target_prefix, pos);
            let mut cursor = i;
            while pos < end {
                let seg_end = end.min(target_prefix[r + 1]);
                let count = (seg_end - pos) as usize;
                for slot in dest.iter_mut().take(cursor + count).skip(cursor) {
                    *slot = r;
                }
                cursor += count;
                pos = seg_end;
                r += 1;
            }
        }

        i = j;
    }

    dest
}

/// Turn per-record destinations into a dense send-count array `sc[0..P)`.
pub fn send_counts(dest: &[usize], group_size: usize) -> Vec<usize> {
    let mut counts = vec![0usize; group_size];
    for &d in dest {
        counts[d] += 1;
    }
    counts
}

/// Reorder `sorted` into a buffer laid out by destination rank in rank
/// order, as the exchange requires. A single forward pass with running
/// per-destination offsets is stable: records bound for the same destination
/// keep their relative (already key-sorted) order.
pub fn layout_by_destination(layout: &RecordLayout, sorted: &[u8], dest: &[usize], send_counts: &[usize]) -> Vec<u8> {
    let mut offsets = Vec::with_capacity(send_counts.len());
    let mut running = 0usize;
    for &c in send_counts {
        offsets.push(running);
        running += c;
    }

    let mut out = vec![0u8; sorted.len()];
    for (i, &d) in dest.iter().enumerate() {
        layout.copy_record(&mut out, offsets[d], sorted, i);
        offsets[d] += 1;
    }
    out
}
