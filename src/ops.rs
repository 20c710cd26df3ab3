//! Derived operations (spec.md §6): `permute`, `take`, and `histogram`, all
//! built as compositions of the core [`crate::orchestrator::sort`] rather
//! than duplicating its distributed-collective logic. This mirrors the
//! original implementation's layering, where these three were thin wrappers
//! around the one distributed sort primitive.

use crate::error::SortResult;
use crate::group::{all_gather_usize, Group};
use crate::local_sort::sort_local;
use crate::orchestrator;
use crate::record::RecordLayout;
use crate::tuning::{Thresholds, TuningSet};

/// Redistribute `local`'s records so this rank's output slot `j` (the `j`-th
/// of its `out_len`-sized share) holds the record currently living at global
/// source position `index_local[j]` — i.e. the result is `source[index]`,
/// repartitioned the way `index_local` itself is sharded across ranks.
/// `index_local` must be a bijection onto `0..total` for the result to be a
/// genuine permutation (see [`take`] for the same fetch without that
/// restriction).
///
/// Two sorts, mirroring the original implementation's construction
/// (`original_source/mpsort/__init__.py`): a plain single sort keyed directly
/// on `index_local` only reproduces this contract when `index_local` happens
/// to be self-inverse, which is not true in general. The first sort keys each
/// output request on the source position it wants and ships it back to
/// whichever rank currently owns that source record, so every source record
/// learns its own destination; the second sort ships the record itself there.
pub fn permute(
    group: &dyn Group,
    layout: &RecordLayout,
    local: &mut Vec<u8>,
    index_local: &[u64],
    out_len: usize,
    tuning: &TuningSet,
    thresholds: &Thresholds,
) -> SortResult<()> {
    debug_assert_eq!(index_local.len(), out_len);

    let in_len = layout.len_of(local);
    let out_base: u64 = {
        let out_counts = all_gather_usize(group, out_len);
        out_counts[..group.rank()].iter().sum::<usize>() as u64
    };

    // Sort A: key = requested source position, payload = requester's global
    // output position. Target partition = the source's own current shares,
    // so every rank ends up holding, at the same local positions as its own
    // source records, the output position each of them was requested for.
    let a_layout = RecordLayout::new(16, 0, 8)?;
    let mut a_buf = vec![0u8; out_len * a_layout.element_bytes];
    for j in 0..out_len {
        let rec = a_layout.record_mut(&mut a_buf, j);
        rec[0..8].copy_from_slice(&index_local[j].to_be_bytes());
        rec[8..16].copy_from_slice(&(out_base + j as u64).to_be_bytes());
    }
    orchestrator::sort(group, &a_layout, &mut a_buf, in_len, tuning, thresholds)?;
    debug_assert_eq!(a_layout.len_of(&a_buf), in_len);

    // Sort B: key = output position (from sort A), payload = the source
    // record itself. Target partition = the caller's requested out_len.
    let elem = layout.element_bytes;
    let b_layout = RecordLayout::new(8 + elem, 0, 8)?;
    let mut b_buf = vec![0u8; in_len * b_layout.element_bytes];
    for i in 0..in_len {
        let a_rec = a_layout.record(&a_buf, i);
        let rec = b_layout.record_mut(&mut b_buf, i);
        rec[0..8].copy_from_slice(&a_rec[8..16]);
        rec[8..].copy_from_slice(layout.record(local, i));
    }
    orchestrator::sort(group, &b_layout, &mut b_buf, out_len, tuning, thresholds)?;

    let n_final = b_layout.len_of(&b_buf);
    let mut out = vec![0u8; n_final * elem];
    for i in 0..n_final {
        let rec = b_layout.record(&b_buf, i);
        layout.record_mut(&mut out, i).copy_from_slice(&rec[8..]);
    }
    *local = out;
    Ok(())
}

fn owner_of(global_prefix: &[u64], g: u64) -> usize {
    let mut lo = 0usize;
    let mut hi = global_prefix.len() - 1;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if global_prefix[mid + 1] <= g {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Fetch arbitrary global positions from a distributed array. `global_prefix`
/// (length `P + 1`) describes `local`'s current sharding; `wanted` is this
/// rank's list of global indices to fetch, in the order the caller wants
/// them back.
///
/// Three phases, matching the original implementation's shape: a histogram
/// of request counts per owning rank (sizing the first sort), a routing
/// sort that ships each request to its owner and a second that ships each
/// fetched value back to its requester, and a final *local* gather that
/// restores the caller's requested order (no further collectives needed,
/// since by then every rank already holds exactly the records it asked
/// for).
pub fn take(
    group: &dyn Group,
    layout: &RecordLayout,
    local: &[u8],
    global_prefix: &[u64],
    wanted: &[u64],
    tuning: &TuningSet,
    thresholds: &Thresholds,
) -> SortResult<Vec<u8>> {
    let my_rank = group.rank();
    let size = group.size();
    let n_wanted = wanted.len();

    let mut owner_counts = vec![0u64; size];
    for &g in wanted {
        owner_counts[owner_of(global_prefix, g)] += 1;
    }
    let owner_totals = group.allreduce_sum_u64(&owner_counts);

    // request record: [owner_rank(8) | requester_rank(8) | request_id(8) | local_offset(8)]
    let req_layout = RecordLayout::new(32, 0, 8)?;
    let mut requests = vec![0u8; n_wanted * 32];
    for (i, &g) in wanted.iter().enumerate() {
        let owner = owner_of(global_prefix, g);
        let local_offset = g - global_prefix[owner];
        let rec = req_layout.record_mut(&mut requests, i);
        rec[0..8].copy_from_slice(&(owner as u64).to_be_bytes());
        rec[8..16].copy_from_slice(&(my_rank as u64).to_be_bytes());
        rec[16..24].copy_from_slice(&(i as u64).to_be_bytes());
        rec[24..32].copy_from_slice(&local_offset.to_be_bytes());
    }

    let my_incoming_total = owner_totals[my_rank] as usize;
    orchestrator::sort(group, &req_layout, &mut requests, my_incoming_total, tuning, thresholds)?;

    // Every request this rank now holds names one of its own local records.
    let n_incoming = req_layout.len_of(&requests);
    let resp_element = 16 + layout.element_bytes;
    let resp_layout = RecordLayout::new(resp_element, 0, 8)?;
    let mut responses = vec![0u8; n_incoming * resp_element];
    for i in 0..n_incoming {
        let req = req_layout.record(&requests, i);
        let requester_rank = &req[8..16];
        let request_id = &req[16..24];
        let local_offset = u64::from_be_bytes(req[24..32].try_into().unwrap()) as usize;

        let resp = resp_layout.record_mut(&mut responses, i);
        resp[0..8].copy_from_slice(requester_rank);
        resp[8..16].copy_from_slice(request_id);
        resp[16..].copy_from_slice(layout.record(local, local_offset));
    }

    orchestrator::sort(group, &resp_layout, &mut responses, n_wanted, tuning, thresholds)?;

    // Local gather: reorder by request_id to restore the caller's order.
    let by_request_id = RecordLayout::new(resp_element, 8, 8)?;
    sort_local(&by_request_id, &mut responses);

    let n_final = resp_layout.len_of(&responses);
    let mut out = vec![0u8; n_final * layout.element_bytes];
    for i in 0..n_final {
        let resp = resp_layout.record(&responses, i);
        layout.record_mut(&mut out, i).copy_from_slice(&resp[16..]);
    }
    Ok(out)
}

/// Bucket `values` against sorted `edges` and sum the per-bin counts across
/// the group. Produces `edges.len() + 1` bins: the overflow bin at index
/// `edges.len()` catches everything past the last edge. When
/// `right_inclusive` is `false`, a value equal to an edge falls in the bin
/// to its right (`[edge, next)`); when `true`, it falls to the left
/// (`(prev, edge]`).
pub fn histogram(group: &dyn Group, values: &[u64], edges: &[u64], right_inclusive: bool) -> Vec<u64> {
    let mut local_counts = vec![0u64; edges.len() + 1];
    for &v in values {
        let bin = if right_inclusive {
            edges.partition_point(|&e| e < v)
        } else {
            edges.partition_point(|&e| e <= v)
        };
        local_counts[bin] += 1;
    }
    group.allreduce_sum_u64(&local_counts)
}
