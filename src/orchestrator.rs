//! Orchestrator (spec.md §4.H): the public entry point. Validates the
//! caller's contract, picks a strategy, and drives the pipeline of the
//! modules above — splitter search, bucket assignment, exchange, merge — or
//! the gather-sort fallback for small arrays.

use crate::bucket;
use crate::error::{SortError, SortResult};
use crate::exchange;
use crate::gather_sort::gather_sort;
use crate::group::{all_gather_usize, Group};
use crate::local_sort::sort_local;
use crate::merge::merge_runs;
use crate::record::RecordLayout;
use crate::tuning::{Strategy, Thresholds, TuningSet};

/// Sort `local` in place across the process group. `out_len` is this rank's
/// exact share of the globally sorted output (the P exact shares, summed,
/// must equal the current global record count — violating this is
/// [`SortError::BadInvariant`], detected identically on every rank via one
/// early collective before any data moves).
///
/// Supports in-place use directly: the caller's buffer is both the input and
/// the output, resized to `out_len` records by the time this returns.
pub fn sort(
    group: &dyn Group,
    layout: &RecordLayout,
    local: &mut Vec<u8>,
    out_len: usize,
    tuning: &TuningSet,
    thresholds: &Thresholds,
) -> SortResult<()> {
    let in_len = layout.len_of(local);
    let totals = group.allreduce_sum_u64(&[in_len as u64, out_len as u64]);
    let (total_in, total_out) = (totals[0], totals[1]);
    log::debug!("sort: rank {} in_len={in_len} out_len={out_len} total_in={total_in} total_out={total_out}", group.rank());
    if total_in != total_out {
        return Err(SortError::BadInvariant { total_in, total_out });
    }

    if total_in == 0 {
        local.clear();
        return Ok(());
    }

    let size = group.size();
    if size == 1 {
        log::debug!("sort: single rank, straight local sort");
        let mut buf = std::mem::take(local);
        sort_local(layout, &mut buf);
        buf.resize(out_len * layout.element_bytes, 0);
        *local = buf;
        return Ok(());
    }

    let out_counts = all_gather_usize(group, out_len);
    let mut target_prefix = vec![0u64; size + 1];
    for i in 0..size {
        target_prefix[i + 1] = target_prefix[i] + out_counts[i] as u64;
    }

    let strategy = tuning.choose_strategy(total_in, thresholds);
    log::debug!("sort: total_in={total_in} selected strategy {strategy:?}");
    let out = match strategy {
        Strategy::GatherSort => gather_sort(group, layout, local, &target_prefix),
        Strategy::Distributed => run_distributed(group, layout, local, &target_prefix, tuning, thresholds),
    };

    debug_assert_eq!(layout.len_of(&out), out_len);
    *local = out;
    Ok(())
}

fn run_distributed(
    group: &dyn Group,
    layout: &RecordLayout,
    local: &[u8],
    target_prefix: &[u64],
    tuning: &TuningSet,
    thresholds: &Thresholds,
) -> Vec<u8> {
    let mut sorted = local.to_vec();
    sort_local(layout, &mut sorted);

    log::debug!("run_distributed: rank {} searching splitters", group.rank());
    let splitters = crate::splitter::search(group, layout, &sorted, target_prefix, tuning);
    let dest = bucket::assign(group, layout, &sorted, &splitters, target_prefix);
    let send_counts = bucket::send_counts(&dest, group.size());
    let send_buf = bucket::layout_by_destination(layout, &sorted, &dest, &send_counts);

    let plan = exchange::handshake(group, &send_counts);
    let kind = tuning.choose_exchange(plan.density, thresholds);
    log::debug!("run_distributed: exchange density={:.4} kind={kind:?}", plan.density);
    let recv = exchange::exchange(group, layout, &send_buf, &send_counts, &plan, kind);

    merge_runs(layout, &recv, &plan.recv_counts)
}
