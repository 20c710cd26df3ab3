//! All-to-all exchange (spec.md §4.E): route records laid out by destination
//! rank to their owners, with dense and sparse implementations chosen
//! adaptively by the orchestrator.

mod dense;
mod sparse;

use crate::group::Group;
use crate::record::RecordLayout;
use crate::tuning::ExchangeKind;

/// The result of the counts-exchange handshake both dense and sparse paths
/// start from: every rank learns how many records each peer is about to
/// send it, and the orchestrator learns the pairwise density used to pick a
/// strategy (spec.md §4.E "Adaptive selection").
pub struct ExchangePlan {
    pub recv_counts: Vec<usize>,
    pub density: f64,
}

/// Exchange the send-counts matrix: every rank's `send_counts[j]` becomes
/// visible to every rank, from which each rank extracts the column
/// addressed to itself.
pub fn handshake(group: &dyn Group, send_counts: &[usize]) -> ExchangePlan {
    let size = group.size();
    let send_u64: Vec<u64> = send_counts.iter().map(|&c| c as u64).collect();
    let matrix = group.all_gather_u64(&send_u64);
    let my_rank = group.rank();

    let recv_counts: Vec<usize> = (0..size).map(|src| matrix[src][my_rank] as usize).collect();

    let nonzero: usize = matrix
        .iter()
        .map(|row| row.iter().filter(|&&c| c > 0).count())
        .sum();
    let density = if size == 0 {
        0.0
    } else {
        nonzero as f64 / (size * size) as f64
    };

    log::debug!("handshake: rank {my_rank} density={density:.4} recv_counts={recv_counts:?}");
    ExchangePlan { recv_counts, density }
}

/// Run the exchange given a precomputed plan and a chosen strategy. `send_buf`
/// must already be laid out by destination rank in rank order (spec.md §4.E
/// "a send buffer laid out by destination rank"). Returns the receive
/// buffer, concatenated in source-rank order.
pub fn exchange(
    group: &dyn Group,
    layout: &RecordLayout,
    send_buf: &[u8],
    send_counts: &[usize],
    plan: &ExchangePlan,
    kind: ExchangeKind,
) -> Vec<u8> {
    match kind {
        ExchangeKind::Dense => dense::exchange(group, layout, send_buf, send_counts),
        ExchangeKind::Sparse => sparse::exchange(group, layout, send_buf, send_counts, &plan.recv_counts),
    }
}
