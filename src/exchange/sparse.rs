//! Sparse all-to-all: skip rank pairs with nothing to send, trading a
//! handshake (already paid for by [`super::handshake`]) for point-to-point
//! messages only between pairs that actually exchange records. Worthwhile
//! when most of the P×P matrix is empty, e.g. an already near-sorted input
//! shuffled across few ranks.

use crate::group::Group;
use crate::record::RecordLayout;

pub fn exchange(
    group: &dyn Group,
    layout: &RecordLayout,
    send_buf: &[u8],
    send_counts: &[usize],
    recv_counts: &[usize],
) -> Vec<u8> {
    let elem = layout.element_bytes;
    let my_rank = group.rank();

    let mut send_displs = Vec::with_capacity(send_counts.len());
    let mut running = 0usize;
    for &c in send_counts {
        send_displs.push(running);
        running += c;
    }

    // Self-to-self is a local copy, not a round trip through the transport.
    let self_chunk = {
        let off = send_displs[my_rank] * elem;
        let len = send_counts[my_rank] * elem;
        send_buf[off..off + len].to_vec()
    };

    // Every nonzero destination but self becomes one entry in a single
    // batched post: the `Group` implementation is responsible for posting
    // every receive before any send so that two ranks which are each other's
    // only partner for a large message can't deadlock against each other's
    // blocking transport (a plain loop of blocking sends followed by a loop
    // of blocking receives cannot give that guarantee).
    let sends: Vec<(usize, &[u8])> = send_counts
        .iter()
        .enumerate()
        .filter(|&(dest, &count)| dest != my_rank && count > 0)
        .map(|(dest, &count)| {
            let off = send_displs[dest] * elem;
            (dest, &send_buf[off..off + count * elem])
        })
        .collect();
    let recv_specs: Vec<(usize, usize)> = recv_counts
        .iter()
        .enumerate()
        .filter(|&(src, &count)| src != my_rank && count > 0)
        .map(|(src, &count)| (src, count * elem))
        .collect();
    log::debug!(
        "sparse exchange: rank {my_rank} sending to {} peers, receiving from {} peers",
        sends.len(),
        recv_specs.len()
    );

    let received = group.sparse_alltoall_bytes(&sends, &recv_specs);
    let mut by_source: std::collections::HashMap<usize, Vec<u8>> = recv_specs
        .iter()
        .map(|&(src, _)| src)
        .zip(received)
        .collect();

    let total_recv: usize = recv_counts.iter().sum();
    let mut recv = vec![0u8; total_recv * elem];
    let mut cursor = 0usize;
    for (src, &count) in recv_counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let chunk = if src == my_rank {
            self_chunk.clone()
        } else {
            by_source.remove(&src).expect("recv_specs and recv_counts agree on nonzero sources")
        };
        recv[cursor..cursor + chunk.len()].copy_from_slice(&chunk);
        cursor += chunk.len();
    }

    recv
}
