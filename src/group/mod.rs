//! Process group abstraction (spec.md §9): a polymorphic capability set the
//! engine depends on instead of any one concrete transport. `mpi_group`
//! realizes it over the real `mpi` crate (rsmpi) for production use;
//! `thread_group` realizes the same trait over in-process threads so the
//! engine's protocol logic can be driven deterministically in `cargo test`
//! without an MPI runtime.

mod thread_group;

#[cfg(feature = "mpi-transport")]
mod mpi_group;

pub use thread_group::ThreadGroup;

#[cfg(feature = "mpi-transport")]
pub use mpi_group::MpiGroup;

/// The capability set every collective and point-to-point primitive in the
/// engine is built from. All methods are collective (every rank must call
/// them in the same order) except `send_bytes`/`recv_bytes` and
/// `sparse_alltoall_bytes`, which are point-to-point and used only by the
/// sparse exchange (spec.md §4.E).
pub trait Group: Send + Sync {
    fn size(&self) -> usize;
    fn rank(&self) -> usize;

    /// A pure synchronization point; no data moves.
    fn barrier(&self);

    /// Element-wise sum of `local` across every rank, result identical on
    /// every rank. Used for count totals and splitter-search round tallies.
    fn allreduce_sum_u64(&self, local: &[u64]) -> Vec<u64>;

    /// Every rank's `local` vector, visible to every rank, in rank order.
    /// Used to learn the per-rank breakdown behind a sum (tie resolution,
    /// sparse handshake), which a plain allreduce would collapse.
    fn all_gather_u64(&self, local: &[u64]) -> Vec<Vec<u64>>;

    /// A single dense variable-length all-to-all: `send` is laid out by
    /// destination rank in rank order according to `send_counts` (each count
    /// in units of `elem_bytes`-sized records); the result is the receive
    /// buffer laid out by source rank in rank order.
    fn alltoallv_bytes(&self, send: &[u8], send_counts: &[usize], elem_bytes: usize) -> Vec<u8>;

    /// Point-to-point send used by the sparse exchange for nonzero
    /// destinations only.
    fn send_bytes(&self, dest: usize, buf: &[u8]);

    /// Point-to-point receive of an already-known byte count.
    fn recv_bytes(&self, source: usize, num_bytes: usize) -> Vec<u8>;

    /// Batched point-to-point exchange for the sparse path (spec.md §4.E):
    /// post every receive in `recv_specs` before posting any send in `sends`,
    /// then wait for all of them, and return the received buffers in
    /// `recv_specs` order.
    ///
    /// This is one call rather than separate non-blocking `isend`/`irecv`
    /// primitives a caller could post now and wait on later: under rsmpi, a
    /// `Request` borrows both the scope it was issued in and its buffer, so it
    /// cannot outlive the call that created it without `unsafe`. Folding
    /// post-receives/post-sends/wait-all into one call keeps every
    /// implementation safe while still giving the two-sided guarantee that
    /// matters — no send is posted before its matching receive exists,
    /// so two ranks that are each other's only partner for a large transfer
    /// cannot deadlock against each other's blocking transport.
    fn sparse_alltoall_bytes(&self, sends: &[(usize, &[u8])], recv_specs: &[(usize, usize)]) -> Vec<Vec<u8>>;

    /// Variable-length gather: every rank contributes `local`; only `root`
    /// gets `Some` back, with the concatenation in rank order.
    fn gather_bytes(&self, local: &[u8], root: usize) -> Option<Vec<u8>>;

    /// Variable-length scatter: `root` supplies `Some(data)` laid out by
    /// destination rank according to `counts_bytes`; every rank (including
    /// root) gets its own slice back.
    fn scatter_bytes(&self, data: Option<&[u8]>, counts_bytes: &[usize], root: usize) -> Vec<u8>;
}

/// Convenience wrapper over [`Group::all_gather_u64`] for a single scalar per
/// rank.
pub fn all_gather_usize(group: &dyn Group, value: usize) -> Vec<usize> {
    group
        .all_gather_u64(&[value as u64])
        .into_iter()
        .map(|v| v[0] as usize)
        .collect()
}
