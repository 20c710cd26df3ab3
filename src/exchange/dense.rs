//! Dense all-to-all: every rank exchanges with every other rank through the
//! group's collective primitive. Correct at any density; the orchestrator
//! only reaches for [`super::sparse`] when the pairwise density is low enough
//! that skipping zero-sized pairs is worth the point-to-point overhead.

use crate::group::Group;
use crate::record::RecordLayout;

pub fn exchange(group: &dyn Group, layout: &RecordLayout, send_buf: &[u8], send_counts: &[usize]) -> Vec<u8> {
    group.alltoallv_bytes(send_buf, send_counts, layout.element_bytes)
}
