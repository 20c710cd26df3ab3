//! Gather-sort fallback (spec.md §4.G): for small global arrays the
//! distributed splitter search and exchange cost more than just gathering
//! everything to one rank, sorting locally, and scattering the exact target
//! partition back out. Used below [`crate::tuning::Thresholds::gather_sort_threshold`].

use crate::group::Group;
use crate::local_sort::sort_local;
use crate::record::RecordLayout;

const ROOT: usize = 0;

/// Gather all records to `ROOT`, sort once, and scatter back the caller's
/// exact target partition (`target_prefix`, length `P + 1`).
pub fn gather_sort(group: &dyn Group, layout: &RecordLayout, local: &[u8], target_prefix: &[u64]) -> Vec<u8> {
    let gathered = group.gather_bytes(local, ROOT);

    let sorted_all = gathered.map(|mut buf| {
        sort_local(layout, &mut buf);
        buf
    });

    let counts_bytes: Vec<usize> = target_prefix
        .windows(2)
        .map(|w| (w[1] - w[0]) as usize * layout.element_bytes)
        .collect();

    group.scatter_bytes(sorted_all.as_deref(), &counts_bytes, ROOT)
}
