//! Splitter search (spec.md §4.C): parallel bisection on the key space to
//! find the P-1 keys that cut the globally sorted sequence at exactly the
//! caller's target output partition. Exact-partition tie resolution among
//! equal-keyed records at a boundary is `bucket::gather_tie_offsets`'s job,
//! driven off `less_count`/`equal_count` below.

use crate::group::Group;
use crate::record::{decrement_be, increment_be, midpoint_be, RecordLayout};
use crate::tuning::TuningSet;

/// One resolved boundary: `key` is the splitter value, `less_count` /
/// `equal_count` are its global counts.
#[derive(Debug, Clone)]
pub struct Splitter {
    pub key: Vec<u8>,
    pub less_count: u64,
    pub equal_count: u64,
}

/// Binary search in a sorted record buffer: the count of records with key
/// strictly less than `candidate`, and the count with key exactly equal.
fn count_less_equal(layout: &RecordLayout, sorted: &[u8], candidate: &[u8]) -> (u64, u64) {
    let n = layout.len_of(sorted);
    let lower = sorted_partition_point(layout, sorted, n, |k| k < candidate);
    let upper = sorted_partition_point(layout, sorted, n, |k| k <= candidate);
    (lower as u64, (upper - lower) as u64)
}

fn sorted_partition_point(
    layout: &RecordLayout,
    sorted: &[u8],
    n: usize,
    pred: impl Fn(&[u8]) -> bool,
) -> usize {
    let mut lo = 0usize;
    let mut hi = n;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(layout.key(sorted, mid)) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Count of this rank's local records whose key equals `candidate` exactly.
pub fn local_equal_count(layout: &RecordLayout, sorted: &[u8], candidate: &[u8]) -> u64 {
    let (_, equal) = count_less_equal(layout, sorted, candidate);
    equal
}

/// Compute the P-1 splitters for a global target partition with prefix sums
/// `target_prefix` (length `P + 1`, `target_prefix[0] == 0`,
/// `target_prefix[P]` == the global record count).
///
/// `sorted` must already be locally sorted by key (spec.md §4.C assumes
/// per-rank sorted local buffers). Every rank must call this with the same
/// `target_prefix` and must run exactly the same number of rounds, which is
/// guaranteed here: all ranks loop `8 * key_bytes` times regardless of how
/// many boundaries resolve early (spec.md §5 "identical across ranks").
pub fn search(
    group: &dyn Group,
    layout: &RecordLayout,
    sorted: &[u8],
    target_prefix: &[u64],
    tuning: &TuningSet,
) -> Vec<Splitter> {
    let boundaries = group.size() - 1;
    if boundaries == 0 {
        return Vec::new();
    }

    let mut lo: Vec<Vec<u8>> = vec![layout.key_min(); boundaries];
    let mut hi: Vec<Vec<u8>> = vec![layout.key_max(); boundaries];
    let mut resolved: Vec<Option<Splitter>> = vec![None; boundaries];
    let overlap = tuning.iallreduce_overlap();
    if !overlap {
        log::debug!("splitter search: DISABLE_IALLREDUCE set, using strict blocking allreduce");
    }
    // With overlap enabled, each boundary's next-round candidate is computed
    // right after this round's direction is known, instead of lazily at the
    // top of the next round — the local work the engine can do without
    // waiting on the next allreduce (spec.md §4.C "Disable-iallreduce").
    let mut prefetched: Vec<Option<Vec<u8>>> = vec![None; boundaries];

    let max_rounds = 8 * layout.key_bytes;
    for round in 0..max_rounds {
        if resolved.iter().all(|r| r.is_some()) {
            log::trace!("splitter search converged after {round} rounds");
            break;
        }

        let candidates: Vec<Vec<u8>> = (0..boundaries)
            .map(|i| match &resolved[i] {
                Some(s) => s.key.clone(),
                None => prefetched[i].take().unwrap_or_else(|| midpoint_be(&lo[i], &hi[i])),
            })
            .collect();

        let mut local_counts = vec![0u64; 2 * boundaries];
        for i in 0..boundaries {
            if resolved[i].is_some() {
                continue;
            }
            let (less, equal) = count_less_equal(layout, sorted, &candidates[i]);
            local_counts[2 * i] = less;
            local_counts[2 * i + 1] = equal;
        }

        let global = group.allreduce_sum_u64(&local_counts);

        for i in 0..boundaries {
            if resolved[i].is_some() {
                continue;
            }
            let less_g = global[2 * i];
            let equal_g = global[2 * i + 1];
            let target = target_prefix[i + 1];

            if less_g <= target && target <= less_g + equal_g {
                resolved[i] = Some(Splitter {
                    key: candidates[i].clone(),
                    less_count: less_g,
                    equal_count: equal_g,
                });
            } else if less_g > target {
                hi[i] = decrement_be(&candidates[i]);
            } else {
                lo[i] = increment_be(&candidates[i]);
            }

            if overlap && resolved[i].is_none() {
                prefetched[i] = Some(midpoint_be(&lo[i], &hi[i]));
            }
        }
    }

    // Bisection over an 8*K-bit space is guaranteed to converge within 8*K
    // rounds; anything still open is a boundary whose lo/hi have met.
    resolved
        .into_iter()
        .enumerate()
        .map(|(i, maybe)| {
            maybe.unwrap_or_else(|| {
                let key = lo[i].clone();
                let (less, equal) = count_less_equal(layout, sorted, &key);
                Splitter {
                    key,
                    less_count: less,
                    equal_count: equal,
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ThreadGroup;
    use crate::local_sort::sort_local;
    use crate::tuning::{TuningFlag, TuningSet};

    fn layout_u32() -> RecordLayout {
        RecordLayout::new(4, 0, 4).unwrap()
    }

    fn records(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn splits_evenly_distributed_values() {
        let layout = layout_u32();
        let ranks_data = vec![vec![3u32, 1, 4, 1, 5], vec![9u32, 2, 6, 5, 3]];

        let results = ThreadGroup::run(2, move |g| {
            let mut local = records(&ranks_data[g.rank()]);
            sort_local(&layout, &mut local);
            let target_prefix = vec![0u64, 5, 10];
            let tuning = TuningSet::build(&[]).unwrap();
            let splitters = search(&g, &layout, &local, &target_prefix, &tuning);
            (local, splitters.into_iter().map(|s| s.key).collect::<Vec<_>>())
        });

        // Global sorted order is [1,1,2,3,3,4,5,5,6,9]; the boundary at T=5
        // must land so the first 5 elements are <= it and the rest after.
        let splitter_key = &results[0].1[0];
        let splitter_val = u32::from_be_bytes(splitter_key.as_slice().try_into().unwrap());
        assert!((3..=4).contains(&splitter_val));
        assert_eq!(results[0].1, results[1].1, "splitters must agree across ranks");
    }

    #[test]
    fn single_rank_has_no_boundaries() {
        let layout = layout_u32();
        let results = ThreadGroup::run(1, move |g| {
            let local = records(&[1, 2, 3]);
            let tuning = TuningSet::build(&[]).unwrap();
            search(&g, &layout, &local, &[0, 3], &tuning)
        });
        assert!(results[0].is_empty());
    }

    #[test]
    fn disabling_iallreduce_overlap_does_not_change_the_result() {
        let layout = layout_u32();
        let ranks_data = vec![vec![3u32, 1, 4, 1, 5], vec![9u32, 2, 6, 5, 3]];

        let run = |tuning: TuningSet| {
            let ranks_data = ranks_data.clone();
            ThreadGroup::run(2, move |g| {
                let mut local = records(&ranks_data[g.rank()]);
                sort_local(&layout, &mut local);
                let target_prefix = vec![0u64, 5, 10];
                search(&g, &layout, &local, &target_prefix, &tuning)
                    .into_iter()
                    .map(|s| s.key)
                    .collect::<Vec<_>>()
            })
        };

        let with_overlap = run(TuningSet::build(&[]).unwrap());
        let without_overlap = run(TuningSet::build(&[TuningFlag::DisableIallreduce]).unwrap());
        assert_eq!(with_overlap, without_overlap);
    }
}
