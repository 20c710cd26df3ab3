//! The recognized tuning flags (spec.md §4.H) plus the numeric thresholds the
//! orchestrator uses to pick a strategy. Mirrors the way `rdst::TuningParameters`
//! centralizes every knob a caller might want to override, with `Default`
//! giving sane constants for everything that isn't explicitly set.

use crate::error::SortError;

/// A single recognized tuning flag. Unknown flags are rejected at the call
/// boundary by `TuningSet::build`; there is no escape hatch for arbitrary
/// strings the way the original Python binding's `tuning: list[str]` allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TuningFlag {
    EnableSparseAlltoallv,
    DisableSparseAlltoallv,
    RequireSparseAlltoallv,
    DisableIallreduce,
    DisableGatherSort,
    RequireGatherSort,
}

/// A validated set of tuning flags for one call to [`crate::orchestrator::sort`].
///
/// `REQUIRE` takes precedence over `DISABLE`, which takes precedence over
/// `ENABLE` (spec.md §9, normalizing the historically ambiguous flag set).
/// Mutually exclusive `REQUIRE`/`DISABLE` pairs for the same strategy are
/// rejected at construction so every other call path never has to consider
/// them again.
#[derive(Debug, Clone, Default)]
pub struct TuningSet {
    enable_sparse: bool,
    disable_sparse: bool,
    require_sparse: bool,
    disable_iallreduce: bool,
    disable_gather_sort: bool,
    require_gather_sort: bool,
}

impl TuningSet {
    pub fn build(flags: &[TuningFlag]) -> Result<Self, SortError> {
        let mut set = TuningSet::default();
        for flag in flags {
            match flag {
                TuningFlag::EnableSparseAlltoallv => set.enable_sparse = true,
                TuningFlag::DisableSparseAlltoallv => set.disable_sparse = true,
                TuningFlag::RequireSparseAlltoallv => set.require_sparse = true,
                TuningFlag::DisableIallreduce => set.disable_iallreduce = true,
                TuningFlag::DisableGatherSort => set.disable_gather_sort = true,
                TuningFlag::RequireGatherSort => set.require_gather_sort = true,
            }
        }

        if set.require_sparse && set.disable_sparse {
            return Err(SortError::BadTuning(
                "REQUIRE_SPARSE_ALLTOALLV and DISABLE_SPARSE_ALLTOALLV are mutually exclusive"
                    .into(),
            ));
        }
        if set.require_gather_sort && set.disable_gather_sort {
            return Err(SortError::BadTuning(
                "REQUIRE_GATHER_SORT and DISABLE_GATHER_SORT are mutually exclusive".into(),
            ));
        }

        Ok(set)
    }

    pub fn iallreduce_overlap(&self) -> bool {
        !self.disable_iallreduce
    }

    /// Resolve the dense/sparse choice for the all-to-all exchange given an
    /// estimated pairwise density (fraction of the P x P send/recv matrix
    /// that is nonzero). Precedence: require > disable > enable > heuristic.
    pub fn choose_exchange(&self, density: f64, thresholds: &Thresholds) -> ExchangeKind {
        if self.require_sparse {
            log::warn!("choose_exchange: REQUIRE_SPARSE_ALLTOALLV forces sparse at density={density:.4}");
            return ExchangeKind::Sparse;
        }
        if self.disable_sparse {
            log::warn!("choose_exchange: DISABLE_SPARSE_ALLTOALLV forces dense at density={density:.4}");
            return ExchangeKind::Dense;
        }
        if self.enable_sparse && density < thresholds.sparse_enable_density {
            log::debug!("choose_exchange: ENABLE_SPARSE_ALLTOALLV widened threshold, density={density:.4} -> sparse");
            return ExchangeKind::Sparse;
        }
        let kind = if density < thresholds.sparse_density_threshold {
            ExchangeKind::Sparse
        } else {
            ExchangeKind::Dense
        };
        log::debug!("choose_exchange: heuristic density={density:.4} -> {kind:?}");
        kind
    }

    /// Resolve whether the gather-sort fallback should run in place of the
    /// distributed path, given the global record count.
    pub fn choose_strategy(&self, global_len: u64, thresholds: &Thresholds) -> Strategy {
        if self.require_gather_sort {
            log::warn!("choose_strategy: REQUIRE_GATHER_SORT forces gather-sort at global_len={global_len}");
            return Strategy::GatherSort;
        }
        if self.disable_gather_sort {
            log::warn!("choose_strategy: DISABLE_GATHER_SORT forces distributed at global_len={global_len}");
            return Strategy::Distributed;
        }
        let strategy = if global_len < thresholds.gather_sort_threshold {
            Strategy::GatherSort
        } else {
            Strategy::Distributed
        };
        log::debug!("choose_strategy: heuristic global_len={global_len} -> {strategy:?}");
        strategy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Dense,
    Sparse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    GatherSort,
    Distributed,
}

/// Numeric thresholds that pick a strategy but never change the observable
/// result (Testable Property 5, tuning invariance).
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Below this *global* record count, the gather-sort fallback runs
    /// unconditionally unless overridden.
    pub gather_sort_threshold: u64,
    /// Below this pairwise density, the sparse exchange is picked over dense.
    pub sparse_density_threshold: f64,
    /// A looser density bound used only when `ENABLE_SPARSE_ALLTOALLV` is set,
    /// letting the caller opt into sparse a bit more eagerly than the default
    /// heuristic would on its own.
    pub sparse_enable_density: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            gather_sort_threshold: 1 << 16,
            sparse_density_threshold: 0.25,
            sparse_enable_density: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_require_disable_sparse_conflict() {
        let err = TuningSet::build(&[
            TuningFlag::RequireSparseAlltoallv,
            TuningFlag::DisableSparseAlltoallv,
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_require_disable_gather_conflict() {
        let err = TuningSet::build(&[TuningFlag::RequireGatherSort, TuningFlag::DisableGatherSort]);
        assert!(err.is_err());
    }

    #[test]
    fn require_sparse_wins_regardless_of_density() {
        let set = TuningSet::build(&[TuningFlag::RequireSparseAlltoallv]).unwrap();
        let t = Thresholds::default();
        assert_eq!(set.choose_exchange(0.99, &t), ExchangeKind::Sparse);
    }

    #[test]
    fn disable_sparse_wins_over_enable() {
        let set = TuningSet::build(&[
            TuningFlag::EnableSparseAlltoallv,
            TuningFlag::DisableSparseAlltoallv,
        ])
        .unwrap();
        let t = Thresholds::default();
        assert_eq!(set.choose_exchange(0.01, &t), ExchangeKind::Dense);
    }

    #[test]
    fn default_heuristic_picks_by_density() {
        let set = TuningSet::build(&[]).unwrap();
        let t = Thresholds::default();
        assert_eq!(set.choose_exchange(0.01, &t), ExchangeKind::Sparse);
        assert_eq!(set.choose_exchange(0.9, &t), ExchangeKind::Dense);
    }
}
