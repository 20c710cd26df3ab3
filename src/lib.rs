//! Stable, distributed sample sort of a one-dimensional array partitioned
//! across a fixed set of parallel processes.
//!
//! The engine treats records as opaque, fixed-width byte windows with a
//! sort key at a caller-specified offset (see [`RecordLayout`]); it never
//! needs to know the record's structural type. [`orchestrator::sort`] picks
//! between a fully distributed splitter-search pipeline and a gather-sort
//! fallback depending on the array's size, and [`ops`] builds `permute`,
//! `take`, and `histogram` on top of that one primitive.
//!
//! ```no_run
//! use mpsort::{group::ThreadGroup, record::RecordLayout, tuning::{Thresholds, TuningSet}, sort};
//!
//! let layout = RecordLayout::new(4, 0, 4).unwrap();
//! let tuning = TuningSet::build(&[]).unwrap();
//! let thresholds = Thresholds::default();
//!
//! let per_rank = vec![vec![5u32, 1, 4], vec![2u32, 8]];
//! let out_lens = [2usize, 3];
//!
//! ThreadGroup::run(2, move |g| {
//!     let mut local: Vec<u8> = per_rank[g.rank()].iter().flat_map(|v| v.to_be_bytes()).collect();
//!     sort(&g, &layout, &mut local, out_lens[g.rank()], &tuning, &thresholds).unwrap();
//! });
//! ```

pub mod bucket;
pub mod error;
pub mod exchange;
pub mod gather_sort;
pub mod group;
pub mod local_sort;
pub mod merge;
pub mod ops;
pub mod orchestrator;
pub mod record;
pub mod splitter;
pub mod tuning;

pub use error::{SortError, SortResult};
pub use orchestrator::sort;
pub use record::RecordLayout;
