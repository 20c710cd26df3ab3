//! End-to-end scenarios (spec.md §8 S1-S6), driven over [`ThreadGroup`] so
//! they run under plain `cargo test` without an MPI launcher.

use mpsort::group::{Group, ThreadGroup};
use mpsort::record::RecordLayout;
use mpsort::tuning::{Thresholds, TuningSet};
use mpsort::{sort, SortError};

fn force_distributed() -> Thresholds {
    Thresholds {
        gather_sort_threshold: 0,
        ..Thresholds::default()
    }
}

fn u32_records(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn u32_values(layout: &RecordLayout, buf: &[u8]) -> Vec<u32> {
    (0..layout.len_of(buf))
        .map(|i| u32::from_be_bytes(layout.key(buf, i).try_into().unwrap()))
        .collect()
}

#[test]
fn s1_integers_in_integers_out_p2() {
    let layout = RecordLayout::new(4, 0, 4).unwrap();
    let per_rank = vec![u32_records(&[3, 1, 4, 1, 5]), u32_records(&[9, 2, 6, 5, 3])];
    let out_lens = [5usize, 5];

    let results = ThreadGroup::run(2, move |g| {
        let mut local = per_rank[g.rank()].clone();
        let tuning = TuningSet::build(&[]).unwrap();
        sort(&g, &layout, &mut local, out_lens[g.rank()], &tuning, &force_distributed()).unwrap();
        u32_values(&layout, &local)
    });

    assert_eq!(results[0], vec![1, 1, 2, 3, 3]);
    assert_eq!(results[1], vec![4, 5, 5, 6, 9]);
}

#[test]
fn s2_mismatched_partition_sizes_p4() {
    let layout = RecordLayout::new(4, 0, 4).unwrap();
    let full: Vec<u32> = (0..1000u32).rev().collect(); // unsorted 999..0
    let in_sizes = [0usize, 400, 0, 600];
    let mut cursor = 0;
    let per_rank: Vec<Vec<u8>> = in_sizes
        .iter()
        .map(|&n| {
            let chunk = u32_records(&full[cursor..cursor + n]);
            cursor += n;
            chunk
        })
        .collect();
    let out_sizes = [200usize, 200, 0, 600];

    let results = ThreadGroup::run(4, move |g| {
        let mut local = per_rank[g.rank()].clone();
        let tuning = TuningSet::build(&[]).unwrap();
        sort(&g, &layout, &mut local, out_sizes[g.rank()], &tuning, &force_distributed()).unwrap();
        u32_values(&layout, &local)
    });

    let all: Vec<u32> = results.into_iter().flatten().collect();
    let mut expected: Vec<u32> = (0..1000u32).collect();
    expected.sort();
    assert_eq!(all, expected);
}

#[test]
fn s3_struct_records_key_not_at_offset_zero() {
    // 16-byte record, 8-byte key at offset 8, 8-byte payload (original global index) at offset 0.
    let layout = RecordLayout::new(16, 8, 8).unwrap();
    let values: Vec<u64> = vec![5, 3, 5, 1, 5, 3, 5, 1, 5, 3];
    let mut buf = Vec::new();
    for (i, &v) in values.iter().enumerate() {
        buf.extend_from_slice(&(i as u64).to_be_bytes()); // payload: original global index
        buf.extend_from_slice(&v.to_be_bytes()); // key
    }
    let per_rank = vec![buf[..80].to_vec(), buf[80..].to_vec()]; // 5 records each
    let out_lens = [5usize, 5];

    let results = ThreadGroup::run(2, move |g| {
        let mut local = per_rank[g.rank()].clone();
        let tuning = TuningSet::build(&[]).unwrap();
        sort(&g, &layout, &mut local, out_lens[g.rank()], &tuning, &force_distributed()).unwrap();
        local
    });

    let flat: Vec<u8> = results.into_iter().flatten().collect();
    let n = layout.len_of(&flat);
    let decoded: Vec<(u64, u64)> = (0..n)
        .map(|i| {
            let rec = layout.record(&flat, i);
            (
                u64::from_be_bytes(rec[8..16].try_into().unwrap()),
                u64::from_be_bytes(rec[0..8].try_into().unwrap()),
            )
        })
        .collect();

    let keys: Vec<u64> = decoded.iter().map(|(k, _)| *k).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]));

    // Among equal keys, original (rank, index) order is preserved: payload
    // (original global index) must be increasing within each key run.
    let mut i = 0;
    while i < decoded.len() {
        let mut j = i + 1;
        while j < decoded.len() && decoded[j].0 == decoded[i].0 {
            j += 1;
        }
        let payloads: Vec<u64> = decoded[i..j].iter().map(|(_, p)| *p).collect();
        assert!(payloads.windows(2).all(|w| w[0] < w[1]));
        i = j;
    }
}

#[test]
fn s4_wide_key_p12() {
    // 24-byte record: 16-byte key (8-byte high, 4-byte mid, 4-byte pad), 8-byte payload.
    let layout = RecordLayout::new(24, 0, 16).unwrap();
    let size = 12usize;
    let total = 240u64;
    let mut all_keys: Vec<(u64, u32)> = (0..total).map(|i| ((i * 7 + 3) % 97, (i % 11) as u32)).collect();
    // deterministic pseudo-shuffle so ranks don't receive pre-sorted input
    all_keys.rotate_left(53);

    let per_rank_sizes = [30usize, 10, 0, 40, 5, 25, 15, 35, 0, 20, 45, 15];
    assert_eq!(per_rank_sizes.iter().sum::<usize>(), total as usize);

    let mut cursor = 0usize;
    let mut per_rank_buf = Vec::with_capacity(size);
    for &n in &per_rank_sizes {
        let mut buf = vec![0u8; n * 24];
        for (local_i, (hi, mid)) in all_keys[cursor..cursor + n].iter().enumerate() {
            let rec = layout.record_mut(&mut buf, local_i);
            rec[0..8].copy_from_slice(&hi.to_be_bytes());
            rec[8..12].copy_from_slice(&mid.to_be_bytes());
            // rec[12..16] pad stays zero
            rec[16..24].copy_from_slice(&(cursor as u64 + local_i as u64).to_be_bytes());
        }
        per_rank_buf.push(buf);
        cursor += n;
    }
    let out_sizes = per_rank_sizes;

    let results = ThreadGroup::run(size, move |g| {
        let mut local = per_rank_buf[g.rank()].clone();
        let tuning = TuningSet::build(&[]).unwrap();
        sort(&g, &layout, &mut local, out_sizes[g.rank()], &tuning, &force_distributed()).unwrap();
        local
    });

    let flat: Vec<u8> = results.into_iter().flatten().collect();
    let n = layout.len_of(&flat);
    let keys: Vec<Vec<u8>> = (0..n).map(|i| layout.key(&flat, i).to_vec()).collect();

    let mut reference: Vec<Vec<u8>> = Vec::with_capacity(all_keys.len());
    for (hi, mid) in &all_keys {
        let mut k = vec![0u8; 16];
        k[0..8].copy_from_slice(&hi.to_be_bytes());
        k[8..12].copy_from_slice(&mid.to_be_bytes());
        reference.push(k);
    }
    reference.sort();

    assert_eq!(keys, reference);
}

#[test]
fn s5_empty_global_array_no_deadlock() {
    let layout = RecordLayout::new(4, 0, 4).unwrap();
    let results = ThreadGroup::run(4, move |g| {
        let mut local: Vec<u8> = Vec::new();
        let tuning = TuningSet::build(&[]).unwrap();
        sort(&g, &layout, &mut local, 0, &tuning, &Thresholds::default()).unwrap();
        local
    });
    assert!(results.iter().all(|r| r.is_empty()));
}

#[test]
fn s6_few_item_sizes_p4_all_combinations() {
    let layout = RecordLayout::new(4, 0, 4).unwrap();

    for a in 0..3u32 {
        for b in 0..3u32 {
            for c in 0..3u32 {
                for d in 0..3u32 {
                    let sizes = [a as usize, b as usize, c as usize, d as usize];
                    let total: usize = sizes.iter().sum();
                    if total == 0 {
                        continue;
                    }

                    // Deterministic pseudo-random-looking values, reversed so
                    // input is never accidentally pre-sorted.
                    let mut value = 0u32;
                    let per_rank: Vec<Vec<u8>> = sizes
                        .iter()
                        .map(|&n| {
                            let vs: Vec<u32> = (0..n as u32)
                                .map(|_| {
                                    value = value.wrapping_add(2654435761);
                                    value % 50
                                })
                                .collect();
                            u32_records(&vs)
                        })
                        .collect();

                    let mut expected: Vec<u32> = per_rank
                        .iter()
                        .flat_map(|buf| u32_values(&layout, buf))
                        .collect();
                    expected.sort();

                    // redistribute output as evenly as possible across ranks
                    let mut out_sizes = [0usize; 4];
                    let mut remaining = total;
                    for (i, o) in out_sizes.iter_mut().enumerate() {
                        let share = (remaining + (4 - i) - 1) / (4 - i);
                        *o = share;
                        remaining -= share;
                    }

                    let results = ThreadGroup::run(4, move |g| {
                        let mut local = per_rank[g.rank()].clone();
                        let tuning = TuningSet::build(&[]).unwrap();
                        sort(&g, &layout, &mut local, out_sizes[g.rank()], &tuning, &force_distributed()).unwrap();
                        u32_values(&layout, &local)
                    });

                    let all: Vec<u32> = results.into_iter().flatten().collect();
                    assert_eq!(all, expected, "sizes={sizes:?}");
                }
            }
        }
    }
}

#[test]
fn bad_invariant_rejected_symmetrically() {
    let layout = RecordLayout::new(4, 0, 4).unwrap();
    let results = ThreadGroup::run(2, move |g| {
        let mut local = u32_records(&[1, 2, 3]);
        let tuning = TuningSet::build(&[]).unwrap();
        let out_len = if g.rank() == 0 { 2 } else { 2 }; // total_out=4 != total_in=3
        sort(&g, &layout, &mut local, out_len, &tuning, &Thresholds::default())
    });
    for r in results {
        assert!(matches!(r, Err(SortError::BadInvariant { .. })));
    }
}
