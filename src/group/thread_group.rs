//! An in-process realization of [`super::Group`] over OS threads and
//! channels. Exists purely as test and development tooling: it lets the
//! engine's splitter search, exchange, and merge logic be driven through the
//! exact same collective sequence a real MPI job would use, deterministically
//! and without `mpiexec`, by running each simulated rank on its own thread.
//!
//! Every collective is implemented as "publish into a shared per-rank slot,
//! cross a barrier, read the fully-populated slot, cross a second barrier
//! before the slot is reused by the next call". The second barrier is what
//! makes it safe to reuse the same fixed slots across an unbounded sequence
//! of collective calls: it guarantees every rank has finished reading call
//! N's data before any rank starts writing call N+1's data into the same
//! storage.

use super::Group;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex};

struct Shared {
    size: usize,
    barrier_a: Barrier,
    barrier_b: Barrier,
    u64_slot: Mutex<Vec<Vec<u64>>>,
    bytes_slot: Mutex<Vec<Vec<u8>>>,
    counts_slot: Mutex<Vec<Vec<usize>>>,
    scatter_slot: Mutex<Option<(Vec<u8>, Vec<usize>)>>,
    senders: Vec<Vec<Mutex<Sender<Vec<u8>>>>>,
    receivers: Vec<Vec<Mutex<Receiver<Vec<u8>>>>>,
}

/// One simulated rank's handle into the shared, thread-joined group.
pub struct ThreadGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadGroup {
    /// Build `size` rank handles sharing one barrier/channel mesh.
    fn new_set(size: usize) -> Vec<ThreadGroup> {
        let mut senders: Vec<Vec<Mutex<Sender<Vec<u8>>>>> = Vec::with_capacity(size);
        let mut receivers_matrix: Vec<Vec<Option<Receiver<Vec<u8>>>>> = Vec::with_capacity(size);
        for _ in 0..size {
            let mut s_row = Vec::with_capacity(size);
            let mut r_row = Vec::with_capacity(size);
            for _ in 0..size {
                let (tx, rx) = mpsc::channel();
                s_row.push(Mutex::new(tx));
                r_row.push(Some(rx));
            }
            senders.push(s_row);
            receivers_matrix.push(r_row);
        }

        let receivers: Vec<Vec<Mutex<Receiver<Vec<u8>>>>> = receivers_matrix
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|rx| Mutex::new(rx.unwrap()))
                    .collect()
            })
            .collect();

        let shared = Arc::new(Shared {
            size,
            barrier_a: Barrier::new(size),
            barrier_b: Barrier::new(size),
            u64_slot: Mutex::new(vec![Vec::new(); size]),
            bytes_slot: Mutex::new(vec![Vec::new(); size]),
            counts_slot: Mutex::new(vec![Vec::new(); size]),
            scatter_slot: Mutex::new(None),
            senders,
            receivers,
        });

        (0..size)
            .map(|rank| ThreadGroup {
                rank,
                shared: shared.clone(),
            })
            .collect()
    }

    /// Run `body` once per simulated rank on its own thread and collect the
    /// per-rank results in rank order. This is the harness integration tests
    /// and property tests drive the engine through.
    pub fn run<F, R>(size: usize, body: F) -> Vec<R>
    where
        F: Fn(ThreadGroup) -> R + Send + Sync,
        R: Send,
    {
        let groups = ThreadGroup::new_set(size);
        std::thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|g| scope.spawn(|| body(g)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    }
}

impl Group for ThreadGroup {
    fn size(&self) -> usize {
        self.shared.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn barrier(&self) {
        self.shared.barrier_a.wait();
        self.shared.barrier_b.wait();
    }

    fn allreduce_sum_u64(&self, local: &[u64]) -> Vec<u64> {
        {
            let mut slot = self.shared.u64_slot.lock().unwrap();
            slot[self.rank] = local.to_vec();
        }
        self.shared.barrier_a.wait();
        let result = {
            let slot = self.shared.u64_slot.lock().unwrap();
            let len = local.len();
            let mut sum = vec![0u64; len];
            for per_rank in slot.iter() {
                for (acc, v) in sum.iter_mut().zip(per_rank.iter()) {
                    *acc = acc.wrapping_add(*v);
                }
            }
            sum
        };
        self.shared.barrier_b.wait();
        result
    }

    fn all_gather_u64(&self, local: &[u64]) -> Vec<Vec<u64>> {
        {
            let mut slot = self.shared.u64_slot.lock().unwrap();
            slot[self.rank] = local.to_vec();
        }
        self.shared.barrier_a.wait();
        let result = {
            let slot = self.shared.u64_slot.lock().unwrap();
            slot.clone()
        };
        self.shared.barrier_b.wait();
        result
    }

    fn alltoallv_bytes(&self, send: &[u8], send_counts: &[usize], elem_bytes: usize) -> Vec<u8> {
        {
            let mut bytes = self.shared.bytes_slot.lock().unwrap();
            bytes[self.rank] = send.to_vec();
            let mut counts = self.shared.counts_slot.lock().unwrap();
            counts[self.rank] = send_counts.to_vec();
        }
        self.shared.barrier_a.wait();
        let recv = {
            let bytes = self.shared.bytes_slot.lock().unwrap();
            let counts = self.shared.counts_slot.lock().unwrap();
            let mut recv = Vec::new();
            for src in 0..self.shared.size {
                let src_counts = &counts[src];
                let offset_records: usize = src_counts[..self.rank].iter().sum();
                let len_records = src_counts[self.rank];
                let start = offset_records * elem_bytes;
                let end = start + len_records * elem_bytes;
                recv.extend_from_slice(&bytes[src][start..end]);
            }
            recv
        };
        self.shared.barrier_b.wait();
        recv
    }

    fn send_bytes(&self, dest: usize, buf: &[u8]) {
        self.shared.senders[self.rank][dest]
            .lock()
            .unwrap()
            .send(buf.to_vec())
            .expect("peer rank dropped its receiver");
    }

    fn recv_bytes(&self, source: usize, num_bytes: usize) -> Vec<u8> {
        let data = self.shared.receivers[source][self.rank]
            .lock()
            .unwrap()
            .recv()
            .expect("peer rank never sent");
        debug_assert_eq!(data.len(), num_bytes);
        data
    }

    fn sparse_alltoall_bytes(&self, sends: &[(usize, &[u8])], recv_specs: &[(usize, usize)]) -> Vec<Vec<u8>> {
        // The channels are unbounded, so posting every send up front never
        // blocks; order relative to the receives below doesn't matter here,
        // unlike under a real blocking transport.
        for &(dest, buf) in sends {
            self.send_bytes(dest, buf);
        }
        recv_specs
            .iter()
            .map(|&(source, num_bytes)| self.recv_bytes(source, num_bytes))
            .collect()
    }

    fn gather_bytes(&self, local: &[u8], root: usize) -> Option<Vec<u8>> {
        {
            let mut bytes = self.shared.bytes_slot.lock().unwrap();
            bytes[self.rank] = local.to_vec();
        }
        self.shared.barrier_a.wait();
        let result = if self.rank == root {
            let bytes = self.shared.bytes_slot.lock().unwrap();
            let mut out = Vec::new();
            for per_rank in bytes.iter() {
                out.extend_from_slice(per_rank);
            }
            Some(out)
        } else {
            None
        };
        self.shared.barrier_b.wait();
        result
    }

    fn scatter_bytes(&self, data: Option<&[u8]>, counts_bytes: &[usize], root: usize) -> Vec<u8> {
        if self.rank == root {
            let mut slot = self.shared.scatter_slot.lock().unwrap();
            *slot = Some((data.expect("root must supply data").to_vec(), counts_bytes.to_vec()));
        }
        self.shared.barrier_a.wait();
        let mine = {
            let slot = self.shared.scatter_slot.lock().unwrap();
            let (buf, counts) = slot.as_ref().unwrap();
            let offset: usize = counts[..self.rank].iter().sum();
            let len = counts[self.rank];
            buf[offset..offset + len].to_vec()
        };
        self.shared.barrier_b.wait();
        mine
    }
}
