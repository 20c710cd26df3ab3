//! Production [`super::Group`] implementation over the `mpi` crate (rsmpi),
//! the real Rust binding to a system MPI implementation.

use super::Group;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::request::{scope, WaitGuard};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;
use mpi::Count;

pub struct MpiGroup {
    world: SimpleCommunicator,
}

impl MpiGroup {
    /// Wrap the world communicator of an already-initialized MPI universe.
    /// The caller owns the `mpi::initialize()` call (and its `Universe`,
    /// which must outlive this group) since that is a process-wide, one-shot
    /// operation the engine itself has no opinion about.
    pub fn from_world(world: SimpleCommunicator) -> Self {
        MpiGroup { world }
    }
}

impl Group for MpiGroup {
    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn allreduce_sum_u64(&self, local: &[u64]) -> Vec<u64> {
        let mut result = vec![0u64; local.len()];
        self.world
            .all_reduce_into(local, &mut result[..], SystemOperation::sum());
        result
    }

    fn all_gather_u64(&self, local: &[u64]) -> Vec<Vec<u64>> {
        let size = self.size();
        let per_rank = local.len();
        let mut flat = vec![0u64; per_rank * size];
        self.world.all_gather_into(local, &mut flat[..]);
        flat.chunks(per_rank).map(|c| c.to_vec()).collect()
    }

    fn alltoallv_bytes(&self, send: &[u8], send_counts: &[usize], elem_bytes: usize) -> Vec<u8> {
        let size = self.size();
        let send_byte_counts: Vec<Count> = send_counts.iter().map(|c| (*c * elem_bytes) as Count).collect();
        let send_displs = prefix_displs(&send_byte_counts);

        // Learn how many bytes each peer is about to send us: this is the
        // counts-exchange collective spec.md §4.E describes as the first
        // half of the dense path.
        let mut recv_byte_counts = vec![0 as Count; size];
        self.world.all_to_all_into(&send_byte_counts, &mut recv_byte_counts[..]);
        let recv_displs = prefix_displs(&recv_byte_counts);
        let total_recv: usize = recv_byte_counts.iter().map(|c| *c as usize).sum();

        let mut recv = vec![0u8; total_recv];
        let send_partition = Partition::new(send, send_byte_counts, send_displs);
        let mut recv_partition = PartitionMut::new(&mut recv[..], recv_byte_counts, recv_displs);
        self.world.all_to_all_varcount_into(&send_partition, &mut recv_partition);
        recv
    }

    fn send_bytes(&self, dest: usize, buf: &[u8]) {
        self.world.process_at_rank(dest as i32).send(buf);
    }

    fn recv_bytes(&self, source: usize, num_bytes: usize) -> Vec<u8> {
        let mut buf = vec![0u8; num_bytes];
        self.world.process_at_rank(source as i32).receive_into(&mut buf[..]);
        buf
    }

    fn sparse_alltoall_bytes(&self, sends: &[(usize, &[u8])], recv_specs: &[(usize, usize)]) -> Vec<Vec<u8>> {
        log::debug!(
            "sparse_alltoall_bytes: rank {} posting {} sends, {} receives",
            self.rank(),
            sends.len(),
            recv_specs.len()
        );
        let mut recv_bufs: Vec<Vec<u8>> = recv_specs.iter().map(|&(_, n)| vec![0u8; n]).collect();
        scope(|scope| {
            let mut guards = Vec::with_capacity(sends.len() + recv_specs.len());
            // Post every receive before any send: both sides of this pattern
            // run the same way, so by the time either rank's send reaches the
            // transport, the matching receive is already outstanding.
            for (buf, &(source, _)) in recv_bufs.iter_mut().zip(recv_specs.iter()) {
                let req = self
                    .world
                    .process_at_rank(source as i32)
                    .immediate_receive_into(scope, &mut buf[..]);
                guards.push(WaitGuard::from(req));
            }
            for &(dest, buf) in sends {
                let req = self.world.process_at_rank(dest as i32).immediate_send(scope, buf);
                guards.push(WaitGuard::from(req));
            }
            // Guards wait on drop here, once every request in the batch is posted.
        });
        recv_bufs
    }

    fn gather_bytes(&self, local: &[u8], root: usize) -> Option<Vec<u8>> {
        let size = self.size();
        let my_len = local.len() as Count;
        let mut counts = vec![0 as Count; size];
        self.world.all_gather_into(&my_len, &mut counts[..]);

        let root_process = self.world.process_at_rank(root as i32);
        if self.rank() == root {
            let displs = prefix_displs(&counts);
            let total: usize = counts.iter().map(|c| *c as usize).sum();
            let mut recv = vec![0u8; total];
            let mut partition = PartitionMut::new(&mut recv[..], counts, displs);
            root_process.gather_varcount_into_root(local, &mut partition);
            Some(recv)
        } else {
            root_process.gather_varcount_into(local);
            None
        }
    }

    fn scatter_bytes(&self, data: Option<&[u8]>, counts_bytes: &[usize], root: usize) -> Vec<u8> {
        let my_len = counts_bytes[self.rank()];
        let mut recv = vec![0u8; my_len];
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank() == root {
            let counts: Vec<Count> = counts_bytes.iter().map(|c| *c as Count).collect();
            let displs = prefix_displs(&counts);
            let partition = Partition::new(data.expect("root must supply data"), counts, displs);
            root_process.scatter_varcount_into_root(&partition, &mut recv[..]);
        } else {
            root_process.scatter_varcount_into(&mut recv[..]);
        }

        recv
    }
}

fn prefix_displs(counts: &[Count]) -> Vec<Count> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut running = 0 as Count;
    for c in counts {
        displs.push(running);
        running += *c;
    }
    displs
}
