//! Process-group collectives.
//!
//! The counting pass only needs a handful of blocking collectives: barrier,
//! broadcast from one rank, and all-gather (from which the reductions are
//! built). [`LocalGroup`] runs every rank as an OS thread in this process;
//! ranks share nothing but the rendezvous used by the collectives, so a
//! message-passing backend can implement [`Communicator`] as a drop-in
//! replacement.

use std::sync::{Arc, Barrier, Mutex, PoisonError};
use std::thread;

/// Blocking collectives over a fixed group of ranks.
///
/// Every rank must call the same collectives in the same order.
pub trait Communicator {
    /// This process's rank.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Block until every rank has arrived.
    fn barrier(&self);

    /// Copy `root`'s buffer into every other rank's buffer.
    fn broadcast_f64s(&self, root: usize, buf: &mut [f64]);

    /// Collect every rank's slice, indexed by rank.
    fn all_gather_u64s(&self, local: &[u64]) -> Vec<Vec<u64>>;
}

/// The trivial group of one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) {}

    fn broadcast_f64s(&self, _root: usize, _buf: &mut [f64]) {}

    fn all_gather_u64s(&self, local: &[u64]) -> Vec<Vec<u64>> {
        vec![local.to_vec()]
    }
}

struct Rendezvous {
    barrier: Barrier,
    f64_slots: Mutex<Vec<Vec<f64>>>,
    u64_slots: Mutex<Vec<Vec<u64>>>,
}

/// One rank's handle onto a [`LocalGroup`].
pub struct LocalComm {
    rank: usize,
    size: usize,
    shared: Arc<Rendezvous>,
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) {
        self.shared.barrier.wait();
    }

    fn broadcast_f64s(&self, root: usize, buf: &mut [f64]) {
        if self.rank == root {
            let mut slots = self
                .shared
                .f64_slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slots[root] = buf.to_vec();
        }
        self.barrier();
        if self.rank != root {
            let slots = self
                .shared
                .f64_slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let src = &slots[root];
            let n = src.len().min(buf.len());
            buf[..n].copy_from_slice(&src[..n]);
        }
        // keep the slot alive until everyone has copied it
        self.barrier();
    }

    fn all_gather_u64s(&self, local: &[u64]) -> Vec<Vec<u64>> {
        {
            let mut slots = self
                .shared
                .u64_slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slots[self.rank] = local.to_vec();
        }
        self.barrier();
        let gathered = self
            .shared
            .u64_slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.barrier();
        gathered
    }
}

/// Runs a closure once per rank, each on its own thread.
pub struct LocalGroup;

impl LocalGroup {
    /// Run `f` on `size` ranks and return the per-rank results in rank order.
    pub fn run<T, F>(size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(LocalComm) -> T + Sync,
    {
        let size = size.max(1);
        let shared = Arc::new(Rendezvous {
            barrier: Barrier::new(size),
            f64_slots: Mutex::new(vec![Vec::new(); size]),
            u64_slots: Mutex::new(vec![Vec::new(); size]),
        });

        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = (0..size)
                .map(|rank| {
                    let comm = LocalComm {
                        rank,
                        size,
                        shared: Arc::clone(&shared),
                    };
                    thread::Builder::new()
                        .name(format!("rank-{rank}"))
                        .spawn_scoped(scope, move || f(comm))
                        .expect("failed to spawn rank thread")
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().expect("Rank thread panicked"))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_process() {
        let c = SingleProcess;
        let mut buf = [1.0, 2.0];
        c.broadcast_f64s(0, &mut buf);
        assert_eq!(buf, [1.0, 2.0]);
        assert_eq!(c.all_gather_u64s(&[4, 5]), vec![vec![4, 5]]);
    }

    #[test]
    fn test_broadcast_from_root() {
        let results = LocalGroup::run(4, |comm| {
            let mut buf = if comm.rank() == 2 {
                [3.5, -1.0]
            } else {
                [0.0, 0.0]
            };
            comm.broadcast_f64s(2, &mut buf);
            buf
        });
        assert_eq!(results, vec![[3.5, -1.0]; 4]);
    }

    #[test]
    fn test_all_gather_in_rank_order() {
        let results = LocalGroup::run(3, |comm| {
            let r = comm.rank() as u64;
            comm.all_gather_u64s(&[r, r * 10])
        });
        let expected = vec![vec![0, 0], vec![1, 10], vec![2, 20]];
        for gathered in results {
            assert_eq!(gathered, expected);
        }
    }

    #[test]
    fn test_back_to_back_collectives() {
        let results = LocalGroup::run(3, |comm| {
            let mut sums = Vec::new();
            for round in 0..5u64 {
                let g = comm.all_gather_u64s(&[round + comm.rank() as u64]);
                sums.push(g.iter().map(|v| v[0]).sum::<u64>());
            }
            sums
        });
        for sums in results {
            assert_eq!(sums, vec![3, 6, 9, 12, 15]);
        }
    }
}
