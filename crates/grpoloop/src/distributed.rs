//! Cross-process gather/barrier primitives using local threads and channels.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Barrier};

use crate::{GrpoError, Result};

/// Where this process sits in the training job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessTopology {
    pub rank: usize,
    pub local_rank: usize,
    pub world_size: usize,
    pub local_world_size: usize,
    pub node: usize,
    pub num_nodes: usize,
    /// Accelerator devices visible on this node.
    pub device_count: usize,
}

impl ProcessTopology {
    /// Single-process, single-device topology.
    pub fn standalone(device_count: usize) -> Self {
        Self {
            rank: 0,
            local_rank: 0,
            world_size: 1,
            local_world_size: 1,
            node: 0,
            num_nodes: 1,
            device_count,
        }
    }
}

/// Collective communication across data-parallel processes.
///
/// `gather_values` returns every rank's payload, in rank order, on every rank,
/// so a gather doubles as the broadcast of the assembled list.
pub trait Collective: Send + Sync {
    fn topology(&self) -> ProcessTopology;

    fn gather_values(&self, payload: Value) -> Vec<Value>;

    fn barrier(&self);

    fn rank(&self) -> usize {
        self.topology().rank
    }

    fn world_size(&self) -> usize {
        self.topology().world_size
    }
}

/// Gather a per-rank list of objects into the concatenated global list,
/// preserving rank order. Every rank receives the full result.
pub fn gather_object<T: Serialize + DeserializeOwned>(
    collective: &dyn Collective,
    items: &[T],
) -> Result<Vec<T>> {
    let payload = serde_json::to_value(items)?;
    let mut gathered = Vec::new();
    for value in collective.gather_values(payload) {
        let mut chunk: Vec<T> = serde_json::from_value(value)?;
        gathered.append(&mut chunk);
    }
    Ok(gathered)
}

/// Trivial collective for single-process runs.
pub struct SingleProcess {
    topology: ProcessTopology,
}

impl SingleProcess {
    pub fn new(device_count: usize) -> Self {
        Self {
            topology: ProcessTopology::standalone(device_count),
        }
    }
}

impl Collective for SingleProcess {
    fn topology(&self) -> ProcessTopology {
        self.topology
    }

    fn gather_values(&self, payload: Value) -> Vec<Value> {
        vec![payload]
    }

    fn barrier(&self) {}
}

/// Shared channel plumbing for a group of thread-local ranks.
///
/// Rank 0 collects every rank's payload, assembles the rank-ordered list and
/// fans it back out, so all ranks observe the same gather result.
pub struct SyncGroup {
    barrier: Arc<Barrier>,
    gather_senders: Vec<Sender<Value>>,
    gather_receivers: Vec<Receiver<Value>>,
    bc_senders: Vec<Sender<Vec<Value>>>,
    bc_receivers: Vec<Receiver<Vec<Value>>>,
}

impl SyncGroup {
    pub fn new(world_size: usize) -> Arc<Self> {
        let mut gather_senders = Vec::with_capacity(world_size);
        let mut gather_receivers = Vec::with_capacity(world_size);
        let mut bc_senders = Vec::with_capacity(world_size);
        let mut bc_receivers = Vec::with_capacity(world_size);

        for _ in 0..world_size {
            let (gs, gr) = bounded(1);
            let (bs, br) = bounded(1);
            gather_senders.push(gs);
            gather_receivers.push(gr);
            bc_senders.push(bs);
            bc_receivers.push(br);
        }

        Arc::new(Self {
            barrier: Arc::new(Barrier::new(world_size)),
            gather_senders,
            gather_receivers,
            bc_senders,
            bc_receivers,
        })
    }
}

/// Thread-local collective backend, one instance per rank thread.
pub struct ThreadCollective {
    topology: ProcessTopology,
    group: Arc<SyncGroup>,
}

impl ThreadCollective {
    pub fn new(topology: ProcessTopology, group: Arc<SyncGroup>) -> Result<Self> {
        if topology.rank >= topology.world_size {
            return Err(GrpoError::Config(format!(
                "rank {} out of world size {}",
                topology.rank, topology.world_size
            )));
        }
        Ok(Self { topology, group })
    }

    /// Build one collective per rank for a single-node thread group.
    pub fn local_group(world_size: usize, device_count: usize) -> Vec<Self> {
        let group = SyncGroup::new(world_size);
        (0..world_size)
            .map(|rank| Self {
                topology: ProcessTopology {
                    rank,
                    local_rank: rank,
                    world_size,
                    local_world_size: world_size,
                    node: 0,
                    num_nodes: 1,
                    device_count,
                },
                group: Arc::clone(&group),
            })
            .collect()
    }
}

impl Collective for ThreadCollective {
    fn topology(&self) -> ProcessTopology {
        self.topology
    }

    fn gather_values(&self, payload: Value) -> Vec<Value> {
        let ws = self.topology.world_size;
        if ws <= 1 {
            return vec![payload];
        }

        let rank = self.topology.rank;
        if rank == 0 {
            let mut all = vec![payload];
            for i in 1..ws {
                all.push(self.group.gather_receivers[i].recv().unwrap());
            }
            for i in 1..ws {
                self.group.bc_senders[i].send(all.clone()).unwrap();
            }
            all
        } else {
            self.group.gather_senders[rank].send(payload).unwrap();
            self.group.bc_receivers[rank].recv().unwrap()
        }
    }

    fn barrier(&self) {
        self.group.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn single_process_gather_is_identity() {
        let collective = SingleProcess::new(1);
        let gathered = gather_object(&collective, &[1u32, 2, 3]).unwrap();
        assert_eq!(gathered, vec![1, 2, 3]);
    }

    #[test]
    fn thread_group_gathers_in_rank_order() {
        let ranks = ThreadCollective::local_group(3, 3);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|collective| {
                thread::spawn(move || {
                    let rank = collective.rank();
                    let local: Vec<usize> = vec![rank * 10, rank * 10 + 1];
                    gather_object(&collective, &local).unwrap()
                })
            })
            .collect();

        for handle in handles {
            let gathered = handle.join().unwrap();
            assert_eq!(gathered, vec![0, 1, 10, 11, 20, 21]);
        }
    }

    #[test]
    fn barrier_synchronizes_all_ranks() {
        let ranks = ThreadCollective::local_group(4, 4);
        let handles: Vec<_> = ranks
            .into_iter()
            .map(|collective| {
                thread::spawn(move || {
                    collective.barrier();
                    collective.rank()
                })
            })
            .collect();
        let mut seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
