//! Round-robin work distribution across inference workers.

use crate::{GrpoError, Result};

/// Assignment of flat request indices to inference workers.
///
/// Item `i` is assigned to worker `i % num_workers`, so each worker's list is
/// an ascending subsequence of `[0, N)` and the union over all workers covers
/// every index exactly once. The plan doubles as the inverse mapping used to
/// restore the original order after gathering worker outputs.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DistributionPlan {
    assignments: Vec<Vec<usize>>,
    num_items: usize,
}

impl DistributionPlan {
    /// Split `num_items` request indices across `num_workers` round-robin.
    pub fn round_robin(num_items: usize, num_workers: usize) -> Self {
        let mut assignments = vec![Vec::new(); num_workers];
        for idx in 0..num_items {
            assignments[idx % num_workers].push(idx);
        }
        Self {
            assignments,
            num_items,
        }
    }

    /// Indices assigned to `worker`, in ascending order.
    pub fn worker_indices(&self, worker: usize) -> &[usize] {
        &self.assignments[worker]
    }

    pub fn num_workers(&self) -> usize {
        self.assignments.len()
    }

    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Restore worker outputs to ascending global-index order.
    ///
    /// `outputs` must be the concatenation of every worker's results in worker
    /// order, with each worker's slice in the order of its assigned indices.
    pub fn reorder<T>(&self, outputs: Vec<T>) -> Result<Vec<T>> {
        if outputs.len() != self.num_items {
            return Err(GrpoError::Protocol(format!(
                "distribution plan covers {} items but {} outputs were gathered",
                self.num_items,
                outputs.len()
            )));
        }

        let mut slots: Vec<Option<T>> = Vec::with_capacity(self.num_items);
        slots.resize_with(self.num_items, || None);

        let mut flat = outputs.into_iter();
        for worker_indices in &self.assignments {
            for &idx in worker_indices {
                if idx >= self.num_items {
                    return Err(GrpoError::Protocol(format!(
                        "distribution plan references index {} out of {} items",
                        idx, self.num_items
                    )));
                }
                let output = flat.next().ok_or_else(|| {
                    GrpoError::Protocol("distribution plan exceeds gathered outputs".to_string())
                })?;
                slots[idx] = Some(output);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.ok_or_else(|| {
                    GrpoError::Protocol(format!("index {} missing from distribution plan", idx))
                })
            })
            .collect()
    }
}
