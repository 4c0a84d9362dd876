use serde::{Deserialize, Serialize};

/// The common set of allocation sizes for a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationAllocationSizes {
    /// The number of bodies to allocate space for.
    pub bodies: usize,
    /// The number of constraints to allocate bookkeeping space for. This does not affect actual type batch allocation sizes,
    /// only the solver-level constraint handle storage.
    pub constraints: usize,
    /// The minimum number of constraints to allocate space for in each individual type batch.
    /// New type batches will be given enough memory for this number of constraints, and any compaction will not reduce the allocations below it.
    pub constraints_per_type_batch: usize,
    /// The minimum number of constraints to allocate space for in each body's constraint list.
    pub constraint_count_per_body_estimate: usize,
}

impl SimulationAllocationSizes {
    pub fn new(
        bodies: usize,
        constraints: usize,
        constraints_per_type_batch: usize,
        constraint_count_per_body_estimate: usize,
    ) -> Self {
        Self {
            bodies,
            constraints,
            constraints_per_type_batch,
            constraint_count_per_body_estimate,
        }
    }
}

impl Default for SimulationAllocationSizes {
    fn default() -> Self {
        Self {
            bodies: 4096,
            constraints: 4096,
            constraints_per_type_batch: 64,
            constraint_count_per_body_estimate: 8,
        }
    }
}
