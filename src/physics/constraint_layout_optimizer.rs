use crate::physics::bodies::Bodies;
use crate::physics::error::SolverError;
use crate::physics::solver::Solver;
use crate::utilities::thread_dispatcher::ThreadDispatcher;
use crate::utilities::vector::LANES;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Optimization {
    /// Index of the batch holding the target region.
    batch_index: usize,
    /// Index of the type batch holding the target region.
    type_batch_index: usize,
    /// Index of the first bundle of the target region.
    bundle_index: usize,
}

/// Incrementally sorts regions of type batches by the memory location of the bodies they reference.
///
/// Two cursors walk the constraints: one aligned to region boundaries and one offset by half a region.
/// Alternating between them each call lets sorted regions intermix, so repeated updates converge toward a full sort.
#[derive(Debug, Clone)]
pub struct ConstraintLayoutOptimizer {
    next_target_without_offset: Optimization,
    next_target_with_offset: Optimization,
    should_offset: bool,
}

impl Default for ConstraintLayoutOptimizer {
    fn default() -> Self {
        Self {
            next_target_without_offset: Optimization::default(),
            // Out of range so the first offset update starts on a half region boundary.
            next_target_with_offset: Optimization {
                batch_index: usize::MAX,
                ..Default::default()
            },
            should_offset: false,
        }
    }
}

impl ConstraintLayoutOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn start_bundle_index(&self, bundle_count: usize, maximum_region_size_in_bundles: usize) -> usize {
        if self.should_offset {
            (maximum_region_size_in_bundles / 2).min(bundle_count.saturating_sub(maximum_region_size_in_bundles))
        } else {
            0
        }
    }

    /// Finds the slot of a stale cursor in the current set of type batches, moving it forward when its region no longer exists.
    fn validate_target(
        &self,
        solver: &Solver,
        slots: &[(usize, usize)],
        target: Optimization,
        maximum_region_size_in_bundles: usize,
    ) -> (usize, usize) {
        let bundle_count = |slot: usize| {
            let (batch_index, type_batch_index) = slots[slot];
            solver.batches[batch_index].type_batches[type_batch_index].bundle_count()
        };
        match slots
            .iter()
            .position(|&slot| slot >= (target.batch_index, target.type_batch_index))
        {
            Some(slot) if slots[slot] == (target.batch_index, target.type_batch_index) => {
                if target.bundle_index < bundle_count(slot) {
                    (slot, target.bundle_index)
                } else {
                    let next = (slot + 1) % slots.len();
                    (next, self.start_bundle_index(bundle_count(next), maximum_region_size_in_bundles))
                }
            }
            Some(slot) => (slot, self.start_bundle_index(bundle_count(slot), maximum_region_size_in_bundles)),
            None => (0, self.start_bundle_index(bundle_count(0), maximum_region_size_in_bundles)),
        }
    }

    /// Sorts up to `region_count` regions of `maximum_region_size_in_bundles` bundles each.
    ///
    /// Regions are bundle aligned so the sort can move whole bundles through its cache. The region size must be even
    /// so that the offset cursor lands on half region boundaries.
    pub fn update(
        &mut self,
        solver: &mut Solver,
        bodies: &Bodies,
        maximum_region_size_in_bundles: usize,
        region_count: usize,
        dispatcher: Option<&dyn ThreadDispatcher>,
    ) -> Result<(), SolverError> {
        if maximum_region_size_in_bundles == 0 || maximum_region_size_in_bundles % 2 != 0 {
            return Err(SolverError::InvalidRegionSize(maximum_region_size_in_bundles));
        }
        if region_count == 0 {
            return Ok(());
        }
        let slots: Vec<(usize, usize)> = solver
            .batches
            .iter()
            .enumerate()
            .flat_map(|(batch_index, batch)| {
                (0..batch.type_batches.len()).map(move |type_batch_index| (batch_index, type_batch_index))
            })
            .collect();
        if slots.is_empty() {
            return Ok(());
        }
        let bundle_count = |slot: usize| {
            let (batch_index, type_batch_index) = slots[slot];
            solver.batches[batch_index].type_batches[type_batch_index].bundle_count()
        };

        let next_target = if self.should_offset {
            self.next_target_with_offset
        } else {
            self.next_target_without_offset
        };
        let (mut slot, mut bundle_index) =
            self.validate_target(solver, &slots, next_target, maximum_region_size_in_bundles);
        let mut targets: Vec<(usize, usize)> = Vec::with_capacity(region_count);
        loop {
            targets.push((slot, bundle_index));
            bundle_index += maximum_region_size_in_bundles;
            if bundle_index >= bundle_count(slot) {
                slot += 1;
                if slot == slots.len() {
                    slot = 0;
                    log::debug!(
                        "Constraint layout optimizer wrapped its {} cursor.",
                        if self.should_offset { "offset" } else { "aligned" }
                    );
                }
                bundle_index = self.start_bundle_index(bundle_count(slot), maximum_region_size_in_bundles);
            }
            // Stop once the next target overlaps the first; every constraint has been covered.
            let (first_slot, first_bundle_index) = targets[0];
            if slot == first_slot
                && bundle_index < first_bundle_index + maximum_region_size_in_bundles
                && bundle_index + maximum_region_size_in_bundles > first_bundle_index
            {
                break;
            }
            if targets.len() >= region_count {
                break;
            }
        }

        let (batch_index, type_batch_index) = slots[slot];
        let next_target = Optimization {
            batch_index,
            type_batch_index,
            bundle_index,
        };
        if self.should_offset {
            self.next_target_with_offset = next_target;
        } else {
            self.next_target_without_offset = next_target;
        }
        self.should_offset = !self.should_offset;

        let maximum_region_size_in_constraints = maximum_region_size_in_bundles * LANES;
        let body_count = bodies.count();
        for &(target_slot, target_bundle_index) in &targets {
            let (batch_index, type_batch_index) = slots[target_slot];
            let type_batch = &mut solver.batches[batch_index].type_batches[type_batch_index];
            let constraint_count = (type_batch.constraint_count() - target_bundle_index * LANES)
                .min(maximum_region_size_in_constraints);
            type_batch.sort_by_body_location(
                target_bundle_index,
                constraint_count,
                &mut solver.handle_to_constraint,
                body_count,
                dispatcher,
            );
        }
        Ok(())
    }
}
