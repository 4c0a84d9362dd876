use std::any::type_name;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::physics::bodies::Bodies;
use crate::physics::constraint_batch::ConstraintBatch;
use crate::physics::constraint_location::ConstraintLocation;
use crate::physics::constraint_reference::ConstraintReference;
use crate::physics::constraints::constraint_description::ConstraintDescription;
use crate::physics::constraints::constraint_type_registry::ConstraintTypeRegistry;
use crate::physics::constraints::type_batch::MAXIMUM_BODIES_PER_CONSTRAINT;
use crate::physics::constraints::type_processor::ConstraintTypeBatch;
use crate::physics::error::SolverError;
use crate::physics::handles::{BodyHandle, ConstraintHandle};
use crate::physics::simulation_allocation_sizes::SimulationAllocationSizes;
use crate::physics::solver_multithreading::SchedulingHistory;
use crate::utilities::memory::id_pool::IdPool;

/// Tuning of the solver's iteration count and work block scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Number of solve iterations run after the warm start of every update. Must be at least 1.
    pub iteration_count: i32,
    /// Work blocks are never made smaller than this unless the type batch itself is smaller.
    pub minimum_block_size_in_bundles: usize,
    /// Work blocks are never made larger than this.
    pub maximum_block_size_in_bundles: usize,
    /// Number of work blocks per batch each worker should get when block size limits allow it.
    pub target_blocks_per_batch_per_worker: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            iteration_count: 8,
            minimum_block_size_in_bundles: 4,
            maximum_block_size_in_bundles: 64,
            target_blocks_per_batch_per_worker: 16,
        }
    }
}

/// Holds and solves constraints between bodies.
///
/// Constraints live in batches of body-disjoint constraints so every batch can be solved in parallel without
/// synchronization. Inside a batch, constraints are grouped by type into bundle-oriented type batches.
pub struct Solver {
    pub(crate) batches: Vec<ConstraintBatch>,
    /// Pool to retrieve constraint handles from when creating new constraints.
    handle_pool: IdPool,
    /// Mapping from constraint handle (via its internal integer value) to the location of a constraint in memory.
    pub(crate) handle_to_constraint: Vec<ConstraintLocation>,
    registry: Arc<ConstraintTypeRegistry>,
    iteration_count: i32,
    minimum_capacity_per_type_batch: usize,
    /// Initial capacity of the body handle sets of new batches.
    body_handle_capacity: usize,
    pub(crate) settings: SolverSettings,
    pub(crate) scheduling_history: SchedulingHistory,
}

impl Solver {
    pub fn new(
        registry: Arc<ConstraintTypeRegistry>,
        settings: SolverSettings,
        allocation_sizes: &SimulationAllocationSizes,
    ) -> Result<Self, SolverError> {
        if settings.iteration_count < 1 {
            return Err(SolverError::InvalidIterationCount(settings.iteration_count));
        }
        Ok(Self {
            batches: Vec::new(),
            handle_pool: IdPool::new(allocation_sizes.constraints),
            handle_to_constraint: vec![ConstraintLocation::default(); allocation_sizes.constraints],
            registry,
            iteration_count: settings.iteration_count,
            minimum_capacity_per_type_batch: allocation_sizes.constraints_per_type_batch.max(1),
            body_handle_capacity: allocation_sizes.bodies,
            settings,
            scheduling_history: SchedulingHistory::default(),
        })
    }

    #[inline(always)]
    pub fn registry(&self) -> &ConstraintTypeRegistry {
        &self.registry
    }

    #[inline(always)]
    pub fn batches(&self) -> &[ConstraintBatch] {
        &self.batches
    }

    #[inline(always)]
    pub fn handle_to_constraint(&self) -> &[ConstraintLocation] {
        &self.handle_to_constraint
    }

    #[inline(always)]
    pub fn iteration_count(&self) -> i32 {
        self.iteration_count
    }

    pub fn set_iteration_count(&mut self, iteration_count: i32) -> Result<(), SolverError> {
        if iteration_count < 1 {
            return Err(SolverError::InvalidIterationCount(iteration_count));
        }
        self.iteration_count = iteration_count;
        self.settings.iteration_count = iteration_count;
        Ok(())
    }

    /// Minimum number of constraints new type batches allocate space for. Compaction never shrinks below it.
    #[inline(always)]
    pub fn minimum_capacity_per_type_batch(&self) -> usize {
        self.minimum_capacity_per_type_batch
    }

    pub fn set_minimum_capacity_per_type_batch(&mut self, capacity: usize) {
        self.minimum_capacity_per_type_batch = capacity.max(1);
    }

    pub fn constraint_exists(&self, handle: ConstraintHandle) -> bool {
        handle.0 >= 0
            && (handle.0 as usize) < self.handle_to_constraint.len()
            && self.handle_to_constraint[handle.0 as usize].is_allocated()
    }

    /// Counts the constraints across every batch.
    pub fn count_constraints(&self) -> usize {
        self.batches.iter().map(|batch| batch.constraint_count()).sum()
    }

    #[inline(always)]
    fn validate_handle(&self, handle: ConstraintHandle) -> Result<ConstraintLocation, SolverError> {
        if self.constraint_exists(handle) {
            Ok(self.handle_to_constraint[handle.0 as usize])
        } else {
            Err(SolverError::InvalidConstraintHandle(handle))
        }
    }

    /// Index of the first batch able to hold a constraint between the given bodies. Equal to the batch count if none can.
    pub(crate) fn find_candidate_batch(&self, body_handles: &[BodyHandle]) -> usize {
        self.batches
            .iter()
            .position(|batch| batch.referenced_handles.can_fit(body_handles))
            .unwrap_or(self.batches.len())
    }

    fn ensure_handle_table_size(&mut self, handle: ConstraintHandle) {
        let required = handle.0 as usize + 1;
        if required > self.handle_to_constraint.len() {
            let new_length = required.max(self.handle_to_constraint.len() * 2);
            self.handle_to_constraint.resize(new_length, ConstraintLocation::default());
        }
    }

    /// Allocates a slot for a constraint of the given type between the given bodies.
    ///
    /// The constraint's prestep data and accumulated impulses start zeroed; use [`Solver::apply_description`] to fill it in.
    pub fn allocate(
        &mut self,
        bodies: &Bodies,
        body_handles: &[BodyHandle],
        type_id: i32,
    ) -> Result<ConstraintHandle, SolverError> {
        if type_id < 0 || type_id as usize >= self.registry.type_count() {
            return Err(SolverError::UnknownTypeId(type_id));
        }
        let expected = self.registry.bodies_per_constraint(type_id);
        if body_handles.len() != expected {
            return Err(SolverError::BodyCountMismatch {
                expected,
                actual: body_handles.len(),
            });
        }
        debug_assert!(expected <= MAXIMUM_BODIES_PER_CONSTRAINT);
        let mut body_indices = [0i32; MAXIMUM_BODIES_PER_CONSTRAINT];
        for (slot, &body_handle) in body_handles.iter().enumerate() {
            body_indices[slot] = bodies.index_of(body_handle)? as i32;
            if body_handles[..slot].contains(&body_handle) {
                return Err(SolverError::DuplicateBodyReference);
            }
        }

        let batch_index = self.find_candidate_batch(body_handles);
        if batch_index == self.batches.len() {
            self.batches.push(ConstraintBatch::new(
                self.registry.type_count(),
                self.body_handle_capacity.max(bodies.count()) as i32,
            ));
            log::debug!("Created constraint batch {}.", batch_index);
        }
        let handle = ConstraintHandle(self.handle_pool.take());
        self.ensure_handle_table_size(handle);
        let index_in_type_batch = self.batches[batch_index].allocate(
            handle,
            body_handles,
            &body_indices[..expected],
            type_id,
            &self.registry,
            self.minimum_capacity_per_type_batch,
        );
        self.handle_to_constraint[handle.0 as usize] = ConstraintLocation {
            batch_index: batch_index as i32,
            type_id,
            index_in_type_batch: index_in_type_batch as i32,
        };
        Ok(handle)
    }

    /// Allocates a constraint and fills it with a description.
    pub fn add<D: ConstraintDescription>(
        &mut self,
        bodies: &Bodies,
        body_handles: &[BodyHandle],
        description: &D,
    ) -> Result<ConstraintHandle, SolverError> {
        let type_id = self.registry.type_id_of::<D>()?;
        let handle = self.allocate(bodies, body_handles, type_id)?;
        self.apply_description(handle, description)?;
        Ok(handle)
    }

    /// Removes a constraint from its batch without returning its handle.
    pub(crate) fn remove_from_batch(&mut self, location: ConstraintLocation, bodies: &Bodies) {
        let batch_index = location.batch_index as usize;
        self.batches[batch_index].remove(
            location.type_id,
            location.index_in_type_batch as usize,
            bodies,
            &mut self.handle_to_constraint,
        );
        self.pop_trailing_empty_batches();
    }

    pub(crate) fn pop_trailing_empty_batches(&mut self) {
        while self.batches.last().map_or(false, |batch| batch.is_empty()) {
            self.batches.pop();
            log::debug!("Removed empty constraint batch {}.", self.batches.len());
        }
    }

    /// Body handles of a constraint's bodies in slot order. Returns the number of bodies written.
    pub(crate) fn collect_body_handles(
        &self,
        location: ConstraintLocation,
        bodies: &Bodies,
        handles: &mut [BodyHandle; MAXIMUM_BODIES_PER_CONSTRAINT],
    ) -> usize {
        let mut count = 0;
        if let Some(type_batch) = self.batches[location.batch_index as usize].get_type_batch(location.type_id) {
            type_batch.enumerate_connected_body_indices(location.index_in_type_batch as usize, &mut |body_index| {
                handles[count] = bodies.handle_of(body_index as usize);
                count += 1;
            });
        }
        count
    }

    /// Moves a constraint into a lower batch that can hold it, keeping its handle, prestep data and accumulated impulses.
    pub(crate) fn transfer_constraint(&mut self, handle: ConstraintHandle, target_batch_index: usize, bodies: &Bodies) {
        let location = self.handle_to_constraint[handle.0 as usize];
        let source_batch_index = location.batch_index as usize;
        debug_assert!(target_batch_index < source_batch_index, "Constraints only move to lower batches.");
        let mut body_handles = [BodyHandle::default(); MAXIMUM_BODIES_PER_CONSTRAINT];
        let body_count = self.collect_body_handles(location, bodies, &mut body_handles);
        let mut body_indices = [0i32; MAXIMUM_BODIES_PER_CONSTRAINT];
        for (index, body_handle) in body_indices.iter_mut().zip(&body_handles[..body_count]) {
            *index = bodies.handle_to_index()[body_handle.0 as usize];
        }

        let (lower, upper) = self.batches.split_at_mut(source_batch_index);
        let target_batch = &mut lower[target_batch_index];
        let source_batch = &mut upper[0];
        debug_assert!(target_batch.referenced_handles.can_fit(&body_handles[..body_count]));
        let target_index = target_batch.allocate(
            handle,
            &body_handles[..body_count],
            &body_indices[..body_count],
            location.type_id,
            &self.registry,
            self.minimum_capacity_per_type_batch,
        );
        let (Some(source_type_batch_index), Some(target_type_batch_index)) = (
            source_batch.type_batch_index(location.type_id),
            target_batch.type_batch_index(location.type_id),
        ) else {
            debug_assert!(false, "Both batches must hold a type batch for the moved constraint.");
            return;
        };
        source_batch.type_batches[source_type_batch_index].transfer_constraint(
            location.index_in_type_batch as usize,
            target_batch.type_batches[target_type_batch_index].as_mut(),
            target_index,
        );
        source_batch.remove(
            location.type_id,
            location.index_in_type_batch as usize,
            bodies,
            &mut self.handle_to_constraint,
        );
        self.handle_to_constraint[handle.0 as usize] = ConstraintLocation {
            batch_index: target_batch_index as i32,
            type_id: location.type_id,
            index_in_type_batch: target_index as i32,
        };
        self.pop_trailing_empty_batches();
    }

    /// Removes a constraint. Its handle may be reused by later allocations.
    pub fn remove(&mut self, handle: ConstraintHandle, bodies: &Bodies) -> Result<(), SolverError> {
        let location = self.validate_handle(handle)?;
        self.remove_from_batch(location, bodies);
        self.handle_to_constraint[handle.0 as usize] = ConstraintLocation::default();
        self.handle_pool.return_id(handle.0);
        Ok(())
    }

    pub fn get_constraint_reference(&self, handle: ConstraintHandle) -> Result<ConstraintReference<'_>, SolverError> {
        let location = self.validate_handle(handle)?;
        let batch = &self.batches[location.batch_index as usize];
        match batch.get_type_batch(location.type_id) {
            Some(type_batch) => Ok(ConstraintReference::new(type_batch, location.index_in_type_batch as usize)),
            None => Err(SolverError::InvalidConstraintHandle(handle)),
        }
    }

    fn validate_description_type<D: ConstraintDescription>(&self, location: ConstraintLocation) -> Result<(), SolverError> {
        let type_id = self.registry.type_id_of::<D>()?;
        if type_id != location.type_id {
            return Err(SolverError::DescriptionTypeMismatch {
                description: type_name::<D>(),
                type_id: location.type_id,
            });
        }
        Ok(())
    }

    /// Overwrites a constraint's prestep data with a description. Accumulated impulses are kept.
    pub fn apply_description<D: ConstraintDescription>(
        &mut self,
        handle: ConstraintHandle,
        description: &D,
    ) -> Result<(), SolverError> {
        let location = self.validate_handle(handle)?;
        self.validate_description_type::<D>(location)?;
        let type_batch = self.batches[location.batch_index as usize]
            .get_type_batch_mut(location.type_id)
            .and_then(|type_batch| type_batch.as_any_mut().downcast_mut::<ConstraintTypeBatch<D::Kernel>>());
        match type_batch {
            Some(type_batch) => {
                type_batch.apply_description(location.index_in_type_batch as usize, description);
                Ok(())
            }
            None => Err(SolverError::DescriptionTypeMismatch {
                description: type_name::<D>(),
                type_id: location.type_id,
            }),
        }
    }

    pub fn get_description<D: ConstraintDescription>(&self, handle: ConstraintHandle) -> Result<D, SolverError> {
        let location = self.validate_handle(handle)?;
        self.validate_description_type::<D>(location)?;
        self.batches[location.batch_index as usize]
            .get_type_batch(location.type_id)
            .and_then(|type_batch| type_batch.as_any().downcast_ref::<ConstraintTypeBatch<D::Kernel>>())
            .map(|type_batch| type_batch.get_description(location.index_in_type_batch as usize))
            .ok_or(SolverError::DescriptionTypeMismatch {
                description: type_name::<D>(),
                type_id: location.type_id,
            })
    }

    /// Visits the memory indices of the bodies referenced by a constraint, in slot order.
    pub fn enumerate_connected_body_indices(
        &self,
        handle: ConstraintHandle,
        visitor: impl FnMut(i32),
    ) -> Result<(), SolverError> {
        self.validate_handle(handle)?;
        self.enumerate_connected_body_indices_unchecked(handle, visitor);
        Ok(())
    }

    pub(crate) fn enumerate_connected_body_indices_unchecked(&self, handle: ConstraintHandle, mut visitor: impl FnMut(i32)) {
        let location = self.handle_to_constraint[handle.0 as usize];
        debug_assert!(location.is_allocated());
        if let Some(type_batch) = self.batches[location.batch_index as usize].get_type_batch(location.type_id) {
            type_batch.enumerate_connected_body_indices(location.index_in_type_batch as usize, &mut visitor);
        }
    }

    /// Accumulated impulse of a constraint, one value per constrained degree of freedom.
    pub fn get_accumulated_impulse(&self, handle: ConstraintHandle) -> Result<Vec<f32>, SolverError> {
        let reference = self.get_constraint_reference(handle)?;
        Ok(reference.type_batch.accumulated_impulses(reference.index_in_type_batch))
    }

    /// Scales every accumulated impulse. Useful when the timestep changes between frames.
    pub fn scale_accumulated_impulses(&mut self, scale: f32) {
        for batch in &mut self.batches {
            for type_batch in &mut batch.type_batches {
                type_batch.scale_accumulated_impulses(scale);
            }
        }
    }

    /// Changes the body memory index referenced by one slot of a constraint. Used when bodies move in memory.
    pub fn update_for_body_memory_move(
        &mut self,
        handle: ConstraintHandle,
        body_index_in_constraint: usize,
        new_body_location: i32,
    ) {
        let location = self.handle_to_constraint[handle.0 as usize];
        debug_assert!(location.is_allocated(), "Moved body must be referenced by an allocated constraint.");
        if let Some(type_batch) = self.batches[location.batch_index as usize].get_type_batch_mut(location.type_id) {
            type_batch.update_for_body_memory_move(
                location.index_in_type_batch as usize,
                body_index_in_constraint,
                new_body_location,
            );
        }
    }

    /// Ensures the handle table, type batches and batch handle sets can hold at least the given numbers of
    /// body handles and constraints without resizing.
    pub fn ensure_capacity(&mut self, body_handle_capacity: usize, constraint_handle_capacity: usize) {
        self.body_handle_capacity = self.body_handle_capacity.max(body_handle_capacity);
        if self.handle_to_constraint.len() < constraint_handle_capacity {
            self.handle_to_constraint
                .resize(constraint_handle_capacity, ConstraintLocation::default());
        }
        self.handle_pool.ensure_capacity(constraint_handle_capacity);
        for batch in &mut self.batches {
            batch.ensure_type_batch_capacities(self.minimum_capacity_per_type_batch);
            batch.referenced_handles.ensure_capacity(body_handle_capacity as i32);
        }
    }

    /// Shrinks allocations to fit the current contents, never going below the given capacities or the per type batch minimum.
    /// Batch handle sets keep every handle they still reference.
    pub fn compact(&mut self, body_handle_capacity: usize, constraint_handle_capacity: usize) {
        self.body_handle_capacity = body_handle_capacity;
        let target = constraint_handle_capacity.max((self.handle_pool.highest_possibly_claimed_id() + 1) as usize);
        if self.handle_to_constraint.len() > target {
            self.handle_to_constraint.truncate(target);
            self.handle_to_constraint.shrink_to_fit();
        }
        self.handle_pool.compact(constraint_handle_capacity);
        for batch in &mut self.batches {
            batch.referenced_handles.compact(body_handle_capacity as i32);
            for type_batch in &mut batch.type_batches {
                let capacity = type_batch.constraint_count().max(self.minimum_capacity_per_type_batch);
                if type_batch.capacity() > capacity {
                    type_batch.resize(capacity);
                }
            }
        }
    }

    /// Resizes the handle table, every type batch and every batch handle set, never dropping below what current contents require.
    pub fn resize(&mut self, body_handle_capacity: usize, constraint_handle_capacity: usize) {
        self.body_handle_capacity = body_handle_capacity;
        let target = constraint_handle_capacity.max((self.handle_pool.highest_possibly_claimed_id() + 1) as usize);
        self.handle_to_constraint.resize(target, ConstraintLocation::default());
        self.handle_pool.resize(constraint_handle_capacity);
        for batch in &mut self.batches {
            batch.resize_type_batch_capacities(self.minimum_capacity_per_type_batch);
            batch.referenced_handles.ensure_capacity(body_handle_capacity as i32);
            batch.referenced_handles.compact(body_handle_capacity as i32);
        }
    }

    /// Removes every constraint, keeping the handle table allocation.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.handle_pool.clear();
        self.handle_to_constraint.fill(ConstraintLocation::default());
        self.scheduling_history = SchedulingHistory::default();
    }

    /// Removes every constraint and releases all memory held by the solver.
    pub fn dispose(&mut self) {
        self.batches = Vec::new();
        self.handle_pool = IdPool::default();
        self.handle_to_constraint = Vec::new();
        self.scheduling_history = SchedulingHistory::default();
    }

    /// Checks that every batch's referenced handle set matches its constraints and that batches are body-disjoint.
    /// Also checks the handle to location mapping in both directions. Panics on the first violation.
    pub fn validate_batch_invariants(&self, bodies: &Bodies) {
        for (batch_index, batch) in self.batches.iter().enumerate() {
            let mut referenced = std::collections::HashSet::new();
            for type_batch in &batch.type_batches {
                let type_id = type_batch.constraint_type_id();
                assert_eq!(
                    batch
                        .type_batch_index(type_id)
                        .map(|index| batch.type_batches[index].constraint_type_id()),
                    Some(type_id),
                    "Type id mapping must point at the type batch."
                );
                assert!(type_batch.constraint_count() > 0, "Empty type batches must be removed.");
                for (index, &handle) in type_batch.index_to_handle().iter().enumerate() {
                    let location = self.handle_to_constraint[handle.0 as usize];
                    assert_eq!(location.batch_index as usize, batch_index);
                    assert_eq!(location.type_id, type_batch.constraint_type_id());
                    assert_eq!(location.index_in_type_batch as usize, index);
                    type_batch.enumerate_connected_body_indices(index, &mut |body_index| {
                        let body_handle = bodies.handle_of(body_index as usize);
                        assert!(
                            referenced.insert(body_handle),
                            "Body {} is referenced twice in batch {}.",
                            body_handle,
                            batch_index
                        );
                        assert!(batch.referenced_handles.contains(body_handle));
                    });
                }
            }
            assert_eq!(
                referenced.len(),
                batch.referenced_handles.count(),
                "Batch {} references handles not used by its constraints.",
                batch_index
            );
        }
        assert!(
            self.batches.last().map_or(true, |batch| !batch.is_empty()),
            "Trailing empty batches must be removed."
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::body_description::BodyDescription;
    use crate::physics::body_properties::{BodyInertia, BodyVelocity};
    use crate::physics::constraints::contact::penetration_limit::PenetrationLimit;

    fn create_solver() -> Solver {
        let mut registry = ConstraintTypeRegistry::new();
        registry.register::<PenetrationLimit>();
        Solver::new(Arc::new(registry), SolverSettings::default(), &SimulationAllocationSizes::default()).unwrap()
    }

    fn create_bodies(count: usize) -> (Bodies, Vec<BodyHandle>) {
        let mut bodies = Bodies::new(count);
        let description = BodyDescription::create_dynamic(BodyVelocity::default(), BodyInertia::sphere(1.0, 1.0));
        let handles = (0..count).map(|_| bodies.add(&description)).collect();
        (bodies, handles)
    }

    #[test]
    fn chain_alternates_between_two_batches() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(5);
        for pair in handles.windows(2) {
            solver.add(&bodies, pair, &PenetrationLimit::default()).unwrap();
        }
        assert_eq!(solver.batches().len(), 2);
        assert_eq!(solver.batches()[0].constraint_count(), 2);
        assert_eq!(solver.count_constraints(), 4);
        solver.validate_batch_invariants(&bodies);
    }

    #[test]
    fn removing_highest_batch_pops_trailing_empties() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(3);
        let first = solver.add(&bodies, &handles[0..2], &PenetrationLimit::default()).unwrap();
        let second = solver.add(&bodies, &handles[1..3], &PenetrationLimit::default()).unwrap();
        assert_eq!(solver.batches().len(), 2);
        solver.remove(first, &bodies).unwrap();
        // Lower empty batches are left for the compressor.
        assert_eq!(solver.batches().len(), 2);
        assert!(solver.batches()[0].is_empty());
        solver.remove(second, &bodies).unwrap();
        assert!(solver.batches().is_empty());
        assert!(!solver.constraint_exists(first));
        assert_eq!(solver.remove(first, &bodies), Err(SolverError::InvalidConstraintHandle(first)));
    }

    #[test]
    fn contract_violations_are_reported() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(2);
        assert_eq!(
            solver.add(&bodies, &handles[0..1], &PenetrationLimit::default()),
            Err(SolverError::BodyCountMismatch { expected: 2, actual: 1 })
        );
        assert_eq!(
            solver.add(&bodies, &[handles[0], handles[0]], &PenetrationLimit::default()),
            Err(SolverError::DuplicateBodyReference)
        );
        assert_eq!(
            solver.add(&bodies, &[handles[0], BodyHandle(17)], &PenetrationLimit::default()),
            Err(SolverError::InvalidBodyHandle(BodyHandle(17)))
        );
        assert_eq!(solver.allocate(&bodies, &handles, 3), Err(SolverError::UnknownTypeId(3)));
        assert_eq!(solver.set_iteration_count(0), Err(SolverError::InvalidIterationCount(0)));
        assert_eq!(solver.count_constraints(), 0);
    }

    #[test]
    fn descriptions_round_trip_through_handles() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(2);
        let description = PenetrationLimit {
            penetration_depth: 0.125,
            ..Default::default()
        };
        let handle = solver.add(&bodies, &handles, &description).unwrap();
        assert_eq!(solver.get_description::<PenetrationLimit>(handle).unwrap(), description);
        let reference = solver.get_constraint_reference(handle).unwrap();
        assert_eq!(reference.body_indices(), vec![0, 1]);
        assert_eq!(solver.get_accumulated_impulse(handle).unwrap(), vec![0.0]);
        let mut visited = Vec::new();
        solver.enumerate_connected_body_indices(handle, |index| visited.push(index)).unwrap();
        assert_eq!(visited, vec![0, 1]);
    }

    #[test]
    fn handles_are_reused_after_removal() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(2);
        let handle = solver.add(&bodies, &handles, &PenetrationLimit::default()).unwrap();
        solver.remove(handle, &bodies).unwrap();
        let reused = solver.add(&bodies, &handles, &PenetrationLimit::default()).unwrap();
        assert_eq!(reused, handle);
        solver.compact(0, 0);
        assert!(solver.handle_to_constraint().len() > handle.0 as usize);
        solver.clear();
        assert_eq!(solver.count_constraints(), 0);
        assert!(!solver.constraint_exists(handle));
    }

    #[test]
    fn capacity_changes_reach_batch_handle_sets() {
        let mut solver = create_solver();
        let (bodies, handles) = create_bodies(2);
        solver.add(&bodies, &handles, &PenetrationLimit::default()).unwrap();
        solver.ensure_capacity(5000, 16);
        assert!(solver.batches()[0].referenced_handles.handle_capacity() >= 5000);
        solver.compact(0, 0);
        assert_eq!(solver.batches()[0].referenced_handles.handle_capacity(), 64);
        assert!(solver.batches()[0].referenced_handles.contains(handles[1]));
        solver.resize(300, 0);
        assert_eq!(solver.batches()[0].referenced_handles.handle_capacity(), 320);
        solver.validate_batch_invariants(&bodies);
    }
}
