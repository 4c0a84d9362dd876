use crate::physics::batch_referenced_handles::BatchReferencedHandles;
use crate::physics::bodies::Bodies;
use crate::physics::constraint_location::ConstraintLocation;
use crate::physics::constraints::constraint_type_registry::ConstraintTypeRegistry;
use crate::physics::constraints::type_batch::TypeBatch;
use crate::physics::handles::{BodyHandle, ConstraintHandle};

/// Contains a set of type batches whose constraints share no body references.
pub struct ConstraintBatch {
    // The solver's handle to location table stores type ids rather than type batch indices, so type batches
    // can change slots on removal without touching every constraint location.
    pub type_index_to_type_batch_index: Vec<i32>,
    pub type_batches: Vec<Box<dyn TypeBatch>>,
    /// Handles of every body referenced by a constraint in this batch.
    pub referenced_handles: BatchReferencedHandles,
}

impl ConstraintBatch {
    pub fn new(initial_type_count_estimate: usize, initial_body_handle_capacity: i32) -> Self {
        Self {
            type_index_to_type_batch_index: vec![-1; initial_type_count_estimate],
            type_batches: Vec::with_capacity(initial_type_count_estimate),
            referenced_handles: BatchReferencedHandles::new(initial_body_handle_capacity),
        }
    }

    /// Index of the type batch holding the given type, if this batch has one.
    #[inline(always)]
    pub fn type_batch_index(&self, type_id: i32) -> Option<usize> {
        match self.type_index_to_type_batch_index.get(type_id as usize) {
            Some(&index) if index >= 0 => Some(index as usize),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn get_type_batch(&self, type_id: i32) -> Option<&dyn TypeBatch> {
        self.type_batch_index(type_id)
            .map(|index| self.type_batches[index].as_ref())
    }

    #[inline(always)]
    pub fn get_type_batch_mut(&mut self, type_id: i32) -> Option<&mut (dyn TypeBatch + 'static)> {
        match self.type_batch_index(type_id) {
            Some(index) => Some(self.type_batches[index].as_mut()),
            None => None,
        }
    }

    /// Gets the type batch index for a type, creating an empty type batch if none exists.
    pub fn get_or_create_type_batch_index(
        &mut self,
        type_id: i32,
        registry: &ConstraintTypeRegistry,
        initial_capacity: usize,
    ) -> usize {
        if let Some(index) = self.type_batch_index(type_id) {
            return index;
        }
        if type_id as usize >= self.type_index_to_type_batch_index.len() {
            self.type_index_to_type_batch_index.resize(type_id as usize + 1, -1);
        }
        let index = self.type_batches.len();
        self.type_index_to_type_batch_index[type_id as usize] = index as i32;
        self.type_batches.push(registry.create_type_batch(type_id, initial_capacity));
        index
    }

    /// Allocates a slot for a constraint and marks its bodies as referenced by this batch.
    ///
    /// The caller guarantees that the batch can fit the body handles.
    pub fn allocate(
        &mut self,
        constraint_handle: ConstraintHandle,
        body_handles: &[BodyHandle],
        body_indices: &[i32],
        type_id: i32,
        registry: &ConstraintTypeRegistry,
        initial_capacity: usize,
    ) -> usize {
        debug_assert!(
            self.referenced_handles.can_fit(body_handles),
            "Constraint batches must hold body-disjoint constraints."
        );
        for &handle in body_handles {
            self.referenced_handles.add(handle);
        }
        let type_batch_index = self.get_or_create_type_batch_index(type_id, registry, initial_capacity);
        self.type_batches[type_batch_index].allocate(constraint_handle, body_indices)
    }

    /// Clears the handles of the bodies referenced by a constraint from this batch's referenced set.
    pub fn remove_body_handles(&mut self, type_batch_index: usize, index_in_type_batch: usize, bodies: &Bodies) {
        let referenced_handles = &mut self.referenced_handles;
        self.type_batches[type_batch_index].enumerate_connected_body_indices(index_in_type_batch, &mut |body_index| {
            referenced_handles.remove(bodies.handle_of(body_index as usize));
        });
    }

    /// Removes a constraint from this batch, dropping its type batch if it becomes empty.
    pub fn remove(
        &mut self,
        type_id: i32,
        index_in_type_batch: usize,
        bodies: &Bodies,
        handle_to_constraint: &mut [ConstraintLocation],
    ) {
        let Some(type_batch_index) = self.type_batch_index(type_id) else {
            debug_assert!(false, "Removed constraint's type batch must exist.");
            return;
        };
        self.remove_body_handles(type_batch_index, index_in_type_batch, bodies);
        self.type_batches[type_batch_index].remove(index_in_type_batch, handle_to_constraint);
        self.remove_type_batch_if_empty(type_batch_index);
    }

    /// Removes a type batch if it has no more constraints. The last type batch takes its slot.
    pub fn remove_type_batch_if_empty(&mut self, type_batch_index: usize) {
        if self.type_batches[type_batch_index].constraint_count() > 0 {
            return;
        }
        let removed_type_id = self.type_batches[type_batch_index].constraint_type_id();
        self.type_index_to_type_batch_index[removed_type_id as usize] = -1;
        self.type_batches.swap_remove(type_batch_index);
        if let Some(moved) = self.type_batches.get(type_batch_index) {
            self.type_index_to_type_batch_index[moved.constraint_type_id() as usize] = type_batch_index as i32;
        }
    }

    pub fn constraint_count(&self) -> usize {
        self.type_batches.iter().map(|type_batch| type_batch.constraint_count()).sum()
    }

    pub fn bundle_count(&self) -> usize {
        self.type_batches.iter().map(|type_batch| type_batch.bundle_count()).sum()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.type_batches.is_empty()
    }

    /// Grows every type batch to at least the given capacity.
    pub fn ensure_type_batch_capacities(&mut self, minimum_capacity: usize) {
        for type_batch in &mut self.type_batches {
            if type_batch.capacity() < minimum_capacity {
                type_batch.resize(minimum_capacity);
            }
        }
    }

    /// Resizes every type batch to the given capacity, never dropping below its constraint count.
    pub fn resize_type_batch_capacities(&mut self, capacity: usize) {
        for type_batch in &mut self.type_batches {
            type_batch.resize(capacity);
        }
    }
}
