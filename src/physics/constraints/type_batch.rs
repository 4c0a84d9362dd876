use std::any::Any;

use crate::physics::bodies::Bodies;
use crate::physics::constraint_location::ConstraintLocation;
use crate::physics::handles::ConstraintHandle;
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Largest number of bodies a single constraint may reference.
pub const MAXIMUM_BODIES_PER_CONSTRAINT: usize = 4;

/// Type-erased storage of one constraint type inside one constraint batch.
///
/// Data is stored in AOSOA bundles of `LANES` constraints. The solver only ever sees this trait; the
/// per-type math runs monomorphized inside [`ConstraintTypeBatch`](super::type_processor::ConstraintTypeBatch).
pub trait TypeBatch: Any + Send + Sync {
    /// Type id of the constraints stored in this batch.
    fn constraint_type_id(&self) -> i32;

    /// Number of bodies referenced by each constraint of this type.
    fn bodies_per_constraint(&self) -> usize;

    fn constraint_count(&self) -> usize;

    fn bundle_count(&self) -> usize;

    /// Capacity of the type batch in constraints. Always a multiple of the lane count.
    fn capacity(&self) -> usize;

    /// Handles of the allocated constraints, in storage order.
    fn index_to_handle(&self) -> &[ConstraintHandle];

    /// Allocates a slot for a constraint referencing the given body memory indices. Returns the slot's index.
    fn allocate(&mut self, handle: ConstraintHandle, body_indices: &[i32]) -> usize;

    /// Removes the constraint at `index`, moving the last constraint into the hole and fixing up its location.
    fn remove(&mut self, index: usize, handle_to_constraint: &mut [ConstraintLocation]);

    /// Memory index of the body in the given slot of a constraint.
    fn body_index(&self, index: usize, slot: usize) -> i32;

    /// Visits the body memory indices of a constraint in slot order.
    fn enumerate_connected_body_indices(&self, index: usize, visitor: &mut dyn FnMut(i32));

    /// Points one body slot of a constraint at a new body memory index.
    fn update_for_body_memory_move(&mut self, index: usize, body_index_in_constraint: usize, new_body_location: i32);

    /// Copies the constraint data at `source_index` into an already allocated slot of another type batch of the same type.
    fn transfer_constraint(&self, source_index: usize, target: &mut dyn TypeBatch, target_index: usize);

    /// Sorts `constraint_count` constraints starting at `bundle_start` by the lowest referenced body index.
    fn sort_by_body_location(
        &mut self,
        bundle_start: usize,
        constraint_count: usize,
        handle_to_constraint: &mut [ConstraintLocation],
        body_count: usize,
        dispatcher: Option<&dyn ThreadDispatcher>,
    );

    /// Changes the capacity, never dropping below the current constraint count.
    fn resize(&mut self, capacity: usize);

    fn scale_accumulated_impulses(&mut self, scale: f32);

    /// Accumulated impulse of one constraint, one value per constrained degree of freedom.
    fn accumulated_impulses(&self, index: usize) -> Vec<f32>;

    /// Computes projection data for bundles `[start_bundle, end_bundle)`.
    ///
    /// # Safety
    /// No other thread may touch the same bundles of this type batch during the call.
    unsafe fn prestep(&self, bodies: &Bodies, dt: f32, inverse_dt: f32, start_bundle: usize, end_bundle: usize);

    /// Applies the accumulated impulses of bundles `[start_bundle, end_bundle)` to the bodies.
    ///
    /// # Safety
    /// No other thread may touch the same bundles or any body they reference during the call.
    unsafe fn warm_start(&self, bodies: &Bodies, start_bundle: usize, end_bundle: usize);

    /// Runs one solve iteration over bundles `[start_bundle, end_bundle)`.
    ///
    /// # Safety
    /// Same contract as [`TypeBatch::warm_start`].
    unsafe fn solve_iteration(&self, bodies: &Bodies, start_bundle: usize, end_bundle: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
