use crate::physics::constraints::type_batch::TypeBatch;

/// Reference to a constraint's memory location in the solver.
///
/// Borrowed from the solver; any mutation of the solver may move the constraint and invalidates the reference.
#[derive(Clone, Copy)]
pub struct ConstraintReference<'a> {
    pub type_batch: &'a dyn TypeBatch,
    /// Index in the type batch where the constraint is allocated.
    pub index_in_type_batch: usize,
}

impl<'a> ConstraintReference<'a> {
    #[inline(always)]
    pub fn new(type_batch: &'a dyn TypeBatch, index_in_type_batch: usize) -> Self {
        Self {
            type_batch,
            index_in_type_batch,
        }
    }

    /// Memory indices of the bodies referenced by the constraint, in slot order.
    pub fn body_indices(&self) -> Vec<i32> {
        (0..self.type_batch.bodies_per_constraint())
            .map(|slot| self.type_batch.body_index(self.index_in_type_batch, slot))
            .collect()
    }
}
