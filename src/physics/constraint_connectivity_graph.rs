use crate::physics::handles::ConstraintHandle;
use crate::physics::solver::Solver;

/// Reference connecting a body to one of its constraints.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyConstraintReference {
    /// Handle of the constraint connected to the body.
    pub connecting_constraint_handle: ConstraintHandle,
    /// The body's slot within the constraint (e.g. 0 for body A, 1 for body B).
    pub body_index_in_constraint: i32,
}

/// A body reached through a constraint, and the connection by which it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedBody {
    pub body_index: i32,
    pub connecting_constraint_handle: ConstraintHandle,
    pub body_index_in_constraint: i32,
}

/// Per-body lists of the constraints touching each body, indexed by body memory index.
///
/// Constraints store body memory indices rather than handles, so this graph follows body memory order too.
/// Every body move must be mirrored here.
#[derive(Debug, Default)]
pub struct ConstraintConnectivityGraph {
    constraint_lists: Vec<Vec<BodyConstraintReference>>,
    constraint_count_per_body_estimate: usize,
}

impl ConstraintConnectivityGraph {
    pub fn new(initial_body_count_estimate: usize, constraint_count_per_body_estimate: usize) -> Self {
        Self {
            constraint_lists: Vec::with_capacity(initial_body_count_estimate),
            constraint_count_per_body_estimate,
        }
    }

    /// Number of body lists in the graph.
    #[inline(always)]
    pub fn body_count(&self) -> usize {
        self.constraint_lists.len()
    }

    /// Removes every body list.
    pub fn clear(&mut self) {
        self.constraint_lists.clear();
    }

    /// Swaps the lists of two body memory slots.
    #[inline(always)]
    pub fn swap_bodies(&mut self, a: usize, b: usize) {
        self.constraint_lists.swap(a, b);
    }

    /// Adds an empty list for a body at the given memory index.
    pub fn add_body_list(&mut self, body_index: usize) {
        if body_index >= self.constraint_lists.len() {
            self.constraint_lists.resize_with(body_index + 1, Vec::new);
        }
        self.constraint_lists[body_index] = Vec::with_capacity(self.constraint_count_per_body_estimate);
    }

    /// Removes the list of a body, moving the list at `last_index` into its slot.
    /// Returns whether the removed list was empty; a nonempty list means constraints were orphaned.
    pub fn remove_body_list(&mut self, body_index: usize, last_index: usize) -> bool {
        debug_assert_eq!(
            last_index + 1,
            self.constraint_lists.len(),
            "Body lists mirror the packed body arrays; removal must move the last list."
        );
        self.constraint_lists.swap_remove(body_index).is_empty()
    }

    #[inline(always)]
    pub fn add_constraint(&mut self, body_index: usize, constraint_handle: ConstraintHandle, body_index_in_constraint: i32) {
        self.constraint_lists[body_index].push(BodyConstraintReference {
            connecting_constraint_handle: constraint_handle,
            body_index_in_constraint,
        });
    }

    /// Removes a constraint from a body's list. Returns whether the constraint was found.
    pub fn remove_constraint(&mut self, body_index: usize, constraint_handle: ConstraintHandle) -> bool {
        // Linear search; bodies rarely have more than a handful of constraints.
        let list = &mut self.constraint_lists[body_index];
        match list
            .iter()
            .position(|reference| reference.connecting_constraint_handle == constraint_handle)
        {
            Some(position) => {
                list.swap_remove(position);
                true
            }
            None => false,
        }
    }

    /// Gets the constraint references of a body in insertion order (modulo swap removals).
    #[inline(always)]
    pub fn constraints(&self, body_index: usize) -> &[BodyConstraintReference] {
        &self.constraint_lists[body_index]
    }

    #[inline(always)]
    pub fn constraint_count(&self, body_index: usize) -> usize {
        self.constraint_lists[body_index].len()
    }

    pub fn body_is_constrained_by(&self, body_index: usize, constraint_handle: ConstraintHandle) -> bool {
        self.constraint_lists[body_index]
            .iter()
            .any(|reference| reference.connecting_constraint_handle == constraint_handle)
    }

    /// Visits every constraint reference of a body, last added first.
    pub fn enumerate_constraints(&self, body_index: usize, mut visitor: impl FnMut(BodyConstraintReference)) {
        for reference in self.constraint_lists[body_index].iter().rev() {
            visitor(*reference);
        }
    }

    /// Visits every body connected to the given body through a constraint, last added constraint first.
    /// Bodies connected by more than one constraint are reported once per constraint. The body itself is never reported.
    pub fn enumerate_connected_bodies(&self, body_index: usize, solver: &Solver, mut visitor: impl FnMut(ConnectedBody)) {
        for reference in self.constraint_lists[body_index].iter().rev() {
            let handle = reference.connecting_constraint_handle;
            let mut index_in_constraint = 0;
            solver.enumerate_connected_body_indices_unchecked(handle, |connected_body_index| {
                if connected_body_index != body_index as i32 {
                    visitor(ConnectedBody {
                        body_index: connected_body_index,
                        connecting_constraint_handle: handle,
                        body_index_in_constraint: index_in_constraint,
                    });
                }
                index_in_constraint += 1;
            });
        }
    }
}
