use crate::physics::bodies::Bodies;
use crate::physics::constraint_connectivity_graph::ConstraintConnectivityGraph;
use crate::physics::handles::BodyHandle;
use crate::physics::solver::Solver;

/// Incrementally changes the memory layout of bodies so that bodies connected by constraints end up near each other.
///
/// Runs a depth first traversal over the constraint graph that survives across calls. Every body reached is pulled
/// down to a watermark slot, so islands end up stored contiguously in traversal order.
#[derive(Debug, Clone, Default)]
pub struct BodyLayoutOptimizer {
    /// Memory indices of visited bodies whose neighbors have not been expanded yet. Every entry is below `target_index`.
    traversal_stack: Vec<usize>,
    /// Next memory slot to fill with a reached body.
    target_index: usize,
    neighbor_handles: Vec<BodyHandle>,
}

impl BodyLayoutOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next memory slot the traversal will fill.
    #[inline(always)]
    pub fn target_index(&self) -> usize {
        self.target_index
    }

    /// Swaps two bodies in memory and updates every system that refers to bodies by memory index.
    pub fn swap_body_location(
        bodies: &mut Bodies,
        graph: &mut ConstraintConnectivityGraph,
        solver: &mut Solver,
        a: usize,
        b: usize,
    ) {
        debug_assert!(a < bodies.count() && b < bodies.count());
        if a == b {
            return;
        }
        // A constraint between a and b holds one reference per slot, so each slot is redirected once.
        for reference in graph.constraints(a) {
            solver.update_for_body_memory_move(
                reference.connecting_constraint_handle,
                reference.body_index_in_constraint as usize,
                b as i32,
            );
        }
        for reference in graph.constraints(b) {
            solver.update_for_body_memory_move(
                reference.connecting_constraint_handle,
                reference.body_index_in_constraint as usize,
                a as i32,
            );
        }
        graph.swap_bodies(a, b);
        bodies.swap(a, b);
    }

    /// Visits up to `maximum_bodies_to_visit` bodies, pulling every newly reached neighbor down to the watermark.
    pub fn partial_island_dfs(
        &mut self,
        bodies: &mut Bodies,
        graph: &mut ConstraintConnectivityGraph,
        solver: &mut Solver,
        maximum_bodies_to_visit: usize,
    ) {
        let body_count = bodies.count();
        if body_count == 0 {
            return;
        }
        if self.target_index >= body_count {
            self.wrap();
        }
        let mut visited_count = 0;
        while visited_count < maximum_bodies_to_visit {
            let Some(body_index) = self.traversal_stack.pop() else {
                if self.target_index >= body_count {
                    self.wrap();
                    break;
                }
                // The body at the watermark roots the next island.
                self.traversal_stack.push(self.target_index);
                self.target_index += 1;
                continue;
            };
            visited_count += 1;

            // Neighbors are tracked by handle; each swap can move a neighbor that has not been processed yet.
            let mut neighbor_handles = std::mem::take(&mut self.neighbor_handles);
            neighbor_handles.clear();
            graph.enumerate_connected_bodies(body_index, solver, |connected| {
                neighbor_handles.push(bodies.handle_of(connected.body_index as usize));
            });
            for &handle in &neighbor_handles {
                let neighbor_index = bodies.handle_to_index()[handle.0 as usize] as usize;
                if neighbor_index >= self.target_index {
                    Self::swap_body_location(bodies, graph, solver, neighbor_index, self.target_index);
                    self.traversal_stack.push(self.target_index);
                    self.target_index += 1;
                }
            }
            self.neighbor_handles = neighbor_handles;
        }
    }

    fn wrap(&mut self) {
        self.target_index = 0;
        self.traversal_stack.clear();
        log::debug!("Body layout optimizer wrapped to the first body.");
    }
}
