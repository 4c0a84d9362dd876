use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::physics::batch_compressor::{BatchCompressor, BatchCompressorSettings};
use crate::physics::bodies::Bodies;
use crate::physics::body_description::BodyDescription;
use crate::physics::body_layout_optimizer::BodyLayoutOptimizer;
use crate::physics::constraint_connectivity_graph::ConstraintConnectivityGraph;
use crate::physics::constraint_layout_optimizer::ConstraintLayoutOptimizer;
use crate::physics::constraints::constraint_description::ConstraintDescription;
use crate::physics::constraints::constraint_type_registry::ConstraintTypeRegistry;
use crate::physics::constraints::contact::penetration_limit::PenetrationLimit;
use crate::physics::constraints::type_batch::MAXIMUM_BODIES_PER_CONSTRAINT;
use crate::physics::error::SolverError;
use crate::physics::handles::{BodyHandle, ConstraintHandle};
use crate::physics::simulation_allocation_sizes::SimulationAllocationSizes;
use crate::physics::solver::{Solver, SolverSettings};
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Per-timestep budgets of the constraint and body layout optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptimizerSettings {
    /// Size of each sorted constraint region in bundles. Must be even.
    pub maximum_region_size_in_bundles: usize,
    /// Number of constraint regions sorted per timestep.
    pub region_count: usize,
    /// Number of bodies the body layout traversal visits per timestep. Zero disables it.
    pub maximum_bodies_to_visit: usize,
}

impl Default for LayoutOptimizerSettings {
    fn default() -> Self {
        Self {
            maximum_region_size_in_bundles: 8,
            region_count: 1,
            maximum_bodies_to_visit: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub gravity: Vec3,
    pub solver: SolverSettings,
    pub compressor: BatchCompressorSettings,
    pub layout: LayoutOptimizerSettings,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -10.0, 0.0),
            solver: SolverSettings::default(),
            compressor: BatchCompressorSettings::default(),
            layout: LayoutOptimizerSettings::default(),
        }
    }
}

/// Orchestrates the bookkeeping and execution of bodies and the constraints between them.
///
/// Every system indexed by body memory location is kept in sync here: the body store, the constraint
/// connectivity graph and the constraint body references held by the solver.
pub struct Simulation {
    pub bodies: Bodies,
    pub solver: Solver,
    pub constraint_graph: ConstraintConnectivityGraph,
    pub solver_batch_compressor: BatchCompressor,
    pub constraint_layout_optimizer: ConstraintLayoutOptimizer,
    pub body_layout_optimizer: BodyLayoutOptimizer,
    pub settings: SimulationSettings,
}

impl Simulation {
    pub fn new(
        registry: Arc<ConstraintTypeRegistry>,
        settings: SimulationSettings,
        allocation_sizes: &SimulationAllocationSizes,
    ) -> Result<Self, SolverError> {
        let region_size = settings.layout.maximum_region_size_in_bundles;
        if region_size == 0 || region_size % 2 != 0 {
            return Err(SolverError::InvalidRegionSize(region_size));
        }
        let solver = Solver::new(registry, settings.solver, allocation_sizes)?;
        log::debug!(
            "Created simulation with {} registered constraint types and capacity for {} bodies.",
            solver.registry().type_count(),
            allocation_sizes.bodies
        );
        Ok(Self {
            bodies: Bodies::new(allocation_sizes.bodies),
            solver,
            constraint_graph: ConstraintConnectivityGraph::new(
                allocation_sizes.bodies,
                allocation_sizes.constraint_count_per_body_estimate,
            ),
            solver_batch_compressor: BatchCompressor::new(&settings.compressor),
            constraint_layout_optimizer: ConstraintLayoutOptimizer::new(),
            body_layout_optimizer: BodyLayoutOptimizer::new(),
            settings,
        })
    }

    /// Creates a simulation with the built in constraint types registered.
    pub fn with_default_types(
        settings: SimulationSettings,
        allocation_sizes: &SimulationAllocationSizes,
    ) -> Result<Self, SolverError> {
        let mut registry = ConstraintTypeRegistry::new();
        registry.register::<PenetrationLimit>();
        Self::new(Arc::new(registry), settings, allocation_sizes)
    }

    pub fn add_body(&mut self, description: &BodyDescription) -> BodyHandle {
        let handle = self.bodies.add(description);
        self.constraint_graph.add_body_list(self.bodies.count() - 1);
        handle
    }

    /// Removes a body along with every constraint attached to it.
    pub fn remove_body(&mut self, handle: BodyHandle) -> Result<(), SolverError> {
        let index = self.bodies.index_of(handle)?;
        while let Some(reference) = self.constraint_graph.constraints(index).last().copied() {
            self.remove_constraint(reference.connecting_constraint_handle)?;
        }
        let removal = self.bodies.remove_at(index);
        if let Some(moved_index) = removal.moved_body_original_index {
            // The last body now lives in the removed slot; point its constraints at it.
            for reference in self.constraint_graph.constraints(moved_index) {
                self.solver.update_for_body_memory_move(
                    reference.connecting_constraint_handle,
                    reference.body_index_in_constraint as usize,
                    index as i32,
                );
            }
        }
        let emptied = self.constraint_graph.remove_body_list(index, self.bodies.count());
        debug_assert!(emptied, "Constraints were removed before the body.");
        Ok(())
    }

    pub fn add_constraint<D: ConstraintDescription>(
        &mut self,
        body_handles: &[BodyHandle],
        description: &D,
    ) -> Result<ConstraintHandle, SolverError> {
        let constraint_handle = self.solver.add(&self.bodies, body_handles, description)?;
        for (slot, &body_handle) in body_handles.iter().enumerate() {
            let body_index = self.bodies.index_of(body_handle)?;
            self.constraint_graph
                .add_constraint(body_index, constraint_handle, slot as i32);
        }
        Ok(constraint_handle)
    }

    pub fn remove_constraint(&mut self, handle: ConstraintHandle) -> Result<(), SolverError> {
        let mut body_indices = [0i32; MAXIMUM_BODIES_PER_CONSTRAINT];
        let mut body_count = 0;
        self.solver.enumerate_connected_body_indices(handle, |body_index| {
            body_indices[body_count] = body_index;
            body_count += 1;
        })?;
        for &body_index in &body_indices[..body_count] {
            let removed = self.constraint_graph.remove_constraint(body_index as usize, handle);
            debug_assert!(removed, "Constraint graph must list every constrained body.");
        }
        self.solver.remove(handle, &self.bodies)
    }

    pub fn apply_description<D: ConstraintDescription>(
        &mut self,
        handle: ConstraintHandle,
        description: &D,
    ) -> Result<(), SolverError> {
        self.solver.apply_description(handle, description)
    }

    pub fn get_description<D: ConstraintDescription>(&self, handle: ConstraintHandle) -> Result<D, SolverError> {
        self.solver.get_description(handle)
    }

    /// Performs one timestep of the given length.
    ///
    /// Integrates velocities, solves constraints, then runs a bounded slice of batch compression and layout optimization.
    pub fn timestep(&mut self, dt: f32, dispatcher: Option<&dyn ThreadDispatcher>) -> Result<(), SolverError> {
        debug_assert!(dt > 0.0, "Timestep duration must be positive.");
        self.bodies.integrate_velocities(self.settings.gravity, dt);
        self.solver.update(&mut self.bodies, dt, dispatcher);
        self.solver_batch_compressor.compress(
            &mut self.solver,
            &self.bodies,
            dispatcher,
            self.settings.compressor.deterministic,
        );
        self.constraint_layout_optimizer.update(
            &mut self.solver,
            &self.bodies,
            self.settings.layout.maximum_region_size_in_bundles,
            self.settings.layout.region_count,
            dispatcher,
        )?;
        self.body_layout_optimizer.partial_island_dfs(
            &mut self.bodies,
            &mut self.constraint_graph,
            &mut self.solver,
            self.settings.layout.maximum_bodies_to_visit,
        );
        Ok(())
    }

    /// Removes every body and constraint.
    pub fn clear(&mut self) {
        self.solver.clear();
        self.bodies.clear();
        self.constraint_graph.clear();
        self.body_layout_optimizer = BodyLayoutOptimizer::new();
    }
}
