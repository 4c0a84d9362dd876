pub mod batch_compressor;
pub mod batch_referenced_handles;
pub mod bodies;
pub mod bodies_gather_scatter;
pub mod body_description;
pub mod body_layout_optimizer;
pub mod body_properties;
pub mod constraint_batch;
pub mod constraint_connectivity_graph;
pub mod constraint_layout_optimizer;
pub mod constraint_location;
pub mod constraint_reference;
pub mod constraints;
pub mod error;
pub mod handles;
pub(crate) mod local_spin_wait;
pub mod simulation;
pub mod simulation_allocation_sizes;
pub mod solver;
pub mod solver_multithreading;

pub use batch_compressor::{BatchCompressor, BatchCompressorSettings};
pub use bodies::Bodies;
pub use body_description::BodyDescription;
pub use body_layout_optimizer::BodyLayoutOptimizer;
pub use body_properties::{BodyInertia, BodyVelocity};
pub use constraint_connectivity_graph::ConstraintConnectivityGraph;
pub use constraint_layout_optimizer::ConstraintLayoutOptimizer;
pub use error::SolverError;
pub use handles::{BodyHandle, ConstraintHandle};
pub use simulation::{LayoutOptimizerSettings, Simulation, SimulationSettings};
pub use simulation_allocation_sizes::SimulationAllocationSizes;
pub use solver::{Solver, SolverSettings};
pub use solver_multithreading::WorkBlock;
