//! Constraint solving core for a rigid body physics engine.
//!
//! Constraints are colored into batches of body-disjoint constraints, stored per type in SIMD-width bundles,
//! and solved by a multithreaded prestep, warm start and solve iteration pipeline. Batch compression and
//! incremental layout optimizers keep the constraint and body memory compact and cache friendly.

pub mod physics;
pub mod utilities;

pub use physics::error::SolverError;
pub use physics::simulation::Simulation;
