use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::physics::bodies::Bodies;
use crate::physics::constraint_location::ConstraintLocation;
use crate::physics::constraints::type_batch::MAXIMUM_BODIES_PER_CONSTRAINT;
use crate::physics::handles::{BodyHandle, ConstraintHandle};
use crate::physics::solver::Solver;
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Number of constraints each analysis job covers.
const TARGET_CONSTRAINTS_PER_JOB: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchCompressorSettings {
    /// Fraction of all constraints analyzed for a better batch each call.
    pub target_candidate_fraction: f32,
    /// Fraction of all constraints that may be moved each call.
    pub maximum_compression_fraction: f32,
    /// Applies moves in handle order so results do not depend on the thread count.
    pub deterministic: bool,
}

impl Default for BatchCompressorSettings {
    fn default() -> Self {
        Self {
            target_candidate_fraction: 0.01,
            maximum_compression_fraction: 0.0005,
            deterministic: false,
        }
    }
}

/// Handles the movement of constraints from higher indexed batches into lower indexed batches
/// to avoid accumulating unnecessary constraint batches.
#[derive(Debug, Clone)]
pub struct BatchCompressor {
    target_candidate_fraction: f32,
    maximum_compression_fraction: f32,
    /// Index of the constraint batch to analyze next. Batch 0 can never move lower and is skipped.
    next_batch_index: usize,
    next_type_batch_index: usize,
}

#[derive(Clone, Copy, Debug)]
struct Compression {
    constraint_handle: ConstraintHandle,
    target_batch: usize,
}

#[derive(Clone, Copy, Debug)]
struct AnalysisRegion {
    type_batch_index: usize,
    start_index_in_type_batch: usize,
    end_index_in_type_batch: usize,
}

impl Default for BatchCompressor {
    fn default() -> Self {
        Self::new(&BatchCompressorSettings::default())
    }
}

impl BatchCompressor {
    pub fn new(settings: &BatchCompressorSettings) -> Self {
        Self {
            target_candidate_fraction: settings.target_candidate_fraction.clamp(0.0, 1.0),
            maximum_compression_fraction: settings.maximum_compression_fraction.clamp(0.0, 1.0),
            next_batch_index: 1,
            next_type_batch_index: 0,
        }
    }

    pub fn target_candidate_fraction(&self) -> f32 {
        self.target_candidate_fraction
    }

    pub fn set_target_candidate_fraction(&mut self, value: f32) {
        self.target_candidate_fraction = value.clamp(0.0, 1.0);
    }

    pub fn maximum_compression_fraction(&self) -> f32 {
        self.maximum_compression_fraction
    }

    pub fn set_maximum_compression_fraction(&mut self, value: f32) {
        self.maximum_compression_fraction = value.clamp(0.0, 1.0);
    }

    /// Finds the lowest batch below the constraint's own batch that can hold it.
    fn try_to_find_better_batch_for_constraint(
        solver: &Solver,
        bodies: &Bodies,
        constraint_handle: ConstraintHandle,
        location: ConstraintLocation,
        compressions: &mut Vec<Compression>,
    ) {
        let mut body_handles = [BodyHandle::default(); MAXIMUM_BODIES_PER_CONSTRAINT];
        let body_count = solver.collect_body_handles(location, bodies, &mut body_handles);
        let body_handles = &body_handles[..body_count];
        if let Some(target_batch) = solver.batches[..location.batch_index as usize]
            .iter()
            .position(|batch| batch.referenced_handles.can_fit(body_handles))
        {
            compressions.push(Compression {
                constraint_handle,
                target_batch,
            });
        }
    }

    fn do_job(
        solver: &Solver,
        bodies: &Bodies,
        batch_index: usize,
        region: &AnalysisRegion,
        compressions: &mut Vec<Compression>,
    ) {
        let type_batch = &solver.batches[batch_index].type_batches[region.type_batch_index];
        let type_id = type_batch.constraint_type_id();
        for index in region.start_index_in_type_batch..region.end_index_in_type_batch {
            let location = ConstraintLocation {
                batch_index: batch_index as i32,
                type_id,
                index_in_type_batch: index as i32,
            };
            let constraint_handle = type_batch.index_to_handle()[index];
            Self::try_to_find_better_batch_for_constraint(solver, bodies, constraint_handle, location, compressions);
        }
    }

    /// Moves cursor onto a batch and type batch that exist. Returns false if nothing above batch 0 holds constraints.
    fn validate_cursor(&mut self, solver: &Solver) -> bool {
        let batch_count = solver.batches.len();
        if self.next_batch_index == 0 || self.next_batch_index >= batch_count {
            self.next_batch_index = 1;
            self.next_type_batch_index = 0;
        }
        // Every batch above 0 is visited at most once before giving up.
        for _ in 0..batch_count {
            if self.next_type_batch_index < solver.batches[self.next_batch_index].type_batches.len() {
                return true;
            }
            self.next_batch_index += 1;
            if self.next_batch_index >= batch_count {
                self.next_batch_index = 1;
            }
            self.next_type_batch_index = 0;
        }
        false
    }

    /// Analyzes a slice of one batch for constraints that fit in lower batches and moves a bounded number of them.
    ///
    /// With `deterministic` set, the applied moves depend only on the solver state, never on the thread count.
    pub fn compress(
        &mut self,
        solver: &mut Solver,
        bodies: &Bodies,
        dispatcher: Option<&dyn ThreadDispatcher>,
        deterministic: bool,
    ) {
        let constraint_count = solver.count_constraints();
        if constraint_count == 0 || solver.batches.len() <= 1 {
            return;
        }
        if !self.validate_cursor(solver) {
            return;
        }
        let target_candidate_count =
            ((self.target_candidate_fraction * constraint_count as f32).round() as usize).max(1);
        let maximum_compression_count =
            ((self.maximum_compression_fraction * constraint_count as f32).round() as usize).max(1);

        // Schedule whole type batches until the candidate target is reached.
        let batch_index = self.next_batch_index;
        let batch = &solver.batches[batch_index];
        let mut analysis_jobs = Vec::new();
        let mut scheduled_constraint_count = 0;
        while self.next_type_batch_index < batch.type_batches.len() && scheduled_constraint_count < target_candidate_count {
            let type_batch_constraint_count = batch.type_batches[self.next_type_batch_index].constraint_count();
            let job_count = 1 + type_batch_constraint_count / TARGET_CONSTRAINTS_PER_JOB;
            let base = type_batch_constraint_count / job_count;
            let remainder = type_batch_constraint_count - base * job_count;
            let mut previous_end = 0;
            for job_index in 0..job_count {
                let count = if job_index < remainder { base + 1 } else { base };
                analysis_jobs.push(AnalysisRegion {
                    type_batch_index: self.next_type_batch_index,
                    start_index_in_type_batch: previous_end,
                    end_index_in_type_batch: previous_end + count,
                });
                previous_end += count;
            }
            scheduled_constraint_count += type_batch_constraint_count;
            self.next_type_batch_index += 1;
        }

        let worker_count = dispatcher.map_or(1, |dispatcher| dispatcher.thread_count().min(analysis_jobs.len()).max(1));
        let worker_compressions: Vec<Mutex<Vec<Compression>>> =
            (0..worker_count).map(|_| Mutex::new(Vec::new())).collect();
        {
            let solver_view: &Solver = solver;
            let job_counter = AtomicUsize::new(0);
            let analyze = |worker_index: usize| {
                let mut compressions = worker_compressions[worker_index]
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                loop {
                    let job_index = job_counter.fetch_add(1, Ordering::Relaxed);
                    let Some(region) = analysis_jobs.get(job_index) else {
                        break;
                    };
                    Self::do_job(solver_view, bodies, batch_index, region, &mut compressions);
                }
            };
            match dispatcher {
                Some(dispatcher) if worker_count > 1 => dispatcher.dispatch_workers(&analyze, worker_count),
                _ => analyze(0),
            }
        }
        let mut worker_compressions: Vec<Vec<Compression>> = worker_compressions
            .into_iter()
            .map(|list| list.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();

        let candidate_count: usize = worker_compressions.iter().map(|list| list.len()).sum();
        let mut applied_count = 0;
        if deterministic {
            let mut compressions: Vec<Compression> = worker_compressions.into_iter().flatten().collect();
            compressions.sort_unstable_by_key(|compression| compression.constraint_handle);
            for compression in compressions.into_iter().take(maximum_compression_count) {
                solver.transfer_constraint(compression.constraint_handle, compression.target_batch, bodies);
                applied_count += 1;
            }
        } else {
            'apply: for list in worker_compressions.iter_mut().rev() {
                while let Some(compression) = list.pop() {
                    if applied_count == maximum_compression_count {
                        break 'apply;
                    }
                    solver.transfer_constraint(compression.constraint_handle, compression.target_batch, bodies);
                    applied_count += 1;
                }
            }
        }
        if candidate_count > 0 {
            log::debug!(
                "Batch compressor moved {} of {} candidates out of batch {}.",
                applied_count,
                candidate_count,
                batch_index
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::physics::body_description::BodyDescription;
    use crate::physics::body_properties::{BodyInertia, BodyVelocity};
    use crate::physics::constraints::constraint_type_registry::ConstraintTypeRegistry;
    use crate::physics::constraints::contact::penetration_limit::PenetrationLimit;
    use crate::physics::simulation_allocation_sizes::SimulationAllocationSizes;
    use crate::physics::solver::SolverSettings;

    fn create_solver_and_bodies(count: usize) -> (Solver, Bodies, Vec<BodyHandle>) {
        let mut registry = ConstraintTypeRegistry::new();
        registry.register::<PenetrationLimit>();
        let solver =
            Solver::new(Arc::new(registry), SolverSettings::default(), &SimulationAllocationSizes::default()).unwrap();
        let mut bodies = Bodies::new(count);
        let description = BodyDescription::create_dynamic(BodyVelocity::default(), BodyInertia::sphere(1.0, 1.0));
        let handles = (0..count).map(|_| bodies.add(&description)).collect();
        (solver, bodies, handles)
    }

    #[test]
    fn moves_constraints_into_emptied_lower_batch() {
        let (mut solver, bodies, handles) = create_solver_and_bodies(3);
        let first = solver.add(&bodies, &handles[0..2], &PenetrationLimit::default()).unwrap();
        let description = PenetrationLimit {
            penetration_depth: 0.25,
            ..Default::default()
        };
        let second = solver.add(&bodies, &handles[1..3], &description).unwrap();
        assert_eq!(solver.handle_to_constraint()[second.0 as usize].batch_index, 1);
        solver.remove(first, &bodies).unwrap();

        let mut compressor = BatchCompressor::default();
        compressor.compress(&mut solver, &bodies, None, false);
        assert_eq!(solver.batches().len(), 1);
        assert_eq!(solver.handle_to_constraint()[second.0 as usize].batch_index, 0);
        assert_eq!(solver.get_description::<PenetrationLimit>(second).unwrap(), description);
        solver.validate_batch_invariants(&bodies);
    }

    #[test]
    fn does_nothing_with_a_single_batch() {
        let (mut solver, bodies, handles) = create_solver_and_bodies(4);
        solver.add(&bodies, &handles[0..2], &PenetrationLimit::default()).unwrap();
        solver.add(&bodies, &handles[2..4], &PenetrationLimit::default()).unwrap();
        let mut compressor = BatchCompressor::default();
        compressor.compress(&mut solver, &bodies, None, true);
        assert_eq!(solver.batches().len(), 1);
        assert_eq!(solver.count_constraints(), 2);
    }

    #[test]
    fn fractions_are_clamped() {
        let compressor = BatchCompressor::new(&BatchCompressorSettings {
            target_candidate_fraction: 2.0,
            maximum_compression_fraction: -1.0,
            deterministic: false,
        });
        assert_eq!(compressor.target_candidate_fraction(), 1.0);
        assert_eq!(compressor.maximum_compression_fraction(), 0.0);
    }
}
