use std::collections::{BTreeMap, HashMap, HashSet};

use approx::assert_abs_diff_eq;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rust_bepusolver::physics::body_layout_optimizer::BodyLayoutOptimizer;
use rust_bepusolver::physics::constraints::contact::penetration_limit::PenetrationLimit;
use rust_bepusolver::physics::constraints::spring_settings::SpringSettings;
use rust_bepusolver::physics::{
    BatchCompressor, BatchCompressorSettings, BodyDescription, BodyHandle, BodyInertia, BodyVelocity,
    ConstraintHandle, ConstraintLayoutOptimizer, LayoutOptimizerSettings, Simulation, SimulationAllocationSizes,
    SimulationSettings,
};
use rust_bepusolver::utilities::bundle_indexing::BundleIndexing;
use rust_bepusolver::utilities::thread_dispatcher::{SimpleThreadDispatcher, ThreadDispatcher};
use rust_bepusolver::utilities::vector::LANES;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dynamic_body(velocity: Vec3) -> BodyDescription {
    BodyDescription::create_dynamic(BodyVelocity::from_linear(velocity), BodyInertia::sphere(1.0, 0.5))
}

fn create_simulation(settings: SimulationSettings) -> Simulation {
    Simulation::with_default_types(settings, &SimulationAllocationSizes::new(64, 64, 16, 4)).unwrap()
}

/// Builds a simulation with random pair constraints, then removes a random subset of them to leave holes in the batches.
fn create_fragmented_simulation(seed: u64, body_count: usize, constraint_count: usize) -> Simulation {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut simulation = create_simulation(SimulationSettings::default());
    let handles: Vec<BodyHandle> = (0..body_count)
        .map(|index| simulation.add_body(&dynamic_body(Vec3::new(index as f32, 0.0, 0.0))))
        .collect();
    let mut constraints = Vec::new();
    while constraints.len() < constraint_count {
        let a = rng.gen_range(0..body_count);
        let b = rng.gen_range(0..body_count);
        if a == b {
            continue;
        }
        let description = PenetrationLimit {
            penetration_depth: rng.gen_range(-0.1..0.1),
            ..Default::default()
        };
        constraints.push(simulation.add_constraint(&[handles[a], handles[b]], &description).unwrap());
    }
    for (index, handle) in constraints.into_iter().enumerate() {
        if index % 3 != 0 && rng.gen_bool(0.6) {
            simulation.remove_constraint(handle).unwrap();
        }
    }
    simulation
}

fn assert_bodies_bijective(simulation: &Simulation) {
    let bodies = &simulation.bodies;
    for index in 0..bodies.count() {
        assert_eq!(bodies.index_of(bodies.handle_of(index)).unwrap(), index);
    }
    let live_handles = bodies.handle_to_index().iter().filter(|&&index| index >= 0).count();
    assert_eq!(live_handles, bodies.count());
}

/// Handle-based shadow of every live constraint: its bodies in slot order and its description.
type ConstraintShadow = BTreeMap<ConstraintHandle, ([BodyHandle; 2], PenetrationLimit)>;

/// Checks the solver, the body store and the connectivity graph against the shadow.
fn assert_matches_shadow(simulation: &Simulation, shadow: &ConstraintShadow) {
    simulation.solver.validate_batch_invariants(&simulation.bodies);
    assert_bodies_bijective(simulation);
    assert_eq!(simulation.solver.count_constraints(), shadow.len());
    let mut graph_reference_count = 0;
    for body_index in 0..simulation.bodies.count() {
        let body_handle = simulation.bodies.handle_of(body_index);
        for reference in simulation.constraint_graph.constraints(body_index) {
            let (body_handles, _) = &shadow[&reference.connecting_constraint_handle];
            assert_eq!(body_handles[reference.body_index_in_constraint as usize], body_handle);
            graph_reference_count += 1;
        }
    }
    assert_eq!(graph_reference_count, 2 * shadow.len());
    for (&handle, (body_handles, description)) in shadow {
        let mut referenced = Vec::new();
        simulation
            .solver
            .enumerate_connected_body_indices(handle, |index| {
                referenced.push(simulation.bodies.handle_of(index as usize))
            })
            .unwrap();
        assert_eq!(referenced, body_handles.to_vec());
        assert_eq!(simulation.get_description::<PenetrationLimit>(handle).unwrap(), *description);
    }
}

fn highest_nonempty_batch(simulation: &Simulation) -> Option<usize> {
    simulation.solver.batches().iter().rposition(|batch| !batch.is_empty())
}

#[test]
fn random_churn_keeps_batches_disjoint_and_handles_bijective() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);
    let mut simulation = create_simulation(SimulationSettings::default());
    let mut bodies: Vec<BodyHandle> = Vec::new();
    let mut constraints: Vec<ConstraintHandle> = Vec::new();
    for step in 0..600 {
        match rng.gen_range(0..10) {
            0..=2 => bodies.push(simulation.add_body(&dynamic_body(Vec3::ZERO))),
            3..=6 if bodies.len() >= 2 => {
                let a = bodies[rng.gen_range(0..bodies.len())];
                let b = bodies[rng.gen_range(0..bodies.len())];
                if a != b {
                    constraints.push(simulation.add_constraint(&[a, b], &PenetrationLimit::default()).unwrap());
                }
            }
            7 | 8 if !constraints.is_empty() => {
                let handle = constraints.swap_remove(rng.gen_range(0..constraints.len()));
                simulation.remove_constraint(handle).unwrap();
            }
            9 if !bodies.is_empty() => {
                let handle = bodies.swap_remove(rng.gen_range(0..bodies.len()));
                simulation.remove_body(handle).unwrap();
                constraints.retain(|&constraint| simulation.solver.constraint_exists(constraint));
            }
            _ => {}
        }
        if step % 20 == 0 {
            simulation.solver.validate_batch_invariants(&simulation.bodies);
            assert_bodies_bijective(&simulation);
        }
    }
    simulation.solver.validate_batch_invariants(&simulation.bodies);
    assert_bodies_bijective(&simulation);
    assert_eq!(simulation.solver.count_constraints(), constraints.len());
}

#[test]
fn removed_constraints_can_be_readded_without_overlap() {
    let mut simulation = create_simulation(SimulationSettings::default());
    let handles: Vec<BodyHandle> = (0..3).map(|_| simulation.add_body(&dynamic_body(Vec3::ZERO))).collect();
    let first = simulation
        .add_constraint(&[handles[0], handles[1]], &PenetrationLimit::default())
        .unwrap();
    simulation
        .add_constraint(&[handles[1], handles[2]], &PenetrationLimit::default())
        .unwrap();
    simulation.remove_constraint(first).unwrap();
    // Batch 0 is empty again but was not popped, so the re-added constraint lands there.
    let readded = simulation
        .add_constraint(&[handles[0], handles[1]], &PenetrationLimit::default())
        .unwrap();
    assert_eq!(simulation.solver.handle_to_constraint()[readded.0 as usize].batch_index, 0);
    simulation.solver.validate_batch_invariants(&simulation.bodies);
}

#[test]
fn compression_never_raises_the_highest_batch() {
    init_logging();
    let mut simulation = create_fragmented_simulation(11, 48, 240);
    let constraint_count = simulation.solver.count_constraints();
    let mut compressor = BatchCompressor::new(&BatchCompressorSettings {
        target_candidate_fraction: 0.5,
        maximum_compression_fraction: 0.1,
        deterministic: false,
    });
    let mut highest = highest_nonempty_batch(&simulation);
    for _ in 0..200 {
        compressor.compress(&mut simulation.solver, &simulation.bodies, None, false);
        let current = highest_nonempty_batch(&simulation);
        assert!(current <= highest);
        highest = current;
        simulation.solver.validate_batch_invariants(&simulation.bodies);
    }
    assert_eq!(simulation.solver.count_constraints(), constraint_count);
}

#[test]
fn deterministic_compression_does_not_depend_on_thread_count() {
    let settings = BatchCompressorSettings {
        target_candidate_fraction: 1.0,
        maximum_compression_fraction: 0.05,
        deterministic: true,
    };
    let dispatcher = SimpleThreadDispatcher::new(4);
    let mut single = create_fragmented_simulation(23, 96, 600);
    let mut multi = create_fragmented_simulation(23, 96, 600);
    let mut single_compressor = BatchCompressor::new(&settings);
    let mut multi_compressor = BatchCompressor::new(&settings);
    for _ in 0..20 {
        single_compressor.compress(&mut single.solver, &single.bodies, None, true);
        multi_compressor.compress(&mut multi.solver, &multi.bodies, Some(&dispatcher), true);
        assert_eq!(single.solver.handle_to_constraint(), multi.solver.handle_to_constraint());
    }
    multi.solver.validate_batch_invariants(&multi.bodies);
}

#[test]
fn bundle_indices_round_trip() {
    for linear_index in 0..(LANES * 37 + 5) {
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(linear_index);
        assert!(inner_index < LANES);
        assert_eq!(BundleIndexing::get_linear_index(bundle_index, inner_index), linear_index);
    }
    assert_eq!(BundleIndexing::get_bundle_count(LANES + 1), 2);
}

#[test]
fn resting_contact_stops_a_falling_body() {
    init_logging();
    let mut simulation = create_simulation(SimulationSettings {
        gravity: Vec3::new(0.0, -9.81, 0.0),
        ..Default::default()
    });
    let falling = simulation.add_body(&dynamic_body(Vec3::ZERO));
    let support = simulation.add_body(&BodyDescription::create_kinematic(BodyVelocity::default()));
    let contact = simulation
        .add_constraint(
            &[falling, support],
            &PenetrationLimit {
                offset_a: Vec3::new(0.0, -0.5, 0.0),
                offset_b: Vec3::new(0.0, 0.5, 0.0),
                normal: Vec3::Y,
                penetration_depth: 0.0,
                spring_settings: SpringSettings::new(1000.0, 1.0),
                maximum_recovery_velocity: 2.0,
            },
        )
        .unwrap();
    assert_eq!(simulation.solver.iteration_count(), 8);
    simulation.timestep(1.0 / 60.0, None).unwrap();
    let velocity = simulation.bodies.velocity(falling).unwrap();
    assert!(velocity.linear.y >= -1e-4);
    assert_abs_diff_eq!(velocity.linear.x, 0.0);
    assert_eq!(simulation.bodies.velocity(support).unwrap(), BodyVelocity::default());
    assert!(simulation.solver.get_accumulated_impulse(contact).unwrap()[0] > 0.0);
}

#[test]
fn work_blocks_cover_every_bundle_once() {
    let simulation = create_fragmented_simulation(5, 200, 900);
    let solver = &simulation.solver;
    for worker_count in 1..=8 {
        let (blocks, batch_boundaries) = solver.build_work_blocks(worker_count);
        assert_eq!(batch_boundaries.len(), solver.batches().len());
        assert_eq!(batch_boundaries.last().copied(), Some(blocks.len()));
        let mut covered: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
        let mut block_start = 0;
        for (batch_index, &boundary) in batch_boundaries.iter().enumerate() {
            for block in &blocks[block_start..boundary] {
                assert_eq!(block.batch_index, batch_index);
                assert!(block.start_bundle < block.end);
                covered
                    .entry((block.batch_index, block.type_batch_index))
                    .or_default()
                    .push((block.start_bundle, block.end));
            }
            block_start = boundary;
        }
        for (batch_index, batch) in solver.batches().iter().enumerate() {
            for (type_batch_index, type_batch) in batch.type_batches.iter().enumerate() {
                let mut ranges = covered.remove(&(batch_index, type_batch_index)).unwrap_or_default();
                ranges.sort_unstable();
                let mut next = 0;
                for (start, end) in ranges {
                    assert_eq!(start, next);
                    next = end;
                }
                assert_eq!(next, type_batch.bundle_count());
            }
        }
        assert!(covered.is_empty());
    }
}

#[test]
fn layout_optimizers_preserve_constraint_connectivity() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(99);
    let mut simulation = create_simulation(SimulationSettings {
        gravity: Vec3::ZERO,
        ..Default::default()
    });
    let handles: Vec<BodyHandle> = (0..120)
        .map(|index| simulation.add_body(&dynamic_body(Vec3::new(index as f32, 0.0, 0.0))))
        .collect();
    let mut shadow = ConstraintShadow::new();
    for _ in 0..300 {
        let a = handles[rng.gen_range(0..handles.len())];
        let b = handles[rng.gen_range(0..handles.len())];
        if a == b {
            continue;
        }
        let description = PenetrationLimit {
            penetration_depth: rng.gen_range(-1.0..1.0),
            ..Default::default()
        };
        let handle = simulation.add_constraint(&[a, b], &description).unwrap();
        shadow.insert(handle, ([a, b], description));
    }
    for index in (1..simulation.bodies.count()).rev() {
        let other = rng.gen_range(0..index);
        BodyLayoutOptimizer::swap_body_location(
            &mut simulation.bodies,
            &mut simulation.constraint_graph,
            &mut simulation.solver,
            index,
            other,
        );
    }

    let dispatcher = SimpleThreadDispatcher::new(3);
    let mut constraint_optimizer = ConstraintLayoutOptimizer::new();
    let mut body_optimizer = BodyLayoutOptimizer::new();
    for round in 0..40 {
        let round_dispatcher: Option<&dyn ThreadDispatcher> = if round % 2 == 0 { None } else { Some(&dispatcher) };
        constraint_optimizer
            .update(&mut simulation.solver, &simulation.bodies, 2, 3, round_dispatcher)
            .unwrap();
        body_optimizer.partial_island_dfs(
            &mut simulation.bodies,
            &mut simulation.constraint_graph,
            &mut simulation.solver,
            10,
        );
    }

    assert_matches_shadow(&simulation, &shadow);
    for (index, &handle) in handles.iter().enumerate() {
        assert_eq!(simulation.bodies.velocity(handle).unwrap().linear.x, index as f32);
    }
    let unique: HashSet<ConstraintHandle> = simulation
        .solver
        .batches()
        .iter()
        .flat_map(|batch| batch.type_batches.iter())
        .flat_map(|type_batch| type_batch.index_to_handle().iter().copied())
        .collect();
    assert_eq!(unique.len(), shadow.len());
}

/// Randomly adds and removes bodies and constraints between timesteps, checking every system after each step.
/// Steps alternate between the calling thread and `dispatcher` when one is given.
fn run_timestep_churn(seed: u64, dispatcher: Option<&dyn ThreadDispatcher>) {
    init_logging();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut simulation = create_simulation(SimulationSettings {
        compressor: BatchCompressorSettings {
            target_candidate_fraction: 0.5,
            maximum_compression_fraction: 0.05,
            deterministic: false,
        },
        layout: LayoutOptimizerSettings {
            maximum_region_size_in_bundles: 2,
            region_count: 2,
            maximum_bodies_to_visit: 8,
        },
        ..Default::default()
    });
    let mut bodies: Vec<BodyHandle> = Vec::new();
    let mut shadow = ConstraintShadow::new();
    for step in 0..400 {
        for _ in 0..4 {
            match rng.gen_range(0..10) {
                0..=2 => bodies.push(simulation.add_body(&dynamic_body(Vec3::ZERO))),
                3..=6 if bodies.len() >= 2 => {
                    let a = bodies[rng.gen_range(0..bodies.len())];
                    let b = bodies[rng.gen_range(0..bodies.len())];
                    if a != b {
                        let description = PenetrationLimit {
                            penetration_depth: rng.gen_range(-0.1..0.1),
                            ..Default::default()
                        };
                        let handle = simulation.add_constraint(&[a, b], &description).unwrap();
                        assert!(shadow.insert(handle, ([a, b], description)).is_none());
                    }
                }
                7 | 8 if !shadow.is_empty() => {
                    let handle = *shadow.keys().nth(rng.gen_range(0..shadow.len())).unwrap();
                    simulation.remove_constraint(handle).unwrap();
                    shadow.remove(&handle);
                }
                9 if !bodies.is_empty() => {
                    let handle = bodies.swap_remove(rng.gen_range(0..bodies.len()));
                    simulation.remove_body(handle).unwrap();
                    shadow.retain(|&constraint, _| simulation.solver.constraint_exists(constraint));
                }
                _ => {}
            }
        }
        let step_dispatcher = if step % 2 == 0 { None } else { dispatcher };
        simulation.timestep(1.0 / 60.0, step_dispatcher).unwrap();
        assert_matches_shadow(&simulation, &shadow);
    }
    assert!(!shadow.is_empty());
}

#[test]
fn churn_between_timesteps_keeps_every_system_consistent() {
    run_timestep_churn(17, None);
}

#[test]
fn churn_between_threaded_timesteps_keeps_every_system_consistent() {
    let dispatcher = SimpleThreadDispatcher::new(4);
    run_timestep_churn(41, Some(&dispatcher));
}

#[test]
fn multithreaded_update_matches_single_threaded() {
    let mut single = create_fragmented_simulation(31, 64, 256);
    let mut multi = create_fragmented_simulation(31, 64, 256);
    for simulation in [&mut single, &mut multi] {
        for index in 0..simulation.bodies.count() {
            let handle = simulation.bodies.handle_of(index);
            simulation
                .bodies
                .set_velocity(handle, BodyVelocity::new(Vec3::new(0.0, -(index as f32) * 0.1, 0.0), Vec3::ZERO))
                .unwrap();
        }
    }
    let dispatcher = SimpleThreadDispatcher::new(4);
    for _ in 0..5 {
        single.solver.update(&mut single.bodies, 1.0 / 60.0, None);
        multi.solver.update(&mut multi.bodies, 1.0 / 60.0, Some(&dispatcher));
    }
    assert_eq!(single.bodies.velocities(), multi.bodies.velocities());
}
