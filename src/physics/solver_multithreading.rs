use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use crate::physics::bodies::Bodies;
use crate::physics::local_spin_wait::LocalSpinWait;
use crate::physics::solver::Solver;
use crate::utilities::thread_dispatcher::ThreadDispatcher;

/// Contiguous range of bundles in one type batch, claimed and executed by a single worker per stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkBlock {
    pub batch_index: usize,
    pub type_batch_index: usize,
    /// Index of the first bundle in the block.
    pub start_bundle: usize,
    /// Exclusive end bundle of the block.
    pub end: usize,
}

/// Worker load observed during the previous update, used to place worker starts for the next one.
#[derive(Debug, Default)]
pub(crate) struct SchedulingHistory {
    worker_count: usize,
    /// Block count of every stage range: all blocks for the prestep first, then one entry per batch.
    stage_block_counts: Vec<usize>,
    /// Per worker, the number of blocks completed in each stage range.
    completed_blocks: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Prestep,
    WarmStart,
    Solve,
}

struct FrameContext<'a> {
    solver: &'a Solver,
    bodies: &'a Bodies,
    dt: f32,
    inverse_dt: f32,
    iteration_count: usize,
    worker_count: usize,
    work_blocks: Vec<WorkBlock>,
    /// Exclusive end block index of each batch.
    batch_boundaries: Vec<usize>,
    /// Claim flag per block. The claimed value alternates between stages touching the same block, so flags are never reset within a frame.
    claims: Vec<AtomicI32>,
    /// Initial start block per worker and stage range; -1 when the worker has no start in that range.
    worker_starts: Vec<Vec<i32>>,
    completed_stages: CachePadded<AtomicUsize>,
    completed_blocks: Vec<CachePadded<Vec<AtomicUsize>>>,
}

impl<'a> FrameContext<'a> {
    #[inline(always)]
    fn batch_range(&self, batch_index: usize) -> (usize, usize) {
        let start = if batch_index == 0 { 0 } else { self.batch_boundaries[batch_index - 1] };
        (start, self.batch_boundaries[batch_index])
    }

    #[inline(always)]
    fn try_claim(&self, block_index: usize, unclaimed: i32, claimed: i32) -> bool {
        self.claims[block_index]
            .compare_exchange(unclaimed, claimed, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    #[inline(always)]
    unsafe fn execute_block(&self, stage: Stage, block_index: usize) {
        let block = &self.work_blocks[block_index];
        let type_batch = &self.solver.batches[block.batch_index].type_batches[block.type_batch_index];
        match stage {
            Stage::Prestep => type_batch.prestep(self.bodies, self.dt, self.inverse_dt, block.start_bundle, block.end),
            Stage::WarmStart => type_batch.warm_start(self.bodies, block.start_bundle, block.end),
            Stage::Solve => type_batch.solve_iteration(self.bodies, block.start_bundle, block.end),
        }
    }

    /// Claims and executes blocks of `[stage_start, stage_end)`: forward from the worker's start, then backward,
    /// then anything left anywhere in the range.
    unsafe fn execute_stage(
        &self,
        stage: Stage,
        stage_start: usize,
        stage_end: usize,
        worker_start: &mut i32,
        unclaimed: i32,
        completed_blocks: &AtomicUsize,
    ) {
        let claimed = unclaimed ^ 1;
        let mut completed_count = 0;
        if *worker_start >= 0 {
            let start = *worker_start as usize;
            debug_assert!(start >= stage_start && start < stage_end);
            let mut block_index = start;
            while block_index < stage_end && self.try_claim(block_index, unclaimed, claimed) {
                self.execute_block(stage, block_index);
                completed_count += 1;
                block_index += 1;
            }
            block_index = start;
            while block_index > stage_start && self.try_claim(block_index - 1, unclaimed, claimed) {
                block_index -= 1;
                self.execute_block(stage, block_index);
                completed_count += 1;
                // Later stages over the same range begin where this worker's contiguous region begins.
                *worker_start = block_index as i32;
            }
        }
        for block_index in stage_start..stage_end {
            if self.try_claim(block_index, unclaimed, claimed) {
                self.execute_block(stage, block_index);
                completed_count += 1;
            }
        }
        completed_blocks.fetch_add(completed_count, Ordering::Relaxed);
    }

    #[inline(always)]
    fn wait_for_stage(&self, sync_stage: usize) {
        self.completed_stages.fetch_add(1, Ordering::AcqRel);
        let target = self.worker_count * sync_stage;
        let mut wait = LocalSpinWait::new();
        while self.completed_stages.load(Ordering::Acquire) < target {
            wait.spin_once();
        }
    }

    unsafe fn solve_worker(&self, worker_index: usize) {
        let mut starts = self.worker_starts[worker_index].clone();
        let completed_blocks = &self.completed_blocks[worker_index];
        let mut sync_stage = 0;

        // The prestep covers every block at once; no per batch barriers.
        self.execute_stage(Stage::Prestep, 0, self.work_blocks.len(), &mut starts[0], 0, &completed_blocks[0]);
        sync_stage += 1;
        self.wait_for_stage(sync_stage);

        // Every block was claimed once by the prestep, so batch stages start from the flipped value.
        for batch_index in 0..self.batch_boundaries.len() {
            let (start, end) = self.batch_range(batch_index);
            self.execute_stage(
                Stage::WarmStart,
                start,
                end,
                &mut starts[batch_index + 1],
                1,
                &completed_blocks[batch_index + 1],
            );
            sync_stage += 1;
            self.wait_for_stage(sync_stage);
        }

        for iteration_index in 0..self.iteration_count {
            let unclaimed = (iteration_index & 1) as i32;
            for batch_index in 0..self.batch_boundaries.len() {
                let (start, end) = self.batch_range(batch_index);
                self.execute_stage(
                    Stage::Solve,
                    start,
                    end,
                    &mut starts[batch_index + 1],
                    unclaimed,
                    &completed_blocks[batch_index + 1],
                );
                sync_stage += 1;
                self.wait_for_stage(sync_stage);
            }
        }
    }
}

impl Solver {
    /// Splits every type batch into work blocks.
    ///
    /// Returns the blocks in batch order and, per batch, the exclusive end index of its blocks.
    pub fn build_work_blocks(&self, worker_count: usize) -> (Vec<WorkBlock>, Vec<usize>) {
        let target_blocks_per_batch = (worker_count.max(1) * self.settings.target_blocks_per_batch_per_worker) as f32;
        let inverse_minimum_block_size = 1.0 / self.settings.minimum_block_size_in_bundles.max(1) as f32;
        let inverse_maximum_block_size = 1.0 / self.settings.maximum_block_size_in_bundles.max(1) as f32;
        let mut work_blocks = Vec::new();
        let mut batch_boundaries = Vec::with_capacity(self.batches.len());
        for (batch_index, batch) in self.batches.iter().enumerate() {
            let batch_bundle_count = batch.bundle_count() as f32;
            for (type_batch_index, type_batch) in batch.type_batches.iter().enumerate() {
                let bundle_count = type_batch.bundle_count();
                let type_batch_size_fraction = bundle_count as f32 / batch_bundle_count;
                let maximum_block_count = bundle_count as f32 * inverse_minimum_block_size;
                let minimum_block_count = bundle_count as f32 * inverse_maximum_block_size;
                let block_count = (maximum_block_count
                    .min(minimum_block_count.max(target_blocks_per_batch * type_batch_size_fraction))
                    as usize)
                    .max(1);
                let base_block_size = bundle_count / block_count;
                let remainder = bundle_count - base_block_size * block_count;
                let mut previous_end = 0;
                for block_index in 0..block_count {
                    let block_bundle_count = base_block_size + usize::from(block_index < remainder);
                    work_blocks.push(WorkBlock {
                        batch_index,
                        type_batch_index,
                        start_bundle: previous_end,
                        end: previous_end + block_bundle_count,
                    });
                    previous_end += block_bundle_count;
                }
            }
            batch_boundaries.push(work_blocks.len());
        }
        (work_blocks, batch_boundaries)
    }

    pub(crate) fn get_uniformly_distributed_start(
        worker_index: usize,
        block_count: usize,
        worker_count: usize,
        offset: usize,
    ) -> i32 {
        if block_count <= worker_count {
            if worker_index < block_count {
                (offset + worker_index) as i32
            } else {
                -1
            }
        } else {
            let blocks_per_worker = block_count / worker_count;
            let remainder = block_count - blocks_per_worker * worker_count;
            (offset + blocks_per_worker * worker_index + remainder.min(worker_index)) as i32
        }
    }

    /// Places worker starts for every stage range. Reuses the previous update's completion ratios when
    /// the worker count and block layout are unchanged; otherwise distributes uniformly.
    fn compute_worker_starts(&self, worker_count: usize, stage_block_counts: &[usize]) -> Vec<Vec<i32>> {
        let history = &self.scheduling_history;
        let use_history = history.worker_count == worker_count
            && history.stage_block_counts == stage_block_counts
            && history.completed_blocks.len() == worker_count;
        let mut starts = vec![vec![-1; stage_block_counts.len()]; worker_count];
        let mut batch_offset = 0;
        for (stage_index, &block_count) in stage_block_counts.iter().enumerate() {
            let offset = if stage_index == 0 { 0 } else { batch_offset };
            let total_completed: usize = if use_history {
                history.completed_blocks.iter().map(|completed| completed[stage_index]).sum()
            } else {
                0
            };
            if use_history && block_count > worker_count && total_completed > 0 {
                let mut cumulative = 0;
                for (worker_index, worker_starts) in starts.iter_mut().enumerate() {
                    let start = (cumulative as f32 / total_completed as f32 * block_count as f32) as usize;
                    worker_starts[stage_index] = (offset + start.min(block_count - 1)) as i32;
                    cumulative += history.completed_blocks[worker_index][stage_index];
                }
            } else {
                for (worker_index, worker_starts) in starts.iter_mut().enumerate() {
                    worker_starts[stage_index] =
                        Self::get_uniformly_distributed_start(worker_index, block_count, worker_count, offset);
                }
            }
            if stage_index > 0 {
                batch_offset += block_count;
            }
        }
        starts
    }

    /// Runs the prestep, warm start and every solve iteration over all constraints.
    ///
    /// Workers are dispatched once; stages are separated by spin barriers. Without a dispatcher the same
    /// schedule runs on the calling thread.
    pub fn update(&mut self, bodies: &mut Bodies, dt: f32, dispatcher: Option<&dyn ThreadDispatcher>) {
        if self.count_constraints() == 0 {
            return;
        }
        let worker_count = dispatcher.map_or(1, |dispatcher| dispatcher.thread_count().max(1));
        let (work_blocks, batch_boundaries) = self.build_work_blocks(worker_count);
        let mut stage_block_counts = Vec::with_capacity(batch_boundaries.len() + 1);
        stage_block_counts.push(work_blocks.len());
        let mut previous_boundary = 0;
        for &boundary in &batch_boundaries {
            stage_block_counts.push(boundary - previous_boundary);
            previous_boundary = boundary;
        }
        let worker_starts = self.compute_worker_starts(worker_count, &stage_block_counts);
        log::trace!(
            "Solver update: {} work blocks in {} batches across {} workers.",
            work_blocks.len(),
            batch_boundaries.len(),
            worker_count
        );

        let bodies: &Bodies = bodies;
        let context = FrameContext {
            solver: self,
            bodies,
            dt,
            inverse_dt: 1.0 / dt,
            iteration_count: self.iteration_count() as usize,
            worker_count,
            claims: (0..work_blocks.len()).map(|_| AtomicI32::new(0)).collect(),
            work_blocks,
            batch_boundaries,
            worker_starts,
            completed_stages: CachePadded::new(AtomicUsize::new(0)),
            completed_blocks: (0..worker_count)
                .map(|_| CachePadded::new((0..stage_block_counts.len()).map(|_| AtomicUsize::new(0)).collect()))
                .collect(),
        };
        let worker = |worker_index: usize| unsafe { context.solve_worker(worker_index) };
        match dispatcher {
            Some(dispatcher) if worker_count > 1 => dispatcher.dispatch_workers(&worker, worker_count),
            _ => worker(0),
        }
        let completed_blocks = context
            .completed_blocks
            .iter()
            .map(|completed| completed.iter().map(|count| count.load(Ordering::Relaxed)).collect())
            .collect();
        drop(context);
        self.scheduling_history = SchedulingHistory {
            worker_count,
            stage_block_counts,
            completed_blocks,
        };
    }
}
