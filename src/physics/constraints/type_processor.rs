use std::any::Any;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::physics::bodies::Bodies;
use crate::physics::body_properties::{BodyInertiaWide, BodyVelocityWide};
use crate::physics::constraint_location::ConstraintLocation;
use crate::physics::constraints::constraint_description::ConstraintDescription;
use crate::physics::constraints::type_batch::{TypeBatch, MAXIMUM_BODIES_PER_CONSTRAINT};
use crate::physics::handles::ConstraintHandle;
use crate::physics::local_spin_wait::LocalSpinWait;
use crate::utilities::bundle_indexing::BundleIndexing;
use crate::utilities::collections::lsb_radix_sort::LsbRadixSort;
use crate::utilities::gather_scatter::{Bundle, GatherScatter};
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::thread_dispatcher::ThreadDispatcher;
use crate::utilities::vector::{Vector, LANES};

/// Per-type constraint math operating on whole bundles.
///
/// Implementors are usually zero sized marker types. All bundle types must be made of lane vectors so
/// that lane moves through [`GatherScatter`] are valid. The accumulated impulse must contain only `f32` lanes.
pub trait ConstraintKernel: Send + Sync + 'static {
    /// Number of bodies referenced by each constraint of this type.
    const BODY_COUNT: usize;

    type Description: ConstraintDescription<Kernel = Self>;
    /// Persistent per-constraint input written from descriptions.
    type PrestepData: Bundle;
    /// Per-frame data computed by the prestep and consumed by warm start and solve.
    type Projection: Bundle;
    /// Impulses accumulated over iterations; persists across frames for warm starting.
    type AccumulatedImpulse: Bundle;

    fn apply_description(description: &Self::Description, prestep: &mut Self::PrestepData, inner_index: usize);

    fn build_description(prestep: &Self::PrestepData, inner_index: usize) -> Self::Description;

    fn prestep(
        inertias: &[BodyInertiaWide],
        prestep: &Self::PrestepData,
        dt: f32,
        inverse_dt: f32,
        projection: &mut Self::Projection,
    );

    fn warm_start(
        projection: &Self::Projection,
        accumulated_impulse: &Self::AccumulatedImpulse,
        velocities: &mut [BodyVelocityWide],
    );

    fn solve(
        projection: &Self::Projection,
        accumulated_impulse: &mut Self::AccumulatedImpulse,
        velocities: &mut [BodyVelocityWide],
    );
}

/// Bundle storage and batch processing for one constraint kernel.
pub struct ConstraintTypeBatch<K: ConstraintKernel> {
    type_id: i32,
    constraint_count: usize,
    /// `BODY_COUNT` vectors per bundle; slot `s` of bundle `b` lives at `b * BODY_COUNT + s`. Unused lanes hold -1.
    body_references: Buffer<Vector<i32>>,
    prestep_data: Buffer<K::PrestepData>,
    projection: Buffer<K::Projection>,
    accumulated_impulses: Buffer<K::AccumulatedImpulse>,
    index_to_handle: Buffer<ConstraintHandle>,
    _kernel: PhantomData<K>,
}

/// Scratch memory for sorting a region of a type batch.
struct SortCache<K: ConstraintKernel> {
    sort_keys: Buffer<i32>,
    source_indices: Buffer<i32>,
    keys_scratch: Buffer<i32>,
    indices_scratch: Buffer<i32>,
    body_references: Buffer<Vector<i32>>,
    prestep_data: Buffer<K::PrestepData>,
    accumulated_impulses: Buffer<K::AccumulatedImpulse>,
    index_to_handle: Buffer<ConstraintHandle>,
}

impl<K: ConstraintKernel> SortCache<K> {
    fn new(constraint_count: usize, bundle_count: usize) -> Self {
        Self {
            sort_keys: Buffer::new(constraint_count),
            source_indices: Buffer::new(constraint_count),
            keys_scratch: Buffer::new(constraint_count),
            indices_scratch: Buffer::new(constraint_count),
            body_references: Buffer::new(bundle_count * K::BODY_COUNT),
            prestep_data: Buffer::new(bundle_count),
            accumulated_impulses: Buffer::new(bundle_count),
            index_to_handle: Buffer::new(bundle_count * LANES),
        }
    }
}

/// Splits `total` items into `worker_count` contiguous ranges, spreading the remainder over the first workers.
#[inline(always)]
fn worker_range(total: usize, worker_count: usize, worker_index: usize) -> (usize, usize) {
    let base = total / worker_count;
    let remainder = total % worker_count;
    let start = base * worker_index + worker_index.min(remainder);
    let end = start + base + usize::from(worker_index < remainder);
    (start, end)
}

#[inline(always)]
fn complete_phase(counter: &AtomicUsize, worker_count: usize) {
    counter.fetch_add(1, Ordering::AcqRel);
    let mut wait = LocalSpinWait::new();
    while counter.load(Ordering::Acquire) < worker_count {
        wait.spin_once();
    }
}

impl<K: ConstraintKernel> ConstraintTypeBatch<K> {
    pub fn new(type_id: i32, initial_capacity: usize) -> Self {
        debug_assert!(
            K::BODY_COUNT >= 1 && K::BODY_COUNT <= MAXIMUM_BODIES_PER_CONSTRAINT,
            "Constraint types must reference between 1 and {} bodies.",
            MAXIMUM_BODIES_PER_CONSTRAINT
        );
        let mut batch = Self {
            type_id,
            constraint_count: 0,
            body_references: Buffer::default(),
            prestep_data: Buffer::default(),
            projection: Buffer::default(),
            accumulated_impulses: Buffer::default(),
            index_to_handle: Buffer::default(),
            _kernel: PhantomData,
        };
        batch.internal_resize(initial_capacity.max(LANES));
        batch
    }

    fn internal_resize(&mut self, capacity: usize) {
        let bundle_capacity = BundleIndexing::get_bundle_count(capacity.max(self.constraint_count));
        if bundle_capacity * LANES == self.index_to_handle.len() {
            return;
        }
        let old_reference_count = self.body_references.len();
        self.body_references.resize(bundle_capacity * K::BODY_COUNT);
        for i in old_reference_count..self.body_references.len() {
            self.body_references[i] = Vector::splat(-1);
        }
        self.prestep_data.resize(bundle_capacity);
        self.projection.resize(bundle_capacity);
        self.accumulated_impulses.resize(bundle_capacity);
        self.index_to_handle.resize(bundle_capacity * LANES);
    }

    #[inline(always)]
    fn body_references_of(&self, bundle_index: usize) -> &[Vector<i32>] {
        &self.body_references.as_slice()[bundle_index * K::BODY_COUNT..(bundle_index + 1) * K::BODY_COUNT]
    }

    /// Raw body reference bundles. See the field layout on [`ConstraintTypeBatch`].
    pub fn body_references(&self) -> &[Vector<i32>] {
        &self.body_references.as_slice()[..self.bundle_count() * K::BODY_COUNT]
    }

    pub fn apply_description(&mut self, index: usize, description: &K::Description) {
        debug_assert!(index < self.constraint_count);
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        K::apply_description(description, self.prestep_data.get_mut(bundle_index), inner_index);
    }

    pub fn get_description(&self, index: usize) -> K::Description {
        debug_assert!(index < self.constraint_count);
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        K::build_description(self.prestep_data.get(bundle_index), inner_index)
    }

    unsafe fn generate_sort_keys_and_copy_references(
        &self,
        cache: &SortCache<K>,
        bundle_start: usize,
        local_bundle_start: usize,
        local_bundle_end: usize,
        constraint_count: usize,
    ) {
        let constraint_start = bundle_start * LANES;
        let local_end = (local_bundle_end * LANES).min(constraint_count);
        for local_index in local_bundle_start * LANES..local_end {
            let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(constraint_start + local_index);
            let sort_key = self
                .body_references_of(bundle_index)
                .iter()
                .map(|references| references[inner_index])
                .min()
                .unwrap_or(0);
            *cache.sort_keys.get_shared_mut(local_index) = sort_key;
            *cache.source_indices.get_shared_mut(local_index) = local_index as i32;
        }
        let count = (local_bundle_end - local_bundle_start) * K::BODY_COUNT;
        let source_start = (bundle_start + local_bundle_start) * K::BODY_COUNT;
        cache
            .body_references
            .slice_shared_mut(local_bundle_start * K::BODY_COUNT, count)
            .copy_from_slice(&self.body_references.as_slice()[source_start..source_start + count]);
    }

    unsafe fn copy_to_cache(&self, cache: &SortCache<K>, bundle_start: usize, local_bundle_start: usize, local_bundle_end: usize) {
        let count = local_bundle_end - local_bundle_start;
        let source_start = bundle_start + local_bundle_start;
        cache
            .prestep_data
            .slice_shared_mut(local_bundle_start, count)
            .copy_from_slice(&self.prestep_data.as_slice()[source_start..source_start + count]);
        cache
            .accumulated_impulses
            .slice_shared_mut(local_bundle_start, count)
            .copy_from_slice(&self.accumulated_impulses.as_slice()[source_start..source_start + count]);
        cache
            .index_to_handle
            .slice_shared_mut(local_bundle_start * LANES, count * LANES)
            .copy_from_slice(&self.index_to_handle.as_slice()[source_start * LANES..(source_start + count) * LANES]);
    }

    unsafe fn sort_keys(cache: &SortCache<K>, constraint_count: usize, keys_upper_bound: i32) {
        LsbRadixSort::sort(
            cache.sort_keys.slice_shared_mut(0, constraint_count),
            cache.source_indices.slice_shared_mut(0, constraint_count),
            cache.keys_scratch.slice_shared_mut(0, constraint_count),
            cache.indices_scratch.slice_shared_mut(0, constraint_count),
            keys_upper_bound,
        );
    }

    unsafe fn regather(
        &self,
        cache: &SortCache<K>,
        bundle_start: usize,
        local_bundle_start: usize,
        local_bundle_end: usize,
        constraint_count: usize,
    ) {
        let constraint_start = bundle_start * LANES;
        let local_end = (local_bundle_end * LANES).min(constraint_count);
        for local_index in local_bundle_start * LANES..local_end {
            let source_index = *cache.source_indices.get(local_index) as usize;
            let (source_bundle, source_inner) = BundleIndexing::get_bundle_indices(source_index);
            let (target_bundle, target_inner) = BundleIndexing::get_bundle_indices(constraint_start + local_index);
            for slot in 0..K::BODY_COUNT {
                (*self.body_references.get_shared_mut(target_bundle * K::BODY_COUNT + slot))[target_inner] =
                    cache.body_references.get(source_bundle * K::BODY_COUNT + slot)[source_inner];
            }
            GatherScatter::copy_lane(
                cache.prestep_data.get(source_bundle),
                source_inner,
                self.prestep_data.get_shared_mut(target_bundle),
                target_inner,
            );
            GatherScatter::copy_lane(
                cache.accumulated_impulses.get(source_bundle),
                source_inner,
                self.accumulated_impulses.get_shared_mut(target_bundle),
                target_inner,
            );
            *self.index_to_handle.get_shared_mut(constraint_start + local_index) = *cache.index_to_handle.get(source_index);
        }
    }
}

impl<K: ConstraintKernel> TypeBatch for ConstraintTypeBatch<K> {
    #[inline(always)]
    fn constraint_type_id(&self) -> i32 {
        self.type_id
    }

    #[inline(always)]
    fn bodies_per_constraint(&self) -> usize {
        K::BODY_COUNT
    }

    #[inline(always)]
    fn constraint_count(&self) -> usize {
        self.constraint_count
    }

    #[inline(always)]
    fn bundle_count(&self) -> usize {
        BundleIndexing::get_bundle_count(self.constraint_count)
    }

    #[inline(always)]
    fn capacity(&self) -> usize {
        self.index_to_handle.len()
    }

    #[inline(always)]
    fn index_to_handle(&self) -> &[ConstraintHandle] {
        &self.index_to_handle.as_slice()[..self.constraint_count]
    }

    fn allocate(&mut self, handle: ConstraintHandle, body_indices: &[i32]) -> usize {
        debug_assert_eq!(body_indices.len(), K::BODY_COUNT);
        if self.constraint_count == self.index_to_handle.len() {
            self.internal_resize((self.constraint_count * 2).max(LANES));
        }
        let index = self.constraint_count;
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        for (slot, &body_index) in body_indices.iter().enumerate() {
            self.body_references[bundle_index * K::BODY_COUNT + slot][inner_index] = body_index;
        }
        // Lanes beyond the count may hold garbage written by solves over partially filled bundles.
        GatherScatter::clear_lane(self.prestep_data.get_mut(bundle_index), inner_index);
        GatherScatter::clear_lane(self.accumulated_impulses.get_mut(bundle_index), inner_index);
        *self.index_to_handle.get_mut(index) = handle;
        self.constraint_count += 1;
        index
    }

    fn remove(&mut self, index: usize, handle_to_constraint: &mut [ConstraintLocation]) {
        debug_assert!(index < self.constraint_count, "Removed index must be allocated.");
        let last_index = self.constraint_count - 1;
        let (last_bundle, last_inner) = BundleIndexing::get_bundle_indices(last_index);
        if index < last_index {
            let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
            for slot in 0..K::BODY_COUNT {
                let moved = self.body_references[last_bundle * K::BODY_COUNT + slot][last_inner];
                self.body_references[bundle_index * K::BODY_COUNT + slot][inner_index] = moved;
            }
            GatherScatter::copy_lane_by_index(self.prestep_data.as_mut_slice(), last_index, index);
            GatherScatter::copy_lane_by_index(self.accumulated_impulses.as_mut_slice(), last_index, index);
            let moved_handle = self.index_to_handle[last_index];
            self.index_to_handle[index] = moved_handle;
            handle_to_constraint[moved_handle.0 as usize].index_in_type_batch = index as i32;
        }
        for slot in 0..K::BODY_COUNT {
            self.body_references[last_bundle * K::BODY_COUNT + slot][last_inner] = -1;
        }
        GatherScatter::clear_lane(self.prestep_data.get_mut(last_bundle), last_inner);
        GatherScatter::clear_lane(self.accumulated_impulses.get_mut(last_bundle), last_inner);
        self.index_to_handle[last_index] = ConstraintHandle(-1);
        self.constraint_count -= 1;
    }

    #[inline(always)]
    fn body_index(&self, index: usize, slot: usize) -> i32 {
        debug_assert!(index < self.constraint_count && slot < K::BODY_COUNT);
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        self.body_references[bundle_index * K::BODY_COUNT + slot][inner_index]
    }

    fn enumerate_connected_body_indices(&self, index: usize, visitor: &mut dyn FnMut(i32)) {
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        for references in self.body_references_of(bundle_index) {
            visitor(references[inner_index]);
        }
    }

    #[inline(always)]
    fn update_for_body_memory_move(&mut self, index: usize, body_index_in_constraint: usize, new_body_location: i32) {
        debug_assert!(index < self.constraint_count && body_index_in_constraint < K::BODY_COUNT);
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        self.body_references[bundle_index * K::BODY_COUNT + body_index_in_constraint][inner_index] = new_body_location;
    }

    fn transfer_constraint(&self, source_index: usize, target: &mut dyn TypeBatch, target_index: usize) {
        let Some(target) = target.as_any_mut().downcast_mut::<Self>() else {
            debug_assert!(false, "Constraints can only move between type batches of the same type.");
            return;
        };
        let (source_bundle, source_inner) = BundleIndexing::get_bundle_indices(source_index);
        let (target_bundle, target_inner) = BundleIndexing::get_bundle_indices(target_index);
        for slot in 0..K::BODY_COUNT {
            target.body_references[target_bundle * K::BODY_COUNT + slot][target_inner] =
                self.body_references[source_bundle * K::BODY_COUNT + slot][source_inner];
        }
        GatherScatter::copy_lane(
            self.prestep_data.get(source_bundle),
            source_inner,
            target.prestep_data.get_mut(target_bundle),
            target_inner,
        );
        GatherScatter::copy_lane(
            self.accumulated_impulses.get(source_bundle),
            source_inner,
            target.accumulated_impulses.get_mut(target_bundle),
            target_inner,
        );
    }

    fn sort_by_body_location(
        &mut self,
        bundle_start: usize,
        constraint_count: usize,
        handle_to_constraint: &mut [ConstraintLocation],
        body_count: usize,
        dispatcher: Option<&dyn ThreadDispatcher>,
    ) {
        if constraint_count == 0 {
            return;
        }
        let constraint_start = bundle_start * LANES;
        debug_assert!(
            constraint_start + constraint_count <= self.constraint_count,
            "Sorted region must lie within the allocated constraints."
        );
        let bundle_count = BundleIndexing::get_bundle_count(constraint_count);
        let keys_upper_bound = body_count.min(i32::MAX as usize) as i32;
        let cache = SortCache::<K>::new(constraint_count, bundle_count);
        let worker_count = dispatcher.map_or(1, |dispatcher| dispatcher.thread_count().min(bundle_count));
        let this = &*self;
        match dispatcher {
            Some(dispatcher) if worker_count > 1 => {
                let keys_generated = AtomicUsize::new(0);
                let sorted = AtomicUsize::new(0);
                let worker = |worker_index: usize| {
                    let (start, end) = worker_range(bundle_count, worker_count, worker_index);
                    unsafe {
                        this.generate_sort_keys_and_copy_references(&cache, bundle_start, start, end, constraint_count);
                        complete_phase(&keys_generated, worker_count);
                        if worker_index == 0 {
                            Self::sort_keys(&cache, constraint_count, keys_upper_bound);
                        } else {
                            let (copy_start, copy_end) = worker_range(bundle_count, worker_count - 1, worker_index - 1);
                            this.copy_to_cache(&cache, bundle_start, copy_start, copy_end);
                        }
                        complete_phase(&sorted, worker_count);
                        this.regather(&cache, bundle_start, start, end, constraint_count);
                    }
                };
                dispatcher.dispatch_workers(&worker, worker_count);
            }
            _ => unsafe {
                this.generate_sort_keys_and_copy_references(&cache, bundle_start, 0, bundle_count, constraint_count);
                Self::sort_keys(&cache, constraint_count, keys_upper_bound);
                this.copy_to_cache(&cache, bundle_start, 0, bundle_count);
                this.regather(&cache, bundle_start, 0, bundle_count, constraint_count);
            },
        }
        for index in constraint_start..constraint_start + constraint_count {
            let handle = self.index_to_handle[index];
            handle_to_constraint[handle.0 as usize].index_in_type_batch = index as i32;
        }
    }

    fn resize(&mut self, capacity: usize) {
        self.internal_resize(capacity.max(LANES));
    }

    fn scale_accumulated_impulses(&mut self, scale: f32) {
        let bundle_count = self.bundle_count();
        for impulses in &mut self.accumulated_impulses.as_mut_slice()[..bundle_count] {
            for lane in unsafe { GatherScatter::as_f32_lanes_mut(impulses) } {
                *lane *= scale;
            }
        }
    }

    fn accumulated_impulses(&self, index: usize) -> Vec<f32> {
        debug_assert!(index < self.constraint_count);
        let (bundle_index, inner_index) = BundleIndexing::get_bundle_indices(index);
        unsafe { GatherScatter::read_f32_lane(self.accumulated_impulses.get(bundle_index), inner_index) }
    }

    unsafe fn prestep(&self, bodies: &Bodies, dt: f32, inverse_dt: f32, start_bundle: usize, end_bundle: usize) {
        let mut inertias = [BodyInertiaWide::default(); MAXIMUM_BODIES_PER_CONSTRAINT];
        for bundle_index in start_bundle..end_bundle {
            for (slot, references) in self.body_references_of(bundle_index).iter().enumerate() {
                inertias[slot] = bodies.gather_inertias(references);
            }
            K::prestep(
                &inertias[..K::BODY_COUNT],
                self.prestep_data.get(bundle_index),
                dt,
                inverse_dt,
                self.projection.get_shared_mut(bundle_index),
            );
        }
    }

    unsafe fn warm_start(&self, bodies: &Bodies, start_bundle: usize, end_bundle: usize) {
        let mut velocities = [BodyVelocityWide::default(); MAXIMUM_BODIES_PER_CONSTRAINT];
        for bundle_index in start_bundle..end_bundle {
            let references = self.body_references_of(bundle_index);
            for (slot, slot_references) in references.iter().enumerate() {
                velocities[slot] = bodies.gather_velocities(slot_references);
            }
            K::warm_start(
                self.projection.get(bundle_index),
                self.accumulated_impulses.get(bundle_index),
                &mut velocities[..K::BODY_COUNT],
            );
            for (slot, slot_references) in references.iter().enumerate() {
                bodies.scatter_velocities(slot_references, &velocities[slot]);
            }
        }
    }

    unsafe fn solve_iteration(&self, bodies: &Bodies, start_bundle: usize, end_bundle: usize) {
        let mut velocities = [BodyVelocityWide::default(); MAXIMUM_BODIES_PER_CONSTRAINT];
        for bundle_index in start_bundle..end_bundle {
            let references = self.body_references_of(bundle_index);
            for (slot, slot_references) in references.iter().enumerate() {
                velocities[slot] = bodies.gather_velocities(slot_references);
            }
            K::solve(
                self.projection.get(bundle_index),
                self.accumulated_impulses.get_shared_mut(bundle_index),
                &mut velocities[..K::BODY_COUNT],
            );
            for (slot, slot_references) in references.iter().enumerate() {
                bodies.scatter_velocities(slot_references, &velocities[slot]);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::constraints::contact::penetration_limit::{PenetrationLimit, PenetrationLimitKernel};
    use crate::physics::constraints::spring_settings::SpringSettings;
    use crate::utilities::thread_dispatcher::SimpleThreadDispatcher;
    use glam::Vec3;

    fn description(depth: f32) -> PenetrationLimit {
        PenetrationLimit {
            offset_a: Vec3::ZERO,
            offset_b: Vec3::ZERO,
            normal: Vec3::Y,
            penetration_depth: depth,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        }
    }

    fn filled_batch(count: usize) -> (ConstraintTypeBatch<PenetrationLimitKernel>, Vec<ConstraintLocation>) {
        let mut batch = ConstraintTypeBatch::<PenetrationLimitKernel>::new(0, 4);
        let mut locations = vec![ConstraintLocation::default(); count];
        for i in 0..count {
            // Descending body indices so sorting has work to do.
            let body = (2 * (count - i)) as i32;
            let index = batch.allocate(ConstraintHandle(i as i32), &[body, body + 1]);
            batch.apply_description(index, &description(i as f32));
            locations[i] = ConstraintLocation {
                batch_index: 0,
                type_id: 0,
                index_in_type_batch: index as i32,
            };
        }
        (batch, locations)
    }

    fn assert_consistent(batch: &ConstraintTypeBatch<PenetrationLimitKernel>, locations: &[ConstraintLocation]) {
        for (index, handle) in batch.index_to_handle().iter().enumerate() {
            let location = locations[handle.0 as usize];
            assert_eq!(location.index_in_type_batch as usize, index);
            // Depth was set to the handle value and body A to a handle derived value.
            assert_eq!(batch.get_description(index).penetration_depth, handle.0 as f32);
            let count = locations.len();
            assert_eq!(batch.body_index(index, 0), (2 * (count - handle.0 as usize)) as i32);
        }
    }

    #[test]
    fn allocate_grows_and_remove_swaps_last() {
        let (mut batch, mut locations) = filled_batch(20);
        assert!(batch.capacity() >= 20);
        assert_eq!(batch.bundle_count(), 3);
        batch.remove(3, &mut locations);
        assert_eq!(batch.constraint_count(), 19);
        assert_eq!(batch.index_to_handle()[3], ConstraintHandle(19));
        assert_eq!(locations[19].index_in_type_batch, 3);
        // Vacated lane is reset.
        let (bundle, inner) = BundleIndexing::get_bundle_indices(19);
        assert_eq!(batch.body_references()[bundle * 2][inner], -1);
        assert!(batch.accumulated_impulses.get(bundle)[inner] == 0.0);
    }

    #[test]
    fn sort_orders_by_lowest_body_index() {
        let (mut batch, mut locations) = filled_batch(37);
        let count = batch.constraint_count();
        batch.sort_by_body_location(0, count, &mut locations, 100, None);
        for i in 1..count {
            assert!(batch.body_index(i - 1, 0) <= batch.body_index(i, 0));
        }
        assert_consistent(&batch, &locations);
    }

    #[test]
    fn multithreaded_sort_matches_single_threaded() {
        let (mut single, mut single_locations) = filled_batch(101);
        let (mut multi, mut multi_locations) = filled_batch(101);
        let dispatcher = SimpleThreadDispatcher::new(4);
        single.sort_by_body_location(1, 60, &mut single_locations, 300, None);
        multi.sort_by_body_location(1, 60, &mut multi_locations, 300, Some(&dispatcher));
        assert_eq!(single.index_to_handle(), multi.index_to_handle());
        assert_consistent(&multi, &multi_locations);
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Anchor {
        target: f32,
    }

    impl ConstraintDescription for Anchor {
        type Kernel = AnchorKernel;
    }

    struct AnchorKernel;

    impl ConstraintKernel for AnchorKernel {
        const BODY_COUNT: usize = 1;

        type Description = Anchor;
        type PrestepData = Vector<f32>;
        type Projection = Vector<f32>;
        type AccumulatedImpulse = Vector<f32>;

        fn apply_description(description: &Anchor, prestep: &mut Vector<f32>, inner_index: usize) {
            prestep[inner_index] = description.target;
        }

        fn build_description(prestep: &Vector<f32>, inner_index: usize) -> Anchor {
            Anchor {
                target: prestep[inner_index],
            }
        }

        fn prestep(_: &[BodyInertiaWide], prestep: &Vector<f32>, _: f32, _: f32, projection: &mut Vector<f32>) {
            *projection = *prestep;
        }

        fn warm_start(_: &Vector<f32>, _: &Vector<f32>, _: &mut [BodyVelocityWide]) {}

        fn solve(_: &Vector<f32>, _: &mut Vector<f32>, _: &mut [BodyVelocityWide]) {}
    }

    fn filled_anchor_batch(count: usize) -> (ConstraintTypeBatch<AnchorKernel>, Vec<ConstraintLocation>) {
        let mut batch = ConstraintTypeBatch::<AnchorKernel>::new(1, 4);
        let mut locations = vec![ConstraintLocation::default(); count];
        for i in 0..count {
            let index = batch.allocate(ConstraintHandle(i as i32), &[(3 * (count - i)) as i32]);
            batch.apply_description(index, &Anchor { target: i as f32 });
            locations[i] = ConstraintLocation {
                batch_index: 0,
                type_id: 1,
                index_in_type_batch: index as i32,
            };
        }
        (batch, locations)
    }

    #[test]
    fn one_body_constraints_sort_by_their_only_body() {
        let dispatcher = SimpleThreadDispatcher::new(3);
        for dispatcher in [None, Some(&dispatcher as &dyn ThreadDispatcher)] {
            let (mut batch, mut locations) = filled_anchor_batch(29);
            batch.sort_by_body_location(0, 29, &mut locations, 100, dispatcher);
            for i in 1..29 {
                assert!(batch.body_index(i - 1, 0) < batch.body_index(i, 0));
            }
            for (index, handle) in batch.index_to_handle().iter().enumerate() {
                assert_eq!(locations[handle.0 as usize].index_in_type_batch as usize, index);
                assert_eq!(batch.get_description(index).target, handle.0 as f32);
                assert_eq!(batch.body_index(index, 0), (3 * (29 - handle.0 as usize)) as i32);
            }
        }
    }

    #[test]
    fn transfer_copies_lane_data() {
        let (source, _) = filled_batch(10);
        let mut target = ConstraintTypeBatch::<PenetrationLimitKernel>::new(0, 8);
        let target_index = target.allocate(ConstraintHandle(5), &[source.body_index(5, 0), source.body_index(5, 1)]);
        source.transfer_constraint(5, &mut target, target_index);
        assert_eq!(target.get_description(target_index).penetration_depth, 5.0);
    }

    #[test]
    fn scale_accumulated_impulses_scales_every_lane() {
        let (mut batch, _) = filled_batch(3);
        batch.accumulated_impulses.get_mut(0)[1] = 4.0;
        batch.scale_accumulated_impulses(0.5);
        assert_eq!(TypeBatch::accumulated_impulses(&batch, 1), vec![2.0]);
    }
}
