use crate::utilities::bundle_indexing::BundleIndexing;
use crate::utilities::symmetric3x3_wide::Symmetric3x3Wide;
use crate::utilities::vector::{Vector, LANES};
use crate::utilities::vector3_wide::Vector3Wide;
use std::mem::size_of;

/// Marks a type as a bundle: a `#[repr(C)]` struct made only of `Vector<f32>` and `Vector<i32>` fields
/// (directly or through other bundles), so that lane `i` of every field sits `LANES` 4-byte slots apart.
///
/// # Safety
/// Implementors must have exactly that layout. Lane accessors below reinterpret the memory as 4-byte slots.
pub unsafe trait Bundle: Copy + Default + Send + Sync + 'static {}

unsafe impl Bundle for Vector<f32> {}
unsafe impl Bundle for Vector<i32> {}
unsafe impl Bundle for Vector3Wide {}
unsafe impl Bundle for Symmetric3x3Wide {}

pub struct GatherScatter;

impl GatherScatter {
    #[inline(always)]
    fn vector_count<T: Bundle>() -> usize {
        debug_assert!(
            size_of::<T>() % size_of::<Vector<f32>>() == 0,
            "Bundles must be composed of whole lane vectors."
        );
        size_of::<T>() / size_of::<Vector<f32>>()
    }

    /// Copies one lane of a bundle into one lane of another bundle of the same type.
    #[inline(always)]
    pub fn copy_lane<T: Bundle>(
        source_bundle: &T,
        source_inner_index: usize,
        target_bundle: &mut T,
        target_inner_index: usize,
    ) {
        debug_assert!(source_inner_index < LANES && target_inner_index < LANES);
        let vector_count = Self::vector_count::<T>();
        let source_base = source_bundle as *const T as *const u32;
        let target_base = target_bundle as *mut T as *mut u32;
        for i in 0..vector_count {
            // Safety: both pointers cover `vector_count * LANES` 4-byte slots per the Bundle contract.
            unsafe {
                *target_base.add(i * LANES + target_inner_index) =
                    *source_base.add(i * LANES + source_inner_index);
            }
        }
    }

    /// Zeroes every field of one lane.
    #[inline(always)]
    pub fn clear_lane<T: Bundle>(bundle: &mut T, inner_index: usize) {
        debug_assert!(inner_index < LANES);
        let vector_count = Self::vector_count::<T>();
        let base = bundle as *mut T as *mut u32;
        for i in 0..vector_count {
            unsafe {
                *base.add(i * LANES + inner_index) = 0;
            }
        }
    }

    /// Views a bundle made only of `Vector<f32>` fields as a flat slice of lanes, field after field.
    ///
    /// # Safety
    /// Every field of `T` must be `f32` lanes. Bundles holding `Vector<i32>` fields would be reinterpreted.
    #[inline(always)]
    pub unsafe fn as_f32_lanes_mut<T: Bundle>(bundle: &mut T) -> &mut [f32] {
        std::slice::from_raw_parts_mut(
            bundle as *mut T as *mut f32,
            Self::vector_count::<T>() * LANES,
        )
    }

    /// Reads every field of one lane of an `f32`-only bundle.
    ///
    /// # Safety
    /// Same contract as [`GatherScatter::as_f32_lanes_mut`].
    #[inline(always)]
    pub unsafe fn read_f32_lane<T: Bundle>(bundle: &T, inner_index: usize) -> Vec<f32> {
        let base = bundle as *const T as *const f32;
        (0..Self::vector_count::<T>())
            .map(|i| *base.add(i * LANES + inner_index))
            .collect()
    }

    /// Copies a lane between two flat-indexed positions of a bundle array.
    #[inline(always)]
    pub fn copy_lane_by_index<T: Bundle>(bundles: &mut [T], source_index: usize, target_index: usize) {
        let (source_bundle, source_inner) = BundleIndexing::get_bundle_indices(source_index);
        let (target_bundle, target_inner) = BundleIndexing::get_bundle_indices(target_index);
        if source_bundle == target_bundle {
            let mut scratch = bundles[source_bundle];
            Self::copy_lane(&bundles[source_bundle], source_inner, &mut scratch, target_inner);
            bundles[target_bundle] = scratch;
        } else {
            let source = bundles[source_bundle];
            Self::copy_lane(&source, source_inner, &mut bundles[target_bundle], target_inner);
        }
    }
}
