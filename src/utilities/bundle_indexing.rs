use crate::utilities::vector::{Vector, LANES};

pub const VECTOR_MASK: usize = LANES - 1;

/// Some helpers for indexing into vector bundles.
pub struct BundleIndexing;

impl BundleIndexing {
    /// Gets the mask value such that x & VECTOR_MASK computes x % LANES.
    #[inline(always)]
    pub const fn vector_mask() -> usize {
        VECTOR_MASK
    }

    /// Gets the shift value such that x >> VECTOR_SHIFT divides x by LANES.
    #[inline(always)]
    pub const fn vector_shift() -> usize {
        LANES.trailing_zeros() as usize
    }

    /// Splits a flat index into its bundle index and the lane within that bundle.
    #[inline(always)]
    pub fn get_bundle_indices(linear_index: usize) -> (usize, usize) {
        (
            linear_index >> Self::vector_shift(),
            linear_index & Self::vector_mask(),
        )
    }

    /// Rebuilds a flat index from a bundle index and a lane.
    #[inline(always)]
    pub fn get_linear_index(bundle_index: usize, index_in_bundle: usize) -> usize {
        (bundle_index << Self::vector_shift()) | index_in_bundle
    }

    #[inline(always)]
    pub fn get_bundle_count(element_count: usize) -> usize {
        (element_count + Self::vector_mask()) >> Self::vector_shift()
    }

    /// Number of occupied lanes in the given bundle of a collection holding `element_count` elements.
    #[inline(always)]
    pub fn get_count_in_bundle(bundle_index: usize, element_count: usize) -> usize {
        let bundle_start = bundle_index << Self::vector_shift();
        element_count.saturating_sub(bundle_start).min(LANES)
    }

    /// Creates a mask where lanes < count_in_bundle are set to -1 (all bits set).
    #[inline(always)]
    pub fn create_mask_for_count_in_bundle(count_in_bundle: usize) -> Vector<i32> {
        Vector::from_array(std::array::from_fn(|i| if i < count_in_bundle { -1 } else { 0 }))
    }

    /// Creates a mask where lanes >= count_in_bundle are set to -1 (all bits set).
    #[inline(always)]
    pub fn create_trailing_mask_for_count_in_bundle(count_in_bundle: usize) -> Vector<i32> {
        Vector::from_array(std::array::from_fn(|i| if i >= count_in_bundle { -1 } else { 0 }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_indices_round_trip() {
        for i in 0..1000usize {
            let (bundle, inner) = BundleIndexing::get_bundle_indices(i);
            assert!(inner < LANES);
            assert_eq!((bundle << BundleIndexing::vector_shift()) | inner, i);
            assert_eq!(BundleIndexing::get_linear_index(bundle, inner), i);
        }
    }

    #[test]
    fn bundle_counts() {
        assert_eq!(BundleIndexing::get_bundle_count(0), 0);
        assert_eq!(BundleIndexing::get_bundle_count(1), 1);
        assert_eq!(BundleIndexing::get_bundle_count(LANES), 1);
        assert_eq!(BundleIndexing::get_bundle_count(LANES + 1), 2);
        assert_eq!(BundleIndexing::get_count_in_bundle(1, LANES + 3), 3);
        assert_eq!(BundleIndexing::get_count_in_bundle(0, LANES + 3), LANES);
    }

    #[test]
    fn masks() {
        let mask = BundleIndexing::create_mask_for_count_in_bundle(3);
        assert_eq!(mask[2], -1);
        assert_eq!(mask[3], 0);
        let trailing = BundleIndexing::create_trailing_mask_for_count_in_bundle(3);
        assert_eq!(trailing[2], 0);
        assert_eq!(trailing[3], -1);
    }
}
