use std::fmt;
use std::ops::{
    Add, AddAssign, BitAnd, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

use bytemuck::Pod;
use wide::{f32x8, i32x8, CmpGt};

/// Number of lanes in every `Vector`. Bundles of constraints and bodies are this wide.
pub const LANES: usize = std::mem::size_of::<f32x8>() / std::mem::size_of::<f32>();

/// Scalar types that have a SIMD register type of width `LANES`.
pub trait SimdLane: Pod + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    type Wide: Pod + Send + Sync + 'static;

    fn splat_wide(value: Self) -> Self::Wide;
}

impl SimdLane for f32 {
    type Wide = f32x8;

    #[inline(always)]
    fn splat_wide(value: f32) -> f32x8 {
        f32x8::splat(value)
    }
}

impl SimdLane for i32 {
    type Wide = i32x8;

    #[inline(always)]
    fn splat_wide(value: i32) -> i32x8 {
        i32x8::splat(value)
    }
}

/// Lane vector used for all AOSOA bundle math. A thin wrapper over the `wide` register type of its scalar.
#[repr(transparent)]
pub struct Vector<T: SimdLane = f32>(pub T::Wide);

impl<T: SimdLane> Clone for Vector<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SimdLane> Copy for Vector<T> {}

impl<T: SimdLane> Default for Vector<T> {
    #[inline(always)]
    fn default() -> Self {
        Self(bytemuck::Zeroable::zeroed())
    }
}

impl<T: SimdLane> PartialEq for Vector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_array() == other.as_array()
    }
}

impl<T: SimdLane> fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Vector").field(self.as_array()).finish()
    }
}

impl<T: SimdLane> Vector<T> {
    /// Number of lanes in the vector.
    pub const LEN: usize = LANES;

    /// Creates a vector with every lane set to the given value.
    #[inline(always)]
    pub fn splat(value: T) -> Self {
        Self(T::splat_wide(value))
    }

    #[inline(always)]
    pub fn from_array(lanes: [T; LANES]) -> Self {
        Self(bytemuck::cast(lanes))
    }

    #[inline(always)]
    pub fn to_array(self) -> [T; LANES] {
        bytemuck::cast(self.0)
    }

    #[inline(always)]
    pub fn as_array(&self) -> &[T; LANES] {
        bytemuck::cast_ref(&self.0)
    }

    #[inline(always)]
    pub fn as_array_mut(&mut self) -> &mut [T; LANES] {
        bytemuck::cast_mut(&mut self.0)
    }
}

impl<T: SimdLane> Index<usize> for Vector<T> {
    type Output = T;

    #[inline(always)]
    fn index(&self, lane: usize) -> &T {
        &self.as_array()[lane]
    }
}

impl<T: SimdLane> IndexMut<usize> for Vector<T> {
    #[inline(always)]
    fn index_mut(&mut self, lane: usize) -> &mut T {
        &mut self.as_array_mut()[lane]
    }
}

macro_rules! impl_wide_op {
    ($scalar:ty, $op_trait:ident, $op_fn:ident, $assign_trait:ident, $assign_fn:ident) => {
        impl $op_trait for Vector<$scalar> {
            type Output = Self;

            #[inline(always)]
            fn $op_fn(self, rhs: Self) -> Self {
                Self($op_trait::$op_fn(self.0, rhs.0))
            }
        }

        impl $assign_trait for Vector<$scalar> {
            #[inline(always)]
            fn $assign_fn(&mut self, rhs: Self) {
                self.0 = $op_trait::$op_fn(self.0, rhs.0);
            }
        }
    };
}

impl_wide_op!(f32, Add, add, AddAssign, add_assign);
impl_wide_op!(f32, Sub, sub, SubAssign, sub_assign);
impl_wide_op!(f32, Mul, mul, MulAssign, mul_assign);
impl_wide_op!(f32, Div, div, DivAssign, div_assign);
impl_wide_op!(i32, Add, add, AddAssign, add_assign);
impl_wide_op!(i32, Sub, sub, SubAssign, sub_assign);

impl BitAnd for Vector<i32> {
    type Output = Self;

    #[inline(always)]
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Mul<f32> for Vector<f32> {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: f32) -> Self {
        Self(self.0 * f32x8::splat(rhs))
    }
}

impl Neg for Vector<f32> {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Vector<f32> {
    #[inline(always)]
    pub fn zero() -> Self {
        Self::splat(0.0)
    }

    #[inline(always)]
    pub fn one() -> Self {
        Self::splat(1.0)
    }

    /// Lanewise maximum.
    #[inline(always)]
    pub fn max(self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }

    /// Lanewise minimum.
    #[inline(always)]
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Picks lanes from `if_true` where `condition` is positive, `if_false` elsewhere.
    #[inline(always)]
    pub fn select_positive(condition: Self, if_true: Self, if_false: Self) -> Self {
        let mask = condition.0.cmp_gt(f32x8::splat(0.0));
        Self(mask.blend(if_true.0, if_false.0))
    }

    /// Sum of all lanes.
    #[inline(always)]
    pub fn horizontal_sum(self) -> f32 {
        self.as_array().iter().sum()
    }
}

impl Vector<i32> {
    /// Lane indices `0, 1, .., LANES - 1`.
    #[inline(always)]
    pub fn lane_indices() -> Self {
        Self::from_array(std::array::from_fn(|i| i as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lanewise_arithmetic() {
        let a = Vector::<f32>::from_array([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = Vector::<f32>::splat(2.0);
        assert_eq!((a * b)[3], 8.0);
        assert_eq!((a - b)[0], -1.0);
        assert_eq!((a / b)[7], 4.0);
        assert_eq!((-a)[1], -2.0);
        assert_eq!(a.horizontal_sum(), 36.0);
    }

    #[test]
    fn select_and_clamp() {
        let a = Vector::<f32>::from_array([-1.0, 2.0, -3.0, 4.0, 0.0, 6.0, -7.0, 8.0]);
        let clamped = a.max(Vector::zero());
        assert_eq!(clamped.to_array(), [0.0, 2.0, 0.0, 4.0, 0.0, 6.0, 0.0, 8.0]);
        let selected = Vector::select_positive(a, Vector::one(), Vector::zero());
        assert_eq!(selected.to_array(), [0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn lane_writes_are_visible_to_wide_ops() {
        let mut indices = Vector::<i32>::splat(-1);
        indices[4] = 9;
        let sum = indices + Vector::lane_indices();
        assert_eq!(sum.to_array(), [-1, 0, 1, 2, 13, 4, 5, 6]);
        assert_eq!((sum & Vector::splat(1))[4], 1);
    }

    #[test]
    fn vectors_are_bundle_aligned() {
        assert_eq!(LANES, 8);
        assert_eq!(std::mem::align_of::<Vector<f32>>(), 32);
        assert_eq!(std::mem::size_of::<Vector<i32>>(), 32);
    }
}
