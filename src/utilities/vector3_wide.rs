use crate::utilities::vector::Vector;
use glam::Vec3;
use std::ops::{Add, Neg, Sub};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
/// Three dimensional vector with SIMD lanes.
pub struct Vector3Wide {
    /// First component of the vector.
    pub x: Vector,
    /// Second component of the vector.
    pub y: Vector,
    /// Third component of the vector.
    pub z: Vector,
}

impl Vector3Wide {
    /// Creates a vector by populating each component with the given scalars.
    #[inline(always)]
    pub fn new(s: Vector) -> Self {
        Self { x: s, y: s, z: s }
    }

    /// Creates a vector whose every lane holds the given scalar vector.
    #[inline(always)]
    pub fn broadcast(source: Vec3) -> Self {
        Self {
            x: Vector::splat(source.x),
            y: Vector::splat(source.y),
            z: Vector::splat(source.z),
        }
    }

    /// Computes the per-lane dot product of two vectors.
    #[inline(always)]
    pub fn dot(a: &Self, b: &Self) -> Vector {
        a.x * b.x + a.y * b.y + a.z * b.z
    }

    /// Scales every component of the vector by a per-lane scalar.
    #[inline(always)]
    pub fn scale(v: &Self, s: Vector) -> Self {
        Self {
            x: v.x * s,
            y: v.y * s,
            z: v.z * s,
        }
    }

    /// Computes the per-lane cross product. The result does not alias either input.
    #[inline(always)]
    pub fn cross(a: &Self, b: &Self) -> Self {
        Self {
            x: a.y * b.z - a.z * b.y,
            y: a.z * b.x - a.x * b.z,
            z: a.x * b.y - a.y * b.x,
        }
    }

    #[inline(always)]
    pub fn length_squared(v: &Self) -> Vector {
        Self::dot(v, v)
    }

    /// Pulls one lane out as a scalar vector.
    #[inline(always)]
    pub fn read_slot(&self, lane: usize) -> Vec3 {
        Vec3::new(self.x[lane], self.y[lane], self.z[lane])
    }

    /// Writes a scalar vector into one lane.
    #[inline(always)]
    pub fn write_slot(&mut self, source: Vec3, lane: usize) {
        self.x[lane] = source.x;
        self.y[lane] = source.y;
        self.z[lane] = source.z;
    }
}

impl Add for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl Neg for Vector3Wide {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}
