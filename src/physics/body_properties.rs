use glam::{Mat3, Vec3};

use crate::utilities::gather_scatter::Bundle;
use crate::utilities::symmetric3x3_wide::Symmetric3x3Wide;
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Linear and angular velocity of a body.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyVelocity {
    /// Linear velocity associated with the body.
    pub linear: Vec3,
    /// Angular velocity associated with the body.
    pub angular: Vec3,
}

impl BodyVelocity {
    #[inline(always)]
    pub fn new(linear: Vec3, angular: Vec3) -> Self {
        Self { linear, angular }
    }

    #[inline(always)]
    pub fn from_linear(linear: Vec3) -> Self {
        Self {
            linear,
            angular: Vec3::ZERO,
        }
    }
}

/// Stores the inertia of a body in inverse form. A zero inverse mass and tensor make the body unmovable by constraints.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyInertia {
    /// Inverse of the body's inertia tensor. Expected to be symmetric.
    pub inverse_inertia_tensor: Mat3,
    /// Inverse of the body's mass.
    pub inverse_mass: f32,
}

impl Default for BodyInertia {
    fn default() -> Self {
        Self {
            inverse_inertia_tensor: Mat3::ZERO,
            inverse_mass: 0.0,
        }
    }
}

impl BodyInertia {
    #[inline(always)]
    pub fn new(inverse_mass: f32, inverse_inertia_tensor: Mat3) -> Self {
        Self {
            inverse_inertia_tensor,
            inverse_mass,
        }
    }

    /// Inertia of a solid sphere of the given mass and radius.
    pub fn sphere(mass: f32, radius: f32) -> Self {
        let inverse_inertia = 1.0 / (mass * radius * radius * (2.0 / 5.0));
        Self {
            inverse_inertia_tensor: Mat3::from_diagonal(Vec3::splat(inverse_inertia)),
            inverse_mass: 1.0 / mass,
        }
    }

    /// Whether the body is unaffected by constraint impulses.
    #[inline(always)]
    pub fn is_kinematic(&self) -> bool {
        self.inverse_mass == 0.0 && self.inverse_inertia_tensor == Mat3::ZERO
    }
}

/// Bundle of body velocities, one body per lane.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyVelocityWide {
    pub linear: Vector3Wide,
    pub angular: Vector3Wide,
}

/// Bundle of body inertias, one body per lane.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyInertiaWide {
    pub inverse_inertia_tensor: Symmetric3x3Wide,
    pub inverse_mass: Vector<f32>,
}

unsafe impl Bundle for BodyVelocityWide {}
unsafe impl Bundle for BodyInertiaWide {}
