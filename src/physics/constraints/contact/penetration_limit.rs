use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::physics::body_properties::{BodyInertiaWide, BodyVelocityWide};
use crate::physics::constraints::constraint_description::ConstraintDescription;
use crate::physics::constraints::spring_settings::{SpringSettings, SpringSettingsWide};
use crate::physics::constraints::type_processor::ConstraintKernel;
use crate::utilities::gather_scatter::Bundle;
use crate::utilities::symmetric3x3_wide::Symmetric3x3Wide;
use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;

/// Single contact point keeping two bodies from approaching along a normal.
///
/// The normal points from B to A. Positive depth means the bodies overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenetrationLimit {
    /// Offset from the center of body A to the contact point.
    pub offset_a: Vec3,
    /// Offset from the center of body B to the contact point.
    pub offset_b: Vec3,
    pub normal: Vec3,
    pub penetration_depth: f32,
    pub spring_settings: SpringSettings,
    /// Largest velocity the constraint may use to push overlapping bodies apart.
    pub maximum_recovery_velocity: f32,
}

impl Default for PenetrationLimit {
    fn default() -> Self {
        Self {
            offset_a: Vec3::ZERO,
            offset_b: Vec3::ZERO,
            normal: Vec3::Y,
            penetration_depth: 0.0,
            spring_settings: SpringSettings::new(30.0, 1.0),
            maximum_recovery_velocity: 2.0,
        }
    }
}

impl ConstraintDescription for PenetrationLimit {
    type Kernel = PenetrationLimitKernel;
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PenetrationLimitPrestepData {
    pub offset_a: Vector3Wide,
    pub offset_b: Vector3Wide,
    pub normal: Vector3Wide,
    pub penetration_depth: Vector<f32>,
    pub spring_settings: SpringSettingsWide,
    pub maximum_recovery_velocity: Vector<f32>,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct PenetrationLimitProjection {
    pub normal: Vector3Wide,
    pub angular_jacobian_a: Vector3Wide,
    pub angular_jacobian_b: Vector3Wide,
    /// Jacobians premultiplied by inverse inertia; maps a constraint space impulse to a world space velocity change.
    pub csi_to_wsv_linear_a: Vector3Wide,
    pub csi_to_wsv_angular_a: Vector3Wide,
    pub csi_to_wsv_linear_b: Vector3Wide,
    pub csi_to_wsv_angular_b: Vector3Wide,
    pub effective_mass: Vector<f32>,
    pub bias_velocity: Vector<f32>,
    pub softness_impulse_scale: Vector<f32>,
}

unsafe impl Bundle for PenetrationLimitPrestepData {}
unsafe impl Bundle for PenetrationLimitProjection {}

pub struct PenetrationLimitKernel;

impl PenetrationLimitKernel {
    #[inline(always)]
    fn apply_impulse(projection: &PenetrationLimitProjection, csi: Vector<f32>, velocities: &mut [BodyVelocityWide]) {
        let (a, b) = velocities.split_at_mut(1);
        let (a, b) = (&mut a[0], &mut b[0]);
        a.linear = a.linear + Vector3Wide::scale(&projection.csi_to_wsv_linear_a, csi);
        a.angular = a.angular + Vector3Wide::scale(&projection.csi_to_wsv_angular_a, csi);
        b.linear = b.linear + Vector3Wide::scale(&projection.csi_to_wsv_linear_b, csi);
        b.angular = b.angular + Vector3Wide::scale(&projection.csi_to_wsv_angular_b, csi);
    }
}

impl ConstraintKernel for PenetrationLimitKernel {
    const BODY_COUNT: usize = 2;

    type Description = PenetrationLimit;
    type PrestepData = PenetrationLimitPrestepData;
    type Projection = PenetrationLimitProjection;
    type AccumulatedImpulse = Vector<f32>;

    fn apply_description(description: &PenetrationLimit, prestep: &mut PenetrationLimitPrestepData, inner_index: usize) {
        prestep.offset_a.write_slot(description.offset_a, inner_index);
        prestep.offset_b.write_slot(description.offset_b, inner_index);
        prestep.normal.write_slot(description.normal, inner_index);
        prestep.penetration_depth[inner_index] = description.penetration_depth;
        prestep.spring_settings.write_slot(&description.spring_settings, inner_index);
        prestep.maximum_recovery_velocity[inner_index] = description.maximum_recovery_velocity;
    }

    fn build_description(prestep: &PenetrationLimitPrestepData, inner_index: usize) -> PenetrationLimit {
        PenetrationLimit {
            offset_a: prestep.offset_a.read_slot(inner_index),
            offset_b: prestep.offset_b.read_slot(inner_index),
            normal: prestep.normal.read_slot(inner_index),
            penetration_depth: prestep.penetration_depth[inner_index],
            spring_settings: prestep.spring_settings.read_slot(inner_index),
            maximum_recovery_velocity: prestep.maximum_recovery_velocity[inner_index],
        }
    }

    fn prestep(
        inertias: &[BodyInertiaWide],
        prestep: &PenetrationLimitPrestepData,
        dt: f32,
        inverse_dt: f32,
        projection: &mut PenetrationLimitProjection,
    ) {
        let (inertia_a, inertia_b) = (&inertias[0], &inertias[1]);
        let normal = prestep.normal;
        let angular_jacobian_a = Vector3Wide::cross(&prestep.offset_a, &normal);
        let angular_jacobian_b = Vector3Wide::cross(&normal, &prestep.offset_b);

        projection.csi_to_wsv_linear_a = Vector3Wide::scale(&normal, inertia_a.inverse_mass);
        projection.csi_to_wsv_angular_a =
            Symmetric3x3Wide::transform_without_overlap(&angular_jacobian_a, &inertia_a.inverse_inertia_tensor);
        projection.csi_to_wsv_linear_b = Vector3Wide::scale(&normal, -inertia_b.inverse_mass);
        projection.csi_to_wsv_angular_b =
            Symmetric3x3Wide::transform_without_overlap(&angular_jacobian_b, &inertia_b.inverse_inertia_tensor);

        let inverse_effective_mass = inertia_a.inverse_mass
            + inertia_b.inverse_mass
            + Vector3Wide::dot(&angular_jacobian_a, &projection.csi_to_wsv_angular_a)
            + Vector3Wide::dot(&angular_jacobian_b, &projection.csi_to_wsv_angular_b);

        let (position_error_to_velocity, effective_mass_cfm_scale, softness_impulse_scale) =
            SpringSettingsWide::compute_springiness(&prestep.spring_settings, dt);
        // Lanes without a dynamic body (including empty lanes) get a zero effective mass instead of infinity.
        projection.effective_mass = Vector::select_positive(
            inverse_effective_mass,
            effective_mass_cfm_scale / inverse_effective_mass,
            Vector::zero(),
        );
        projection.softness_impulse_scale = Vector::select_positive(
            inverse_effective_mass,
            softness_impulse_scale,
            Vector::zero(),
        );

        let depth = prestep.penetration_depth;
        projection.bias_velocity = Vector::select_positive(
            depth,
            (depth * position_error_to_velocity).min(prestep.maximum_recovery_velocity),
            depth * inverse_dt,
        );
        projection.normal = normal;
        projection.angular_jacobian_a = angular_jacobian_a;
        projection.angular_jacobian_b = angular_jacobian_b;
    }

    fn warm_start(
        projection: &PenetrationLimitProjection,
        accumulated_impulse: &Vector<f32>,
        velocities: &mut [BodyVelocityWide],
    ) {
        Self::apply_impulse(projection, *accumulated_impulse, velocities);
    }

    fn solve(
        projection: &PenetrationLimitProjection,
        accumulated_impulse: &mut Vector<f32>,
        velocities: &mut [BodyVelocityWide],
    ) {
        let (a, b) = (&velocities[0], &velocities[1]);
        let constraint_space_velocity = Vector3Wide::dot(&a.linear, &projection.normal)
            - Vector3Wide::dot(&b.linear, &projection.normal)
            + Vector3Wide::dot(&a.angular, &projection.angular_jacobian_a)
            + Vector3Wide::dot(&b.angular, &projection.angular_jacobian_b);
        let csi = (projection.bias_velocity - constraint_space_velocity) * projection.effective_mass
            - *accumulated_impulse * projection.softness_impulse_scale;
        let previous = *accumulated_impulse;
        *accumulated_impulse = (previous + csi).max(Vector::zero());
        let corrective_csi = *accumulated_impulse - previous;
        Self::apply_impulse(projection, corrective_csi, velocities);
    }
}
