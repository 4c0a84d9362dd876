use crate::physics::body_properties::{BodyInertia, BodyVelocity};

/// Describes a body's solver-relevant state.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyDescription {
    /// Linear and angular velocity of the body.
    pub velocity: BodyVelocity,
    /// Inverse mass and inverse inertia tensor of the body.
    pub local_inertia: BodyInertia,
}

impl BodyDescription {
    /// Creates a description for a body that responds to constraint impulses.
    #[inline(always)]
    pub fn create_dynamic(velocity: BodyVelocity, local_inertia: BodyInertia) -> Self {
        debug_assert!(local_inertia.inverse_mass > 0.0, "Dynamic bodies need a finite mass.");
        Self {
            velocity,
            local_inertia,
        }
    }

    /// Creates a description for a body with zero inverse inertia. Constraints can push against it but never move it.
    #[inline(always)]
    pub fn create_kinematic(velocity: BodyVelocity) -> Self {
        Self {
            velocity,
            local_inertia: BodyInertia::default(),
        }
    }
}
