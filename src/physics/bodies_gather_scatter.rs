use crate::physics::bodies::Bodies;
use crate::physics::body_properties::{BodyInertiaWide, BodyVelocityWide};
use crate::utilities::vector::{Vector, LANES};

impl Bodies {
    /// Gathers the velocities of up to `LANES` bodies into a bundle. Lanes with a negative body index stay zero.
    #[inline(always)]
    pub fn gather_velocities(&self, body_indices: &Vector<i32>) -> BodyVelocityWide {
        let mut velocities = BodyVelocityWide::default();
        for lane in 0..LANES {
            let index = body_indices[lane];
            if index >= 0 {
                let velocity = self.velocities.get(index as usize);
                velocities.linear.write_slot(velocity.linear, lane);
                velocities.angular.write_slot(velocity.angular, lane);
            }
        }
        velocities
    }

    /// Gathers the inertias of up to `LANES` bodies into a bundle. Lanes with a negative body index stay zero,
    /// which makes them behave like kinematic bodies in the constraint math.
    #[inline(always)]
    pub fn gather_inertias(&self, body_indices: &Vector<i32>) -> BodyInertiaWide {
        let inertias = self.inertias();
        let mut gathered = BodyInertiaWide::default();
        for lane in 0..LANES {
            let index = body_indices[lane];
            if index >= 0 {
                let inertia = &inertias[index as usize];
                gathered
                    .inverse_inertia_tensor
                    .write_slot(&inertia.inverse_inertia_tensor, lane);
                gathered.inverse_mass[lane] = inertia.inverse_mass;
            }
        }
        gathered
    }

    /// Writes a velocity bundle back to the referenced bodies. Lanes with a negative body index are skipped.
    ///
    /// # Safety
    /// No other thread may access the velocities of the referenced bodies during the call. Within one
    /// constraint batch this follows from the bodies being disjoint.
    #[inline(always)]
    pub unsafe fn scatter_velocities(&self, body_indices: &Vector<i32>, velocities: &BodyVelocityWide) {
        for lane in 0..LANES {
            let index = body_indices[lane];
            if index >= 0 {
                let target = self.velocities.get_shared_mut(index as usize);
                target.linear = velocities.linear.read_slot(lane);
                target.angular = velocities.angular.read_slot(lane);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::physics::bodies::Bodies;
    use crate::physics::body_description::BodyDescription;
    use crate::physics::body_properties::{BodyInertia, BodyVelocity};
    use crate::utilities::vector::Vector;
    use glam::Vec3;

    #[test]
    fn gather_scatter_skips_empty_lanes() {
        let mut bodies = Bodies::new(4);
        let a = bodies.add(&BodyDescription::create_dynamic(
            BodyVelocity::from_linear(Vec3::X),
            BodyInertia::sphere(2.0, 1.0),
        ));
        let b = bodies.add(&BodyDescription::create_dynamic(
            BodyVelocity::from_linear(Vec3::Y),
            BodyInertia::sphere(4.0, 1.0),
        ));
        let mut indices = Vector::<i32>::splat(-1);
        indices[0] = 1;
        indices[3] = 0;
        let mut velocities = bodies.gather_velocities(&indices);
        assert_eq!(velocities.linear.read_slot(0), Vec3::Y);
        assert_eq!(velocities.linear.read_slot(3), Vec3::X);
        assert_eq!(velocities.linear.read_slot(1), Vec3::ZERO);
        let inertias = bodies.gather_inertias(&indices);
        assert_eq!(inertias.inverse_mass[0], 0.25);
        assert_eq!(inertias.inverse_mass[2], 0.0);

        velocities.linear.write_slot(Vec3::Z, 0);
        velocities.linear.write_slot(Vec3::splat(9.0), 5);
        unsafe { bodies.scatter_velocities(&indices, &velocities) };
        assert_eq!(bodies.velocity(b).unwrap().linear, Vec3::Z);
        assert_eq!(bodies.velocity(a).unwrap().linear, Vec3::X);
    }
}
