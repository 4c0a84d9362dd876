use serde::{Deserialize, Serialize};

use crate::utilities::gather_scatter::Bundle;
use crate::utilities::vector::Vector;

/// SIMD-wide spring settings, one constraint per lane.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SpringSettingsWide {
    pub angular_frequency: Vector<f32>,
    pub twice_damping_ratio: Vector<f32>,
}

unsafe impl Bundle for SpringSettingsWide {}

impl SpringSettingsWide {
    #[inline(always)]
    pub fn write_slot(&mut self, source: &SpringSettings, lane: usize) {
        self.angular_frequency[lane] = source.angular_frequency;
        self.twice_damping_ratio[lane] = source.twice_damping_ratio;
    }

    #[inline(always)]
    pub fn read_slot(&self, lane: usize) -> SpringSettings {
        SpringSettings {
            angular_frequency: self.angular_frequency[lane],
            twice_damping_ratio: self.twice_damping_ratio[lane],
        }
    }

    /// Computes the softness terms of a springy constraint for a timestep.
    ///
    /// Returns `(position_error_to_velocity, effective_mass_cfm_scale, softness_impulse_scale)`.
    #[inline(always)]
    pub fn compute_springiness(settings: &SpringSettingsWide, dt: f32) -> (Vector<f32>, Vector<f32>, Vector<f32>) {
        let angular_frequency_dt = settings.angular_frequency * dt;
        let position_error_to_velocity =
            settings.angular_frequency / (angular_frequency_dt + settings.twice_damping_ratio);
        let extra = Vector::one() / (angular_frequency_dt * (angular_frequency_dt + settings.twice_damping_ratio));
        let effective_mass_cfm_scale = Vector::one() / (Vector::one() + extra);
        let softness_impulse_scale = extra * effective_mass_cfm_scale;
        (
            position_error_to_velocity,
            effective_mass_cfm_scale,
            softness_impulse_scale,
        )
    }
}

/// Scalar spring settings describing the frequency and damping of a springy constraint.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpringSettings {
    /// Target number of undamped oscillations per unit of time, scaled by 2 * PI.
    pub angular_frequency: f32,
    /// Twice the ratio of the spring's actual damping to its critical damping.
    pub twice_damping_ratio: f32,
}

impl SpringSettings {
    /// Constructs a new spring settings instance.
    ///
    /// * `frequency`: Target number of undamped oscillations per unit of time.
    /// * `damping_ratio`: Ratio of the spring's actual damping to its critical damping.
    ///   0 is undamped, 1 is critically damped, and higher values are overdamped.
    pub fn new(frequency: f32, damping_ratio: f32) -> Self {
        let settings = Self {
            angular_frequency: frequency * (2.0 * std::f32::consts::PI),
            twice_damping_ratio: damping_ratio * 2.0,
        };
        debug_assert!(
            settings.is_valid(),
            "Spring settings must have positive frequency and nonnegative damping ratio."
        );
        settings
    }

    /// Gets the target number of undamped oscillations per unit of time.
    #[inline(always)]
    pub fn frequency(&self) -> f32 {
        self.angular_frequency / (2.0 * std::f32::consts::PI)
    }

    #[inline(always)]
    pub fn damping_ratio(&self) -> f32 {
        self.twice_damping_ratio / 2.0
    }

    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.angular_frequency.is_finite()
            && self.angular_frequency > 0.0
            && self.twice_damping_ratio.is_finite()
            && self.twice_damping_ratio >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn round_trips_frequency_and_damping() {
        let settings = SpringSettings::new(30.0, 1.0);
        assert_relative_eq!(settings.frequency(), 30.0, epsilon = 1e-4);
        assert_relative_eq!(settings.damping_ratio(), 1.0);
    }

    #[test]
    fn stiff_springs_approach_rigid() {
        let mut wide = SpringSettingsWide::default();
        wide.write_slot(&SpringSettings::new(1000.0, 1.0), 0);
        let (_, cfm_scale, softness) = SpringSettingsWide::compute_springiness(&wide, 1.0 / 60.0);
        assert!(cfm_scale[0] > 0.999);
        assert!(softness[0] < 1e-3);
        assert_relative_eq!(cfm_scale[0] + softness[0], 1.0, epsilon = 1e-5);
    }
}
