use crate::utilities::vector::Vector;
use crate::utilities::vector3_wide::Vector3Wide;
use glam::Mat3;

/// Stores the lower left triangle (including diagonal) of 3x3 matrices with SIMD lanes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct Symmetric3x3Wide {
    /// First row, first column of the matrix.
    pub xx: Vector,
    /// Second row, first column of the matrix.
    pub yx: Vector,
    /// Second row, second column of the matrix.
    pub yy: Vector,
    /// Third row, first column of the matrix.
    pub zx: Vector,
    /// Third row, second column of the matrix.
    pub zy: Vector,
    /// Third row, third column of the matrix.
    pub zz: Vector,
}

impl Symmetric3x3Wide {
    /// Computes `v * m` for every lane.
    #[inline(always)]
    pub fn transform_without_overlap(v: &Vector3Wide, m: &Self) -> Vector3Wide {
        Vector3Wide {
            x: v.x * m.xx + v.y * m.yx + v.z * m.zx,
            y: v.x * m.yx + v.y * m.yy + v.z * m.zy,
            z: v.x * m.zx + v.y * m.zy + v.z * m.zz,
        }
    }

    /// Writes the lower triangle of a scalar matrix into one lane. The matrix is assumed symmetric.
    #[inline(always)]
    pub fn write_slot(&mut self, source: &Mat3, lane: usize) {
        self.xx[lane] = source.x_axis.x;
        self.yx[lane] = source.x_axis.y;
        self.yy[lane] = source.y_axis.y;
        self.zx[lane] = source.x_axis.z;
        self.zy[lane] = source.y_axis.z;
        self.zz[lane] = source.z_axis.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn transform_matches_scalar_for_symmetric_matrix() {
        let m = Mat3::from_cols(
            Vec3::new(2.0, 0.5, 0.25),
            Vec3::new(0.5, 3.0, -1.0),
            Vec3::new(0.25, -1.0, 4.0),
        );
        let mut wide = Symmetric3x3Wide::default();
        wide.write_slot(&m, 2);
        let mut v = Vector3Wide::default();
        v.write_slot(Vec3::new(1.0, -2.0, 0.5), 2);
        let result = Symmetric3x3Wide::transform_without_overlap(&v, &wide).read_slot(2);
        let expected = m * Vec3::new(1.0, -2.0, 0.5);
        assert!((result - expected).length() < 1e-5);
    }
}
