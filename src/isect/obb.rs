use glam::Vec2;

use super::Aabb;

/// Oriented box in screen space, used for the narrow phase.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obb {
    center: Vec2,
    half_extents: Vec2,
    angle: f32,
    axes: [Vec2; 2],
    quad: [Vec2; 4],
}

impl Obb {
    pub fn new(center: Vec2, half_extents: Vec2, angle: f32) -> Self {
        let half_extents = half_extents.abs();
        let (sin, cos) = angle.sin_cos();
        let axis_x = Vec2::new(cos, sin);
        let axis_y = Vec2::new(-sin, cos);
        let ex = axis_x * half_extents.x;
        let ey = axis_y * half_extents.y;
        Self {
            center,
            half_extents,
            angle,
            axes: [axis_x, axis_y],
            quad: [
                center - ex - ey,
                center + ex - ey,
                center + ex + ey,
                center - ex + ey,
            ],
        }
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn half_extents(&self) -> Vec2 {
        self.half_extents
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    /// Corners in winding order, starting at the box-local minimum.
    pub fn quad(&self) -> &[Vec2; 4] {
        &self.quad
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(&self.quad)
    }

    fn project(&self, axis: Vec2) -> (f32, f32) {
        let mut lo = f32::MAX;
        let mut hi = f32::MIN;
        for corner in &self.quad {
            let d = corner.dot(axis);
            lo = lo.min(d);
            hi = hi.max(d);
        }
        (lo, hi)
    }

    /// Separating-axis test over both boxes' face normals. Touching counts as
    /// intersecting, matching [`Aabb::intersects`].
    pub fn intersects(&self, other: &Obb) -> bool {
        for axis in self.axes.iter().chain(other.axes.iter()) {
            let (a_lo, a_hi) = self.project(*axis);
            let (b_lo, b_hi) = other.project(*axis);
            if a_hi < b_lo || b_hi < a_lo {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    #[test]
    fn axis_aligned_boxes_overlap() {
        let a = Obb::new(Vec2::new(5.0, 5.0), Vec2::splat(5.0), 0.0);
        let b = Obb::new(Vec2::new(10.0, 10.0), Vec2::splat(5.0), 0.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn axis_aligned_boxes_apart() {
        let a = Obb::new(Vec2::new(5.0, 5.0), Vec2::splat(5.0), 0.0);
        let b = Obb::new(Vec2::new(105.0, 105.0), Vec2::splat(5.0), 0.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn rotated_boxes_separated_on_diagonal() {
        // AABBs overlap, but the thin rotated bars never meet.
        let a = Obb::new(Vec2::new(0.0, 0.0), Vec2::new(20.0, 1.0), FRAC_PI_4);
        let b = Obb::new(Vec2::new(10.0, -4.0), Vec2::new(20.0, 1.0), FRAC_PI_4);
        assert!(a.aabb().intersects(&b.aabb()));
        assert!(!a.intersects(&b));
    }

    #[test]
    fn crossing_bars_intersect() {
        let a = Obb::new(Vec2::ZERO, Vec2::new(20.0, 1.0), FRAC_PI_4);
        let b = Obb::new(Vec2::ZERO, Vec2::new(20.0, 1.0), -FRAC_PI_4);
        assert!(a.intersects(&b));
    }

    #[test]
    fn aabb_encloses_rotated_quad() {
        let obb = Obb::new(Vec2::new(50.0, 50.0), Vec2::new(10.0, 10.0), FRAC_PI_4);
        let aabb = obb.aabb();
        let reach = 10.0 * std::f32::consts::SQRT_2;
        assert!((aabb.min.x - (50.0 - reach)).abs() < 1e-3);
        assert!((aabb.max.y - (50.0 + reach)).abs() < 1e-3);
    }
}
