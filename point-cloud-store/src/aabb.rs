/// Axis-aligned bounding box used for bounds tracking and kd-tree cells.
use constants::format::FALLBACK_AABB_EXTENT;
use glam::{Affine3A, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Axis aligned bounding box.
///
/// [`Aabb::invalid`] (`min = +inf`, `max = -inf`) is the identity of the
/// union operators, so bounds are built by folding points into it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min_point: Vec3,
    pub max_point: Vec3,
}

impl Aabb {
    pub fn new(min_point: Vec3, max_point: Vec3) -> Self {
        Self {
            min_point,
            max_point,
        }
    }

    pub fn invalid() -> Self {
        Self {
            min_point: Vec3::INFINITY,
            max_point: Vec3::NEG_INFINITY,
        }
    }

    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        points.into_iter().fold(Self::invalid(), |aabb, p| aabb | p)
    }

    /// Bounds of `count` little-endian `[f32; 3]` positions spaced `stride`
    /// bytes apart.
    pub fn from_strided(bytes: &[u8], count: usize, stride: usize) -> Self {
        let mut aabb = Self::invalid();
        for i in 0..count {
            aabb |= read_vec3(&bytes[i * stride..]);
        }
        aabb
    }

    pub fn is_inf(&self) -> bool {
        self.min_point.abs().cmpeq(Vec3::INFINITY).any()
            || self.max_point.abs().cmpeq(Vec3::INFINITY).any()
    }

    pub fn is_nan(&self) -> bool {
        self.min_point.is_nan() || self.max_point.is_nan()
    }

    /// Finite and strictly positive extent on every axis.
    pub fn is_valid(&self) -> bool {
        !self.is_inf() && !self.is_nan() && self.max_point.cmpgt(self.min_point).all()
    }

    pub fn contains(&self, point: Vec3, epsilon: f32) -> bool {
        (self.min_point - epsilon).cmple(point).all() && point.cmple(self.max_point + epsilon).all()
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        self.contains(point, 1.0e-6)
    }

    pub fn contains_aabb(&self, other: &Aabb) -> bool {
        self.min_point.cmple(other.min_point).all() && other.max_point.cmple(self.max_point).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min_point.cmple(other.max_point).all() && other.min_point.cmple(self.max_point).all()
    }

    /// Cut the box in two along `axis` at `split_point`'s coordinate, clamped
    /// into the box so the halves never leave it.
    ///
    /// A NaN coordinate cuts at the end of the box it sorts towards under
    /// [`f32::total_cmp`]: the minimum for a negative NaN, the maximum
    /// otherwise. Never panics, even on inverted boxes.
    pub fn split(&self, axis: usize, split_point: Vec3) -> (Aabb, Aabb) {
        assert!(axis < 3, "split axis {} out of range", axis);
        let (min, max) = (self.min_point[axis], self.max_point[axis]);
        let coordinate = split_point[axis];
        let boundary = if !coordinate.is_nan() {
            coordinate.max(min).min(max)
        } else if coordinate.is_sign_negative() {
            min
        } else {
            max
        };

        let mut left = *self;
        let mut right = *self;
        left.max_point[axis] = boundary;
        right.min_point[axis] = boundary;
        (left, right)
    }

    /// Map `v` linearly so that `min_point` becomes 0 and `max_point` 1.
    /// The box must have positive extent on every axis.
    pub fn to_unit_space(&self, v: Vec3) -> Vec3 {
        debug_assert!(
            self.size().cmpgt(Vec3::ZERO).all(),
            "to_unit_space on degenerate {}",
            self
        );
        (v - self.min_point) / (self.max_point - self.min_point)
    }

    pub fn center_point(&self) -> Vec3 {
        self.min_point.lerp(self.max_point, 0.5)
    }

    pub fn size(&self) -> Vec3 {
        self.max_point - self.min_point
    }

    /// Axis of the largest extent; the first one on ties.
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    /// Squared distance from `point` to the closest point of the box; zero
    /// inside.
    pub fn distance_squared_to(&self, point: Vec3) -> f32 {
        let outside = (self.min_point - point).max(point - self.max_point).max(Vec3::ZERO);
        outside.length_squared()
    }

    pub fn expanded(&self, margin: f32) -> Aabb {
        Aabb::new(self.min_point - margin, self.max_point + margin)
    }

    /// Slab test. Returns the ray parameter where the ray enters the box (0
    /// when starting inside), or `None` on a miss. Axes the ray runs parallel
    /// to (infinite `inv_direction`) only check the origin against the slab.
    pub fn intersect_ray(&self, origin: Vec3, inv_direction: Vec3) -> Option<f32> {
        let mut t_enter = 0.0f32;
        let mut t_exit = f32::INFINITY;

        for axis in 0..3 {
            if inv_direction[axis].is_infinite() {
                if origin[axis] < self.min_point[axis] || origin[axis] > self.max_point[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min_point[axis] - origin[axis]) * inv_direction[axis];
            let t2 = (self.max_point[axis] - origin[axis]) * inv_direction[axis];
            t_enter = t_enter.max(t1.min(t2));
            t_exit = t_exit.min(t1.max(t2));
        }

        (t_exit >= t_enter).then_some(t_enter)
    }

    /// Bounds of this box after transforming it by `frame`: the union of the
    /// eight transformed corners.
    pub fn transformed_bounds(&self, frame: &Affine3A) -> Aabb {
        let p = [self.min_point, self.max_point];
        (0..8)
            .map(|i| {
                let corner = Vec3::new(p[(i >> 2) & 1].x, p[(i >> 1) & 1].y, p[i & 1].z);
                frame.transform_point3(corner)
            })
            .fold(Aabb::invalid(), |aabb, v| aabb | v)
    }

    /// This box, or `[-1, 1]^3` if it is not valid.
    pub fn ensure_valid(&self) -> Aabb {
        if self.is_valid() {
            *self
        } else {
            Aabb::new(Vec3::splat(-FALLBACK_AABB_EXTENT), Vec3::splat(FALLBACK_AABB_EXTENT))
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::invalid()
    }
}

impl BitOrAssign<Vec3> for Aabb {
    fn bitor_assign(&mut self, point: Vec3) {
        self.min_point = self.min_point.min(point);
        self.max_point = self.max_point.max(point);
    }
}

impl BitOrAssign<Aabb> for Aabb {
    fn bitor_assign(&mut self, other: Aabb) {
        self.min_point = self.min_point.min(other.min_point);
        self.max_point = self.max_point.max(other.max_point);
    }
}

impl BitOr<Vec3> for Aabb {
    type Output = Aabb;

    fn bitor(mut self, point: Vec3) -> Aabb {
        self |= point;
        self
    }
}

impl BitOr<Aabb> for Aabb {
    type Output = Aabb;

    fn bitor(mut self, other: Aabb) -> Aabb {
        self |= other;
        self
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aabb{{min: {}, max: {}}}", self.min_point, self.max_point)
    }
}

pub(crate) fn read_vec3(bytes: &[u8]) -> Vec3 {
    let component = |i: usize| {
        f32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
    };
    Vec3::new(component(0), component(1), component(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_box(rng: &mut StdRng) -> Aabb {
        let a = Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
        let b = Vec3::new(rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
        Aabb::new(a.min(b), a.max(b))
    }

    #[test]
    fn invalid_is_union_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let a = random_box(&mut rng);
            assert_eq!(Aabb::invalid() | a, a);
            assert_eq!(a | Aabb::invalid(), a);
        }
        assert!(!Aabb::invalid().is_valid());
    }

    #[test]
    fn union_is_commutative_associative_idempotent() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..32 {
            let a = random_box(&mut rng);
            let b = random_box(&mut rng);
            let c = random_box(&mut rng);
            assert_eq!(a | b, b | a);
            assert_eq!((a | b) | c, a | (b | c));
            assert_eq!(a | a, a);
        }
    }

    #[test]
    fn from_points_bounds_all() {
        let points = [Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 5.0, 0.0), Vec3::ZERO];
        let aabb = Aabb::from_points(points);
        assert_eq!(aabb.min_point, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max_point, Vec3::new(1.0, 5.0, 3.0));
        assert!(points.iter().all(|&p| aabb.contains_point(p)));
    }

    #[test]
    fn split_is_consistent() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..64 {
            let b = random_box(&mut rng);
            let axis = rng.gen_range(0..3);
            let p = Vec3::new(rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0));
            let (left, right) = b.split(axis, p);

            assert_eq!(left | right, b);
            assert_eq!(left.max_point[axis], right.min_point[axis]);
            assert!(b.contains_aabb(&left));
            assert!(b.contains_aabb(&right));
        }
    }

    #[test]
    fn split_tolerates_nan_and_inverted_boxes() {
        let unit = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let (left, right) = unit.split(0, Vec3::splat(f32::NAN));
        assert_eq!((left, right.min_point.x), (unit, 1.0));

        let negative_nan = f32::from_bits(0xffff_ffff);
        let (left, right) = unit.split(1, Vec3::splat(negative_nan));
        assert_eq!((left.max_point.y, right), (0.0, unit));

        let inverted = Aabb::new(Vec3::ONE, Vec3::ZERO);
        let (left, right) = inverted.split(2, Vec3::splat(0.5));
        assert_eq!(left.max_point.z, right.min_point.z);

        let (left, _) = Aabb::invalid().split(0, Vec3::splat(f32::NAN));
        assert_eq!(left, Aabb::invalid());
    }

    #[test]
    fn contains_respects_epsilon() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert!(aabb.contains(Vec3::new(1.05, 0.5, 0.5), 0.1));
        assert!(!aabb.contains(Vec3::new(1.05, 0.5, 0.5), 0.01));
    }

    #[test]
    fn unit_space_maps_corners() {
        let aabb = Aabb::new(Vec3::new(-2.0, 0.0, 10.0), Vec3::new(2.0, 4.0, 20.0));
        assert_eq!(aabb.to_unit_space(aabb.min_point), Vec3::ZERO);
        assert_eq!(aabb.to_unit_space(aabb.max_point), Vec3::ONE);
        assert_eq!(aabb.to_unit_space(aabb.center_point()), Vec3::splat(0.5));
    }

    #[test]
    fn transformed_bounds_of_rotation() {
        let aabb = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        let frame = Affine3A::from_rotation_z(std::f32::consts::FRAC_PI_2);
        let rotated = aabb.transformed_bounds(&frame);
        assert!((rotated.min_point - Vec3::new(-1.0, 0.0, 0.0)).abs().max_element() < 1e-5);
        assert!((rotated.max_point - Vec3::new(0.0, 2.0, 1.0)).abs().max_element() < 1e-5);
    }

    #[test]
    fn ensure_valid_substitutes_unit_box() {
        let fallback = Aabb::invalid().ensure_valid();
        assert_eq!(fallback, Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)));
        let flat = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(flat.ensure_valid(), fallback);
    }

    #[test]
    fn ray_intersection() {
        let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let inv = Vec3::new(1.0, 0.0, 0.0).recip();
        assert_eq!(aabb.intersect_ray(Vec3::new(-5.0, 0.0, 0.0), inv), Some(4.0));
        assert_eq!(aabb.intersect_ray(Vec3::new(5.0, 0.0, 0.0), inv), None);
        assert_eq!(aabb.intersect_ray(Vec3::new(-5.0, 3.0, 0.0), inv), None);
    }

    #[test]
    fn distance_to_box() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::ONE);
        assert_eq!(aabb.distance_squared_to(Vec3::splat(0.5)), 0.0);
        assert_eq!(aabb.distance_squared_to(Vec3::new(3.0, 0.5, 0.5)), 4.0);
    }
}
