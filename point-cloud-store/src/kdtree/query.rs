/// Nearest point, picking ray and region queries.
use super::{KdNode, KdTreeIndex, PointIndex};
use crate::aabb::Aabb;
use crate::point_cloud::Vertex;
use glam::Vec3;

/// Best candidate so far. Ties on distance go to the lower point index, so
/// tree and exhaustive searches agree.
#[derive(Clone, Copy)]
struct Candidate {
    distance_squared: f32,
    ray_parameter: f32,
    index: usize,
}

impl Candidate {
    fn none(max_distance: f32) -> Self {
        Self {
            distance_squared: max_distance * max_distance,
            ray_parameter: f32::INFINITY,
            index: usize::MAX,
        }
    }

    fn offer(&mut self, distance_squared: f32, ray_parameter: f32, index: usize) {
        let better = distance_squared < self.distance_squared
            || (distance_squared == self.distance_squared
                && (ray_parameter, index) < (self.ray_parameter, self.index));
        if better {
            *self = Self {
                distance_squared,
                ray_parameter,
                index,
            };
        }
    }

    fn point_index(&self) -> PointIndex {
        PointIndex(self.index)
    }
}

/// Perpendicular distance² of `point` to the ray and the ray parameter of
/// its foot, or `None` behind the origin. `direction` is unit length.
fn ray_distance(origin: Vec3, direction: Vec3, point: Vec3) -> Option<(f32, f32)> {
    let v = point - origin;
    let t = v.dot(direction);
    (t >= 0.0).then(|| ((v - direction * t).length_squared(), t))
}

impl KdTreeIndex {
    /// Closest point to `query` no farther than `max_distance`, or
    /// [`PointIndex::INVALID`].
    pub fn nearest_point(&self, vertices: &[Vertex], query: Vec3, max_distance: f32) -> PointIndex {
        let mut best = Candidate::none(max_distance);
        if self.nodes.is_empty() {
            return best.point_index();
        }

        let mut stack = vec![0u32];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if node.aabb().distance_squared_to(query) > best.distance_squared {
                continue;
            }
            match *node {
                KdNode::Leaf { begin, end, .. } => {
                    for slot in begin..end {
                        let index = self.point_at(slot);
                        let d2 = (vertices[index].position() - query).length_squared();
                        best.offer(d2, 0.0, index);
                    }
                }
                KdNode::Inner { left, right, .. } => {
                    let left_d2 = self.nodes[left as usize].aabb().distance_squared_to(query);
                    let right_d2 = self.nodes[right as usize].aabb().distance_squared_to(query);
                    // Nearer child on top.
                    if left_d2 <= right_d2 {
                        stack.extend([right, left]);
                    } else {
                        stack.extend([left, right]);
                    }
                }
            }
        }
        best.point_index()
    }

    /// Point closest to the ray `origin + t * direction`, `t >= 0`, whose
    /// perpendicular distance is at most `max_distance`. Ties prefer the
    /// point nearer the origin.
    pub fn nearest_to_ray(
        &self,
        vertices: &[Vertex],
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> PointIndex {
        let mut best = Candidate::none(max_distance);
        let direction = direction.normalize_or_zero();
        if self.nodes.is_empty() || direction == Vec3::ZERO {
            return best.point_index();
        }
        let inv_direction = direction.recip();

        let mut stack = vec![0u32];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            let reach = best.distance_squared.sqrt();
            if node.aabb().expanded(reach).intersect_ray(origin, inv_direction).is_none() {
                continue;
            }
            match *node {
                KdNode::Leaf { begin, end, .. } => {
                    for slot in begin..end {
                        let index = self.point_at(slot);
                        if let Some((d2, t)) = ray_distance(origin, direction, vertices[index].position()) {
                            best.offer(d2, t, index);
                        }
                    }
                }
                KdNode::Inner { left, right, .. } => {
                    let entry = |child: u32| {
                        self.nodes[child as usize]
                            .aabb()
                            .expanded(reach)
                            .intersect_ray(origin, inv_direction)
                            .unwrap_or(f32::INFINITY)
                    };
                    if entry(left) <= entry(right) {
                        stack.extend([right, left]);
                    } else {
                        stack.extend([left, right]);
                    }
                }
            }
        }
        best.point_index()
    }

    /// Indices of all points inside `region` (boundary included), ascending.
    pub fn points_in_aabb(&self, vertices: &[Vertex], region: &Aabb) -> Vec<usize> {
        let mut found = Vec::new();
        if self.nodes.is_empty() {
            return found;
        }

        let mut stack = vec![0u32];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id as usize];
            if !node.aabb().intersects(region) {
                continue;
            }
            match *node {
                KdNode::Leaf { begin, end, .. } => found.extend(
                    (begin..end)
                        .map(|slot| self.point_at(slot))
                        .filter(|&index| region.contains(vertices[index].position(), 0.0)),
                ),
                KdNode::Inner { left, right, .. } => stack.extend([right, left]),
            }
        }
        found.sort_unstable();
        found
    }
}

/// Linear scan equivalent of [`KdTreeIndex::nearest_point`].
pub fn nearest_point_exhaustive(vertices: &[Vertex], query: Vec3, max_distance: f32) -> PointIndex {
    let mut best = Candidate::none(max_distance);
    for (index, vertex) in vertices.iter().enumerate() {
        best.offer((vertex.position() - query).length_squared(), 0.0, index);
    }
    best.point_index()
}

/// Linear scan equivalent of [`KdTreeIndex::nearest_to_ray`].
pub fn nearest_to_ray_exhaustive(
    vertices: &[Vertex],
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
) -> PointIndex {
    let mut best = Candidate::none(max_distance);
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        return best.point_index();
    }
    for (index, vertex) in vertices.iter().enumerate() {
        if let Some((d2, t)) = ray_distance(origin, direction, vertex.position()) {
            best.offer(d2, t, index);
        }
    }
    best.point_index()
}
