/// Implicit median kd-tree over point positions.
///
/// The tree is stored as a permutation of point indices plus a flat array of
/// nodes in depth-first order. Its shape depends only on the point count,
/// the root box and the positions of the separator points, so a persisted
/// permutation is enough to rebuild the nodes without partitioning again.
mod build;
mod query;

pub use query::{nearest_point_exhaustive, nearest_to_ray_exhaustive};

use crate::aabb::Aabb;
use crate::point_cloud::Vertex;
use crate::progress::{Completion, ProgressSink};
use build::Builder;
use constants::format::KDTREE_LEAF_SIZE;
use glam::Vec3;

/// Index of a point in a cloud, or [`PointIndex::INVALID`] for "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointIndex(pub usize);

impl PointIndex {
    pub const INVALID: PointIndex = PointIndex(usize::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn get(self) -> Option<usize> {
        self.is_valid().then_some(self.0)
    }
}

impl Default for PointIndex {
    fn default() -> Self {
        Self::INVALID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexState {
    #[default]
    Empty,
    /// Built in memory.
    Ready,
    /// Read from a file; the permutation is trusted.
    Loaded,
}

/// One node of the tree. Children are addressed by position in the node
/// array; leaves address a range of the permutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KdNode {
    Inner {
        aabb: Aabb,
        axis: u8,
        separator: Vec3,
        left: u32,
        right: u32,
    },
    Leaf {
        aabb: Aabb,
        begin: usize,
        end: usize,
    },
}

impl KdNode {
    pub fn aabb(&self) -> &Aabb {
        match self {
            KdNode::Inner { aabb, .. } | KdNode::Leaf { aabb, .. } => aabb,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, KdNode::Leaf { .. })
    }
}

/// Spatial index of a point cloud.
#[derive(Debug, Default)]
pub struct KdTreeIndex {
    state: IndexState,
    aabb: Aabb,
    point_indices: Vec<u64>,
    nodes: Vec<KdNode>,
    depth: usize,
}

impl KdTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != IndexState::Empty
    }

    /// Box the tree was laid out in: the requested box widened to cover
    /// every positioned point.
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Point indices in tree order. Every leaf owns a contiguous slice.
    pub fn point_indices(&self) -> &[u64] {
        &self.point_indices
    }

    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    /// Number of levels, 1 for a tree that is a single leaf.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaves(&self) -> impl Iterator<Item = &KdNode> {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    /// Boxes of every node at `depth` (the root is depth 0), for drawing
    /// one level of the tree.
    pub fn aabbs_at_depth(&self, depth: usize) -> Vec<Aabb> {
        let mut boxes = Vec::new();
        if self.nodes.is_empty() {
            return boxes;
        }

        let mut stack = vec![(0u32, 0usize)];
        while let Some((id, level)) = stack.pop() {
            let node = &self.nodes[id as usize];
            if level == depth {
                boxes.push(*node.aabb());
                continue;
            }
            if let KdNode::Inner { left, right, .. } = *node {
                stack.push((right, level + 1));
                stack.push((left, level + 1));
            }
        }
        boxes
    }

    /// Build over `vertices` inside `aabb`.
    ///
    /// Reports the number of points placed in finished leaves. When the sink
    /// returns `false` the index is left Empty. Panics if an index already
    /// exists.
    pub fn build(&mut self, aabb: Aabb, vertices: &[Vertex], progress: &mut dyn ProgressSink) -> Completion {
        assert!(
            !self.is_initialized(),
            "kd-tree index already {:?}, clear it before building",
            self.state
        );
        if vertices.is_empty() {
            return Completion::Finished(());
        }

        self.aabb = root_bounds(aabb, vertices);
        self.point_indices = (0..vertices.len() as u64).collect();

        let mut builder = Builder::new(vertices, &mut self.point_indices, true, Some(progress));
        let nodes = builder.run(self.aabb);
        let depth = builder.depth();
        let Completion::Finished(nodes) = nodes else {
            log::info!("kd-tree construction cancelled");
            self.clear();
            return Completion::Cancelled;
        };

        self.nodes = nodes;
        self.depth = depth;
        self.state = IndexState::Ready;
        log::debug!(
            "Built kd-tree over {} points: {} nodes, {} leaves, depth {}",
            vertices.len(),
            self.nodes.len(),
            self.leaves().count(),
            self.depth
        );
        Completion::Finished(())
    }

    /// Back to Empty, releasing memory.
    pub fn clear(&mut self) {
        self.state = IndexState::Empty;
        self.aabb = Aabb::invalid();
        self.point_indices = Vec::new();
        self.nodes = Vec::new();
        self.depth = 0;
    }

    /// Size the permutation for `count` entries and hand out its bytes so a
    /// reader can stream a persisted index straight into it. Finish with
    /// [`KdTreeIndex::finish_loading`].
    pub fn alloc_for_loading(&mut self, count: usize, aabb: Aabb) -> &mut [u8] {
        self.clear();
        self.aabb = aabb;
        self.point_indices = vec![0; count];
        bytemuck::cast_slice_mut(&mut self.point_indices)
    }

    /// Derive the nodes of a streamed-in permutation without reordering it.
    pub fn finish_loading(&mut self, vertices: &[Vertex]) {
        debug_assert_eq!(vertices.len(), self.point_indices.len());
        self.aabb = root_bounds(self.aabb, vertices);

        let mut builder = Builder::new(vertices, &mut self.point_indices, false, None);
        let Completion::Finished(nodes) = builder.run(self.aabb) else {
            unreachable!("loading has no progress sink to cancel it");
        };
        self.depth = builder.depth();
        self.nodes = nodes;
        self.state = IndexState::Loaded;
    }

    /// Permutation entry `i` as a point index.
    fn point_at(&self, i: usize) -> usize {
        self.point_indices[i] as usize
    }
}

/// `aabb` widened by the bounds of every positioned point.
fn root_bounds(aabb: Aabb, vertices: &[Vertex]) -> Aabb {
    vertices
        .iter()
        .map(Vertex::position)
        .filter(|p| p.is_finite())
        .fold(aabb, |bounds, p| bounds | p)
}

/// Ranges at or below this size are leaves.
pub(crate) const LEAF_SIZE: usize = KDTREE_LEAF_SIZE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_vertices(count: usize, seed: u64) -> Vec<Vertex> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let p = Vec3::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(0.0..10.0),
                    rng.gen_range(-20.0..20.0),
                );
                Vertex::new(p, [0; 3])
            })
            .collect()
    }

    fn bounds(vertices: &[Vertex]) -> Aabb {
        Aabb::from_points(vertices.iter().map(Vertex::position))
    }

    #[test]
    fn point_index_sentinel() {
        assert!(!PointIndex::INVALID.is_valid());
        assert_eq!(PointIndex::INVALID.get(), None);
        assert_eq!(PointIndex(3).get(), Some(3));
        assert_eq!(PointIndex::default(), PointIndex::INVALID);
    }

    #[test]
    fn leaves_partition_points() {
        let vertices = random_vertices(1000, 1);
        let mut index = KdTreeIndex::new();
        assert!(index.build(bounds(&vertices), &vertices, &mut NoProgress).finished().is_some());
        assert_eq!(index.state(), IndexState::Ready);

        let mut seen = vec![false; vertices.len()];
        for leaf in index.leaves() {
            let KdNode::Leaf { aabb, begin, end } = *leaf else {
                unreachable!()
            };
            assert!(end - begin <= LEAF_SIZE);
            for &point in &index.point_indices()[begin..end] {
                assert!(aabb.contains(vertices[point as usize].position(), 0.0));
                assert!(!seen[point as usize], "point {} in two leaves", point);
                seen[point as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn small_cloud_is_a_single_leaf() {
        let vertices = random_vertices(LEAF_SIZE, 2);
        let mut index = KdTreeIndex::new();
        let _ = index.build(bounds(&vertices), &vertices, &mut NoProgress);
        assert_eq!(index.nodes().len(), 1);
        assert_eq!(index.depth(), 1);
        assert!(index.nodes()[0].is_leaf());
    }

    #[test]
    fn loading_reproduces_built_tree() {
        let vertices = random_vertices(777, 3);
        let aabb = bounds(&vertices);
        let mut built = KdTreeIndex::new();
        let _ = built.build(aabb, &vertices, &mut NoProgress);

        let mut loaded = KdTreeIndex::new();
        let bytes = loaded.alloc_for_loading(vertices.len(), aabb);
        bytes.copy_from_slice(bytemuck::cast_slice(built.point_indices()));
        loaded.finish_loading(&vertices);

        assert_eq!(loaded.state(), IndexState::Loaded);
        assert_eq!(loaded.nodes(), built.nodes());
        assert_eq!(loaded.depth(), built.depth());
    }

    #[test]
    fn cancelled_build_leaves_index_empty() {
        let vertices = random_vertices(500, 4);
        let mut index = KdTreeIndex::new();
        let mut calls = 0;
        let mut sink = |_done: u64, _total: u64| {
            calls += 1;
            calls < 3
        };
        assert!(index.build(bounds(&vertices), &vertices, &mut sink).is_cancelled());
        assert_eq!(index.state(), IndexState::Empty);
        assert!(index.point_indices().is_empty());
        assert!(index.nodes().is_empty());
    }

    #[test]
    fn build_progress_ends_at_point_count() {
        let vertices = random_vertices(300, 5);
        let mut index = KdTreeIndex::new();
        let mut last = (0, 0);
        let mut sink = |done: u64, total: u64| {
            assert!(done >= last.0);
            last = (done, total);
            true
        };
        let _ = index.build(bounds(&vertices), &vertices, &mut sink);
        assert_eq!(last, (300, 300));
    }

    #[test]
    #[should_panic(expected = "already")]
    fn building_twice_panics() {
        let vertices = random_vertices(20, 6);
        let mut index = KdTreeIndex::new();
        let _ = index.build(bounds(&vertices), &vertices, &mut NoProgress);
        let _ = index.build(bounds(&vertices), &vertices, &mut NoProgress);
    }

    #[test]
    fn levels_cover_root() {
        let vertices = random_vertices(400, 7);
        let mut index = KdTreeIndex::new();
        let _ = index.build(bounds(&vertices), &vertices, &mut NoProgress);

        assert_eq!(index.aabbs_at_depth(0), vec![*index.aabb()]);
        let level = index.aabbs_at_depth(1);
        assert_eq!(level.len(), 2);
        assert!(level.iter().all(|b| index.aabb().contains_aabb(b)));
        assert!(index.aabbs_at_depth(index.depth()).is_empty());
    }

    #[test]
    fn widens_box_to_cover_points() {
        let vertices = random_vertices(64, 8);
        let mut index = KdTreeIndex::new();
        let small = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let _ = index.build(small, &vertices, &mut NoProgress);
        assert!(index.aabb().contains_aabb(&bounds(&vertices)));
    }
}
