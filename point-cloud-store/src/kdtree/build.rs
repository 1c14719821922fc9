use super::{KdNode, LEAF_SIZE};
use crate::aabb::Aabb;
use crate::point_cloud::Vertex;
use crate::progress::{Completion, ProgressSink};
use glam::Vec3;

/// Recursive layout of the implicit tree.
///
/// With `partition` set every inner range is reordered by quickselect around
/// its median before the separator is read; without it the permutation is
/// taken as already laid out (loading).
pub(super) struct Builder<'a, 'p> {
    vertices: &'a [Vertex],
    indices: &'a mut [u64],
    partition: bool,
    progress: Option<&'p mut dyn ProgressSink>,
    nodes: Vec<KdNode>,
    depth: usize,
    cancelled: bool,
}

impl<'a, 'p> Builder<'a, 'p> {
    pub(super) fn new(
        vertices: &'a [Vertex],
        indices: &'a mut [u64],
        partition: bool,
        progress: Option<&'p mut dyn ProgressSink>,
    ) -> Self {
        Self {
            vertices,
            indices,
            partition,
            progress,
            nodes: Vec::new(),
            depth: 0,
            cancelled: false,
        }
    }

    pub(super) fn run(&mut self, root: Aabb) -> Completion<Vec<KdNode>> {
        let count = self.indices.len();
        // A median tree has at most 2 * ceil(n / leaf) - 1 nodes.
        self.nodes.reserve(2 * count.div_ceil(LEAF_SIZE));
        self.layout(0, count, root, 1);

        if self.cancelled {
            Completion::Cancelled
        } else {
            Completion::Finished(std::mem::take(&mut self.nodes))
        }
    }

    pub(super) fn depth(&self) -> usize {
        self.depth
    }

    fn position(&self, slot: usize) -> Vec3 {
        self.vertices[self.indices[slot] as usize].position()
    }

    fn layout(&mut self, begin: usize, end: usize, aabb: Aabb, level: usize) -> u32 {
        let id = self.nodes.len() as u32;
        self.depth = self.depth.max(level);

        if end - begin <= LEAF_SIZE {
            self.nodes.push(KdNode::Leaf { aabb, begin, end });
            self.leaf_done(end);
            return id;
        }

        let axis = aabb.longest_axis();
        let mid = begin + (end - begin) / 2;
        if self.partition {
            let vertices = self.vertices;
            self.indices[begin..end].select_nth_unstable_by(mid - begin, |&a, &b| {
                let a = vertices[a as usize].position()[axis];
                let b = vertices[b as usize].position()[axis];
                a.total_cmp(&b)
            });
        }

        let separator = self.position(mid);
        let (left_aabb, right_aabb) = aabb.split(axis, separator);

        // Children are patched in once known.
        self.nodes.push(KdNode::Leaf { aabb, begin, end });
        let left = self.layout(begin, mid, left_aabb, level + 1);
        if self.cancelled {
            return id;
        }
        let right = self.layout(mid, end, right_aabb, level + 1);

        self.nodes[id as usize] = KdNode::Inner {
            aabb,
            axis: axis as u8,
            separator,
            left,
            right,
        };
        id
    }

    fn leaf_done(&mut self, points_done: usize) {
        if let Some(progress) = self.progress.as_mut() {
            if !progress.report(points_done as u64, self.indices.len() as u64) {
                self.cancelled = true;
            }
        }
    }
}
