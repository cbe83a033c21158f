//! Depth-cycled-axis KD-tree with binned split selection and ratio-triggered
//! subtree rebuilds. Grounded on `original_source/Kdtree.h` / `.cpp`.

use crate::broad_phase::BroadPhase;
use crate::config::KdTreeConfig;
use crate::sphere::{lower_bound, upper_bound, Sphere};
use cgmath::Point3;
use tracing::{debug, trace};

#[derive(Debug)]
struct KdNode {
    parent: Option<usize>,
    children: [Option<usize>; 2],
    split_axis: usize,
    split_pos: f32,
    min: Point3<f32>,
    max: Point3<f32>,
    head: Option<usize>,
    local_count: usize,
    /// Count of objects in this node's local list plus its whole subtree.
    object_total: usize,
}

/// KD-tree over sphere AABBs: split axis rotates with depth (x, y, z, x, …),
/// straddlers are kept at the node whose plane they cross, and lopsided
/// subtrees are invalidated and rebuilt from scratch.
#[derive(Debug)]
pub struct KdTree {
    config: KdTreeConfig,
    nodes: Vec<KdNode>,
    root: usize,
    next: Vec<Option<usize>>,
    cell_of: Vec<Option<usize>>,
}

impl Default for KdTree {
    fn default() -> Self {
        Self::new()
    }
}

impl KdTree {
    pub fn new() -> Self {
        Self::with_config(KdTreeConfig::default())
    }

    pub fn with_config(config: KdTreeConfig) -> Self {
        KdTree {
            config,
            nodes: Vec::new(),
            root: 0,
            next: Vec::new(),
            cell_of: Vec::new(),
        }
    }

    fn build_arena(&mut self, depth_remaining: i32, axis: usize, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(KdNode {
            parent,
            children: [None, None],
            split_axis: axis,
            split_pos: 0.0,
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(0.0, 0.0, 0.0),
            head: None,
            local_count: 0,
            object_total: 0,
        });

        if depth_remaining > 0 {
            let next_axis = (axis + 1) % 3;
            let left = self.build_arena(depth_remaining - 1, next_axis, Some(index));
            let right = self.build_arena(depth_remaining - 1, next_axis, Some(index));
            self.nodes[index].children = [Some(left), Some(right)];
        }

        index
    }

    fn insert_local(&mut self, node: usize, index: usize) {
        self.next[index] = self.nodes[node].head;
        self.nodes[node].head = Some(index);
        self.nodes[node].local_count += 1;
        self.cell_of[index] = Some(node);
    }

    /// Bins `list` along `node`'s split axis, picks the split position
    /// minimizing `|start_sum[k] - end_sum[B-k-1]|`, partitions the list into
    /// left/right/local, and recurses. Leaves (preallocated depth limit, or
    /// populations too small to bin) store their whole list locally.
    fn construct(&mut self, node: usize, list: Vec<usize>, min: Point3<f32>, max: Point3<f32>, spheres: &[Sphere]) {
        self.nodes[node].min = min;
        self.nodes[node].max = max;
        self.nodes[node].object_total = list.len();
        self.nodes[node].head = None;
        self.nodes[node].local_count = 0;

        let is_leaf = self.nodes[node].children[0].is_none();
        let axis = self.nodes[node].split_axis;
        let span = max[axis] - min[axis];

        if is_leaf || list.len() < self.config.bin_count || span <= 0.0 {
            for &i in &list {
                self.insert_local(node, i);
            }
            return;
        }

        let bin_count = self.config.bin_count;
        let mut start_bins = vec![0usize; bin_count];
        let mut end_bins = vec![0usize; bin_count];
        for &i in &list {
            let lo_bin = (((lower_bound(&spheres[i], axis) - min[axis]) / span) * bin_count as f32)
                .floor()
                .clamp(0.0, (bin_count - 1) as f32) as usize;
            let hi_bin = (((upper_bound(&spheres[i], axis) - min[axis]) / span) * bin_count as f32)
                .floor()
                .clamp(0.0, (bin_count - 1) as f32) as usize;
            start_bins[lo_bin] += 1;
            end_bins[hi_bin] += 1;
        }

        let mut start_sum = vec![0usize; bin_count];
        let mut end_sum = vec![0usize; bin_count];
        let mut running = 0;
        for k in 0..bin_count {
            running += start_bins[k];
            start_sum[k] = running;
        }
        running = 0;
        for k in 0..bin_count {
            running += end_bins[k];
            end_sum[k] = running;
        }

        let mut best_k = 0;
        let mut best_diff = i64::MAX;
        for k in 0..bin_count {
            let diff = (start_sum[k] as i64 - end_sum[bin_count - k - 1] as i64).abs();
            if diff < best_diff {
                best_diff = diff;
                best_k = k;
            }
        }
        let split_pos = min[axis] + (best_k as f32) * (span / bin_count as f32);
        self.nodes[node].split_pos = split_pos;

        let mut left_list = Vec::new();
        let mut right_list = Vec::new();
        let mut local_list = Vec::new();
        for i in list {
            let lo = lower_bound(&spheres[i], axis);
            let hi = upper_bound(&spheres[i], axis);
            if hi <= split_pos {
                left_list.push(i);
            } else if lo >= split_pos {
                right_list.push(i);
            } else {
                local_list.push(i);
            }
        }

        for &i in &local_list {
            self.insert_local(node, i);
        }

        let mut left_max = max;
        let mut right_min = min;
        match axis {
            0 => {
                left_max.x = split_pos;
                right_min.x = split_pos;
            }
            1 => {
                left_max.y = split_pos;
                right_min.y = split_pos;
            }
            _ => {
                left_max.z = split_pos;
                right_min.z = split_pos;
            }
        }

        let left_child = self.nodes[node].children[0].unwrap();
        let right_child = self.nodes[node].children[1].unwrap();
        self.construct(left_child, left_list, min, left_max, spheres);
        self.construct(right_child, right_list, right_min, max, spheres);
    }

    fn check_contains(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        for axis in 0..3 {
            if n.min[axis] > sphere.position[axis] - sphere.radius {
                return false;
            }
            if n.max[axis] < sphere.position[axis] + sphere.radius {
                return false;
            }
        }
        true
    }

    fn check_straddle(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        if n.children[0].is_none() {
            return true;
        }
        let axis = n.split_axis;
        let lo = lower_bound(sphere, axis);
        let hi = upper_bound(sphere, axis);
        lo < n.split_pos && hi > n.split_pos
    }

    fn remove_object(&mut self, index: usize) {
        let node = self.cell_of[index].expect("sphere must have a home node");
        if self.nodes[node].head == Some(index) {
            self.nodes[node].head = self.next[index];
        } else {
            let mut iter = self.nodes[node].head;
            while let Some(current) = iter {
                if self.next[current] == Some(index) {
                    self.next[current] = self.next[index];
                    break;
                }
                iter = self.next[current];
            }
        }
        self.next[index] = None;
        self.nodes[node].local_count -= 1;
        self.cell_of[index] = None;

        let mut cursor = Some(node);
        while let Some(n) = cursor {
            self.nodes[n].object_total -= 1;
            cursor = self.nodes[n].parent;
        }
    }

    fn add_object(&mut self, index: usize, spheres: &[Sphere]) {
        let mut node = self.root;
        loop {
            self.nodes[node].object_total += 1;
            let children = self.nodes[node].children;
            if children[0].is_none() {
                self.insert_local(node, index);
                return;
            }

            let axis = self.nodes[node].split_axis;
            let split = self.nodes[node].split_pos;
            let lo = lower_bound(&spheres[index], axis);
            let hi = upper_bound(&spheres[index], axis);

            if hi <= split {
                node = children[0].unwrap();
            } else if lo >= split {
                node = children[1].unwrap();
            } else {
                self.insert_local(node, index);
                return;
            }
        }
    }

    fn collect_subtree(&mut self, node: usize, out: &mut Vec<usize>) {
        let mut iter = self.nodes[node].head;
        while let Some(i) = iter {
            let next = self.next[i];
            self.next[i] = None;
            self.cell_of[i] = None;
            out.push(i);
            iter = next;
        }
        self.nodes[node].head = None;
        self.nodes[node].local_count = 0;
        self.nodes[node].object_total = 0;

        let children = self.nodes[node].children;
        if let Some(left) = children[0] {
            self.collect_subtree(left, out);
        }
        if let Some(right) = children[1] {
            self.collect_subtree(right, out);
        }
    }

    fn invalidate_and_rebuild(&mut self, node: usize, spheres: &[Sphere]) {
        let min = self.nodes[node].min;
        let max = self.nodes[node].max;
        let mut list = Vec::new();
        self.collect_subtree(node, &mut list);
        debug!(node, count = list.len(), "kd-tree subtree rebuild");
        self.construct(node, list, min, max, spheres);
    }

    /// Walks the tree looking for a subtree whose left/right split has
    /// drifted outside the acceptable ratio, rebuilding the first one found
    /// (bottom of the walk stops there; the rebuild starts fresh, so there's
    /// nothing stale left lower in that subtree to re-examine this tick).
    fn rebalance(&mut self, node: usize, spheres: &[Sphere]) {
        let children = self.nodes[node].children;
        let (left, right) = match (children[0], children[1]) {
            (Some(l), Some(r)) => (l, r),
            _ => return,
        };

        let denom = self.nodes[node].object_total - self.nodes[node].local_count;
        if denom > 0 {
            let ratio = self.nodes[left].object_total as f32 / denom as f32;
            if ratio < self.config.accept_lower || ratio > self.config.accept_upper {
                self.invalidate_and_rebuild(node, spheres);
                return;
            }
        }

        self.rebalance(left, spheres);
        self.rebalance(right, spheres);
    }

    fn entirely_left(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        upper_bound(sphere, n.split_axis) <= n.split_pos
    }

    fn entirely_right(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        lower_bound(sphere, n.split_axis) >= n.split_pos
    }

    fn check_node_collisions(&self, node: usize, query: usize, spheres: &mut [Sphere]) {
        let mut iter = self.nodes[node].head;
        while let Some(other) = iter {
            if other != query && spheres[query].overlaps(&spheres[other]) {
                spheres[query].colliding = true;
                spheres[other].colliding = true;
            }
            iter = self.next[other];
        }

        let children = self.nodes[node].children;
        if children[0].is_none() {
            return;
        }

        if self.entirely_left(node, &spheres[query]) {
            let left = children[0].unwrap();
            if self.nodes[left].object_total > 0 {
                self.check_node_collisions(left, query, spheres);
            }
        }
        if self.entirely_right(node, &spheres[query]) {
            let right = children[1].unwrap();
            if self.nodes[right].object_total > 0 {
                self.check_node_collisions(right, query, spheres);
            }
        }
    }
}

fn population_bounds(spheres: &[Sphere]) -> (Point3<f32>, Point3<f32>) {
    if spheres.is_empty() {
        return (Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
    }
    let mut min = [f32::INFINITY; 3];
    let mut max = [f32::NEG_INFINITY; 3];
    for sphere in spheres {
        for axis in 0..3 {
            min[axis] = min[axis].min(sphere.position[axis] - sphere.radius);
            max[axis] = max[axis].max(sphere.position[axis] + sphere.radius);
        }
    }
    (Point3::new(min[0], min[1], min[2]), Point3::new(max[0], max[1], max[2]))
}

impl BroadPhase for KdTree {
    fn add_objects(&mut self, spheres: &mut [Sphere]) {
        self.nodes.clear();
        self.root = self.build_arena(self.config.max_depth, 0, None);
        self.next = vec![None; spheres.len()];
        self.cell_of = vec![None; spheres.len()];

        let (min, max) = population_bounds(spheres);
        let list: Vec<usize> = (0..spheres.len()).collect();
        self.construct(self.root, list, min, max, spheres);
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        for i in 0..spheres.len() {
            let node = self.cell_of[i].expect("sphere must have a home node");
            let settled = self.check_contains(node, &spheres[i]) && self.check_straddle(node, &spheres[i]);
            if !settled {
                self.remove_object(i);
                self.add_object(i, spheres);
            }
        }

        self.rebalance(self.root, spheres);

        for i in 0..spheres.len() {
            self.check_node_collisions(self.root, i, spheres);
        }

        trace!(nodes = self.nodes.len(), "kd-tree update complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    #[test]
    fn flags_overlapping_pair() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(0.0, 0.0, 0.0), 1.0),
            Sphere::new(1, Point3::new(1.5, 0.0, 0.0), 1.0),
        ];
        let mut bp = KdTree::new();
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding);
        assert!(spheres[1].colliding);
    }

    #[test]
    fn skips_far_apart_pair() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(-50.0, 0.0, 0.0), 1.0),
            Sphere::new(1, Point3::new(50.0, 0.0, 0.0), 1.0),
        ];
        let mut bp = KdTree::new();
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(!spheres[0].colliding);
        assert!(!spheres[1].colliding);
    }

    #[test]
    fn skewed_population_triggers_subtree_rebuild() {
        // Start with a root split evenly between left and right halves...
        let mut spheres: Vec<Sphere> = (0..100)
            .map(|i| Sphere::new(i, Point3::new(-50.0 + i as f32 * 0.1, 0.0, 0.0), 0.5))
            .chain((0..100).map(|i| Sphere::new(100 + i, Point3::new(10.0 + i as f32 * 0.1, 0.0, 0.0), 0.5)))
            .collect();

        let mut bp = KdTree::new();
        bp.add_objects(&mut spheres);

        let root = bp.root;
        let left0 = bp.nodes[root].children[0].unwrap();
        let right0 = bp.nodes[root].children[1].unwrap();
        let initial_ratio = bp.nodes[left0].object_total as f32
            / (bp.nodes[left0].object_total + bp.nodes[right0].object_total) as f32;
        assert!((0.4..=0.6).contains(&initial_ratio));

        // ...then drag every right-side sphere into the left half, which
        // reinserts them from the root and skews the split badly.
        for sphere in spheres.iter_mut().skip(100) {
            sphere.position.x -= 60.0;
        }
        bp.update(&mut spheres);

        // The rebalance pass must have invalidated and rebuilt the subtree,
        // landing back within the acceptable ratio.
        let left1 = bp.nodes[root].children[0].unwrap();
        let right1 = bp.nodes[root].children[1].unwrap();
        let rebuilt_total = bp.nodes[left1].object_total + bp.nodes[right1].object_total;
        assert_eq!(rebuilt_total, spheres.len());
        let rebuilt_ratio = bp.nodes[left1].object_total as f32 / rebuilt_total as f32;
        assert!(
            (0.4..=0.6).contains(&rebuilt_ratio),
            "expected rebalance to restore an acceptable split, got {rebuilt_ratio}"
        );
    }

    #[test]
    fn idempotent_when_nothing_moves() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(0.0, 0.0, 0.0), 1.0),
            Sphere::new(1, Point3::new(1.5, 0.0, 0.0), 1.0),
        ];
        let mut bp = KdTree::new();
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        let first = (spheres[0].colliding, spheres[1].colliding);
        bp.update(&mut spheres);
        let second = (spheres[0].colliding, spheres[1].colliding);
        assert_eq!(first, second);
    }
}
