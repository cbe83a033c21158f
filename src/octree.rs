//! Axis-aligned octree with "stuck at straddle" placement, in either
//! incremental or full-rebuild mode. Grounded on
//! `original_source/Octree.h` / `.cpp`.

use crate::broad_phase::BroadPhase;
use crate::config::OctreeConfig;
use crate::error::{BroadPhaseError, Result};
use crate::sphere::Sphere;
use cgmath::Point3;
use tracing::trace;

#[derive(Debug)]
struct OctreeNode {
    parent: Option<usize>,
    children: [Option<usize>; 8],
    head: Option<usize>,
    object_count: usize,
    center: Point3<f32>,
    half_width: f32,
}

/// Octree that can operate in incremental-update or full-rebuild mode.
#[derive(Debug)]
pub struct Octree {
    config: OctreeConfig,
    rebuild_mode: bool,
    nodes: Vec<OctreeNode>,
    root: usize,
    center: Point3<f32>,
    half_width: f32,
    next: Vec<Option<usize>>,
    cell_of: Vec<Option<usize>>,
}

impl Octree {
    pub fn new(center: Point3<f32>, half_width: f32, rebuild_mode: bool) -> Result<Self> {
        Self::with_config(center, half_width, rebuild_mode, OctreeConfig::default())
    }

    pub fn with_config(
        center: Point3<f32>,
        half_width: f32,
        rebuild_mode: bool,
        config: OctreeConfig,
    ) -> Result<Self> {
        if half_width <= 0.0 {
            return Err(BroadPhaseError::NonPositiveHalfWidth(half_width));
        }
        Ok(Octree {
            config,
            rebuild_mode,
            nodes: Vec::new(),
            root: 0,
            center,
            half_width,
            next: Vec::new(),
            cell_of: Vec::new(),
        })
    }

    fn build_arena(&mut self, center: Point3<f32>, half_width: f32, depth_remaining: i32, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(OctreeNode {
            parent,
            children: [None; 8],
            head: None,
            object_count: 0,
            center,
            half_width,
        });

        if depth_remaining > 0 {
            let step = half_width * 0.5;
            for i in 0..8 {
                let mut child_center = center;
                child_center.x += if i & 1 != 0 { step } else { -step };
                child_center.y += if i & 2 != 0 { step } else { -step };
                child_center.z += if i & 4 != 0 { step } else { -step };

                let child = self.build_arena(child_center, step, depth_remaining - 1, Some(index));
                self.nodes[index].children[i] = Some(child);
            }
        }

        index
    }

    /// Depth at which the finest cell is still at least `max_object_node_ratio`
    /// times the *smallest* radius in the population — matching the original
    /// tool's sizing pass, which (despite the variable's name) is driven by
    /// radius rather than diameter.
    fn depth_for(&self, spheres: &[Sphere]) -> i32 {
        let mut smallest_radius = spheres.iter().map(|s| s.radius).fold(f32::INFINITY, f32::min);
        if !smallest_radius.is_finite() {
            smallest_radius = 1.0;
        }
        let threshold = smallest_radius * self.config.max_object_node_ratio;

        let mut cell_size = 2.0 * self.half_width;
        let mut depth = 0;
        while threshold <= cell_size && depth < self.config.max_depth {
            cell_size /= 2.0;
            depth += 1;
        }
        depth
    }

    fn check_contains(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        for axis in 0..3 {
            if n.center[axis] - n.half_width > sphere.position[axis] - sphere.radius {
                return false;
            }
            if n.center[axis] + n.half_width < sphere.position[axis] + sphere.radius {
                return false;
            }
        }
        true
    }

    /// "Stuck at straddle": descend into the child indicated by the sign of
    /// `center - node.center` per axis, unless the sphere straddles that
    /// axis's splitting plane, in which case it stays at this node.
    fn add_object_to_node(&mut self, mut node: usize, index: usize, spheres: &[Sphere]) {
        loop {
            let n = &self.nodes[node];
            let center = spheres[index].position;
            let radius = spheres[index].radius;
            let mut position_bits = 0usize;
            let mut straddle = false;

            for axis in 0..3 {
                if n.center[axis] < center[axis] {
                    if n.center[axis] > center[axis] - radius {
                        straddle = true;
                        break;
                    }
                    position_bits |= 1 << axis;
                } else if n.center[axis] < center[axis] + radius {
                    straddle = true;
                    break;
                }
            }

            if !straddle {
                if let Some(child) = self.nodes[node].children[position_bits] {
                    node = child;
                    continue;
                }
            }

            self.next[index] = self.nodes[node].head;
            self.nodes[node].head = Some(index);
            self.nodes[node].object_count += 1;
            self.cell_of[index] = Some(node);
            return;
        }
    }

    /// Batched bulk-insert: partitions `list` by straddle/child-index once,
    /// storing straddlers (and any sphere whose indicated child doesn't
    /// exist) locally and recursing only into children that received at
    /// least one object. Below `min_split_count` objects, gives up on
    /// partitioning and stores the whole list at `node`.
    fn add_objects_to_node(&mut self, node: usize, list: Vec<usize>, spheres: &[Sphere]) {
        if list.len() < self.config.min_split_count {
            for i in list {
                self.next[i] = self.nodes[node].head;
                self.nodes[node].head = Some(i);
                self.nodes[node].object_count += 1;
                self.cell_of[i] = Some(node);
            }
            return;
        }

        let mut child_lists: [Vec<usize>; 8] = Default::default();
        let n_center = self.nodes[node].center;
        let children = self.nodes[node].children;

        for i in list {
            let center = spheres[i].position;
            let radius = spheres[i].radius;
            let mut position_bits = 0usize;
            let mut straddle = false;

            for axis in 0..3 {
                if n_center[axis] < center[axis] {
                    if n_center[axis] > center[axis] - radius {
                        straddle = true;
                        break;
                    }
                    position_bits |= 1 << axis;
                } else if n_center[axis] < center[axis] + radius {
                    straddle = true;
                    break;
                }
            }

            if !straddle && children[position_bits].is_some() {
                child_lists[position_bits].push(i);
            } else {
                self.next[i] = self.nodes[node].head;
                self.nodes[node].head = Some(i);
                self.nodes[node].object_count += 1;
                self.cell_of[i] = Some(node);
            }
        }

        for (position, child_list) in child_lists.into_iter().enumerate() {
            if let (Some(child), false) = (children[position], child_list.is_empty()) {
                self.add_objects_to_node(child, child_list, spheres);
            }
        }
    }

    fn clear_all_lists(&mut self) {
        for node in &mut self.nodes {
            node.head = None;
            node.object_count = 0;
        }
        for slot in &mut self.cell_of {
            *slot = None;
        }
    }

    fn check_node_collisions(&self, node: usize, ancestors: &[usize], spheres: &mut [Sphere]) {
        let mut local: Vec<usize> = Vec::new();
        let mut iter = self.nodes[node].head;
        while let Some(i) = iter {
            local.push(i);
            iter = self.next[i];
        }

        for i in 0..local.len() {
            for j in (i + 1)..local.len() {
                let (a, b) = (local[i], local[j]);
                if spheres[a].overlaps(&spheres[b]) {
                    spheres[a].colliding = true;
                    spheres[b].colliding = true;
                }
            }
        }

        for &ancestor in ancestors {
            let mut iter = self.nodes[ancestor].head;
            while let Some(b) = iter {
                for &a in &local {
                    if spheres[a].overlaps(&spheres[b]) {
                        spheres[a].colliding = true;
                        spheres[b].colliding = true;
                    }
                }
                iter = self.next[b];
            }
        }

        let mut next_ancestors = ancestors.to_vec();
        next_ancestors.push(node);
        for child in self.nodes[node].children {
            if let Some(child) = child {
                self.check_node_collisions(child, &next_ancestors, spheres);
            }
        }
    }
}

impl BroadPhase for Octree {
    fn add_objects(&mut self, spheres: &mut [Sphere]) {
        let depth = self.depth_for(spheres);

        self.nodes.clear();
        self.root = self.build_arena(self.center, self.half_width, depth, None);

        self.next = vec![None; spheres.len()];
        self.cell_of = vec![None; spheres.len()];

        if self.rebuild_mode {
            for i in 0..spheres.len() {
                self.add_object_to_node(self.root, i, spheres);
            }
        } else {
            self.add_objects_to_node(self.root, (0..spheres.len()).collect(), spheres);
        }
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        if self.rebuild_mode {
            self.clear_all_lists();
            self.add_objects_to_node(self.root, (0..spheres.len()).collect(), spheres);
        } else {
            for i in 0..spheres.len() {
                let mut node = self.cell_of[i].expect("sphere must have a home node");
                if self.check_contains(node, &spheres[i]) {
                    continue;
                }

                // Unlink from its current node.
                if self.nodes[node].head == Some(i) {
                    self.nodes[node].head = self.next[i];
                } else {
                    let mut iter = self.nodes[node].head;
                    while let Some(current) = iter {
                        if self.next[current] == Some(i) {
                            self.next[current] = self.next[i];
                            break;
                        }
                        iter = self.next[current];
                    }
                }
                self.nodes[node].object_count -= 1;
                self.next[i] = None;
                self.cell_of[i] = None;

                // Walk up to the first ancestor that (still) contains it.
                while let Some(parent) = self.nodes[node].parent {
                    node = parent;
                    if self.check_contains(node, &spheres[i]) {
                        break;
                    }
                }

                self.add_object_to_node(node, i, spheres);
            }
        }

        self.check_node_collisions(self.root, &[], spheres);

        trace!(nodes = self.nodes.len(), rebuild_mode = self.rebuild_mode, "octree update complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    fn make(rebuild: bool) -> Octree {
        Octree::new(Point3::new(0.0, 0.0, 0.0), 100.0, rebuild).unwrap()
    }

    #[test]
    fn flags_overlapping_pair_incremental() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(0.0, 0.0, 0.0), 1.0),
            Sphere::new(1, Point3::new(1.5, 0.0, 0.0), 1.0),
        ];
        let mut bp = make(false);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding);
        assert!(spheres[1].colliding);
    }

    #[test]
    fn flags_overlapping_pair_rebuild() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(0.0, 0.0, 0.0), 1.0),
            Sphere::new(1, Point3::new(1.5, 0.0, 0.0), 1.0),
        ];
        let mut bp = make(true);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding);
        assert!(spheres[1].colliding);
    }

    #[test]
    fn ancestor_and_deep_descendant_collide() {
        // A big sphere straddling the root stays at the root; a tiny sphere
        // deep in a leaf near it must still be caught via the ancestor stack.
        let mut spheres = vec![
            Sphere::new(0, Point3::new(0.0, 0.0, 0.0), 90.0),
            Sphere::new(1, Point3::new(50.0, 50.0, 50.0), 1.0),
        ];
        let mut bp = make(false);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding);
        assert!(spheres[1].colliding);
    }

    #[test]
    fn sphere_straddling_child_boundary_still_collides_with_sibling() {
        // Sphere 0 sits just past the root's x=0 midplane on the positive
        // side, but its radius pulls its lower edge back across it — it must
        // straddle and stay at the root, not get pushed into the +x,+y,+z
        // child. Sphere 1 sits cleanly in the -x,+y,+z sibling child, with
        // its edge just reaching across into sphere 0's true extent. If the
        // straddle test were compared against the child center instead of
        // the root's own center, sphere 0 would wrongly land in a sibling
        // child and this real overlap would never be tested.
        let mut spheres = vec![
            Sphere::new(0, Point3::new(10.0, 90.0, 90.0), 15.0),
            Sphere::new(1, Point3::new(-20.0, 90.0, 90.0), 16.0),
        ];
        let mut bp = make(false);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding, "straddling sphere was not flagged");
        assert!(spheres[1].colliding, "sibling sphere was not flagged");
    }

    #[test]
    fn rejects_non_positive_half_width() {
        assert!(Octree::new(Point3::new(0.0, 0.0, 0.0), 0.0, false).is_err());
    }

    #[test]
    fn batched_initial_insert_above_min_split_count_still_finds_the_pair() {
        // 40 spheres spread far apart exercises the batched partition path
        // in `add_objects` (min_split_count defaults to 32), plus one
        // overlapping pair mixed in.
        let mut spheres: Vec<Sphere> = (0..40)
            .map(|i| Sphere::new(i, Point3::new(-95.0 + i as f32 * 5.0, 0.0, 0.0), 1.0))
            .collect();
        spheres.push(Sphere::new(40, Point3::new(-95.5, 0.0, 0.0), 1.0));

        let mut bp = make(false);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);

        assert!(spheres[0].colliding, "overlapping pair missed by batched insert");
        assert!(spheres[40].colliding, "overlapping pair missed by batched insert");
        assert!(!spheres[5].colliding, "isolated sphere falsely flagged");
    }
}
