//! Octree variant whose containment test is against a doubled half-width,
//! letting a node's box overlap its siblings so objects move between cells
//! less often. Grounded on `original_source/LooseOctree.h` / `.cpp`.

use crate::broad_phase::BroadPhase;
use crate::config::OctreeConfig;
use crate::error::{BroadPhaseError, Result};
use crate::sphere::Sphere;
use cgmath::Point3;
use tracing::trace;

#[derive(Debug)]
struct LooseOctreeNode {
    parent: Option<usize>,
    children: [Option<usize>; 8],
    head: Option<usize>,
    object_count: usize,
    center: Point3<f32>,
    half_width: f32,
}

/// Loose octree, incremental-update or full-rebuild mode.
#[derive(Debug)]
pub struct LooseOctree {
    config: OctreeConfig,
    rebuild_mode: bool,
    nodes: Vec<LooseOctreeNode>,
    root: usize,
    center: Point3<f32>,
    half_width: f32,
    next: Vec<Option<usize>>,
    cell_of: Vec<Option<usize>>,
}

impl LooseOctree {
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
        Ok(LooseOctree {
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
        self.nodes.push(LooseOctreeNode {
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

    /// Loose containment: the sphere's AABB fits inside a cube of full side
    /// `4 * half_width` (doubled half-width) centered on the node.
    fn check_loose_contains(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        let loose_half = n.half_width * 2.0;
        for axis in 0..3 {
            if n.center[axis] - loose_half > sphere.position[axis] - sphere.radius {
                return false;
            }
            if n.center[axis] + loose_half < sphere.position[axis] + sphere.radius {
                return false;
            }
        }
        true
    }

    /// Tight containment, used only when walking upward for a reinsertion
    /// ancestor — looseness must not be inherited by an ancestor search or
    /// the containment hierarchy stops being well-defined.
    fn check_contains_non_loose(&self, node: usize, sphere: &Sphere) -> bool {
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

    /// Squared distance from the query sphere's center to the node's loose
    /// box, compared against the sphere's own radius squared.
    fn check_boundaries(&self, node: usize, sphere: &Sphere) -> bool {
        let n = &self.nodes[node];
        let loose_half = n.half_width * 2.0;
        let mut sq_distance = 0.0f32;
        for axis in 0..3 {
            let min = n.center[axis] - loose_half;
            let max = n.center[axis] + loose_half;
            let v = sphere.position[axis];
            if v < min {
                sq_distance += (min - v) * (min - v);
            } else if v > max {
                sq_distance += (v - max) * (v - max);
            }
        }
        sq_distance <= sphere.radius * sphere.radius
    }

    fn add_object_to_node(&mut self, mut node: usize, index: usize, spheres: &[Sphere]) {
        loop {
            let n = &self.nodes[node];
            let center = spheres[index].position;
            let radius = spheres[index].radius;
            let mut position_bits = 0usize;
            let mut straddle = false;

            // Child-descent index uses the tight half-width, same as a
            // regular octree, even though containment here is loose.
            for axis in 0..3 {
                if n.center[axis] < center[axis] {
                    if n.center[axis] - (n.half_width / 2.0) > center[axis] - radius {
                        straddle = true;
                        break;
                    }
                    position_bits |= 1 << axis;
                } else if n.center[axis] + (n.half_width / 2.0) < center[axis] + radius {
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

    fn clear_all_lists(&mut self) {
        for node in &mut self.nodes {
            node.head = None;
            node.object_count = 0;
        }
        for slot in &mut self.cell_of {
            *slot = None;
        }
    }

    fn check_node_collisions(&self, node: usize, query: usize, spheres: &mut [Sphere]) {
        if !self.check_boundaries(node, &spheres[query]) {
            return;
        }

        for child in self.nodes[node].children {
            if let Some(child) = child {
                self.check_node_collisions(child, query, spheres);
            }
        }

        let mut iter = self.nodes[node].head;
        while let Some(other) = iter {
            if other != query && spheres[query].overlaps(&spheres[other]) {
                spheres[query].colliding = true;
                spheres[other].colliding = true;
            }
            iter = self.next[other];
        }
    }
}

impl BroadPhase for LooseOctree {
    fn add_objects(&mut self, spheres: &mut [Sphere]) {
        let depth = self.depth_for(spheres);

        self.nodes.clear();
        self.root = self.build_arena(self.center, self.half_width, depth, None);

        self.next = vec![None; spheres.len()];
        self.cell_of = vec![None; spheres.len()];

        for i in 0..spheres.len() {
            self.add_object_to_node(self.root, i, spheres);
        }
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        if self.rebuild_mode {
            self.clear_all_lists();
            for i in 0..spheres.len() {
                self.add_object_to_node(self.root, i, spheres);
            }
        } else {
            for i in 0..spheres.len() {
                let mut node = self.cell_of[i].expect("sphere must have a home node");
                if self.check_loose_contains(node, &spheres[i]) {
                    continue;
                }

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

                // Walk up to the first *non-loose* containing ancestor,
                // falling back to the root if none is found.
                loop {
                    match self.nodes[node].parent {
                        Some(parent) => {
                            node = parent;
                            if self.check_contains_non_loose(node, &spheres[i]) {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                self.add_object_to_node(node, i, spheres);
            }
        }

        for i in 0..spheres.len() {
            self.check_node_collisions(self.root, i, spheres);
        }

        trace!(nodes = self.nodes.len(), rebuild_mode = self.rebuild_mode, "loose octree update complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Point3;

    fn make(rebuild: bool) -> LooseOctree {
        LooseOctree::new(Point3::new(0.0, 0.0, 0.0), 100.0, rebuild).unwrap()
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
    fn far_apart_pair_not_flagged() {
        let mut spheres = vec![
            Sphere::new(0, Point3::new(-90.0, -90.0, -90.0), 1.0),
            Sphere::new(1, Point3::new(90.0, 90.0, 90.0), 1.0),
        ];
        let mut bp = make(false);
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(!spheres[0].colliding);
        assert!(!spheres[1].colliding);
    }

    #[test]
    fn rejects_non_positive_half_width() {
        assert!(LooseOctree::new(Point3::new(0.0, 0.0, 0.0), 0.0, false).is_err());
    }
}
