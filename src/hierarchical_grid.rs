//! Multiple geometric levels of hashed cells, each sized for a different
//! range of object diameters. Grounded on
//! `original_source/HierarchicalGrid.h` / `.cpp`.

use crate::broad_phase::BroadPhase;
use crate::config::{GridConfig, HASH_PRIME_LEVEL, HASH_PRIME_X, HASH_PRIME_Y, HASH_PRIME_Z};
use crate::error::{BroadPhaseError, Result};
use crate::sphere::Sphere;
use tracing::trace;

#[cfg(test)]
use std::cell::RefCell;
#[cfg(test)]
use std::collections::HashSet;

#[derive(Debug, Default)]
struct Bucket {
    last_frame: u64,
    head: Option<usize>,
}

/// A multi-level spatial hash grid: level 0 is sized for the smallest
/// object, and each subsequent level is `cell_growth` times coarser, up to
/// a level that comfortably holds the largest object.
#[derive(Debug)]
pub struct HierarchicalGrid {
    config: GridConfig,
    buckets: Vec<Bucket>,
    next: Vec<Option<usize>>,
    cell_of: Vec<Option<usize>>,
    /// Fixed per sphere at `add_objects` time and never reassigned
    /// afterward — the original never relevels an object once installed.
    sphere_level: Vec<usize>,
    level_cell_size: Vec<f32>,
    /// Number of spheres assigned to each level; fixed after `add_objects`.
    level_object_count: Vec<usize>,
    frame_count: u64,
    #[cfg(test)]
    test_seen: RefCell<HashSet<(u64, usize)>>,
}

impl HierarchicalGrid {
    pub fn new(bucket_count: usize) -> Result<Self> {
        Self::with_config(bucket_count, GridConfig::default())
    }

    pub fn with_config(bucket_count: usize, config: GridConfig) -> Result<Self> {
        if bucket_count == 0 {
            return Err(BroadPhaseError::ZeroBucketCount(bucket_count));
        }
        Ok(HierarchicalGrid {
            config,
            buckets: (0..bucket_count).map(|_| Bucket::default()).collect(),
            next: Vec::new(),
            cell_of: Vec::new(),
            sphere_level: Vec::new(),
            level_cell_size: Vec::new(),
            level_object_count: Vec::new(),
            frame_count: 0,
            #[cfg(test)]
            test_seen: RefCell::new(HashSet::new()),
        })
    }

    fn hash(&self, x: i64, y: i64, z: i64, level: usize) -> usize {
        let h = (HASH_PRIME_X.wrapping_mul(x))
            .wrapping_add(HASH_PRIME_Y.wrapping_mul(y))
            .wrapping_add(HASH_PRIME_Z.wrapping_mul(z))
            .wrapping_add(HASH_PRIME_LEVEL.wrapping_mul(level as i64));
        h.rem_euclid(self.buckets.len() as i64) as usize
    }

    fn bucket_of(&self, sphere: &Sphere, level: usize) -> usize {
        let cell_size = self.level_cell_size[level];
        let p = sphere.position;
        let x = (p.x / cell_size).floor() as i64;
        let y = (p.y / cell_size).floor() as i64;
        let z = (p.z / cell_size).floor() as i64;
        self.hash(x, y, z, level)
    }

    fn insert(&mut self, bucket: usize, index: usize) {
        self.next[index] = self.buckets[bucket].head;
        self.buckets[bucket].head = Some(index);
        self.cell_of[index] = Some(bucket);
    }

    fn remove(&mut self, bucket: usize, index: usize) {
        if self.buckets[bucket].head == Some(index) {
            self.buckets[bucket].head = self.next[index];
        } else {
            let mut iter = self.buckets[bucket].head;
            while let Some(current) = iter {
                if self.next[current] == Some(index) {
                    self.next[current] = self.next[index];
                    break;
                }
                iter = self.next[current];
            }
        }
        self.next[index] = None;
    }

    fn check_collisions(&mut self, bucket: usize, frame: u64, query: usize, spheres: &mut [Sphere]) {
        #[cfg(test)]
        {
            let mut seen = self.test_seen.borrow_mut();
            assert!(
                seen.insert((frame, bucket)),
                "bucket {bucket} checked twice for the same outer sphere in frame {frame}"
            );
        }

        self.buckets[bucket].last_frame = frame;

        let mut iter = self.buckets[bucket].head;
        while let Some(other) = iter {
            if other != query && spheres[query].overlaps(&spheres[other]) {
                spheres[query].colliding = true;
                spheres[other].colliding = true;
            }
            iter = self.next[other];
        }
    }
}

impl BroadPhase for HierarchicalGrid {
    fn add_objects(&mut self, spheres: &mut [Sphere]) {
        let min_radius = spheres
            .iter()
            .map(|s| s.radius)
            .fold(f32::INFINITY, f32::min)
            .max(self.config.epsilon);
        let max_radius = spheres.iter().map(|s| s.radius).fold(0.0f32, f32::max).max(min_radius);

        let ratio = self.config.object_cell_ratio;
        let mut level_size = min_radius * 2.0 * ratio;
        let top_bound = max_radius * 2.0 * ratio;

        self.level_cell_size = vec![level_size];
        while self.level_cell_size.last().copied().unwrap_or(level_size) < top_bound
            && self.level_cell_size.len() < 64
        {
            level_size *= self.config.cell_growth;
            self.level_cell_size.push(level_size);
        }

        let levels = self.level_cell_size.len();
        self.sphere_level = vec![0; spheres.len()];
        self.level_object_count = vec![0; levels];
        self.next = vec![None; spheres.len()];
        self.cell_of = vec![None; spheres.len()];

        for i in 0..spheres.len() {
            let diameter = spheres[i].radius * 2.0;
            let level = (0..levels)
                .find(|&l| self.level_cell_size[l] / ratio >= diameter)
                .unwrap_or(levels - 1);
            self.sphere_level[i] = level;
            self.level_object_count[level] += 1;

            let bucket = self.bucket_of(&spheres[i], level);
            self.insert(bucket, i);
        }
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        for i in 0..spheres.len() {
            let level = self.sphere_level[i];
            let desired = self.bucket_of(&spheres[i], level);
            if self.cell_of[i] != Some(desired) {
                if let Some(old) = self.cell_of[i] {
                    self.remove(old, i);
                }
                self.insert(desired, i);
            }

            self.frame_count += 1;
            if self.frame_count == u64::MAX {
                tracing::warn!("hierarchical grid frame counter reached u64::MAX, wrapping");
                self.frame_count = 0;
            }
            let frame = self.frame_count;

            let home = self.cell_of[i].expect("sphere was just inserted into a bucket");
            self.check_collisions(home, frame, i, spheres);

            let radius = spheres[i].radius;
            let p = spheres[i].position;

            for l in 0..self.level_cell_size.len() {
                if self.level_object_count[l] == 0 {
                    continue;
                }
                let cell_size = self.level_cell_size[l];
                let inflate = cell_size / self.config.object_cell_ratio + self.config.epsilon;

                let min = (
                    ((p.x - radius - inflate) / cell_size).floor() as i64,
                    ((p.y - radius - inflate) / cell_size).floor() as i64,
                    ((p.z - radius - inflate) / cell_size).floor() as i64,
                );
                let max = (
                    ((p.x + radius + inflate) / cell_size).ceil() as i64,
                    ((p.y + radius + inflate) / cell_size).ceil() as i64,
                    ((p.z + radius + inflate) / cell_size).ceil() as i64,
                );

                for x in min.0..=max.0 {
                    for y in min.1..=max.1 {
                        for z in min.2..=max.2 {
                            let bucket = self.hash(x, y, z, l);
                            if self.buckets[bucket].last_frame == frame {
                                continue;
                            }
                            self.check_collisions(bucket, frame, i, spheres);
                        }
                    }
                }
            }
        }

        trace!(
            levels = self.level_cell_size.len(),
            frame_count = self.frame_count,
            "hierarchical grid update complete"
        );
    }
}
