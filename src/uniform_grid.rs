//! Fixed array of hash buckets, sized once from the population's largest
//! sphere. Grounded on `original_source/UniformGrid.h` / `.cpp`.

use crate::broad_phase::BroadPhase;
use crate::config::{GridConfig, DEFAULT_HASH_BUCKETS, HASH_PRIME_X, HASH_PRIME_Y, HASH_PRIME_Z};
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

/// A single-level spatial hash grid with frame-stamped neighbor dedup.
#[derive(Debug)]
pub struct UniformGrid {
    config: GridConfig,
    buckets: Vec<Bucket>,
    /// `next[i]` is the next sphere index in the same bucket's intrusive
    /// list as sphere `i`, standing in for the original's `next` pointer.
    next: Vec<Option<usize>>,
    /// `cell_of[i]` is the bucket sphere `i` currently lives in.
    cell_of: Vec<Option<usize>>,
    cell_size: f32,
    frame_count: u64,
    #[cfg(test)]
    test_seen: RefCell<HashSet<(u64, usize)>>,
}

impl UniformGrid {
    pub fn new(bucket_count: usize) -> Result<Self> {
        Self::with_config(bucket_count, GridConfig::default())
    }

    pub fn with_config(bucket_count: usize, config: GridConfig) -> Result<Self> {
        if bucket_count == 0 {
            return Err(BroadPhaseError::ZeroBucketCount(bucket_count));
        }
        Ok(UniformGrid {
            config,
            buckets: (0..bucket_count).map(|_| Bucket::default()).collect(),
            next: Vec::new(),
            cell_of: Vec::new(),
            cell_size: 1.0,
            frame_count: 0,
            #[cfg(test)]
            test_seen: RefCell::new(HashSet::new()),
        })
    }

    fn hash(&self, x: i64, y: i64, z: i64) -> usize {
        let h = (HASH_PRIME_X.wrapping_mul(x))
            .wrapping_add(HASH_PRIME_Y.wrapping_mul(y))
            .wrapping_add(HASH_PRIME_Z.wrapping_mul(z));
        h.rem_euclid(self.buckets.len() as i64) as usize
    }

    fn cell_coords(&self, sphere: &Sphere) -> (i64, i64, i64) {
        let p = sphere.position;
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        )
    }

    fn bucket_of(&self, sphere: &Sphere) -> usize {
        let (x, y, z) = self.cell_coords(sphere);
        self.hash(x, y, z)
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

    /// Stamp this bucket as checked this frame and test every other sphere
    /// linked into it against `query`. Always stamps, even if it was already
    /// stamped this frame (matching the original's unconditional stamp).
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

impl BroadPhase for UniformGrid {
    fn add_objects(&mut self, spheres: &mut [Sphere]) {
        let max_radius = spheres.iter().map(|s| s.radius).fold(0.0f32, f32::max);
        self.cell_size = (max_radius.max(f32::MIN_POSITIVE) * 2.0) * self.config.object_cell_ratio;

        self.next = vec![None; spheres.len()];
        self.cell_of = vec![None; spheres.len()];

        for i in 0..spheres.len() {
            let bucket = self.bucket_of(&spheres[i]);
            self.insert(bucket, i);
        }
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        let inflate = self.cell_size / self.config.object_cell_ratio + self.config.epsilon;

        for i in 0..spheres.len() {
            let desired = self.bucket_of(&spheres[i]);
            if self.cell_of[i] != Some(desired) {
                if let Some(old) = self.cell_of[i] {
                    self.remove(old, i);
                }
                self.insert(desired, i);
            }

            self.frame_count += 1;
            if self.frame_count == u64::MAX {
                tracing::warn!("uniform grid frame counter reached u64::MAX, wrapping");
                self.frame_count = 0;
            }
            let frame = self.frame_count;

            let home = self.cell_of[i].expect("sphere was just inserted into a bucket");
            self.check_collisions(home, frame, i, spheres);

            let radius = spheres[i].radius;
            let p = spheres[i].position;
            let min = (
                ((p.x - radius - inflate) / self.cell_size).floor() as i64,
                ((p.y - radius - inflate) / self.cell_size).floor() as i64,
                ((p.z - radius - inflate) / self.cell_size).floor() as i64,
            );
            let max = (
                ((p.x + radius + inflate) / self.cell_size).ceil() as i64,
                ((p.y + radius + inflate) / self.cell_size).ceil() as i64,
                ((p.z + radius + inflate) / self.cell_size).ceil() as i64,
            );

            for x in min.0..=max.0 {
                for y in min.1..=max.1 {
                    for z in min.2..=max.2 {
                        let bucket = self.hash(x, y, z);
                        if self.buckets[bucket].last_frame == frame {
                            continue;
                        }
                        self.check_collisions(bucket, frame, i, spheres);
                    }
                }
            }
        }

        trace!(frame_count = self.frame_count, "uniform grid update complete");
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
        let mut bp = UniformGrid::new(1024).unwrap();
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres[0].colliding);
        assert!(spheres[1].colliding);
    }

    #[test]
    fn rejects_zero_buckets() {
        assert!(UniformGrid::new(0).is_err());
    }

    #[test]
    fn dense_cluster_never_double_checks_a_bucket_per_sphere() {
        // many spheres sharing one cell; the internal assert inside
        // check_collisions would panic if dedup broke.
        let mut spheres: Vec<Sphere> = (0..50)
            .map(|i| Sphere::new(i, Point3::new(0.01 * i as f32, 0.0, 0.0), 0.5))
            .collect();
        let mut bp = UniformGrid::new(64).unwrap();
        bp.add_objects(&mut spheres);
        bp.update(&mut spheres);
        assert!(spheres.iter().all(|s| s.colliding));
    }
}
