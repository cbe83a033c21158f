//! All ordered pairs, tested once each. O(n^2), no bookkeeping.

use crate::broad_phase::BroadPhase;
use crate::sphere::Sphere;

/// The reference structure every other structure is checked against: every
/// pair `(A, B)` with `A.id < B.id` is tested exactly once per `update`.
#[derive(Debug, Default)]
pub struct BruteForce;

impl BruteForce {
    pub fn new() -> Self {
        BruteForce
    }
}

impl BroadPhase for BruteForce {
    fn add_objects(&mut self, _spheres: &mut [Sphere]) {
        // No index to build; the whole population is scanned every tick.
    }

    fn update(&mut self, spheres: &mut [Sphere]) {
        // Each unordered pair of distinct spheres is visited exactly once;
        // the id ordering from the original is an artifact of walking
        // pointers, not a semantic requirement once indices already do that.
        for i in 0..spheres.len() {
            for j in (i + 1)..spheres.len() {
                if spheres[i].overlaps(&spheres[j]) {
                    spheres[i].colliding = true;
                    spheres[j].colliding = true;
                }
            }
        }
    }
}
