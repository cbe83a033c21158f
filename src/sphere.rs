//! The single shape type every broad-phase structure operates on.

use cgmath::{InnerSpace, Point3, Vector3};

/// A moving sphere under broad-phase test.
///
/// `position`, `velocity`, `radius` and `id` are owned by the tick driver —
/// no `BroadPhase` implementation in this crate ever writes them. `colliding`
/// is shared: the driver clears it before calling `update`, and the active
/// `BroadPhase` sets it on every sphere found to overlap another.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere {
    /// Stable, unique identifier. Typically (but not necessarily) the
    /// sphere's index in the population slice.
    pub id: u32,
    pub position: Point3<f32>,
    pub velocity: Vector3<f32>,
    pub radius: f32,
    pub colliding: bool,
}

impl Sphere {
    pub fn new(id: u32, position: Point3<f32>, radius: f32) -> Self {
        Sphere {
            id,
            position,
            velocity: Vector3::new(0.0, 0.0, 0.0),
            radius,
            colliding: false,
        }
    }

    /// `|centerA - centerB|² <= (rA + rB)²`, the one predicate every
    /// structure in this crate agrees on. Touching spheres (distance exactly
    /// equal to the sum of radii) count as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &Sphere) -> bool {
        let delta = self.position - other.position;
        let radius_sum = self.radius + other.radius;
        delta.magnitude2() <= radius_sum * radius_sum
    }
}

/// Lower bound of a sphere's axis-aligned bounding box on one axis.
#[inline]
pub fn lower_bound(sphere: &Sphere, axis: usize) -> f32 {
    sphere.position[axis] - sphere.radius
}

/// Upper bound of a sphere's axis-aligned bounding box on one axis.
#[inline]
pub fn upper_bound(sphere: &Sphere, axis: usize) -> f32 {
    sphere.position[axis] + sphere.radius
}
