//! The trait implemented by every broad-phase collision structure.

use crate::sphere::Sphere;
use std::fmt::Debug;

/// Trait implemented by all broad phase algorithms compared by this crate.
///
/// A `BroadPhase` owns whatever spatial index it needs internally, and is
/// responsible only for flagging overlapping pairs — it never reports pairs
/// as a list, and it never touches anything on [`Sphere`] but `colliding`.
pub trait BroadPhase: Debug {
    /// Install the population and build the initial index. Called exactly
    /// once, before any call to [`update`](BroadPhase::update).
    fn add_objects(&mut self, spheres: &mut [Sphere]);

    /// Repair the index for whatever motion happened since the last call,
    /// then flag every overlapping pair by setting `colliding = true` on
    /// both spheres involved. Idempotent if nothing moved and `colliding`
    /// was left set from the previous call.
    fn update(&mut self, spheres: &mut [Sphere]);
}
