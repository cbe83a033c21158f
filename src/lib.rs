//! Seven interchangeable broad-phase collision structures over a population
//! of moving spheres, built to be compared directly against one another:
//! same input, same overlap predicate, same [`BroadPhase`] contract.
//!
//! Pick a structure, call [`BroadPhase::add_objects`] once, then
//! [`BroadPhase::update`] every tick after moving the population. Every
//! structure agrees on which pairs overlap; they differ only in how they
//! get there.

mod broad_phase;
mod brute_force;
mod config;
mod error;
mod hierarchical_grid;
mod kd_tree;
mod loose_octree;
mod octree;
mod sort_and_sweep;
mod sphere;
mod uniform_grid;

pub use broad_phase::BroadPhase;
pub use brute_force::BruteForce;
pub use config::{GridConfig, KdTreeConfig, OctreeConfig, DEFAULT_HASH_BUCKETS};
pub use error::{BroadPhaseError, Result};
pub use hierarchical_grid::HierarchicalGrid;
pub use kd_tree::KdTree;
pub use loose_octree::LooseOctree;
pub use octree::Octree;
pub use sort_and_sweep::SortAndSweep;
pub use sphere::{lower_bound, upper_bound, Sphere};
pub use uniform_grid::UniformGrid;
