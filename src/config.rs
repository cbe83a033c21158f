//! Compile-time tunables shared by the grid and tree structures.
//!
//! These mirror the static constants of the original tool (one per
//! structure, documented in `SPEC_FULL.md`'s tunable constants table).
//! They're grouped here as `Default`-able structs rather than bare
//! `const`s so a caller can override them per instance without touching
//! the algorithm code, the same role the original's file-scope statics
//! played.

/// Tunables shared by [`crate::UniformGrid`] and [`crate::HierarchicalGrid`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    /// Cell size is this many times the largest (or, per level, the
    /// relevant) object diameter.
    pub object_cell_ratio: f32,
    /// Each hierarchical level's cell size is this many times the one
    /// below it. Unused by `UniformGrid`.
    pub cell_growth: f32,
    /// Slack added to an object's AABB before walking neighboring cells,
    /// guarding against an object sitting exactly on a cell boundary.
    pub epsilon: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            object_cell_ratio: 4.0,
            cell_growth: 4.0,
            epsilon: 5.0e-4,
        }
    }
}

/// Tunables shared by [`crate::Octree`] and [`crate::LooseOctree`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OctreeConfig {
    pub max_depth: i32,
    pub max_object_node_ratio: f32,
    /// Octree-only: minimum object count in a batch before `add_objects`
    /// bothers partitioning it per-node rather than inserting one at a
    /// time. `LooseOctree` does not use this.
    pub min_split_count: usize,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        OctreeConfig {
            max_depth: 5,
            max_object_node_ratio: 8.0,
            min_split_count: 32,
        }
    }
}

/// Tunables for [`crate::KdTree`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KdTreeConfig {
    pub max_depth: i32,
    pub bin_count: usize,
    pub accept_lower: f32,
    pub accept_upper: f32,
}

impl Default for KdTreeConfig {
    fn default() -> Self {
        KdTreeConfig {
            max_depth: 12,
            bin_count: 32,
            accept_lower: 0.4,
            accept_upper: 0.6,
        }
    }
}

/// Default hash bucket count suggested (not required) to be a power of two.
pub const DEFAULT_HASH_BUCKETS: usize = 1024;

/// Large-prime hash constants shared by the two hash grids.
pub const HASH_PRIME_X: i64 = 563_300_407;
pub const HASH_PRIME_Y: i64 = 495_250_453;
pub const HASH_PRIME_Z: i64 = 236_350_427;
pub const HASH_PRIME_LEVEL: i64 = 153_950_359;
