//! Compares `update` cost per structure at varying population sizes — a
//! reproducible, headless stand-in for the original tool's interactive FPS
//! counter.

use broadphase::{
    BroadPhase, BruteForce, HierarchicalGrid, KdTree, LooseOctree, Octree, Sphere, SortAndSweep,
    UniformGrid,
};
use cgmath::Point3;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn population(count: usize, seed: u64) -> Vec<Sphere> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let position = Point3::new(
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
                rng.random_range(-50.0..50.0),
            );
            Sphere::new(i as u32, position, rng.random_range(1.25..7.25))
        })
        .collect()
}

fn structures() -> Vec<(&'static str, Box<dyn BroadPhase>)> {
    vec![
        ("brute_force", Box::new(BruteForce::new())),
        ("sort_and_sweep", Box::new(SortAndSweep::new())),
        ("uniform_grid", Box::new(UniformGrid::new(2048).unwrap())),
        ("hierarchical_grid", Box::new(HierarchicalGrid::new(2048).unwrap())),
        (
            "octree_incremental",
            Box::new(Octree::new(Point3::new(0.0, 0.0, 0.0), 100.0, false).unwrap()),
        ),
        (
            "loose_octree_incremental",
            Box::new(LooseOctree::new(Point3::new(0.0, 0.0, 0.0), 100.0, false).unwrap()),
        ),
        ("kd_tree", Box::new(KdTree::new())),
    ]
}

fn update_cost(c: &mut Criterion) {
    for &count in &[100usize, 1_000, 4_000] {
        let mut group = c.benchmark_group(format!("update/{count}"));
        for (name, mut structure) in structures() {
            let mut spheres = population(count, 7);
            structure.add_objects(&mut spheres);
            // Settle the index once so the measured loop is steady-state
            // `update` cost, not first-insertion cost.
            structure.update(&mut spheres);

            group.bench_with_input(BenchmarkId::new(name, count), &count, |b, _| {
                b.iter(|| {
                    for sphere in spheres.iter_mut() {
                        sphere.colliding = false;
                    }
                    structure.update(&mut spheres);
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, update_cost);
criterion_main!(benches);
