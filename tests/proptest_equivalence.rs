//! Property-based cross-structure equivalence: for arbitrary small
//! populations, every structure must agree with the brute-force reference.

use broadphase::{BroadPhase, BruteForce, HierarchicalGrid, KdTree, Octree, Sphere, SortAndSweep, UniformGrid};
use cgmath::Point3;
use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

fn flagged(spheres: &[Sphere]) -> Vec<u32> {
    let mut ids: Vec<u32> = spheres.iter().filter(|s| s.colliding).map(|s| s.id).collect();
    ids.sort_unstable();
    ids
}

fn run(structure: &mut dyn BroadPhase, spheres: &mut [Sphere]) -> Vec<u32> {
    structure.add_objects(spheres);
    structure.update(spheres);
    flagged(spheres)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_structure_agrees_with_brute_force(
        spheres in prop_vec((-30.0f32..30.0, -30.0f32..30.0, -30.0f32..30.0, 0.0f32..4.0), 1..40)
    ) {
        let base: Vec<Sphere> = spheres
            .into_iter()
            .enumerate()
            .map(|(i, (x, y, z, radius))| Sphere::new(i as u32, Point3::new(x, y, z), radius))
            .collect();

        let mut reference = base.clone();
        let expected = run(&mut BruteForce::new(), &mut reference);

        let mut check = |mut structure: Box<dyn BroadPhase>| {
            let mut spheres = base.clone();
            let got = run(structure.as_mut(), &mut spheres);
            prop_assert_eq!(got, expected.clone());
            Ok(())
        };

        check(Box::new(SortAndSweep::new()))?;
        check(Box::new(UniformGrid::new(256).unwrap()))?;
        check(Box::new(HierarchicalGrid::new(256).unwrap()))?;
        check(Box::new(Octree::new(Point3::new(0.0, 0.0, 0.0), 60.0, false).unwrap()))?;
        check(Box::new(Octree::new(Point3::new(0.0, 0.0, 0.0), 60.0, true).unwrap()))?;
        check(Box::new(KdTree::new()))?;
    }
}
