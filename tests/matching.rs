use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use acsfm::features::{ImageFeature, IndexedMatch, PairwiseMatches};
use acsfm::matching::{GeometricFilter, GeometricModel};
use acsfm::sensors::camera::perspective::Perspective;
use acsfm::sfm::CameraPose;
use acsfm::Float;

fn camera_intrinsic() -> Perspective<Float> {
    Perspective::new(800.0, 800.0, 320.0, 240.0, 0.0)
}

#[test]
fn geometric_filter_keeps_epipolar_consistent_matches() {
    let mut rng = StdRng::seed_from_u64(23);

    let camera_one = CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
    let camera_two = CameraPose::new(
        camera_intrinsic(),
        Rotation3::from_euler_angles(0.02, -0.06, 0.01).matrix().into_owned(),
        Vector3::<Float>::new(-0.8, 0.1, 0.05)
    );

    let points: Vec<Vector3<Float>> = (0..50).map(|_| Vector3::<Float>::new(
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-1.5..1.5),
        rng.gen_range(4.0..8.0)
    )).collect();

    let mut features_one = Vec::<ImageFeature>::new();
    let mut features_two = Vec::<ImageFeature>::new();
    for point in &points {
        let x1 = camera_one.project_point(point).unwrap();
        let x2 = camera_two.project_point(point).unwrap();
        features_one.push(ImageFeature::new(x1[0], x1[1]));
        features_two.push(ImageFeature::new(x2[0], x2[1]));
    }
    // Clutter features participating only in wrong matches.
    let n_clutter = 10;
    for _ in 0..n_clutter {
        features_one.push(ImageFeature::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
        features_two.push(ImageFeature::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }

    let mut putative = PairwiseMatches::new();
    for i in 0..features_one.len() {
        putative.insert(0, 1, IndexedMatch::new(i, i));
    }

    let mut features = HashMap::new();
    features.insert(0, features_one);
    features.insert(1, features_two);
    let mut dimensions = HashMap::new();
    dimensions.insert(0, (640, 480));
    dimensions.insert(1, (640, 480));

    let filter = GeometricFilter{model: GeometricModel::Fundamental, estimator_iterations: 2048, precision: None};
    let geometric = filter.filter(&putative, &features, &dimensions);

    let kept = geometric.get(0, 1).expect("pair dropped entirely");
    assert!(kept.len() >= points.len() - 2);
    // The clutter bindings cannot survive a tight epipolar model.
    assert!(kept.len() <= points.len() + 2);
}

#[test]
fn geometric_filter_drops_structureless_pairs() {
    let mut rng = StdRng::seed_from_u64(29);

    let random_features = |rng: &mut StdRng| (0..30).map(|_| {
        ImageFeature::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0))
    }).collect::<Vec<ImageFeature>>();

    let mut features = HashMap::new();
    features.insert(0, random_features(&mut rng));
    features.insert(1, random_features(&mut rng));
    let mut dimensions = HashMap::new();
    dimensions.insert(0, (640, 480));
    dimensions.insert(1, (640, 480));

    let mut putative = PairwiseMatches::new();
    for i in 0..30 {
        putative.insert(0, 1, IndexedMatch::new(i, i));
    }

    let filter = GeometricFilter::default();
    let geometric = filter.filter(&putative, &features, &dimensions);

    assert!(geometric.get(0, 1).map_or(true, |v| v.len() < 18));
}
