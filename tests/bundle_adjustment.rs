use nalgebra::{Matrix3, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use acsfm::sensors::camera::perspective::Perspective;
use acsfm::sfm::bundle_adjustment::{BaProblemBuilder, BundleSolver, IntrinsicConfig, LevenbergMarquardt};
use acsfm::sfm::CameraPose;
use acsfm::Float;

fn camera_intrinsic() -> Perspective<Float> {
    Perspective::new(800.0, 800.0, 320.0, 240.0, 0.0)
}

fn ground_truth_cameras() -> Vec<CameraPose> {
    vec![
        CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros()),
        CameraPose::new(
            camera_intrinsic(),
            Rotation3::from_euler_angles(0.02, -0.05, 0.01).matrix().into_owned(),
            Vector3::<Float>::new(-0.9, 0.05, 0.1)
        ),
    ]
}

fn scene_points(rng: &mut StdRng, n: usize) -> Vec<Vector3<Float>> {
    (0..n).map(|_| Vector3::<Float>::new(
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-1.5..1.5),
        rng.gen_range(4.0..8.0)
    )).collect()
}

fn assemble(config: IntrinsicConfig, cameras: &[CameraPose], points: &[Vector3<Float>], noise: Float, rng: &mut StdRng) -> acsfm::sfm::bundle_adjustment::BaProblem {
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut builder = BaProblemBuilder::new(config);
    for (idx, camera) in cameras.iter().enumerate() {
        builder.add_camera(idx, 0, camera, [0.0; 3]);
    }
    for (track, point) in points.iter().enumerate() {
        let perturbed = point + Vector3::<Float>::new(
            noise * normal.sample(rng),
            noise * normal.sample(rng),
            noise * normal.sample(rng)
        );
        builder.add_point(track, &perturbed);
    }
    for (track, point) in points.iter().enumerate() {
        for (idx, camera) in cameras.iter().enumerate() {
            let observation = camera.project_point(point).expect("synthetic point behind camera");
            builder.add_observation(idx, track, observation[0], observation[1]);
        }
    }
    builder.build()
}

#[test]
fn parameter_buffer_is_ordered_cameras_groups_points() {
    let mut rng = StdRng::seed_from_u64(3);
    let cameras = ground_truth_cameras();
    let points = scene_points(&mut rng, 10);

    let problem = assemble(IntrinsicConfig::SharedFocal, &cameras, &points, 0.0, &mut rng);

    assert_eq!(problem.n_cameras, 2);
    assert_eq!(problem.n_groups, 1);
    assert_eq!(problem.n_points, 10);
    // [2 cameras * 6 | 1 group * 1 | 10 points * 3]
    assert_eq!(problem.parameters.len(), 2 * 6 + 1 + 10 * 3);
    assert_eq!(problem.camera_offset(1), 6);
    assert_eq!(problem.group_offset(0), 12);
    assert_eq!(problem.point_offset(0), 13);
    assert_eq!(problem.parameters[problem.group_offset(0)], 800.0);
    assert_eq!(problem.observations.len(), 20);

    // Accessors bind each observation to its owning blocks.
    for obs_idx in 0..problem.observations.len() {
        assert_eq!(problem.camera_for(obs_idx).len(), 6);
        assert_eq!(problem.point_for(obs_idx).len(), 3);
        assert_eq!(problem.intrinsics_for(obs_idx).len(), 1);
    }
}

#[test]
fn exact_problem_has_zero_residuals() {
    let mut rng = StdRng::seed_from_u64(5);
    let cameras = ground_truth_cameras();
    let points = scene_points(&mut rng, 15);

    let problem = assemble(IntrinsicConfig::FocalPerCamera, &cameras, &points, 0.0, &mut rng);
    assert!(problem.rmse() < 1e-9);
}

#[test]
fn refinement_reduces_reprojection_error() {
    let mut rng = StdRng::seed_from_u64(9);
    let cameras = ground_truth_cameras();
    let points = scene_points(&mut rng, 25);

    let mut problem = assemble(IntrinsicConfig::FocalPerCamera, &cameras, &points, 0.05, &mut rng);
    let rmse_before = problem.rmse();
    assert!(rmse_before > 0.5);

    let solver = LevenbergMarquardt::default();
    let solved = solver.solve(&mut problem);

    assert!(solved);
    let rmse_after = problem.rmse();
    assert!(rmse_after < rmse_before / 10.0, "rmse {} -> {}", rmse_before, rmse_after);
}

#[test]
fn failed_refinement_keeps_pre_optimization_state() {
    // A problem with no observations is unusable; parameters must be intact.
    let cameras = ground_truth_cameras();
    let mut builder = BaProblemBuilder::new(IntrinsicConfig::FocalPerCamera);
    for (idx, camera) in cameras.iter().enumerate() {
        builder.add_camera(idx, 0, camera, [0.0; 3]);
    }
    let mut problem = builder.build();
    let before = problem.parameters.clone();

    let solver = LevenbergMarquardt::default();
    assert!(!solver.solve(&mut problem));
    assert_eq!(problem.parameters, before);
}

#[test]
fn shared_brown_block_carries_distortion_terms() {
    let mut rng = StdRng::seed_from_u64(21);
    let cameras = ground_truth_cameras();
    let points = scene_points(&mut rng, 8);

    let problem = assemble(IntrinsicConfig::SharedBrown, &cameras, &points, 0.0, &mut rng);
    assert_eq!(problem.config.group_block_size(), 6);
    let offset = problem.group_offset(0);
    assert_eq!(problem.parameters[offset], 800.0);
    assert_eq!(problem.parameters[offset + 1], 320.0);
    assert_eq!(problem.parameters[offset + 2], 240.0);
    assert_eq!(problem.parameters[offset + 3], 0.0);
}
