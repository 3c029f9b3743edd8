use approx::assert_relative_eq;
use nalgebra::{Matrix3, Rotation3, Vector2, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use acsfm::numerics::pose::rotation_angular_distance;
use acsfm::robust::kernels::essential::EssentialKernel;
use acsfm::robust::kernels::fundamental::FundamentalKernel;
use acsfm::robust::kernels::homography::HomographyKernel;
use acsfm::robust::kernels::resection::ResectionKernelK;
use acsfm::robust::acransac;
use acsfm::sensors::camera::perspective::Perspective;
use acsfm::sensors::camera::Camera;
use acsfm::sfm::epipolar::{decompose_essential, sampson_distance_squared};
use acsfm::sfm::triangulation::{inter_ray_angle, triangulate_dlt};
use acsfm::sfm::CameraPose;
use acsfm::Float;

const IMAGE_DIMENSIONS: (usize, usize) = (640, 480);

fn camera_intrinsic() -> Perspective<Float> {
    Perspective::new(800.0, 800.0, 320.0, 240.0, 0.0)
}

fn synthetic_scene(rng: &mut StdRng, n: usize) -> Vec<Vector3<Float>> {
    (0..n).map(|_| Vector3::<Float>::new(
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-1.5..1.5),
        rng.gen_range(4.0..8.0)
    )).collect()
}

fn second_camera() -> CameraPose {
    let rotation = Rotation3::from_euler_angles(0.02, -0.06, 0.01).matrix().into_owned();
    let translation = Vector3::<Float>::new(-0.8, 0.1, 0.05);
    CameraPose::new(camera_intrinsic(), rotation, translation)
}

fn project_all(camera: &CameraPose, points: &[Vector3<Float>]) -> Vec<Vector2<Float>> {
    points.iter().map(|p| camera.project_point(p).expect("synthetic point behind camera")).collect()
}

#[test]
fn triangulation_round_trip_reprojects_within_tolerance() {
    let mut rng = StdRng::seed_from_u64(7);
    let points = synthetic_scene(&mut rng, 40);

    let camera_one = CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
    let camera_two = second_camera();

    let x1 = project_all(&camera_one, &points);
    let x2 = project_all(&camera_two, &points);

    for i in 0..points.len() {
        let triangulated = triangulate_dlt(&camera_one.projection_matrix(), &x1[i], &camera_two.projection_matrix(), &x2[i])
            .expect("triangulation failed on clean data");
        let reprojected_one = camera_one.project_point(&triangulated).unwrap();
        let reprojected_two = camera_two.project_point(&triangulated).unwrap();
        assert!((reprojected_one - x1[i]).norm() < 1e-6);
        assert!((reprojected_two - x2[i]).norm() < 1e-6);
        assert!(inter_ray_angle(&triangulated, &camera_one.center(), &camera_two.center()) > 1.0);
    }
}

#[test]
fn essential_estimation_recovers_relative_motion() {
    let mut rng = StdRng::seed_from_u64(11);
    let points = synthetic_scene(&mut rng, 60);

    let camera_one = CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
    let camera_two = second_camera();

    let mut x1 = project_all(&camera_one, &points);
    let mut x2 = project_all(&camera_two, &points);

    // Inject gross outliers.
    let n_outliers = 12;
    for _ in 0..n_outliers {
        x1.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
        x2.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }

    let intrinsic = camera_intrinsic();
    let kernel = EssentialKernel::new(
        &x1,
        &x2,
        &intrinsic.get_inverse_projection(),
        &intrinsic.get_inverse_projection(),
        IMAGE_DIMENSIONS
    );
    let result = acransac(&kernel, 2048, None);

    assert!(result.found());
    assert!(result.inliers.len() >= points.len() - 2);
    assert!(result.inliers.len() <= points.len() + 2);

    let essential = result.model.unwrap();
    let (bearings_one, bearings_two) = kernel.bearings();
    let inlier_b1: Vec<Vector2<Float>> = result.inliers.iter().map(|&i| bearings_one[i]).collect();
    let inlier_b2: Vec<Vector2<Float>> = result.inliers.iter().map(|&i| bearings_two[i]).collect();

    let (rotation, translation) = decompose_essential(&essential, &inlier_b1, &inlier_b2).expect("decomposition failed");
    assert!(rotation_angular_distance(&rotation, &camera_two.rotation) < 0.5);

    let direction = translation.normalize();
    let expected = camera_two.translation.normalize();
    assert!(direction.dot(&expected).abs() > 0.999);
}

#[test]
fn fundamental_kernel_finds_epipolar_geometry() {
    let mut rng = StdRng::seed_from_u64(13);
    let points = synthetic_scene(&mut rng, 50);

    let camera_one = CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
    let camera_two = second_camera();

    let mut x1 = project_all(&camera_one, &points);
    let mut x2 = project_all(&camera_two, &points);
    for _ in 0..10 {
        x1.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
        x2.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }

    let kernel = FundamentalKernel::new(&x1, &x2, IMAGE_DIMENSIONS);
    let result = acransac(&kernel, 2048, None);

    assert!(result.found());
    assert!(result.inliers.len() >= points.len() - 2);

    let fundamental = result.model.unwrap();
    for i in 0..points.len() {
        assert!(sampson_distance_squared(&fundamental, &x1[i], &x2[i]).sqrt() < 0.5);
    }
}

#[test]
fn homography_kernel_recovers_planar_mapping() {
    let mut rng = StdRng::seed_from_u64(17);

    // Points on the z = 5 plane induce an exact homography between views.
    let points: Vec<Vector3<Float>> = (0..40).map(|_| Vector3::<Float>::new(
        rng.gen_range(-2.0..2.0),
        rng.gen_range(-1.5..1.5),
        5.0
    )).collect();

    let camera_one = CameraPose::new(camera_intrinsic(), Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
    let camera_two = second_camera();

    let mut x1 = project_all(&camera_one, &points);
    let mut x2 = project_all(&camera_two, &points);
    for _ in 0..8 {
        x1.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
        x2.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
    }

    let kernel = HomographyKernel::new(&x1, &x2, IMAGE_DIMENSIONS);
    let result = acransac(&kernel, 2048, None);

    assert!(result.found());
    assert!(result.inliers.len() >= points.len() - 2);

    let homography = result.model.unwrap();
    for i in 0..points.len() {
        let mapped = homography * Vector3::<Float>::new(x1[i][0], x1[i][1], 1.0);
        let mapped = Vector2::<Float>::new(mapped[0] / mapped[2], mapped[1] / mapped[2]);
        assert!((mapped - x2[i]).norm() < 0.5);
    }
}

#[test]
fn calibrated_resection_recovers_pose() {
    let mut rng = StdRng::seed_from_u64(19);
    let points = synthetic_scene(&mut rng, 40);

    let camera = second_camera();
    let mut observations = project_all(&camera, &points);
    let mut world = points.clone();

    // Wrong 3D bindings act as resection outliers.
    for _ in 0..8 {
        observations.push(Vector2::<Float>::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)));
        world.push(Vector3::<Float>::new(rng.gen_range(-2.0..2.0), rng.gen_range(-1.5..1.5), rng.gen_range(4.0..8.0)));
    }

    let intrinsic = camera_intrinsic();
    let kernel = ResectionKernelK::new(
        &observations,
        &world,
        &intrinsic.get_projection(),
        &intrinsic.get_inverse_projection(),
        IMAGE_DIMENSIONS
    );
    let result = acransac(&kernel, 2048, None);

    assert!(result.found());
    assert!(result.inliers.len() >= points.len() - 2);

    let (rotation, translation) = result.model.unwrap();
    assert!(rotation_angular_distance(&rotation, &camera.rotation) < 0.5);
    assert_relative_eq!(translation[0], camera.translation[0], epsilon = 0.05);
    assert_relative_eq!(translation[1], camera.translation[1], epsilon = 0.05);
    assert_relative_eq!(translation[2], camera.translation[2], epsilon = 0.05);

    // The recovered pose reprojects the genuine correspondences tightly.
    let pose = CameraPose::new(intrinsic, rotation, translation);
    for i in 0..points.len() {
        assert!(pose.reprojection_error(&points[i], &observations[i]) < 0.5);
    }
}
