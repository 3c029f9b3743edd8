extern crate nalgebra as na;

use na::{Matrix3, Matrix3x4, Vector2, Vector3};

use crate::numerics::Conditioner;
use crate::robust::Kernel;
use crate::sfm::resection::{pose_from_normalized_projection, resection_dlt};
use crate::{float, Float};

/**
 * Uncalibrated resection kernel: 6-point DLT on conditioned 2D points and
 * raw 3D points, squared reprojection error in the conditioned frame,
 * point-to-point meaningfulness constant.
 */
pub struct ResectionKernel {
    points2d: Vec<Vector2<Float>>,
    points3d: Vec<Vector3<Float>>,
    conditioner: Conditioner,
    log_alpha0: Float
}

impl ResectionKernel {
    pub fn new(points2d_pixels: &[Vector2<Float>], points3d: &[Vector3<Float>], image_dimensions: (usize, usize)) -> ResectionKernel {
        assert_eq!(points2d_pixels.len(), points3d.len());
        assert!(!points2d_pixels.is_empty());

        let conditioner = Conditioner::new(points2d_pixels);
        let points2d = conditioner.apply_all(points2d_pixels);

        let (w, h) = (image_dimensions.0 as Float, image_dimensions.1 as Float);
        let scale_sqrd = conditioner.scale * conditioner.scale;
        let log_alpha0 = (float::consts::PI / (w * h) / scale_sqrd).log10();

        ResectionKernel{points2d, points3d: points3d.to_vec(), conditioner, log_alpha0}
    }
}

#[allow(non_snake_case)]
fn reprojection_error_squared(P: &Matrix3x4<Float>, x: &Vector2<Float>, point: &Vector3<Float>) -> Float {
    let u = P[(0, 0)] * point[0] + P[(0, 1)] * point[1] + P[(0, 2)] * point[2] + P[(0, 3)];
    let v = P[(1, 0)] * point[0] + P[(1, 1)] * point[1] + P[(1, 2)] * point[2] + P[(1, 3)];
    let w = P[(2, 0)] * point[0] + P[(2, 1)] * point[1] + P[(2, 2)] * point[2] + P[(2, 3)];
    match w.abs() {
        w_abs if w_abs > 1e-12 => (Vector2::<Float>::new(u / w, v / w) - x).norm_squared(),
        _ => float::INFINITY
    }
}

#[allow(non_snake_case)]
impl Kernel for ResectionKernel {
    type Model = Matrix3x4<Float>;

    fn minimum_samples(&self) -> usize { 6 }
    fn max_models(&self) -> usize { 1 }

    fn num_samples(&self) -> usize {
        self.points2d.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<Matrix3x4<Float>> {
        let points2d = sample.iter().map(|&i| self.points2d[i]).collect::<Vec<Vector2<Float>>>();
        let points3d = sample.iter().map(|&i| self.points3d[i]).collect::<Vec<Vector3<Float>>>();
        resection_dlt(&points2d, &points3d).into_iter().collect::<Vec<Matrix3x4<Float>>>()
    }

    fn error(&self, index: usize, model: &Matrix3x4<Float>) -> Float {
        reprojection_error_squared(model, &self.points2d[index], &self.points3d[index])
    }

    fn log_alpha0(&self) -> Float {
        self.log_alpha0
    }

    fn mult_error(&self) -> Float {
        1.0
    }

    fn unnormalize(&self, model: &Matrix3x4<Float>) -> Matrix3x4<Float> {
        let inverse = self.conditioner.transform.try_inverse().expect("ResectionKernel: conditioning transform not invertible");
        inverse * model
    }

    fn unnormalize_error(&self, squared_error: Float) -> Float {
        squared_error.sqrt() / self.conditioner.scale
    }

    fn threshold_scale(&self) -> Float {
        self.conditioner.scale * self.conditioner.scale
    }
}

/**
 * Resection with known intrinsics: the DLT runs on K^-1 bearings and the
 * model is constrained to [R|t]; errors are pixel reprojections through K.
 */
pub struct ResectionKernelK {
    points2d_pixels: Vec<Vector2<Float>>,
    bearings: Vec<Vector2<Float>>,
    points3d: Vec<Vector3<Float>>,
    projection: Matrix3<Float>,
    log_alpha0: Float
}

impl ResectionKernelK {
    pub fn new(
        points2d_pixels: &[Vector2<Float>],
        points3d: &[Vector3<Float>],
        projection: &Matrix3<Float>,
        inverse_projection: &Matrix3<Float>,
        image_dimensions: (usize, usize)
    ) -> ResectionKernelK {
        assert_eq!(points2d_pixels.len(), points3d.len());

        let bearings = points2d_pixels.iter().map(|p| {
            let ray = inverse_projection * Vector3::<Float>::new(p[0], p[1], 1.0);
            Vector2::<Float>::new(ray[0] / ray[2], ray[1] / ray[2])
        }).collect::<Vec<Vector2<Float>>>();

        let (w, h) = (image_dimensions.0 as Float, image_dimensions.1 as Float);
        let log_alpha0 = (float::consts::PI / (w * h)).log10();

        ResectionKernelK{
            points2d_pixels: points2d_pixels.to_vec(),
            bearings,
            points3d: points3d.to_vec(),
            projection: *projection,
            log_alpha0
        }
    }
}

impl Kernel for ResectionKernelK {
    type Model = (Matrix3<Float>, Vector3<Float>);

    fn minimum_samples(&self) -> usize { 6 }
    fn max_models(&self) -> usize { 1 }

    fn num_samples(&self) -> usize {
        self.bearings.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<(Matrix3<Float>, Vector3<Float>)> {
        let points2d = sample.iter().map(|&i| self.bearings[i]).collect::<Vec<Vector2<Float>>>();
        let points3d = sample.iter().map(|&i| self.points3d[i]).collect::<Vec<Vector3<Float>>>();
        resection_dlt(&points2d, &points3d)
            .and_then(|p| pose_from_normalized_projection(&p))
            .into_iter()
            .collect::<Vec<(Matrix3<Float>, Vector3<Float>)>>()
    }

    #[allow(non_snake_case)]
    fn error(&self, index: usize, model: &(Matrix3<Float>, Vector3<Float>)) -> Float {
        let (R, t) = model;
        let point_in_camera = R * self.points3d[index] + t;
        match point_in_camera[2] {
            z if z.abs() > 1e-12 => {
                let projected = self.projection * (point_in_camera / z);
                (Vector2::<Float>::new(projected[0], projected[1]) - self.points2d_pixels[index]).norm_squared()
            }
            _ => float::INFINITY
        }
    }

    fn log_alpha0(&self) -> Float {
        self.log_alpha0
    }

    fn mult_error(&self) -> Float {
        1.0
    }

    fn unnormalize(&self, model: &(Matrix3<Float>, Vector3<Float>)) -> (Matrix3<Float>, Vector3<Float>) {
        model.clone()
    }

    fn unnormalize_error(&self, squared_error: Float) -> Float {
        squared_error.sqrt()
    }

    fn threshold_scale(&self) -> Float {
        1.0
    }
}
