extern crate nalgebra as na;

use na::{Matrix3, Vector2, Vector3};

use crate::robust::Kernel;
use crate::sfm::epipolar::{compute_fundamental, eight_point_fundamental, enforce_essential_constraints, sampson_distance_squared, Essential};
use crate::Float;

/**
 * Essential-matrix kernel. Fitting runs the 8-point solver on
 * K^-1-normalized bearings and projects onto the essential manifold; errors
 * are Sampson distances of the implied fundamental matrix on the raw pixel
 * coordinates, so no further de-normalization applies.
 */
pub struct EssentialKernel {
    left_pixels: Vec<Vector2<Float>>,
    right_pixels: Vec<Vector2<Float>>,
    left_bearings: Vec<Vector2<Float>>,
    right_bearings: Vec<Vector2<Float>>,
    inverse_projection_left: Matrix3<Float>,
    inverse_projection_right: Matrix3<Float>,
    log_alpha0: Float
}

impl EssentialKernel {
    pub fn new(
        left_pixels: &[Vector2<Float>],
        right_pixels: &[Vector2<Float>],
        inverse_projection_left: &Matrix3<Float>,
        inverse_projection_right: &Matrix3<Float>,
        right_dimensions: (usize, usize)
    ) -> EssentialKernel {
        assert_eq!(left_pixels.len(), right_pixels.len());

        let to_bearing = |p: &Vector2<Float>, k_inv: &Matrix3<Float>| -> Vector2<Float> {
            let ray = k_inv * Vector3::<Float>::new(p[0], p[1], 1.0);
            Vector2::<Float>::new(ray[0] / ray[2], ray[1] / ray[2])
        };

        let left_bearings = left_pixels.iter().map(|p| to_bearing(p, inverse_projection_left)).collect::<Vec<Vector2<Float>>>();
        let right_bearings = right_pixels.iter().map(|p| to_bearing(p, inverse_projection_right)).collect::<Vec<Vector2<Float>>>();

        let (w, h) = (right_dimensions.0 as Float, right_dimensions.1 as Float);
        let log_alpha0 = (2.0 * (w + h) / (w * h)).log10();

        EssentialKernel{
            left_pixels: left_pixels.to_vec(),
            right_pixels: right_pixels.to_vec(),
            left_bearings,
            right_bearings,
            inverse_projection_left: *inverse_projection_left,
            inverse_projection_right: *inverse_projection_right,
            log_alpha0
        }
    }

    pub fn bearings(&self) -> (&[Vector2<Float>], &[Vector2<Float>]) {
        (&self.left_bearings, &self.right_bearings)
    }

    fn fundamental_of(&self, model: &Essential) -> Matrix3<Float> {
        compute_fundamental(model, &self.inverse_projection_left, &self.inverse_projection_right)
    }
}

impl Kernel for EssentialKernel {
    type Model = Essential;

    fn minimum_samples(&self) -> usize { 8 }
    fn max_models(&self) -> usize { 1 }

    fn num_samples(&self) -> usize {
        self.left_pixels.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<Essential> {
        let left = sample.iter().map(|&i| self.left_bearings[i]).collect::<Vec<Vector2<Float>>>();
        let right = sample.iter().map(|&i| self.right_bearings[i]).collect::<Vec<Vector2<Float>>>();
        eight_point_fundamental(&left, &right)
            .and_then(|f| enforce_essential_constraints(&f))
            .into_iter()
            .collect::<Vec<Essential>>()
    }

    fn error(&self, index: usize, model: &Essential) -> Float {
        let f = self.fundamental_of(model);
        sampson_distance_squared(&f, &self.left_pixels[index], &self.right_pixels[index])
    }

    fn log_alpha0(&self) -> Float {
        self.log_alpha0
    }

    fn mult_error(&self) -> Float {
        0.5
    }

    fn unnormalize(&self, model: &Essential) -> Essential {
        *model
    }

    fn unnormalize_error(&self, squared_error: Float) -> Float {
        squared_error.sqrt()
    }

    fn threshold_scale(&self) -> Float {
        1.0
    }
}
