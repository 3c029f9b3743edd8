extern crate nalgebra as na;

use na::Vector2;

use crate::numerics::Conditioner;
use crate::robust::Kernel;
use crate::sfm::epipolar::{eight_point_fundamental, sampson_distance_squared, seven_point_fundamental, Fundamental};
use crate::Float;

/**
 * Fundamental-matrix kernel: 7-point minimal solver (up to 3 candidates),
 * Sampson distance, Hartley conditioning on both views. The meaningfulness
 * constant is the point-to-line case over the second image.
 */
pub struct FundamentalKernel {
    left: Vec<Vector2<Float>>,
    right: Vec<Vector2<Float>>,
    conditioner_left: Conditioner,
    conditioner_right: Conditioner,
    log_alpha0: Float
}

impl FundamentalKernel {
    pub fn new(left_pixels: &[Vector2<Float>], right_pixels: &[Vector2<Float>], right_dimensions: (usize, usize)) -> FundamentalKernel {
        assert_eq!(left_pixels.len(), right_pixels.len());
        assert!(!left_pixels.is_empty());

        let conditioner_left = Conditioner::new(left_pixels);
        let conditioner_right = Conditioner::new(right_pixels);
        let left = conditioner_left.apply_all(left_pixels);
        let right = conditioner_right.apply_all(right_pixels);

        let (w, h) = (right_dimensions.0 as Float, right_dimensions.1 as Float);
        let log_alpha0 = (2.0 * (w + h) / (w * h) / conditioner_right.scale).log10();

        FundamentalKernel{left, right, conditioner_left, conditioner_right, log_alpha0}
    }
}

impl Kernel for FundamentalKernel {
    type Model = Fundamental;

    fn minimum_samples(&self) -> usize { 7 }
    fn max_models(&self) -> usize { 3 }

    fn num_samples(&self) -> usize {
        self.left.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<Fundamental> {
        let left = sample.iter().map(|&i| self.left[i]).collect::<Vec<Vector2<Float>>>();
        let right = sample.iter().map(|&i| self.right[i]).collect::<Vec<Vector2<Float>>>();
        match sample.len() {
            7 => seven_point_fundamental(&left, &right),
            _ => eight_point_fundamental(&left, &right).into_iter().collect::<Vec<Fundamental>>()
        }
    }

    fn error(&self, index: usize, model: &Fundamental) -> Float {
        sampson_distance_squared(model, &self.left[index], &self.right[index])
    }

    fn log_alpha0(&self) -> Float {
        self.log_alpha0
    }

    fn mult_error(&self) -> Float {
        0.5
    }

    fn unnormalize(&self, model: &Fundamental) -> Fundamental {
        // x_r_cond^T F x_l_cond = (T_r x_r)^T F (T_l x_l)
        let f = self.conditioner_right.transform.transpose() * model * self.conditioner_left.transform;
        f.normalize()
    }

    fn unnormalize_error(&self, squared_error: Float) -> Float {
        squared_error.sqrt() / self.conditioner_right.scale
    }

    fn threshold_scale(&self) -> Float {
        self.conditioner_right.scale * self.conditioner_right.scale
    }
}
