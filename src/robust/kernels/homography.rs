extern crate nalgebra as na;

use na::{Matrix3, Vector2, Vector3};

use crate::numerics::Conditioner;
use crate::robust::Kernel;
use crate::sfm::epipolar::homography_dlt;
use crate::{float, Float};

/**
 * Homography kernel: 4-point DLT, forward transfer error, Hartley
 * conditioning on both views. Point-to-point meaningfulness constant.
 */
pub struct HomographyKernel {
    left: Vec<Vector2<Float>>,
    right: Vec<Vector2<Float>>,
    conditioner_left: Conditioner,
    conditioner_right: Conditioner,
    log_alpha0: Float
}

impl HomographyKernel {
    pub fn new(left_pixels: &[Vector2<Float>], right_pixels: &[Vector2<Float>], right_dimensions: (usize, usize)) -> HomographyKernel {
        assert_eq!(left_pixels.len(), right_pixels.len());
        assert!(!left_pixels.is_empty());

        let conditioner_left = Conditioner::new(left_pixels);
        let conditioner_right = Conditioner::new(right_pixels);
        let left = conditioner_left.apply_all(left_pixels);
        let right = conditioner_right.apply_all(right_pixels);

        let (w, h) = (right_dimensions.0 as Float, right_dimensions.1 as Float);
        let scale_sqrd = conditioner_right.scale * conditioner_right.scale;
        let log_alpha0 = (float::consts::PI / (w * h) / scale_sqrd).log10();

        HomographyKernel{left, right, conditioner_left, conditioner_right, log_alpha0}
    }
}

impl Kernel for HomographyKernel {
    type Model = Matrix3<Float>;

    fn minimum_samples(&self) -> usize { 4 }
    fn max_models(&self) -> usize { 1 }

    fn num_samples(&self) -> usize {
        self.left.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<Matrix3<Float>> {
        let left = sample.iter().map(|&i| self.left[i]).collect::<Vec<Vector2<Float>>>();
        let right = sample.iter().map(|&i| self.right[i]).collect::<Vec<Vector2<Float>>>();
        homography_dlt(&left, &right).into_iter().collect::<Vec<Matrix3<Float>>>()
    }

    fn error(&self, index: usize, model: &Matrix3<Float>) -> Float {
        let x_l = self.left[index];
        let mapped = model * Vector3::<Float>::new(x_l[0], x_l[1], 1.0);
        match mapped[2].abs() {
            w if w > 1e-12 => {
                let projected = Vector2::<Float>::new(mapped[0] / mapped[2], mapped[1] / mapped[2]);
                (projected - self.right[index]).norm_squared()
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

    fn unnormalize(&self, model: &Matrix3<Float>) -> Matrix3<Float> {
        // x_r = T_r^-1 H T_l x_l
        let inverse_right = self.conditioner_right.transform.try_inverse().expect("HomographyKernel: conditioning transform not invertible");
        let h = inverse_right * model * self.conditioner_left.transform;
        match h[(2, 2)].abs() {
            v if v > 1e-12 => h / h[(2, 2)],
            _ => h
        }
    }

    fn unnormalize_error(&self, squared_error: Float) -> Float {
        squared_error.sqrt() / self.conditioner_right.scale
    }

    fn threshold_scale(&self) -> Float {
        self.conditioner_right.scale * self.conditioner_right.scale
    }
}
