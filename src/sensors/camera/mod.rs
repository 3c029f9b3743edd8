extern crate nalgebra as na;

use na::{base::storage::Storage, Matrix3, Matrix3x4, Matrix4, Vector, Vector2, Vector3, U1, U3};

use crate::GenericFloat;

pub mod perspective;

pub trait Camera<F: GenericFloat> {
    fn get_projection(&self) -> Matrix3<F>;
    fn get_inverse_projection(&self) -> Matrix3<F>;
    fn project<T>(&self, position: &Vector<F, U3, T>) -> Option<Vector2<F>> where T: Storage<F, U3, U1>;
    fn backproject(&self, point: &Vector2<F>, depth: F) -> Vector3<F>;
    fn get_focal_x(&self) -> F;
    fn get_focal_y(&self) -> F;
    fn from_matrices(projection: &Matrix3<F>, inverse_projection: &Matrix3<F>) -> Self;
}

/**
 * Photogrammetric Computer Vision p.498
 * Decomposes a general camera projection P into K[R|t] with K the camera
 * intrinsics and R|t the extrinsics.
 */
#[allow(non_snake_case)]
pub fn decompose_projection<F: GenericFloat>(projection_matrix: &Matrix3x4<F>) -> Option<(Matrix3<F>, Matrix4<F>)> {
    let A = projection_matrix.fixed_columns::<3>(0).into_owned();
    let a = projection_matrix.fixed_columns::<1>(3).into_owned();

    let A_inverse = A.try_inverse()?;
    let Z = -A_inverse * a;
    let A_norm = match A.determinant() {
        det if det < F::zero() => -A,
        det if det > F::zero() => A,
        _ => return None
    };

    let qr_decomp = A_norm.try_inverse()?.qr();
    let mut R = qr_decomp.q().try_inverse()?;
    let mut K = qr_decomp.r().try_inverse()?;

    let K_diag = K.diagonal();
    let mut K_diag_sign = Vector3::<F>::zeros();
    for i in 0..3 {
        K_diag_sign[i] = match K_diag[i] {
            v if v < F::zero() => -F::one(),
            v if v > F::zero() => F::one(),
            _ => return None
        };
    }

    let D = Matrix3::<F>::from_diagonal(&K_diag_sign);
    R = D * R;
    K = K * D;
    K = K / K[(2, 2)];

    let mut pose = Matrix4::<F>::identity();
    pose.fixed_view_mut::<3, 3>(0, 0).copy_from(&R);
    let t = -(R * Z);
    pose.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);

    Some((K, pose))
}
