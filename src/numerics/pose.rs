extern crate nalgebra as na;

use na::{Isometry3, Matrix3, Matrix3x4, Matrix4, Translation3, UnitQuaternion, Vector3};

use crate::Float;

pub fn from_matrix(mat: &Matrix4<Float>) -> Isometry3<Float> {
    let vec = Vector3::<Float>::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
    let rot = mat.fixed_view::<3, 3>(0, 0).into_owned();
    Isometry3::<Float>::from_parts(Translation3::from(vec), UnitQuaternion::<Float>::from_matrix(&rot))
}

pub fn se3(t: &Vector3<Float>, rotation: &Matrix3<Float>) -> Matrix4<Float> {
    let mut transform = Matrix4::<Float>::identity();
    transform.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    transform.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
    transform
}

pub fn extrinsics(rotation: &Matrix3<Float>, t: &Vector3<Float>) -> Matrix3x4<Float> {
    let mut m = Matrix3x4::<Float>::zeros();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(t);
    m
}

pub fn decomp(pose: &Isometry3<Float>) -> (Vector3<Float>, Matrix3<Float>) {
    (pose.translation.vector, pose.rotation.to_rotation_matrix().matrix().into_owned())
}

/**
 * Angle between two rotations in degrees.
 */
pub fn rotation_angular_distance(a: &Matrix3<Float>, b: &Matrix3<Float>) -> Float {
    let relative = a.transpose() * b;
    let trace = relative.trace();
    let cos_angle = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/**
 * 3D Rotations - Kanatani p.35
 */
pub fn optimal_correction_of_rotation(rotation: &Matrix3<Float>) -> Matrix3<Float> {
    let mut svd = rotation.svd(true, true);
    let u = &svd.u.expect("optimal_correction_of_rotation: SVD failed on u");
    let v_t = &svd.v_t.expect("optimal_correction_of_rotation: SVD failed on v_t");
    svd.singular_values[0] = 1.0;
    svd.singular_values[1] = 1.0;
    svd.singular_values[2] = (u * v_t.transpose()).determinant();
    svd.recompose().expect("optimal_correction_of_rotation: SVD failed on recompose")
}
