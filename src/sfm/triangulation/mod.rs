extern crate nalgebra as na;

use na::{Matrix3x4, SMatrix, Vector2, Vector3, Vector4};
use na::linalg::SymmetricEigen;

use crate::Float;

/**
 * Linear triangulation up to scale, see Triangulation by Hartley et al.
 * Each view contributes two rows u*p3 - p1 and v*p3 - p2; the homogeneous
 * solution is the null vector of the stacked system, extracted from the
 * 4x4 normal matrix.
 */
#[allow(non_snake_case)]
pub fn triangulate_nview(observations: &[(Matrix3x4<Float>, Vector2<Float>)]) -> Option<Vector3<Float>> {
    if observations.len() < 2 {
        return None;
    }

    let mut M = SMatrix::<Float, 4, 4>::zeros();
    for (projection, point) in observations {
        let u = point[0];
        let v = point[1];
        let row_u = projection.row(2).into_owned() * u - projection.row(0).into_owned();
        let row_v = projection.row(2).into_owned() * v - projection.row(1).into_owned();
        M += row_u.transpose() * row_u;
        M += row_v.transpose() * row_v;
    }

    let eigen = SymmetricEigen::new(M);
    let mut min_idx = 0;
    let mut min_value = eigen.eigenvalues[0];
    for i in 1..eigen.eigenvalues.len() {
        if eigen.eigenvalues[i] < min_value {
            min_idx = i;
            min_value = eigen.eigenvalues[i];
        }
    }

    let p: Vector4<Float> = eigen.eigenvectors.column(min_idx).into_owned();
    match p[3].abs() {
        w if w > 1e-12 => Some(Vector3::<Float>::new(p[0] / p[3], p[1] / p[3], p[2] / p[3])),
        _ => None
    }
}

#[allow(non_snake_case)]
pub fn triangulate_dlt(P1: &Matrix3x4<Float>, x1: &Vector2<Float>, P2: &Matrix3x4<Float>, x2: &Vector2<Float>) -> Option<Vector3<Float>> {
    triangulate_nview(&[(*P1, *x1), (*P2, *x2)])
}

/**
 * Angle between the viewing rays from two camera centers to a point, in
 * degrees. Small values indicate unreliable depth.
 */
pub fn inter_ray_angle(point: &Vector3<Float>, center_one: &Vector3<Float>, center_two: &Vector3<Float>) -> Float {
    let ray_one = point - center_one;
    let ray_two = point - center_two;
    let norms = ray_one.norm() * ray_two.norm();
    match norms {
        n if n > 1e-12 => (ray_one.dot(&ray_two) / n).clamp(-1.0, 1.0).acos().to_degrees(),
        _ => 0.0
    }
}
