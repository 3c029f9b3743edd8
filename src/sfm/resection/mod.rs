extern crate nalgebra as na;

use na::{Matrix3, Matrix3x4, SMatrix, SVector, Vector2, Vector3};
use na::linalg::SymmetricEigen;

use crate::numerics::pose::optimal_correction_of_rotation;
use crate::Float;

/**
 * Direct linear transform resection: recovers the 3x4 projection from
 * >= 6 2D-3D correspondences. Each correspondence contributes the two
 * classic DLT rows; the 12-vector null space comes from the normal matrix.
 */
#[allow(non_snake_case)]
pub fn resection_dlt(points2d: &[Vector2<Float>], points3d: &[Vector3<Float>]) -> Option<Matrix3x4<Float>> {
    assert_eq!(points2d.len(), points3d.len());
    if points2d.len() < 6 {
        return None;
    }

    let mut M = SMatrix::<Float, 12, 12>::zeros();
    for (x, X) in points2d.iter().zip(points3d.iter()) {
        let u = x[0];
        let v = x[1];
        let mut row_u = SMatrix::<Float, 1, 12>::zeros();
        let mut row_v = SMatrix::<Float, 1, 12>::zeros();
        for c in 0..4 {
            let X_c = match c {
                3 => 1.0,
                _ => X[c]
            };
            row_u[(0, c)] = X_c;
            row_u[(0, 8 + c)] = -u * X_c;
            row_v[(0, 4 + c)] = X_c;
            row_v[(0, 8 + c)] = -v * X_c;
        }
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
    let p: SVector<Float, 12> = eigen.eigenvectors.column(min_idx).into_owned();

    let mut P = Matrix3x4::<Float>::zeros();
    for r in 0..3 {
        for c in 0..4 {
            P[(r, c)] = p[4 * r + c];
        }
    }

    // Fix the projective sign so the sample points sit in front of the camera.
    let mut depth_sign = 0.0;
    for X in points3d {
        let w = P[(2, 0)] * X[0] + P[(2, 1)] * X[1] + P[(2, 2)] * X[2] + P[(2, 3)];
        depth_sign += match w {
            w if w > 0.0 => 1.0,
            w if w < 0.0 => -1.0,
            _ => 0.0
        };
    }
    if depth_sign < 0.0 {
        P = -P;
    }

    Some(P)
}

/**
 * Extracts [R|t] from a projection computed on K^-1-normalized bearings.
 * The leading 3x3 block equals s*R up to noise; the determinant gives the
 * scale, the closest proper rotation the orientation.
 */
#[allow(non_snake_case)]
pub fn pose_from_normalized_projection(P: &Matrix3x4<Float>) -> Option<(Matrix3<Float>, Vector3<Float>)> {
    let mut P_signed = *P;
    let A = P_signed.fixed_columns::<3>(0).into_owned();
    if A.determinant() < 0.0 {
        P_signed = -P_signed;
    }

    let A = P_signed.fixed_columns::<3>(0).into_owned();
    let det = A.determinant();
    if det.abs() < 1e-12 {
        return None;
    }
    let scale = det.cbrt();

    let R = optimal_correction_of_rotation(&(A / scale));
    let t = P_signed.fixed_columns::<1>(3).into_owned() / scale;
    Some((R, t))
}
