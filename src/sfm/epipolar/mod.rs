extern crate nalgebra as na;

use na::{DMatrix, Matrix3, SMatrix, SVector, Vector2, Vector3};
use na::linalg::SymmetricEigen;

use crate::numerics::cubic_roots;
use crate::numerics::pose::optimal_correction_of_rotation;
use crate::sfm::triangulation::triangulate_dlt;
use crate::numerics::pose::extrinsics;
use crate::Float;

pub type Fundamental = Matrix3<Float>;
pub type Essential = Matrix3<Float>;

#[allow(non_snake_case)]
fn to_matrix3(f: &SVector<Float, 9>) -> Matrix3<Float> {
    Matrix3::<Float>::new(
        f[0], f[1], f[2],
        f[3], f[4], f[5],
        f[6], f[7], f[8]
    )
}

fn linear_coefficients(feature_left: &Vector2<Float>, feature_right: &Vector2<Float>) -> SMatrix<Float, 1, 9> {
    let l_x = feature_left[0];
    let l_y = feature_left[1];
    let r_x = feature_right[0];
    let r_y = feature_right[1];

    SMatrix::<Float, 1, 9>::from_row_slice(&[
        r_x * l_x, r_x * l_y, r_x,
        r_y * l_x, r_y * l_y, r_y,
        l_x, l_y, 1.0
    ])
}

/**
 * Photogrammetric Computer Vision p.570
 * Least-squares epipolar constraint fit over >= 8 correspondences, with the
 * rank-2 constraint enforced afterwards. The null space is extracted from
 * the 9x9 normal matrix since nalgebra computes thin SVDs on wide systems.
 */
#[allow(non_snake_case)]
pub fn eight_point_fundamental(left: &[Vector2<Float>], right: &[Vector2<Float>]) -> Option<Fundamental> {
    assert_eq!(left.len(), right.len());
    if left.len() < 8 {
        return None;
    }

    let mut M = SMatrix::<Float, 9, 9>::zeros();
    for (l, r) in left.iter().zip(right.iter()) {
        let eta = linear_coefficients(l, r);
        M += eta.transpose() * eta;
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

    let f_vec = eigen.eigenvectors.column(min_idx).into_owned();
    let F = to_matrix3(&f_vec);

    let mut svd_f = F.svd(true, true);
    svd_f.singular_values[2] = 0.0;
    let F_rank2 = svd_f.recompose().ok()?;
    Some(F_rank2.normalize())
}

/**
 * Minimal 7-point solver. The two-dimensional null space gives
 * F(a) = a*F1 + (1-a)*F2; det(F(a)) = 0 is cubic in a, yielding up to three
 * candidates. Coefficients come from evaluating the determinant at four
 * abscissae rather than symbolic expansion.
 */
#[allow(non_snake_case)]
pub fn seven_point_fundamental(left: &[Vector2<Float>], right: &[Vector2<Float>]) -> Vec<Fundamental> {
    assert_eq!(left.len(), 7);
    assert_eq!(right.len(), 7);

    let mut M = SMatrix::<Float, 9, 9>::zeros();
    for (l, r) in left.iter().zip(right.iter()) {
        let eta = linear_coefficients(l, r);
        M += eta.transpose() * eta;
    }

    let eigen = SymmetricEigen::new(M);
    let mut order = (0..9).collect::<Vec<usize>>();
    order.sort_unstable_by(|&a, &b| eigen.eigenvalues[a].partial_cmp(&eigen.eigenvalues[b]).expect("seven_point: eigenvalue not comparable"));

    let F1 = to_matrix3(&eigen.eigenvectors.column(order[0]).into_owned());
    let F2 = to_matrix3(&eigen.eigenvectors.column(order[1]).into_owned());

    let det_at = |alpha: Float| -> Float { (F1.scale(alpha) + F2.scale(1.0 - alpha)).determinant() };

    // det(a*F1+(1-a)*F2) = c3*a^3 + c2*a^2 + c1*a + c0, fitted at a = 0,1,-1,2
    let d0 = det_at(0.0);
    let d1 = det_at(1.0);
    let d_minus = det_at(-1.0);
    let d2 = det_at(2.0);

    let c0 = d0;
    let c2 = (d1 + d_minus) / 2.0 - d0;
    let c3 = (d2 + d0 - 2.0 * d1 - 2.0 * c2) / 6.0;
    let c1 = d1 - d0 - c2 - c3;

    cubic_roots(c3, c2, c1, c0)
        .into_iter()
        .map(|alpha| (F1.scale(alpha) + F2.scale(1.0 - alpha)).normalize())
        .filter(|f: &Fundamental| f.iter().all(|v| v.is_finite()))
        .collect::<Vec<Fundamental>>()
}

/**
 * Squared Sampson distance for x_right^T * F * x_left = 0.
 */
#[allow(non_snake_case)]
pub fn sampson_distance_squared(F: &Fundamental, left: &Vector2<Float>, right: &Vector2<Float>) -> Float {
    let x_l = Vector3::<Float>::new(left[0], left[1], 1.0);
    let x_r = Vector3::<Float>::new(right[0], right[1], 1.0);

    let F_x_l = F * x_l;
    let Ft_x_r = F.transpose() * x_r;
    let constraint = x_r.dot(&F_x_l);

    let denom = F_x_l[0].powi(2) + F_x_l[1].powi(2) + Ft_x_r[0].powi(2) + Ft_x_r[1].powi(2);
    match denom {
        d if d > 0.0 => constraint.powi(2) / d,
        _ => crate::float::INFINITY
    }
}

#[allow(non_snake_case)]
pub fn epipolar_constraint(F: &Fundamental, left: &Vector2<Float>, right: &Vector2<Float>) -> Float {
    let x_l = Vector3::<Float>::new(left[0], left[1], 1.0);
    let x_r = Vector3::<Float>::new(right[0], right[1], 1.0);
    x_r.dot(&(F * x_l)).abs()
}

/**
 * E = K_right^T * F * K_left for x_right^T F x_left = 0.
 */
#[allow(non_snake_case)]
pub fn compute_essential(F: &Fundamental, projection_left: &Matrix3<Float>, projection_right: &Matrix3<Float>) -> Essential {
    projection_right.transpose() * F * projection_left
}

#[allow(non_snake_case)]
pub fn compute_fundamental(E: &Essential, inverse_projection_left: &Matrix3<Float>, inverse_projection_right: &Matrix3<Float>) -> Fundamental {
    inverse_projection_right.transpose() * E * inverse_projection_left
}

/**
 * Projects a 3x3 matrix onto the essential manifold: equal leading singular
 * values, zero last one.
 */
#[allow(non_snake_case)]
pub fn enforce_essential_constraints(E: &Matrix3<Float>) -> Option<Essential> {
    let mut svd = E.svd(true, true);
    let sigma = (svd.singular_values[0] + svd.singular_values[1]) / 2.0;
    svd.singular_values[0] = sigma;
    svd.singular_values[1] = sigma;
    svd.singular_values[2] = 0.0;
    svd.recompose().ok().map(|e| e.normalize())
}

/**
 * Multiple View Geometry p.258
 * The four (R,t) candidates of an essential matrix. Signs of U and V are
 * fixed so both rotations are proper.
 */
#[allow(non_snake_case)]
pub fn essential_candidates(E: &Essential) -> Option<Vec<(Matrix3<Float>, Vector3<Float>)>> {
    let svd = E.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let U = u * u.determinant();
    let V_t = v_t * v_t.determinant();

    let W = Matrix3::<Float>::new(
        0.0, -1.0, 0.0,
        1.0, 0.0, 0.0,
        0.0, 0.0, 1.0
    );

    let R1 = optimal_correction_of_rotation(&(U * W * V_t));
    let R2 = optimal_correction_of_rotation(&(U * W.transpose() * V_t));
    let t = u.column(2).into_owned();

    Some(vec![(R1, t), (R1, -t), (R2, t), (R2, -t)])
}

/**
 * Chooses the (R,t) candidate maximizing the number of correspondences that
 * triangulate with positive depth in both cameras. Bearings are the
 * K^-1-normalized image points of each view.
 */
#[allow(non_snake_case)]
pub fn decompose_essential(E: &Essential, bearings_left: &[Vector2<Float>], bearings_right: &[Vector2<Float>]) -> Option<(Matrix3<Float>, Vector3<Float>)> {
    assert_eq!(bearings_left.len(), bearings_right.len());
    if bearings_left.is_empty() {
        return None;
    }

    let candidates = essential_candidates(E)?;
    let identity = extrinsics(&Matrix3::<Float>::identity(), &Vector3::<Float>::zeros());

    let mut best: Option<(Matrix3<Float>, Vector3<Float>)> = None;
    let mut best_count = 0;
    for (R, t) in candidates {
        let P2 = extrinsics(&R, &t);
        let mut count = 0;
        for (b_l, b_r) in bearings_left.iter().zip(bearings_right.iter()) {
            if let Some(point) = triangulate_dlt(&identity, b_l, &P2, b_r) {
                let depth_left = point[2];
                let depth_right = (R * point + t)[2];
                if depth_left > 0.0 && depth_right > 0.0 {
                    count += 1;
                }
            }
        }
        if count > best_count {
            best_count = count;
            best = Some((R, t));
        }
    }
    best
}

/**
 * Hartley-normalized homography DLT for x_right ~ H * x_left; >= 4
 * correspondences, null space via the 9x9 normal matrix.
 */
#[allow(non_snake_case)]
pub fn homography_dlt(left: &[Vector2<Float>], right: &[Vector2<Float>]) -> Option<Matrix3<Float>> {
    assert_eq!(left.len(), right.len());
    if left.len() < 4 {
        return None;
    }

    let mut A = DMatrix::<Float>::zeros(2 * left.len(), 9);
    for (row, (l, r)) in left.iter().zip(right.iter()).enumerate() {
        let x1 = l[0];
        let y1 = l[1];
        let x2 = r[0];
        let y2 = r[1];

        A[(2 * row, 0)] = -x1;
        A[(2 * row, 1)] = -y1;
        A[(2 * row, 2)] = -1.0;
        A[(2 * row, 6)] = x2 * x1;
        A[(2 * row, 7)] = x2 * y1;
        A[(2 * row, 8)] = x2;

        A[(2 * row + 1, 3)] = -x1;
        A[(2 * row + 1, 4)] = -y1;
        A[(2 * row + 1, 5)] = -1.0;
        A[(2 * row + 1, 6)] = y2 * x1;
        A[(2 * row + 1, 7)] = y2 * y1;
        A[(2 * row + 1, 8)] = y2;
    }

    let M = A.transpose() * &A;
    let M_static = SMatrix::<Float, 9, 9>::from_iterator(M.iter().copied());
    let eigen = SymmetricEigen::new(M_static);
    let mut min_idx = 0;
    let mut min_value = eigen.eigenvalues[0];
    for i in 1..eigen.eigenvalues.len() {
        if eigen.eigenvalues[i] < min_value {
            min_idx = i;
            min_value = eigen.eigenvalues[i];
        }
    }
    let h = eigen.eigenvectors.column(min_idx).into_owned();
    let H = to_matrix3(&h);
    match H[(2, 2)].abs() {
        v if v > 1e-12 => Some(H / H[(2, 2)]),
        _ => Some(H)
    }
}
