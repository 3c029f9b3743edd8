extern crate nalgebra as na;

use na::{Matrix3, Vector2};

use crate::{float, Float};

pub mod pose;

pub fn quadratic_roots(a: Float, b: Float, c: Float) -> Vec<Float> {
    if a.abs() < 1e-12 {
        return match b.abs() {
            v if v < 1e-12 => Vec::new(),
            _ => vec![-c / b]
        };
    }
    let det = b.powi(2) - 4.0 * a * c;
    match det {
        det if det > 0.0 => {
            let det_sqrt = det.sqrt();
            vec![(-b - det_sqrt) / (2.0 * a), (-b + det_sqrt) / (2.0 * a)]
        }
        det if det < 0.0 => Vec::new(),
        _ => vec![-b / (2.0 * a)]
    }
}

/**
 * Real roots of a*x^3 + b*x^2 + c*x + d = 0 via the trigonometric form of
 * the depressed cubic. Falls back to the quadratic for a vanishing leading
 * coefficient.
 */
pub fn cubic_roots(a: Float, b: Float, c: Float, d: Float) -> Vec<Float> {
    if a.abs() < 1e-12 {
        return quadratic_roots(b, c, d);
    }

    let b_n = b / a;
    let c_n = c / a;
    let d_n = d / a;

    // x = t - b_n/3 gives t^3 + p*t + q = 0
    let p = c_n - b_n.powi(2) / 3.0;
    let q = 2.0 * b_n.powi(3) / 27.0 - b_n * c_n / 3.0 + d_n;
    let shift = -b_n / 3.0;

    let discriminant = (q / 2.0).powi(2) + (p / 3.0).powi(3);

    match discriminant {
        disc if disc > 1e-12 => {
            let sqrt_disc = disc.sqrt();
            let u = (-q / 2.0 + sqrt_disc).cbrt();
            let v = (-q / 2.0 - sqrt_disc).cbrt();
            vec![u + v + shift]
        }
        disc if disc < -1e-12 => {
            let r = (-p.powi(3) / 27.0).sqrt();
            let phi = (-q / (2.0 * r)).clamp(-1.0, 1.0).acos();
            let m = 2.0 * (-p / 3.0).sqrt();
            vec![
                m * (phi / 3.0).cos() + shift,
                m * ((phi + 2.0 * float::consts::PI) / 3.0).cos() + shift,
                m * ((phi + 4.0 * float::consts::PI) / 3.0).cos() + shift,
            ]
        }
        _ => {
            if q.abs() < 1e-12 && p.abs() < 1e-12 {
                return vec![shift];
            }
            let u = (-q / 2.0).cbrt();
            vec![2.0 * u + shift, -u + shift]
        }
    }
}

/**
 * Isotropic conditioning: zero centroid, mean distance sqrt(2).
 * Hartley-style normalization for the direct linear solvers.
 */
pub struct Conditioner {
    pub transform: Matrix3<Float>,
    pub scale: Float
}

impl Conditioner {
    pub fn new(points: &[Vector2<Float>]) -> Conditioner {
        assert!(!points.is_empty());
        let n = points.len() as Float;
        let centroid = points.iter().fold(Vector2::<Float>::zeros(), |acc, p| acc + p) / n;
        let mean_distance = points.iter().fold(0.0, |acc, p| acc + (p - centroid).norm()) / n;
        let scale = match mean_distance {
            d if d > 1e-12 => (2.0 as Float).sqrt() / d,
            _ => 1.0
        };
        let transform = Matrix3::<Float>::new(
            scale, 0.0, -scale * centroid[0],
            0.0, scale, -scale * centroid[1],
            0.0, 0.0, 1.0
        );
        Conditioner{transform, scale}
    }

    pub fn apply(&self, point: &Vector2<Float>) -> Vector2<Float> {
        Vector2::<Float>::new(
            self.transform[(0, 0)] * point[0] + self.transform[(0, 2)],
            self.transform[(1, 1)] * point[1] + self.transform[(1, 2)]
        )
    }

    pub fn apply_all(&self, points: &[Vector2<Float>]) -> Vec<Vector2<Float>> {
        points.iter().map(|p| self.apply(p)).collect::<Vec<Vector2<Float>>>()
    }
}
