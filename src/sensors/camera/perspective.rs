extern crate nalgebra as na;
extern crate num_traits;

use na::{base::storage::Storage, convert, Matrix3, Vector, Vector2, Vector3, U1, U3};
use simba::scalar::SupersetOf;

use crate::sensors::camera::Camera;
use crate::GenericFloat;

const IDENTITY_EPS: f32 = 1e-9f32;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Perspective<F: GenericFloat> {
    pub projection: Matrix3<F>,
    pub inverse_projection: Matrix3<F>
}

impl<F: GenericFloat> Perspective<F> {
    pub fn new(fx: F, fy: F, cx: F, cy: F, s: F) -> Perspective<F> {
        let (projection, inverse_projection) = Self::compute_projections(fx, fy, cx, cy, s);
        assert!(num_traits::Float::abs((projection * inverse_projection).determinant() - F::one()) <= F::from_f32(IDENTITY_EPS).expect("Perspective: conversion failed!"));
        Perspective{projection, inverse_projection}
    }

    fn compute_projections(fx: F, fy: F, cx: F, cy: F, s: F) -> (Matrix3<F>, Matrix3<F>) {
        let projection = Matrix3::<F>::new(
            fx, s, cx,
            F::zero(), fy, cy,
            F::zero(), F::zero(), F::one()
        );

        let k = -cx / fx + s * cy / (fx * fy);
        let inverse_projection = Matrix3::<F>::new(
            F::one() / fx, -s / (fx * fy), k,
            F::zero(), F::one() / fy, -cy / fy,
            F::zero(), F::zero(), F::one()
        );

        (projection, inverse_projection)
    }

    pub fn from_matrix(mat: &Matrix3<F>) -> Perspective<F> {
        Perspective::new(mat[(0, 0)], mat[(1, 1)], mat[(0, 2)], mat[(1, 2)], mat[(0, 1)])
    }

    pub fn get_fx(&self) -> F { self.projection[(0, 0)] }
    pub fn get_fy(&self) -> F { self.projection[(1, 1)] }
    pub fn get_cx(&self) -> F { self.projection[(0, 2)] }
    pub fn get_cy(&self) -> F { self.projection[(1, 2)] }
    pub fn get_s(&self) -> F { self.projection[(0, 1)] }

    pub fn cast<F2: GenericFloat + SupersetOf<F>>(&self) -> Perspective<F2> {
        Perspective::<F2>::new(
            convert(self.get_fx()),
            convert(self.get_fy()),
            convert(self.get_cx()),
            convert(self.get_cy()),
            convert(self.get_s())
        )
    }
}

impl<F: GenericFloat> Camera<F> for Perspective<F> {
    fn from_matrices(projection: &Matrix3<F>, inverse_projection: &Matrix3<F>) -> Self {
        Perspective{projection: projection.clone(), inverse_projection: inverse_projection.clone()}
    }

    fn get_projection(&self) -> Matrix3<F> {
        self.projection
    }

    fn get_inverse_projection(&self) -> Matrix3<F> {
        self.inverse_projection
    }

    fn project<T>(&self, position: &Vector<F, U3, T>) -> Option<Vector2<F>> where T: Storage<F, U3, U1> {
        let z = position[2];
        match z {
            z if num_traits::Float::abs(z) > F::zero() => {
                let homogeneous = position / z;
                let projected = self.get_projection() * homogeneous;
                Some(Vector2::<F>::new(projected[0], projected[1]))
            }
            _ => None
        }
    }

    fn backproject(&self, point: &Vector2<F>, depth: F) -> Vector3<F> {
        let homogeneous = Vector3::<F>::new(point[0], point[1], F::one());
        (self.inverse_projection * homogeneous).scale(depth)
    }

    fn get_focal_x(&self) -> F {
        self.projection[(0, 0)]
    }

    fn get_focal_y(&self) -> F {
        self.projection[(1, 1)]
    }
}
