extern crate nalgebra as na;

use na::{Matrix3, Matrix3x4, Vector2, Vector3};

use crate::features::{ImageFeature, ImageId};
use crate::numerics::pose;
use crate::sensors::camera::perspective::Perspective;
use crate::sensors::camera::Camera;
use crate::Float;

pub mod bundle_adjustment;
pub mod epipolar;
pub mod incremental;
pub mod resection;
pub mod triangulation;

/**
 * A posed view: intrinsics plus world-to-camera extrinsics. Created when a
 * view is triangulated as part of the seed pair or resected; refined in
 * place by bundle adjustment; never removed from a reconstruction.
 */
#[derive(Debug, Clone)]
pub struct CameraPose {
    pub intrinsic: Perspective<Float>,
    pub rotation: Matrix3<Float>,
    pub translation: Vector3<Float>
}

impl CameraPose {
    pub fn new(intrinsic: Perspective<Float>, rotation: Matrix3<Float>, translation: Vector3<Float>) -> CameraPose {
        CameraPose{intrinsic, rotation, translation}
    }

    pub fn extrinsics(&self) -> Matrix3x4<Float> {
        pose::extrinsics(&self.rotation, &self.translation)
    }

    pub fn projection_matrix(&self) -> Matrix3x4<Float> {
        self.intrinsic.get_projection() * self.extrinsics()
    }

    pub fn center(&self) -> Vector3<Float> {
        -(self.rotation.transpose() * self.translation)
    }

    pub fn depth_of(&self, point: &Vector3<Float>) -> Float {
        (self.rotation * point + self.translation)[2]
    }

    pub fn project_point(&self, point: &Vector3<Float>) -> Option<Vector2<Float>> {
        let point_in_camera = self.rotation * point + self.translation;
        match point_in_camera[2] {
            z if z > 0.0 => self.intrinsic.project(&point_in_camera),
            _ => None
        }
    }

    pub fn reprojection_error(&self, point: &Vector3<Float>, observation: &Vector2<Float>) -> Float {
        match self.project_point(point) {
            Some(projected) => (projected - observation).norm(),
            None => crate::float::INFINITY
        }
    }
}

/**
 * One input image: its detected features and the intrinsic group it was
 * assigned from the image list.
 */
#[derive(Debug, Clone)]
pub struct View {
    pub id: ImageId,
    pub width: usize,
    pub height: usize,
    pub features: Vec<ImageFeature>,
    pub intrinsic_group: usize
}

impl View {
    pub fn new(id: ImageId, width: usize, height: usize, features: Vec<ImageFeature>, intrinsic_group: usize) -> View {
        View{id, width, height, features, intrinsic_group}
    }

    pub fn feature_point(&self, feature: usize) -> Vector2<Float> {
        let f = &self.features[feature];
        Vector2::<Float>::new(f.x, f.y)
    }
}

/**
 * Images sharing one calibration. When known is false the intrinsic holds
 * a guess (or a resected estimate) rather than calibrated values.
 */
#[derive(Debug, Clone)]
pub struct IntrinsicGroup {
    pub intrinsic: Perspective<Float>,
    pub known: bool,
    pub width: usize,
    pub height: usize,
    pub radial_distortion: [Float; 3]
}

impl IntrinsicGroup {
    pub fn new(intrinsic: Perspective<Float>, known: bool, width: usize, height: usize) -> IntrinsicGroup {
        IntrinsicGroup{intrinsic, known, width, height, radial_distortion: [0.0; 3]}
    }
}
