extern crate nalgebra as na;

use na::{DVector, Matrix3, Rotation3, Vector2, Vector3};
use std::collections::HashMap;

use crate::features::ImageId;
use crate::sfm::CameraPose;
use crate::tracks::TrackId;
use crate::Float;

/**
 * How intrinsics enter the parameter buffer. One assembler serves all
 * three; they differ only in block sizes.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntrinsicConfig {
    /// [angle-axis | t | f] per camera, principal point fixed.
    FocalPerCamera,
    /// [angle-axis | t] per camera plus one shared [f] per intrinsic group.
    SharedFocal,
    /// [angle-axis | t] per camera plus shared [f cx cy k1 k2 k3] per group.
    SharedBrown
}

impl IntrinsicConfig {
    pub fn camera_block_size(&self) -> usize {
        match self {
            IntrinsicConfig::FocalPerCamera => 7,
            _ => 6
        }
    }

    pub fn group_block_size(&self) -> usize {
        match self {
            IntrinsicConfig::FocalPerCamera => 0,
            IntrinsicConfig::SharedFocal => 1,
            IntrinsicConfig::SharedBrown => 6
        }
    }
}

/// One 2D pixel measurement bound to its camera, intrinsic group and point.
#[derive(Debug, Copy, Clone)]
pub struct Observation {
    pub camera: usize,
    pub group: usize,
    pub point: usize,
    pub x: Float,
    pub y: Float
}

/**
 * Flattened bundle-adjustment problem: one contiguous parameter buffer
 * ordered cameras, intrinsic groups, points, plus parallel observation
 * bindings. Consumed by a BundleSolver through the block accessors; the
 * assembler knows nothing about solver internals.
 */
#[derive(Debug, Clone)]
pub struct BaProblem {
    pub config: IntrinsicConfig,
    pub parameters: DVector<Float>,
    pub observations: Vec<Observation>,
    pub n_cameras: usize,
    pub n_groups: usize,
    pub n_points: usize,
    pub camera_ids: Vec<ImageId>,
    /// Internal intrinsic-group index of each camera.
    pub camera_groups: Vec<usize>,
    pub group_ids: Vec<usize>,
    pub point_ids: Vec<TrackId>,
    base_principal_points: Vec<(Float, Float)>
}

impl BaProblem {
    pub fn camera_offset(&self, camera: usize) -> usize {
        camera * self.config.camera_block_size()
    }

    pub fn group_offset(&self, group: usize) -> usize {
        self.n_cameras * self.config.camera_block_size() + group * self.config.group_block_size()
    }

    pub fn point_offset(&self, point: usize) -> usize {
        self.n_cameras * self.config.camera_block_size()
            + self.n_groups * self.config.group_block_size()
            + point * 3
    }

    pub fn camera_for(&self, observation: usize) -> &[Float] {
        let obs = &self.observations[observation];
        let offset = self.camera_offset(obs.camera);
        &self.parameters.as_slice()[offset..offset + self.config.camera_block_size()]
    }

    pub fn point_for(&self, observation: usize) -> &[Float] {
        let obs = &self.observations[observation];
        let offset = self.point_offset(obs.point);
        &self.parameters.as_slice()[offset..offset + 3]
    }

    pub fn intrinsics_for(&self, observation: usize) -> &[Float] {
        let obs = &self.observations[observation];
        let offset = self.group_offset(obs.group);
        &self.parameters.as_slice()[offset..offset + self.config.group_block_size()]
    }

    pub fn camera_for_mut(&mut self, observation: usize) -> &mut [Float] {
        let obs = self.observations[observation];
        let offset = self.camera_offset(obs.camera);
        let size = self.config.camera_block_size();
        &mut self.parameters.as_mut_slice()[offset..offset + size]
    }

    pub fn point_for_mut(&mut self, observation: usize) -> &mut [Float] {
        let obs = self.observations[observation];
        let offset = self.point_offset(obs.point);
        &mut self.parameters.as_mut_slice()[offset..offset + 3]
    }

    fn intrinsics_of(&self, camera: usize, group: usize) -> (Float, Float, Float, [Float; 3]) {
        let (base_cx, base_cy) = self.base_principal_points[camera];
        match self.config {
            IntrinsicConfig::FocalPerCamera => {
                let offset = self.camera_offset(camera);
                (self.parameters[offset + 6], base_cx, base_cy, [0.0; 3])
            }
            IntrinsicConfig::SharedFocal => {
                let offset = self.group_offset(group);
                (self.parameters[offset], base_cx, base_cy, [0.0; 3])
            }
            IntrinsicConfig::SharedBrown => {
                let offset = self.group_offset(group);
                (
                    self.parameters[offset],
                    self.parameters[offset + 1],
                    self.parameters[offset + 2],
                    [self.parameters[offset + 3], self.parameters[offset + 4], self.parameters[offset + 5]]
                )
            }
        }
    }

    /**
     * Pixel residual of one observation under the current parameters.
     */
    pub fn residual(&self, observation: usize) -> Vector2<Float> {
        let obs = &self.observations[observation];
        let camera_offset = self.camera_offset(obs.camera);
        let point_offset = self.point_offset(obs.point);

        let axis_angle = Vector3::<Float>::new(
            self.parameters[camera_offset],
            self.parameters[camera_offset + 1],
            self.parameters[camera_offset + 2]
        );
        let translation = Vector3::<Float>::new(
            self.parameters[camera_offset + 3],
            self.parameters[camera_offset + 4],
            self.parameters[camera_offset + 5]
        );
        let point = Vector3::<Float>::new(
            self.parameters[point_offset],
            self.parameters[point_offset + 1],
            self.parameters[point_offset + 2]
        );

        let rotation = Rotation3::new(axis_angle);
        let point_in_camera = rotation * point + translation;

        let z = match point_in_camera[2] {
            z if z.abs() > 1e-12 => z,
            _ => 1e-12
        };
        let x = point_in_camera[0] / z;
        let y = point_in_camera[1] / z;

        let (f, cx, cy, radial) = self.intrinsics_of(obs.camera, obs.group);
        let r_sqrd = x * x + y * y;
        let distortion = 1.0 + radial[0] * r_sqrd + radial[1] * r_sqrd.powi(2) + radial[2] * r_sqrd.powi(3);

        let u = f * distortion * x + cx;
        let v = f * distortion * y + cy;
        Vector2::<Float>::new(u - obs.x, v - obs.y)
    }

    pub fn residual_vector(&self) -> DVector<Float> {
        let mut r = DVector::<Float>::zeros(2 * self.observations.len());
        for i in 0..self.observations.len() {
            let res = self.residual(i);
            r[2 * i] = res[0];
            r[2 * i + 1] = res[1];
        }
        r
    }

    pub fn total_squared_error(&self) -> Float {
        (0..self.observations.len()).fold(0.0, |acc, i| acc + self.residual(i).norm_squared())
    }

    pub fn rmse(&self) -> Float {
        match self.observations.len() {
            0 => 0.0,
            n => (self.total_squared_error() / n as Float).sqrt()
        }
    }

    /// Refined pose of the camera at internal index `camera`.
    pub fn camera_pose(&self, camera: usize) -> (Matrix3<Float>, Vector3<Float>) {
        let offset = self.camera_offset(camera);
        let axis_angle = Vector3::<Float>::new(
            self.parameters[offset],
            self.parameters[offset + 1],
            self.parameters[offset + 2]
        );
        let translation = Vector3::<Float>::new(
            self.parameters[offset + 3],
            self.parameters[offset + 4],
            self.parameters[offset + 5]
        );
        (Rotation3::new(axis_angle).matrix().into_owned(), translation)
    }

    /// Refined (f, cx, cy, radial) of the camera at internal index `camera`.
    pub fn camera_intrinsics(&self, camera: usize, group: usize) -> (Float, Float, Float, [Float; 3]) {
        self.intrinsics_of(camera, group)
    }

    /// Refined position of the point at internal index `point`.
    pub fn point_position(&self, point: usize) -> Vector3<Float> {
        let offset = self.point_offset(point);
        Vector3::<Float>::new(
            self.parameters[offset],
            self.parameters[offset + 1],
            self.parameters[offset + 2]
        )
    }
}

/**
 * Assembles cameras, shared intrinsic groups, points and their 2D
 * observations into a BaProblem.
 */
pub struct BaProblemBuilder {
    config: IntrinsicConfig,
    cameras: Vec<(ImageId, usize, CameraPose)>,
    camera_index: HashMap<ImageId, usize>,
    groups: Vec<(usize, Float, Float, Float, [Float; 3])>,
    group_index: HashMap<usize, usize>,
    points: Vec<(TrackId, Vector3<Float>)>,
    point_index: HashMap<TrackId, usize>,
    observations: Vec<Observation>
}

impl BaProblemBuilder {
    pub fn new(config: IntrinsicConfig) -> BaProblemBuilder {
        BaProblemBuilder{
            config,
            cameras: Vec::new(),
            camera_index: HashMap::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
            points: Vec::new(),
            point_index: HashMap::new(),
            observations: Vec::new()
        }
    }

    pub fn add_camera(&mut self, image: ImageId, group_key: usize, pose: &CameraPose, radial_distortion: [Float; 3]) -> () {
        if self.camera_index.contains_key(&image) {
            return;
        }
        let group_internal = match self.group_index.get(&group_key) {
            Some(&g) => g,
            None => {
                let g = self.groups.len();
                self.groups.push((
                    group_key,
                    pose.intrinsic.get_fx(),
                    pose.intrinsic.get_cx(),
                    pose.intrinsic.get_cy(),
                    radial_distortion
                ));
                self.group_index.insert(group_key, g);
                g
            }
        };
        self.camera_index.insert(image, self.cameras.len());
        self.cameras.push((image, group_internal, pose.clone()));
    }

    pub fn add_point(&mut self, track: TrackId, position: &Vector3<Float>) -> () {
        if self.point_index.contains_key(&track) {
            return;
        }
        self.point_index.insert(track, self.points.len());
        self.points.push((track, *position));
    }

    pub fn add_observation(&mut self, image: ImageId, track: TrackId, x: Float, y: Float) -> () {
        let camera = *self.camera_index.get(&image).expect("BaProblemBuilder: observation for unknown camera");
        let point = *self.point_index.get(&track).expect("BaProblemBuilder: observation for unknown point");
        let group = self.cameras[camera].1;
        self.observations.push(Observation{camera, group, point, x, y});
    }

    pub fn build(self) -> BaProblem {
        let n_cameras = self.cameras.len();
        let n_groups = self.groups.len();
        let n_points = self.points.len();
        let camera_block = self.config.camera_block_size();
        let group_block = self.config.group_block_size();

        let n_parameters = n_cameras * camera_block + n_groups * group_block + n_points * 3;
        let mut parameters = DVector::<Float>::zeros(n_parameters);
        let mut base_principal_points = Vec::<(Float, Float)>::with_capacity(n_cameras);
        let mut camera_ids = Vec::<ImageId>::with_capacity(n_cameras);
        let mut camera_groups = Vec::<usize>::with_capacity(n_cameras);

        for (c, (image, group, pose)) in self.cameras.iter().enumerate() {
            let offset = c * camera_block;
            let axis_angle = Rotation3::from_matrix(&pose.rotation).scaled_axis();
            parameters[offset] = axis_angle[0];
            parameters[offset + 1] = axis_angle[1];
            parameters[offset + 2] = axis_angle[2];
            parameters[offset + 3] = pose.translation[0];
            parameters[offset + 4] = pose.translation[1];
            parameters[offset + 5] = pose.translation[2];
            if self.config == IntrinsicConfig::FocalPerCamera {
                parameters[offset + 6] = pose.intrinsic.get_fx();
            }
            base_principal_points.push((pose.intrinsic.get_cx(), pose.intrinsic.get_cy()));
            camera_ids.push(*image);
            camera_groups.push(*group);
        }

        let group_base = n_cameras * camera_block;
        let mut group_ids = Vec::<usize>::with_capacity(n_groups);
        for (g, (key, f, cx, cy, radial)) in self.groups.iter().enumerate() {
            let offset = group_base + g * group_block;
            match self.config {
                IntrinsicConfig::FocalPerCamera => {}
                IntrinsicConfig::SharedFocal => {
                    parameters[offset] = *f;
                }
                IntrinsicConfig::SharedBrown => {
                    parameters[offset] = *f;
                    parameters[offset + 1] = *cx;
                    parameters[offset + 2] = *cy;
                    parameters[offset + 3] = radial[0];
                    parameters[offset + 4] = radial[1];
                    parameters[offset + 5] = radial[2];
                }
            }
            group_ids.push(*key);
        }

        let point_base = group_base + n_groups * group_block;
        let mut point_ids = Vec::<TrackId>::with_capacity(n_points);
        for (p, (track, position)) in self.points.iter().enumerate() {
            let offset = point_base + p * 3;
            parameters[offset] = position[0];
            parameters[offset + 1] = position[1];
            parameters[offset + 2] = position[2];
            point_ids.push(*track);
        }

        BaProblem{
            config: self.config,
            parameters,
            observations: self.observations,
            n_cameras,
            n_groups,
            n_points,
            camera_ids,
            camera_groups,
            group_ids,
            point_ids,
            base_principal_points
        }
    }
}
