extern crate nalgebra as na;
extern crate rayon;

use log::{debug, info, warn};
use na::{Matrix3, Matrix3x4, Vector2, Vector3};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

use crate::features::ImageId;
use crate::robust::kernels::essential::EssentialKernel;
use crate::robust::kernels::resection::{ResectionKernel, ResectionKernelK};
use crate::robust::acransac;
use crate::sensors::camera::perspective::Perspective;
use crate::sensors::camera::{decompose_projection, Camera};
use crate::sfm::bundle_adjustment::{BaProblemBuilder, BundleSolver, IntrinsicConfig};
use crate::sfm::epipolar::decompose_essential;
use crate::sfm::triangulation::{inter_ray_angle, triangulate_nview};
use crate::sfm::{CameraPose, IntrinsicGroup, View};
use crate::tracks::{TrackId, TrackSet};
use crate::Float;

/**
 * Single-writer state of a growing reconstruction. Cameras accumulate
 * monotonically; points and individual observations can be revoked by the
 * refinement passes.
 */
#[derive(Debug, Clone, Default)]
pub struct ReconstructionState {
    cameras: HashMap<ImageId, CameraPose>,
    points: HashMap<TrackId, Vector3<Float>>,
    remaining: BTreeSet<ImageId>,
    thresholds: HashMap<ImageId, Float>
}

impl ReconstructionState {
    pub fn new(image_ids: impl Iterator<Item = ImageId>) -> ReconstructionState {
        ReconstructionState{
            cameras: HashMap::new(),
            points: HashMap::new(),
            remaining: image_ids.collect::<BTreeSet<ImageId>>(),
            thresholds: HashMap::new()
        }
    }

    pub fn cameras(&self) -> &HashMap<ImageId, CameraPose> {
        &self.cameras
    }

    pub fn points(&self) -> &HashMap<TrackId, Vector3<Float>> {
        &self.points
    }

    pub fn remaining(&self) -> &BTreeSet<ImageId> {
        &self.remaining
    }

    pub fn camera(&self, image: ImageId) -> Option<&CameraPose> {
        self.cameras.get(&image)
    }

    pub fn is_posed(&self, image: ImageId) -> bool {
        self.cameras.contains_key(&image)
    }

    pub fn threshold(&self, image: ImageId) -> Option<Float> {
        self.thresholds.get(&image).copied()
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    fn insert_camera(&mut self, image: ImageId, pose: CameraPose, threshold: Float) -> () {
        self.cameras.insert(image, pose);
        self.thresholds.insert(image, threshold);
        self.remaining.remove(&image);
    }

    fn insert_point(&mut self, track: TrackId, position: Vector3<Float>) -> () {
        self.points.insert(track, position);
    }

    fn remove_point(&mut self, track: TrackId) -> () {
        self.points.remove(&track);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    Idle,
    SeedSelected,
    SeedTriangulated,
    Growing,
    Done,
    Failed
}

pub struct EngineParameters {
    /// Iteration budget per a-contrario estimation.
    pub estimator_iterations: usize,
    /// A candidate image is resected in the current round if it sees at
    /// least this fraction of the best candidate's 2D-3D correspondences.
    pub resection_ratio: Float,
    /// Minimum inter-ray angle for a triangulated point, in degrees.
    pub min_parallax_degrees: Float,
    /// Reprojection cutoff of the track-rejection pass, in pixels.
    pub rejection_precision: Float,
    pub max_refinement_rounds: usize,
    pub intrinsic_config: IntrinsicConfig
}

impl Default for EngineParameters {
    fn default() -> EngineParameters {
        EngineParameters{
            estimator_iterations: 1024,
            resection_ratio: 0.75,
            min_parallax_degrees: 2.0,
            rejection_precision: 4.0,
            max_refinement_rounds: 16,
            intrinsic_config: IntrinsicConfig::FocalPerCamera
        }
    }
}

/**
 * Grows a reconstruction image by image:
 * Idle -> SeedSelected -> SeedTriangulated -> Growing
 * -> (BundleRefine <-> Growing) -> Done | Failed.
 * Owns the TrackSet exclusively; outlier observations are pruned from it
 * during refinement.
 */
pub struct IncrementalEngine<S: BundleSolver> {
    views: HashMap<ImageId, View>,
    groups: Vec<IntrinsicGroup>,
    tracks: TrackSet,
    state: ReconstructionState,
    status: EngineStatus,
    params: EngineParameters,
    solver: S,
    seed: Option<(ImageId, ImageId)>
}

impl<S: BundleSolver> IncrementalEngine<S> {
    pub fn new(views: Vec<View>, groups: Vec<IntrinsicGroup>, tracks: TrackSet, params: EngineParameters, solver: S) -> IncrementalEngine<S> {
        let state = ReconstructionState::new(views.iter().map(|v| v.id));
        let views = views.into_iter().map(|v| (v.id, v)).collect::<HashMap<ImageId, View>>();
        IncrementalEngine{views, groups, tracks, state, status: EngineStatus::Idle, params, solver, seed: None}
    }

    pub fn state(&self) -> &ReconstructionState {
        &self.state
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn seed(&self) -> Option<(ImageId, ImageId)> {
        self.seed
    }

    fn group_of(&self, view: &View) -> &IntrinsicGroup {
        &self.groups[view.intrinsic_group]
    }

    /**
     * The user pair, or the pair sharing the most tracks as a heuristic for
     * reconstructability.
     */
    fn select_seed(&mut self, user_pair: Option<(ImageId, ImageId)>) -> Option<(ImageId, ImageId)> {
        if let Some((a, b)) = user_pair {
            if a != b && self.views.contains_key(&a) && self.views.contains_key(&b) {
                return Some((a, b));
            }
            warn!("seed: user pair ({},{}) not usable, falling back to best pair", a, b);
        }

        let mut pair_counts = HashMap::<(ImageId, ImageId), usize>::new();
        for (_, track) in self.tracks.iter() {
            let images = track.images().collect::<Vec<ImageId>>();
            for i in 0..images.len() {
                for j in (i + 1)..images.len() {
                    *pair_counts.entry((images[i], images[j])).or_insert(0) += 1;
                }
            }
        }

        pair_counts.into_iter()
            .max_by_key(|&(pair, count)| (count, std::cmp::Reverse(pair)))
            .map(|(pair, _)| pair)
    }

    /**
     * Bootstraps the reconstruction from the seed pair: a-contrario
     * essential estimation, cheirality-based decomposition, DLT
     * triangulation of the common tracks with depth and parallax filters.
     */
    #[allow(non_snake_case)]
    fn triangulate_seed(&mut self, pair: (ImageId, ImageId)) -> bool {
        let (id_a, id_b) = pair;
        let view_a = &self.views[&id_a];
        let view_b = &self.views[&id_b];
        let intrinsic_a = self.group_of(view_a).intrinsic;
        let intrinsic_b = self.group_of(view_b).intrinsic;

        let common = self.tracks.common_tracks(id_a, id_b);
        let x_a = common.iter().map(|&(_, f_a, _)| view_a.feature_point(f_a)).collect::<Vec<Vector2<Float>>>();
        let x_b = common.iter().map(|&(_, _, f_b)| view_b.feature_point(f_b)).collect::<Vec<Vector2<Float>>>();
        info!("seed ({},{}): {} common tracks", id_a, id_b, common.len());

        let kernel = EssentialKernel::new(
            &x_a,
            &x_b,
            &intrinsic_a.get_inverse_projection(),
            &intrinsic_b.get_inverse_projection(),
            (view_b.width, view_b.height)
        );
        let estimation = acransac(&kernel, self.params.estimator_iterations, None);
        if !estimation.found() {
            warn!("seed ({},{}): no meaningful essential matrix", id_a, id_b);
            return false;
        }
        let essential = estimation.model.expect("seed: estimation reported found without model");

        let (bearings_a, bearings_b) = kernel.bearings();
        let inlier_bearings_a = estimation.inliers.iter().map(|&i| bearings_a[i]).collect::<Vec<Vector2<Float>>>();
        let inlier_bearings_b = estimation.inliers.iter().map(|&i| bearings_b[i]).collect::<Vec<Vector2<Float>>>();

        let (R, t) = match decompose_essential(&essential, &inlier_bearings_a, &inlier_bearings_b) {
            Some(motion) => motion,
            None => {
                warn!("seed ({},{}): essential decomposition failed", id_a, id_b);
                return false;
            }
        };

        let camera_a = CameraPose::new(intrinsic_a, Matrix3::<Float>::identity(), Vector3::<Float>::zeros());
        let camera_b = CameraPose::new(intrinsic_b, R, t);
        let P_a = camera_a.projection_matrix();
        let P_b = camera_b.projection_matrix();
        let center_a = camera_a.center();
        let center_b = camera_b.center();

        let mut triangulated = Vec::<(TrackId, Vector3<Float>)>::with_capacity(estimation.inliers.len());
        let mut dropped = 0;
        for &inlier in &estimation.inliers {
            let (track_id, f_a, f_b) = common[inlier];
            let observations = [(P_a, view_a.feature_point(f_a)), (P_b, view_b.feature_point(f_b))];
            match triangulate_nview(&observations) {
                Some(point) => {
                    let in_front = camera_a.depth_of(&point) > 0.0 && camera_b.depth_of(&point) > 0.0;
                    let parallax = inter_ray_angle(&point, &center_a, &center_b);
                    if in_front && parallax >= self.params.min_parallax_degrees {
                        triangulated.push((track_id, point));
                    } else {
                        dropped += 1;
                    }
                }
                None => dropped += 1
            }
        }
        info!("seed ({},{}): {} points triangulated, {} dropped", id_a, id_b, triangulated.len(), dropped);

        if triangulated.len() < 6 {
            // Nothing is committed, so the caller is free to retry another seed.
            warn!("seed ({},{}): too few well-conditioned points", id_a, id_b);
            return false;
        }

        for (track_id, point) in triangulated {
            self.state.insert_point(track_id, point);
        }
        self.state.insert_camera(id_a, camera_a, estimation.threshold);
        self.state.insert_camera(id_b, camera_b, estimation.threshold);
        true
    }

    /// 2D-3D correspondences of an unprocessed view against the current structure.
    fn correspondences_2d3d(&self, image: ImageId) -> (Vec<Vector2<Float>>, Vec<Vector3<Float>>) {
        let view = &self.views[&image];
        let mut points2d = Vec::<Vector2<Float>>::new();
        let mut points3d = Vec::<Vector3<Float>>::new();
        for (&track_id, position) in self.state.points.iter() {
            if let Some(track) = self.tracks.get(track_id) {
                if let Some(feature) = track.feature_in(image) {
                    points2d.push(view.feature_point(feature));
                    points3d.push(*position);
                }
            }
        }
        (points2d, points3d)
    }

    /**
     * Recovers the pose of one view from its 2D-3D correspondences, with
     * the calibrated kernel when the intrinsic group is known and the
     * projective 6-point kernel (plus K[R|t] decomposition) otherwise.
     */
    fn resect_view(&mut self, image: ImageId) -> bool {
        let (points2d, points3d) = self.correspondences_2d3d(image);
        let view = &self.views[&image];
        let group = self.group_of(view);
        let dimensions = (view.width, view.height);

        let resected = match group.known {
            true => {
                let intrinsic = group.intrinsic;
                let kernel = ResectionKernelK::new(
                    &points2d,
                    &points3d,
                    &intrinsic.get_projection(),
                    &intrinsic.get_inverse_projection(),
                    dimensions
                );
                let estimation = acransac(&kernel, self.params.estimator_iterations, None);
                let threshold = estimation.threshold;
                estimation.model.map(|(rotation, translation)| {
                    (CameraPose::new(intrinsic, rotation, translation), threshold)
                })
            }
            false => {
                let kernel = ResectionKernel::new(&points2d, &points3d, dimensions);
                let estimation = acransac(&kernel, self.params.estimator_iterations, None);
                let threshold = estimation.threshold;
                estimation.model.and_then(|projection: Matrix3x4<Float>| {
                    decompose_projection(&projection).map(|(k, pose)| {
                        let intrinsic = Perspective::from_matrix(&k);
                        let rotation = pose.fixed_view::<3, 3>(0, 0).into_owned();
                        let translation = pose.fixed_view::<3, 1>(0, 3).into_owned();
                        (CameraPose::new(intrinsic, rotation, translation), threshold)
                    })
                })
            }
        };

        match resected {
            Some((pose, threshold)) => {
                info!("resection: image {} posed from {} correspondences", image, points2d.len());
                self.state.insert_camera(image, pose, threshold);
                true
            }
            None => {
                debug!("resection: image {} failed, kept for a later round", image);
                false
            }
        }
    }

    /**
     * Triangulates tracks that became observable through the newly posed
     * view, against every already-reconstructed camera that sees them.
     */
    fn triangulate_new_tracks(&mut self, image: ImageId) -> () {
        let mut added = 0;
        let mut dropped = 0;
        let candidate_ids = self.tracks.iter()
            .filter(|&(track_id, track)| track.observes(image) && !self.state.points.contains_key(&track_id))
            .map(|(track_id, _)| track_id)
            .collect::<Vec<TrackId>>();

        for track_id in candidate_ids {
            let track = match self.tracks.get(track_id) {
                Some(t) => t,
                None => continue
            };

            let mut observations = Vec::<(Matrix3x4<Float>, Vector2<Float>)>::new();
            let mut posed = Vec::<&CameraPose>::new();
            for (obs_image, feature) in track.iter() {
                if let Some(camera) = self.state.cameras.get(&obs_image) {
                    observations.push((camera.projection_matrix(), self.views[&obs_image].feature_point(feature)));
                    posed.push(camera);
                }
            }
            if observations.len() < 2 {
                continue;
            }

            match triangulate_nview(&observations) {
                Some(point) => {
                    let in_front = posed.iter().all(|camera| camera.depth_of(&point) > 0.0);
                    let centers = posed.iter().map(|camera| camera.center()).collect::<Vec<Vector3<Float>>>();
                    let mut max_parallax = 0.0;
                    for i in 0..centers.len() {
                        for j in (i + 1)..centers.len() {
                            max_parallax = inter_ray_angle(&point, &centers[i], &centers[j]).max(max_parallax);
                        }
                    }
                    if in_front && max_parallax >= self.params.min_parallax_degrees {
                        self.state.insert_point(track_id, point);
                        added += 1;
                    } else {
                        dropped += 1;
                    }
                }
                None => dropped += 1
            }
        }
        info!("triangulation: image {} added {} points, {} dropped", image, added, dropped);
    }

    /**
     * One growing round: every unprocessed view scoring at least
     * resection_ratio of the best candidate is resected, then its newly
     * observable tracks are triangulated. Returns the number of views posed.
     */
    fn grow_round(&mut self) -> usize {
        let remaining = self.state.remaining.iter().copied().collect::<Vec<ImageId>>();
        let tracks = &self.tracks;
        let points = &self.state.points;
        let mut scores = remaining.par_iter()
            .map(|&image| {
                let count = points.keys()
                    .filter(|&&track_id| tracks.get(track_id).map_or(false, |t| t.observes(image)))
                    .count();
                (image, count)
            })
            .collect::<Vec<(ImageId, usize)>>();
        scores.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let best = match scores.first() {
            Some(&(_, count)) => count,
            None => return 0
        };
        if best <= 6 {
            return 0;
        }

        let cutoff = ((best as Float) * self.params.resection_ratio).ceil() as usize;
        let candidates = scores.into_iter()
            .filter(|&(_, count)| count > 6 && count >= cutoff)
            .map(|(image, _)| image)
            .collect::<Vec<ImageId>>();

        let mut resected = 0;
        for image in candidates {
            if self.resect_view(image) {
                resected += 1;
                self.triangulate_new_tracks(image);
            }
        }
        resected
    }

    fn assemble_problem(&self) -> crate::sfm::bundle_adjustment::BaProblem {
        let mut builder = BaProblemBuilder::new(self.params.intrinsic_config);
        let mut posed_ids = self.state.cameras.keys().copied().collect::<Vec<ImageId>>();
        posed_ids.sort_unstable();
        for &image in &posed_ids {
            let view = &self.views[&image];
            let group = self.group_of(view);
            builder.add_camera(image, view.intrinsic_group, &self.state.cameras[&image], group.radial_distortion);
        }

        let mut point_ids = self.state.points.keys().copied().collect::<Vec<TrackId>>();
        point_ids.sort_unstable();
        for &track_id in &point_ids {
            builder.add_point(track_id, &self.state.points[&track_id]);
            if let Some(track) = self.tracks.get(track_id) {
                for (image, feature) in track.iter() {
                    if self.state.is_posed(image) {
                        let observation = self.views[&image].feature_point(feature);
                        builder.add_observation(image, track_id, observation[0], observation[1]);
                    }
                }
            }
        }
        builder.build()
    }

    fn commit_problem(&mut self, problem: &crate::sfm::bundle_adjustment::BaProblem) -> () {
        for c in 0..problem.n_cameras {
            let image = problem.camera_ids[c];
            let (rotation, translation) = problem.camera_pose(c);
            let group_internal = problem.camera_groups[c];
            let (f, cx, cy, _radial) = problem.camera_intrinsics(c, group_internal);
            if let Some(camera) = self.state.cameras.get_mut(&image) {
                camera.rotation = rotation;
                camera.translation = translation;
                camera.intrinsic = Perspective::new(f, f * camera.intrinsic.get_fy() / camera.intrinsic.get_fx(), cx, cy, camera.intrinsic.get_s());
            }
        }
        for (g_internal, &group_key) in problem.group_ids.iter().enumerate() {
            let offset = problem.group_offset(g_internal);
            match self.params.intrinsic_config {
                IntrinsicConfig::FocalPerCamera => {}
                IntrinsicConfig::SharedFocal => {
                    let f = problem.parameters[offset];
                    let group = &mut self.groups[group_key];
                    let fy = f * group.intrinsic.get_fy() / group.intrinsic.get_fx();
                    group.intrinsic = Perspective::new(f, fy, group.intrinsic.get_cx(), group.intrinsic.get_cy(), group.intrinsic.get_s());
                }
                IntrinsicConfig::SharedBrown => {
                    let f = problem.parameters[offset];
                    let cx = problem.parameters[offset + 1];
                    let cy = problem.parameters[offset + 2];
                    let group = &mut self.groups[group_key];
                    let fy = f * group.intrinsic.get_fy() / group.intrinsic.get_fx();
                    group.intrinsic = Perspective::new(f, fy, cx, cy, group.intrinsic.get_s());
                    group.radial_distortion = [
                        problem.parameters[offset + 3],
                        problem.parameters[offset + 4],
                        problem.parameters[offset + 5]
                    ];
                }
            }
        }
        for p in 0..problem.n_points {
            let track_id = problem.point_ids[p];
            if self.state.points.contains_key(&track_id) {
                self.state.insert_point(track_id, problem.point_position(p));
            }
        }
    }

    /**
     * Bundle adjustment alternated with track rejection until stable:
     * observations above the precision cutoff are pruned, tracks starved
     * below two observations or flat parallax disappear entirely.
     */
    fn refine(&mut self) -> () {
        for round in 0..self.params.max_refinement_rounds {
            let mut problem = self.assemble_problem();
            if problem.observations.is_empty() {
                return;
            }
            let rmse_before = problem.rmse();
            let solved = self.solver.solve(&mut problem);
            if solved {
                self.commit_problem(&problem);
                info!("refine round {}: rmse {:.4} -> {:.4}", round, rmse_before, problem.rmse());
            } else {
                debug!("refine round {}: solver kept pre-optimization state", round);
            }

            let rejected = self.reject_outlier_observations();
            if rejected == 0 {
                return;
            }
            info!("refine round {}: rejected {} observations", round, rejected);
        }
    }

    fn reject_outlier_observations(&mut self) -> usize {
        let mut rejected = 0;
        let point_ids = self.state.points.keys().copied().collect::<Vec<TrackId>>();
        for track_id in point_ids {
            let position = self.state.points[&track_id];
            let track = match self.tracks.get(track_id) {
                Some(t) => t.clone(),
                None => {
                    self.state.remove_point(track_id);
                    continue;
                }
            };

            for (image, feature) in track.iter() {
                let camera = match self.state.cameras.get(&image) {
                    Some(c) => c,
                    None => continue
                };
                let observation = self.views[&image].feature_point(feature);
                let cutoff = self.params.rejection_precision.max(self.state.threshold(image).unwrap_or(0.0));
                if camera.reprojection_error(&position, &observation) > cutoff {
                    self.tracks.get_mut(track_id).expect("reject: track vanished").remove_observation(image);
                    rejected += 1;
                }
            }

            let track = match self.tracks.get(track_id) {
                Some(t) => t,
                None => continue
            };
            if track.len() < 2 {
                self.tracks.remove(track_id);
                self.state.remove_point(track_id);
                continue;
            }

            let posed_centers = track.iter()
                .filter_map(|(image, _)| self.state.cameras.get(&image).map(|c| c.center()))
                .collect::<Vec<Vector3<Float>>>();
            if posed_centers.len() < 2 {
                self.state.remove_point(track_id);
                continue;
            }
            let mut max_parallax = 0.0;
            for i in 0..posed_centers.len() {
                for j in (i + 1)..posed_centers.len() {
                    max_parallax = inter_ray_angle(&position, &posed_centers[i], &posed_centers[j]).max(max_parallax);
                }
            }
            if max_parallax < self.params.min_parallax_degrees {
                self.tracks.remove(track_id);
                self.state.remove_point(track_id);
            }
        }
        rejected
    }

    /**
     * Runs the full state machine. Terminal states: Done with at least two
     * bundle-adjusted cameras, or Failed when the seed (or every resection)
     * came up empty.
     */
    pub fn run(&mut self, user_seed: Option<(ImageId, ImageId)>) -> EngineStatus {
        self.status = EngineStatus::Idle;

        let pair = match self.select_seed(user_seed) {
            Some(pair) => pair,
            None => {
                warn!("engine: no viable seed pair");
                self.status = EngineStatus::Failed;
                return self.status;
            }
        };
        self.seed = Some(pair);
        self.status = EngineStatus::SeedSelected;
        info!("engine: seed pair ({},{})", pair.0, pair.1);

        if !self.triangulate_seed(pair) {
            self.status = EngineStatus::Failed;
            return self.status;
        }
        self.status = EngineStatus::SeedTriangulated;
        self.refine();

        loop {
            self.status = EngineStatus::Growing;
            let resected = self.grow_round();
            if resected == 0 {
                break;
            }
            info!("engine: round resected {} views ({} posed, {} points)", resected, self.state.camera_count(), self.state.point_count());
            self.refine();
        }

        self.status = match self.state.camera_count() {
            n if n >= 2 => EngineStatus::Done,
            _ => EngineStatus::Failed
        };
        info!("engine: finished with {} cameras, {} points", self.state.camera_count(), self.state.point_count());
        self.status
    }
}
