extern crate nalgebra as na;
extern crate rayon;

use log::info;
use na::Vector2;
use rayon::prelude::*;
use std::collections::HashMap;

use crate::features::{ImageFeature, ImageId, IndexedMatch, PairwiseMatches};
use crate::robust::kernels::fundamental::FundamentalKernel;
use crate::robust::kernels::homography::HomographyKernel;
use crate::robust::{acransac, Kernel};
use crate::Float;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GeometricModel {
    Fundamental,
    Homography
}

pub struct GeometricFilter {
    pub model: GeometricModel,
    pub estimator_iterations: usize,
    pub precision: Option<Float>
}

impl Default for GeometricFilter {
    fn default() -> GeometricFilter {
        GeometricFilter{model: GeometricModel::Fundamental, estimator_iterations: 1024, precision: None}
    }
}

impl GeometricFilter {
    fn filter_pair(
        &self,
        putative: &[IndexedMatch],
        features_left: &[ImageFeature],
        features_right: &[ImageFeature],
        right_dimensions: (usize, usize)
    ) -> Vec<IndexedMatch> {
        let left = putative.iter().map(|m| Vector2::<Float>::new(features_left[m.i].x, features_left[m.i].y)).collect::<Vec<Vector2<Float>>>();
        let right = putative.iter().map(|m| Vector2::<Float>::new(features_right[m.j].x, features_right[m.j].y)).collect::<Vec<Vector2<Float>>>();
        if left.is_empty() {
            return Vec::new();
        }

        let (inliers, minimum_samples) = match self.model {
            GeometricModel::Fundamental => {
                let kernel = FundamentalKernel::new(&left, &right, right_dimensions);
                (acransac(&kernel, self.estimator_iterations, self.precision).inliers, kernel.minimum_samples())
            }
            GeometricModel::Homography => {
                let kernel = HomographyKernel::new(&left, &right, right_dimensions);
                (acransac(&kernel, self.estimator_iterations, self.precision).inliers, kernel.minimum_samples())
            }
        };

        // A pair barely above the minimal sample carries no evidence.
        if inliers.len() < 5 * minimum_samples / 2 {
            return Vec::new();
        }
        inliers.into_iter().map(|i| putative[i]).collect::<Vec<IndexedMatch>>()
    }

    /**
     * Robust per-pair filtering of putative matches: independent
     * a-contrario estimations fan out over the image pairs, the surviving
     * inlier sets merge sequentially into the output map.
     */
    pub fn filter(
        &self,
        putative: &PairwiseMatches,
        features: &HashMap<ImageId, Vec<ImageFeature>>,
        dimensions: &HashMap<ImageId, (usize, usize)>
    ) -> PairwiseMatches {
        let pairs = putative.pairs().collect::<Vec<(&(ImageId, ImageId), &Vec<IndexedMatch>)>>();

        let filtered_pairs = pairs.into_par_iter()
            .map(|(&(image_i, image_j), pair_matches)| {
                let kept = self.filter_pair(
                    pair_matches,
                    &features[&image_i],
                    &features[&image_j],
                    dimensions[&image_j]
                );
                ((image_i, image_j), kept)
            })
            .collect::<Vec<((ImageId, ImageId), Vec<IndexedMatch>)>>();

        let mut geometric = PairwiseMatches::new();
        let mut kept_pairs = 0;
        for ((image_i, image_j), kept) in filtered_pairs {
            if !kept.is_empty() {
                kept_pairs += 1;
                geometric.set_pair(image_i, image_j, kept);
            }
        }
        info!("geometric filter: {} of {} pairs kept", kept_pairs, putative.pair_count());
        geometric
    }
}
