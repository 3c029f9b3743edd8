extern crate nalgebra as na;

use na::{Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Float;

pub type ImageId = usize;
pub type FeatureId = usize;

pub trait Feature {
    fn get_x_image_float(&self) -> Float;
    fn get_y_image_float(&self) -> Float;
    fn get_as_2d_point(&self) -> Vector2<Float> {
        Vector2::<Float>::new(self.get_x_image_float(), self.get_y_image_float())
    }
    fn get_as_3d_point(&self) -> Vector3<Float> {
        Vector3::<Float>::new(self.get_x_image_float(), self.get_y_image_float(), 1.0)
    }
}

/**
 * A located keypoint in pixel coordinates. Scale and orientation come from
 * the external detector and are carried through untouched.
 */
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageFeature {
    pub x: Float,
    pub y: Float,
    pub scale: Float,
    pub orientation: Float
}

impl ImageFeature {
    pub fn new(x: Float, y: Float) -> ImageFeature {
        ImageFeature{x, y, scale: 1.0, orientation: 0.0}
    }

    pub fn with_scale_and_orientation(x: Float, y: Float, scale: Float, orientation: Float) -> ImageFeature {
        ImageFeature{x, y, scale, orientation}
    }
}

impl Feature for ImageFeature {
    fn get_x_image_float(&self) -> Float { self.x }
    fn get_y_image_float(&self) -> Float { self.y }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Match<T: Feature> {
    pub feature_one: T,
    pub feature_two: T
}

impl<T: Feature> Match<T> {
    pub fn new(feature_one: T, feature_two: T) -> Match<T> {
        Match{feature_one, feature_two}
    }
}

/**
 * An ordered pair of feature indices for two specific images.
 */
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexedMatch {
    pub i: FeatureId,
    pub j: FeatureId
}

impl IndexedMatch {
    pub fn new(i: FeatureId, j: FeatureId) -> IndexedMatch {
        IndexedMatch{i, j}
    }
}

/**
 * Indexed matches per unordered image pair. Pairs are keyed as (min,max);
 * inserting a match for a flipped pair swaps its feature indices so the
 * stored orientation stays consistent. De-duplicated by value.
 */
#[derive(Debug, Clone, Default)]
pub struct PairwiseMatches {
    map: BTreeMap<(ImageId, ImageId), Vec<IndexedMatch>>
}

impl PairwiseMatches {
    pub fn new() -> PairwiseMatches {
        PairwiseMatches{map: BTreeMap::new()}
    }

    pub fn insert(&mut self, image_a: ImageId, image_b: ImageId, m: IndexedMatch) -> () {
        assert_ne!(image_a, image_b);
        let (key, m_oriented) = match image_a < image_b {
            true => ((image_a, image_b), m),
            false => ((image_b, image_a), IndexedMatch::new(m.j, m.i))
        };
        let matches_for_pair = self.map.entry(key).or_insert_with(Vec::new);
        if !matches_for_pair.contains(&m_oriented) {
            matches_for_pair.push(m_oriented);
        }
    }

    pub fn set_pair(&mut self, image_a: ImageId, image_b: ImageId, matches: Vec<IndexedMatch>) -> () {
        assert_ne!(image_a, image_b);
        let (key, mut matches_oriented) = match image_a < image_b {
            true => ((image_a, image_b), matches),
            false => ((image_b, image_a), matches.into_iter().map(|m| IndexedMatch::new(m.j, m.i)).collect::<Vec<IndexedMatch>>())
        };
        matches_oriented.sort_unstable();
        matches_oriented.dedup();
        self.map.insert(key, matches_oriented);
    }

    pub fn get(&self, image_a: ImageId, image_b: ImageId) -> Option<&Vec<IndexedMatch>> {
        let key = match image_a < image_b {
            true => (image_a, image_b),
            false => (image_b, image_a)
        };
        self.map.get(&key)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&(ImageId, ImageId), &Vec<IndexedMatch>)> {
        self.map.iter()
    }

    pub fn pair_count(&self) -> usize {
        self.map.len()
    }

    pub fn match_count(&self) -> usize {
        self.map.values().fold(0, |acc, v| acc + v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
