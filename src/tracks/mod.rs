use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::features::{FeatureId, ImageId, PairwiseMatches};

pub type TrackId = usize;

/**
 * Observations of one physical 3D point: at most one feature per image.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    observations: BTreeMap<ImageId, FeatureId>
}

impl Track {
    pub fn new() -> Track {
        Track{observations: BTreeMap::new()}
    }

    pub fn insert_observation(&mut self, image: ImageId, feature: FeatureId) -> () {
        self.observations.insert(image, feature);
    }

    pub fn remove_observation(&mut self, image: ImageId) -> () {
        self.observations.remove(&image);
    }

    pub fn feature_in(&self, image: ImageId) -> Option<FeatureId> {
        self.observations.get(&image).copied()
    }

    pub fn observes(&self, image: ImageId) -> bool {
        self.observations.contains_key(&image)
    }

    pub fn images(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.observations.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageId, FeatureId)> + '_ {
        self.observations.iter().map(|(&i, &f)| (i, f))
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackSet {
    tracks: BTreeMap<TrackId, Track>
}

impl TrackSet {
    pub fn new() -> TrackSet {
        TrackSet{tracks: BTreeMap::new()}
    }

    pub fn insert(&mut self, id: TrackId, track: Track) -> () {
        self.tracks.insert(id, track);
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    pub fn remove(&mut self, id: TrackId) -> () {
        self.tracks.remove(&id);
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrackId, &Track)> {
        self.tracks.iter().map(|(&id, t)| (id, t))
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect::<Vec<TrackId>>()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /**
     * Tracks observed in both images, with their feature indices.
     */
    pub fn common_tracks(&self, image_a: ImageId, image_b: ImageId) -> Vec<(TrackId, FeatureId, FeatureId)> {
        self.tracks.iter()
            .filter_map(|(&id, track)| match (track.feature_in(image_a), track.feature_in(image_b)) {
                (Some(f_a), Some(f_b)) => Some((id, f_a, f_b)),
                _ => None
            })
            .collect::<Vec<(TrackId, FeatureId, FeatureId)>>()
    }
}

/**
 * Arena-indexed union-find with path compression and union by rank.
 * Node ids are assigned densely at first sight.
 */
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>
}

impl UnionFind {
    pub fn new() -> UnionFind {
        UnionFind{parent: Vec::new(), rank: Vec::new()}
    }

    pub fn new_node(&mut self) -> usize {
        let id = self.parent.len();
        self.parent.push(id);
        self.rank.push(0);
        id
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) -> () {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }
}

/**
 * Fuses pairwise correspondences into multi-image tracks. Every match
 * (I,i) <-> (J,j) unions the two (image,feature) nodes; the surviving
 * union-find classes are materialized by export().
 */
pub struct TrackBuilder {
    uf: UnionFind,
    node_ids: HashMap<(ImageId, FeatureId), usize>,
    nodes: Vec<(ImageId, FeatureId)>,
    removed_roots: BTreeSet<usize>
}

impl TrackBuilder {
    pub fn new() -> TrackBuilder {
        TrackBuilder{
            uf: UnionFind::new(),
            node_ids: HashMap::new(),
            nodes: Vec::new(),
            removed_roots: BTreeSet::new()
        }
    }

    fn node(&mut self, image: ImageId, feature: FeatureId) -> usize {
        match self.node_ids.get(&(image, feature)) {
            Some(&id) => id,
            None => {
                let id = self.uf.new_node();
                self.node_ids.insert((image, feature), id);
                self.nodes.push((image, feature));
                id
            }
        }
    }

    pub fn build(&mut self, matches: &PairwiseMatches) -> () {
        for (&(image_i, image_j), pair_matches) in matches.pairs() {
            for m in pair_matches {
                let node_a = self.node(image_i, m.i);
                let node_b = self.node(image_j, m.j);
                self.uf.union(node_a, node_b);
            }
        }
    }

    fn classes(&mut self) -> BTreeMap<usize, Vec<(ImageId, FeatureId)>> {
        let mut classes = BTreeMap::<usize, Vec<(ImageId, FeatureId)>>::new();
        for node in 0..self.uf.len() {
            let root = self.uf.find(node);
            if self.removed_roots.contains(&root) {
                continue;
            }
            let (image, feature) = self.nodes[node];
            classes.entry(root).or_insert_with(Vec::new).push((image, feature));
        }
        classes
    }

    /**
     * Removes classes with two different features of the same image
     * (conflicts from symmetric or multiple matches) and classes spanning
     * fewer than min_length distinct images.
     */
    pub fn filter(&mut self, min_length: usize) -> () {
        let classes = self.classes();
        let mut conflicts = 0;
        let mut short = 0;
        for (root, members) in &classes {
            let mut images_seen = BTreeSet::<ImageId>::new();
            let mut conflict = false;
            for &(image, _) in members {
                if !images_seen.insert(image) {
                    conflict = true;
                    break;
                }
            }
            if conflict {
                conflicts += 1;
                self.removed_roots.insert(*root);
            } else if images_seen.len() < min_length {
                short += 1;
                self.removed_roots.insert(*root);
            }
        }
        info!("track filter: {} conflicting, {} below length {}", conflicts, short, min_length);
    }

    /**
     * Cross-validation against spurious global matches: a track is kept only
     * if every pair of images it touches shares at least threshold tracks.
     */
    pub fn filter_pairwise_minimum_matches(&mut self, threshold: usize) -> () {
        let classes = self.classes();

        let mut pair_support = HashMap::<(ImageId, ImageId), usize>::new();
        for members in classes.values() {
            let images = members.iter().map(|&(image, _)| image).collect::<BTreeSet<ImageId>>();
            let image_list = images.into_iter().collect::<Vec<ImageId>>();
            for a in 0..image_list.len() {
                for b in (a + 1)..image_list.len() {
                    *pair_support.entry((image_list[a], image_list[b])).or_insert(0) += 1;
                }
            }
        }

        let mut dropped = 0;
        for (root, members) in &classes {
            let images = members.iter().map(|&(image, _)| image).collect::<BTreeSet<ImageId>>();
            let image_list = images.into_iter().collect::<Vec<ImageId>>();
            let mut supported = true;
            'pairs: for a in 0..image_list.len() {
                for b in (a + 1)..image_list.len() {
                    let support = pair_support.get(&(image_list[a], image_list[b])).copied().unwrap_or(0);
                    if support < threshold {
                        supported = false;
                        break 'pairs;
                    }
                }
            }
            if !supported {
                dropped += 1;
                self.removed_roots.insert(*root);
            }
        }
        info!("track pairwise-support filter: {} dropped below {}", dropped, threshold);
    }

    /**
     * Materializes the surviving union-find classes into a TrackSet. Classes
     * violating the one-feature-per-image invariant never survive export.
     */
    pub fn export(&mut self) -> TrackSet {
        let classes = self.classes();
        let mut track_set = TrackSet::new();
        let mut next_id: TrackId = 0;
        for members in classes.values() {
            let mut track = Track::new();
            let mut conflict = false;
            for &(image, feature) in members {
                match track.feature_in(image) {
                    Some(existing) if existing != feature => {
                        conflict = true;
                        break;
                    }
                    _ => track.insert_observation(image, feature)
                }
            }
            if conflict || track.len() < 2 {
                continue;
            }
            track_set.insert(next_id, track);
            next_id += 1;
        }
        info!("track export: {} tracks", track_set.len());
        track_set
    }
}
