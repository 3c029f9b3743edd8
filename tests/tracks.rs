use acsfm::features::{IndexedMatch, PairwiseMatches};
use acsfm::tracks::TrackBuilder;

fn matches_of(pairs: &[(usize, usize, &[(usize, usize)])]) -> PairwiseMatches {
    let mut matches = PairwiseMatches::new();
    for &(image_i, image_j, pair_matches) in pairs {
        for &(i, j) in pair_matches {
            matches.insert(image_i, image_j, IndexedMatch::new(i, j));
        }
    }
    matches
}

#[test]
fn fuses_transitive_correspondences_into_one_track() {
    // feature 0 of image 0 <-> feature 5 of image 1 <-> feature 9 of image 2
    let matches = matches_of(&[
        (0, 1, &[(0, 5)]),
        (1, 2, &[(5, 9)]),
    ]);

    let mut builder = TrackBuilder::new();
    builder.build(&matches);
    builder.filter(2);
    let tracks = builder.export();

    assert_eq!(tracks.len(), 1);
    let (_, track) = tracks.iter().next().unwrap();
    assert_eq!(track.len(), 3);
    assert_eq!(track.feature_in(0), Some(0));
    assert_eq!(track.feature_in(1), Some(5));
    assert_eq!(track.feature_in(2), Some(9));
}

#[test]
fn conflicting_classes_are_removed() {
    // Image 1 sees two different features fused into the same class.
    let matches = matches_of(&[
        (0, 1, &[(0, 5)]),
        (0, 1, &[(0, 6)]),
    ]);

    let mut builder = TrackBuilder::new();
    builder.build(&matches);
    builder.filter(2);
    let tracks = builder.export();

    assert!(tracks.is_empty());
}

#[test]
fn no_conflicts_survive_filtering() {
    let matches = matches_of(&[
        (0, 1, &[(0, 5), (1, 6), (2, 7)]),
        (1, 2, &[(5, 9), (6, 6), (7, 7)]),
        (0, 2, &[(2, 7), (3, 11)]),
        // conflicting double match
        (0, 1, &[(3, 8)]),
        (1, 2, &[(8, 11), (8, 12)]),
    ]);

    let mut builder = TrackBuilder::new();
    builder.build(&matches);
    builder.filter(2);
    let tracks = builder.export();

    for (_, track) in tracks.iter() {
        let images: Vec<usize> = track.images().collect();
        let mut deduped = images.clone();
        deduped.dedup();
        assert_eq!(images, deduped, "a track observes some image twice");
        assert!(track.len() >= 2);
    }
}

#[test]
fn short_classes_are_removed() {
    let matches = matches_of(&[
        (0, 1, &[(0, 5), (1, 6)]),
        (1, 2, &[(6, 9)]),
    ]);

    let mut builder = TrackBuilder::new();
    builder.build(&matches);
    builder.filter(3);
    let tracks = builder.export();

    // Only the track spanning all three images survives minLength = 3.
    assert_eq!(tracks.len(), 1);
    let (_, track) = tracks.iter().next().unwrap();
    assert_eq!(track.len(), 3);
}

#[test]
fn pairwise_minimum_support_drops_weak_tracks() {
    // Three tracks between images 0 and 1, a single spurious track touching
    // image 2.
    let matches = matches_of(&[
        (0, 1, &[(0, 10), (1, 11), (2, 12)]),
        (0, 2, &[(3, 20)]),
    ]);

    let mut builder = TrackBuilder::new();
    builder.build(&matches);
    builder.filter(2);
    builder.filter_pairwise_minimum_matches(2);
    let tracks = builder.export();

    assert_eq!(tracks.len(), 3);
    for (_, track) in tracks.iter() {
        assert!(!track.observes(2));
    }
}

#[test]
fn empty_input_yields_empty_track_set() {
    let mut builder = TrackBuilder::new();
    builder.build(&PairwiseMatches::new());
    builder.filter(2);
    assert!(builder.export().is_empty());
}

#[test]
fn flipped_pair_insertion_is_normalized() {
    let mut matches = PairwiseMatches::new();
    matches.insert(1, 0, IndexedMatch::new(5, 0));
    matches.insert(0, 1, IndexedMatch::new(0, 5));

    assert_eq!(matches.match_count(), 1);
    let stored = matches.get(0, 1).unwrap();
    assert_eq!(stored[0], IndexedMatch::new(0, 5));
}
