use std::io::Write;

use acsfm::features::{IndexedMatch, PairwiseMatches};
use acsfm::io::{
    build_intrinsic_groups, export_ply, read_descriptors, read_features, read_image_list,
    read_match_file, write_match_file, ListIntrinsic,
};
use nalgebra::Vector3;
use acsfm::Float;

#[test]
fn image_list_arity_selects_intrinsic_case() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lists.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "img0.jpg;640;480").unwrap();
    writeln!(file, "img1.jpg;640;480;850.5;Canon;EOS").unwrap();
    writeln!(file, "img2.jpg;640;480;850.5;Canon;EOS").unwrap();
    writeln!(file, "img3.jpg;640;480;800;0;320;0;800;240;0;0;1").unwrap();
    drop(file);

    let entries = read_image_list(&path).unwrap();
    assert_eq!(entries.len(), 4);
    assert!(entries[0].intrinsic.is_none());
    match &entries[1].intrinsic {
        Some(ListIntrinsic::Focal{focal, maker, model}) => {
            assert_eq!(*focal, 850.5);
            assert_eq!(maker, "Canon");
            assert_eq!(model, "EOS");
        }
        other => panic!("expected focal intrinsic, got {:?}", other)
    }
    match &entries[3].intrinsic {
        Some(ListIntrinsic::Full(k)) => {
            assert_eq!(k[(0, 0)], 800.0);
            assert_eq!(k[(0, 2)], 320.0);
            assert_eq!(k[(1, 2)], 240.0);
        }
        other => panic!("expected full intrinsic, got {:?}", other)
    }

    // Identical parsed intrinsics collapse into one group; the unknown
    // image keeps its own.
    let (groups, assignment) = build_intrinsic_groups(&entries);
    assert_eq!(groups.len(), 3);
    assert_eq!(assignment[1], assignment[2]);
    assert_ne!(assignment[0], assignment[1]);
    assert!(!groups[assignment[0]].known);
    assert!(groups[assignment[1]].known);
}

#[test]
fn malformed_image_list_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lists.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "img0.jpg;640").unwrap();
    drop(file);

    assert!(read_image_list(&path).is_err());
}

#[test]
fn feature_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img0.feat");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "12.5 40.25 2.0 1.5708").unwrap();
    writeln!(file, "100 200 1 0").unwrap();
    drop(file);

    let features = read_features(&path).unwrap();
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].x, 12.5);
    assert_eq!(features[0].y, 40.25);
    assert_eq!(features[0].scale, 2.0);
    assert_eq!(features[1].orientation, 0.0);
}

#[test]
fn descriptor_file_reads_count_prefixed_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img0.desc");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&3u64.to_le_bytes()).unwrap();
    for value in 0..3u8 {
        file.write_all(&[value; 4]).unwrap();
    }
    drop(file);

    let descriptors = read_descriptors(&path, 4).unwrap();
    assert_eq!(descriptors.len(), 3);
    assert_eq!(descriptors[1], vec![1, 1, 1, 1]);

    // A truncated blob is an input error, not a partial result.
    assert!(read_descriptors(&path, 8).is_err());
}

#[test]
fn match_file_round_trip() {
    let mut matches = PairwiseMatches::new();
    matches.set_pair(0, 1, vec![IndexedMatch::new(0, 5), IndexedMatch::new(3, 9)]);
    matches.set_pair(1, 2, vec![IndexedMatch::new(5, 2)]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matches.putative.txt");
    write_match_file(&path, &matches).unwrap();

    let loaded = read_match_file(&path).unwrap();
    assert_eq!(loaded.pair_count(), 2);
    assert_eq!(loaded.match_count(), 3);
    assert_eq!(loaded.get(0, 1).unwrap(), matches.get(0, 1).unwrap());
    assert_eq!(loaded.get(2, 1).unwrap(), matches.get(1, 2).unwrap());
}

#[test]
fn missing_match_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(read_match_file(&dir.path().join("absent.txt")).is_err());
}

#[test]
fn ply_export_writes_cameras_and_points() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.ply");

    let points = vec![
        Vector3::<Float>::new(0.0, 1.0, 5.0),
        Vector3::<Float>::new(-1.0, 0.5, 6.0),
    ];
    let centers = vec![Vector3::<Float>::zeros()];
    export_ply(&path, &points, None, &centers).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.starts_with("ply\nformat ascii 1.0"));
    assert!(contents.contains("element vertex 3"));
    assert!(contents.contains("0 0 0 0 255 0"));
    assert!(contents.contains("0 1 5 255 255 255"));

    // Mismatched color table is rejected.
    assert!(export_ply(&path, &points, Some(&[[255, 0, 0]]), &centers).is_err());
}
