extern crate nalgebra as na;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::info;
use na::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::features::{ImageFeature, ImageId, IndexedMatch, PairwiseMatches};
use crate::sensors::camera::perspective::Perspective;
use crate::sfm::incremental::ReconstructionState;
use crate::sfm::IntrinsicGroup;
use crate::Float;

/**
 * One line of the image list. The line arity selects the intrinsic case:
 * name;width;height                      no calibration
 * name;width;height;focal[;maker[;model]] known focal (pixels), centered pp
 * name;width;height;k00;...;k22          full 3x3 intrinsic matrix
 */
#[derive(Debug, Clone, PartialEq)]
pub struct ImageListEntry {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub intrinsic: Option<ListIntrinsic>
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListIntrinsic {
    Focal{focal: Float, maker: String, model: String},
    Full(Matrix3<Float>)
}

fn parse_field<T: std::str::FromStr>(field: &str, line_number: usize, what: &str) -> Result<T> {
    field.trim().parse::<T>().map_err(|_| eyre!("line {}: could not parse {} from '{}'", line_number, what, field))
}

pub fn read_image_list(path: &Path) -> Result<Vec<ImageListEntry>> {
    let file = File::open(path).wrap_err_with(|| format!("opening image list {:?}", path))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::<ImageListEntry>::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.wrap_err("reading image list")?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.split(';').collect::<Vec<&str>>();
        let name = fields[0].trim().to_string();
        if fields.len() < 3 {
            return Err(eyre!("image list line {}: expected at least name;width;height", line_number));
        }
        let width = parse_field::<usize>(fields[1], line_number, "width")?;
        let height = parse_field::<usize>(fields[2], line_number, "height")?;

        let intrinsic = match fields.len() {
            3 => None,
            4..=6 => {
                let focal = parse_field::<Float>(fields[3], line_number, "focal")?;
                let maker = fields.get(4).map(|s| s.trim().to_string()).unwrap_or_default();
                let model = fields.get(5).map(|s| s.trim().to_string()).unwrap_or_default();
                Some(ListIntrinsic::Focal{focal, maker, model})
            }
            12 => {
                let mut k = [0.0 as Float; 9];
                for (idx, field) in fields[3..12].iter().enumerate() {
                    k[idx] = parse_field::<Float>(field, line_number, "intrinsic coefficient")?;
                }
                Some(ListIntrinsic::Full(Matrix3::<Float>::new(
                    k[0], k[1], k[2],
                    k[3], k[4], k[5],
                    k[6], k[7], k[8]
                )))
            }
            n => return Err(eyre!("image list line {}: unexpected field count {}", line_number, n))
        };

        entries.push(ImageListEntry{name, width, height, intrinsic});
    }
    info!("image list: {} entries from {:?}", entries.len(), path);
    Ok(entries)
}

/**
 * Merges images with identical parsed intrinsics into intrinsic groups and
 * assigns each image its group index. Images without calibration each get
 * their own group seeded with a focal guess and a centered principal point.
 */
pub fn build_intrinsic_groups(entries: &[ImageListEntry]) -> (Vec<IntrinsicGroup>, Vec<usize>) {
    let mut groups = Vec::<IntrinsicGroup>::new();
    let mut group_keys = Vec::<Option<(ListIntrinsic, usize, usize)>>::new();
    let mut assignment = Vec::<usize>::with_capacity(entries.len());

    for entry in entries {
        let key = entry.intrinsic.clone().map(|i| (i, entry.width, entry.height));
        let existing = match &key {
            Some(k) => group_keys.iter().position(|g| g.as_ref() == Some(k)),
            None => None
        };

        match existing {
            Some(group_idx) => assignment.push(group_idx),
            None => {
                let (intrinsic, known) = match &entry.intrinsic {
                    Some(ListIntrinsic::Focal{focal, ..}) => (
                        Perspective::<Float>::new(*focal, *focal, entry.width as Float / 2.0, entry.height as Float / 2.0, 0.0),
                        true
                    ),
                    Some(ListIntrinsic::Full(k)) => (Perspective::<Float>::from_matrix(k), true),
                    None => {
                        let focal_guess = 1.2 * entry.width.max(entry.height) as Float;
                        (
                            Perspective::<Float>::new(focal_guess, focal_guess, entry.width as Float / 2.0, entry.height as Float / 2.0, 0.0),
                            false
                        )
                    }
                };
                assignment.push(groups.len());
                groups.push(IntrinsicGroup::new(intrinsic, known, entry.width, entry.height));
                group_keys.push(key);
            }
        }
    }
    info!("image list: {} intrinsic groups over {} images", groups.len(), entries.len());
    (groups, assignment)
}

/**
 * Text feature file: one `x y scale orientation` line per feature.
 */
pub fn read_features(path: &Path) -> Result<Vec<ImageFeature>> {
    let file = File::open(path).wrap_err_with(|| format!("opening feature file {:?}", path))?;
    let reader = BufReader::new(file);

    let mut features = Vec::<ImageFeature>::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.wrap_err("reading feature file")?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        if fields.len() != 4 {
            return Err(eyre!("feature file {:?} line {}: expected `x y scale orientation`", path, line_number));
        }
        let x = parse_field::<Float>(fields[0], line_number, "x")?;
        let y = parse_field::<Float>(fields[1], line_number, "y")?;
        let scale = parse_field::<Float>(fields[2], line_number, "scale")?;
        let orientation = parse_field::<Float>(fields[3], line_number, "orientation")?;
        features.push(ImageFeature::with_scale_and_orientation(x, y, scale, orientation));
    }
    Ok(features)
}

/**
 * Binary descriptor file: little-endian u64 element count followed by one
 * fixed-size blob per descriptor.
 */
pub fn read_descriptors(path: &Path, descriptor_size: usize) -> Result<Vec<Vec<u8>>> {
    let file = File::open(path).wrap_err_with(|| format!("opening descriptor file {:?}", path))?;
    let mut reader = BufReader::new(file);

    let mut count_bytes = [0u8; 8];
    reader.read_exact(&mut count_bytes).wrap_err("reading descriptor count")?;
    let count = u64::from_le_bytes(count_bytes) as usize;

    let mut descriptors = Vec::<Vec<u8>>::with_capacity(count);
    for i in 0..count {
        let mut blob = vec![0u8; descriptor_size];
        reader.read_exact(&mut blob).wrap_err_with(|| format!("reading descriptor {} of {}", i, count))?;
        descriptors.push(blob);
    }
    Ok(descriptors)
}

/**
 * Match file: blocks of `imageI imageJ`, `count`, then count `i j` lines.
 */
pub fn read_match_file(path: &Path) -> Result<PairwiseMatches> {
    let file = File::open(path).wrap_err_with(|| format!("opening match file {:?}", path))?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut matches = PairwiseMatches::new();
    loop {
        let header = match lines.next() {
            Some(line) => line.wrap_err("reading match file")?,
            None => break
        };
        if header.trim().is_empty() {
            continue;
        }
        let header_fields = header.split_whitespace().collect::<Vec<&str>>();
        if header_fields.len() != 2 {
            return Err(eyre!("match file {:?}: malformed pair header '{}'", path, header));
        }
        let image_i = parse_field::<ImageId>(header_fields[0], 0, "image index")?;
        let image_j = parse_field::<ImageId>(header_fields[1], 0, "image index")?;

        let count_line = lines.next().ok_or_else(|| eyre!("match file {:?}: missing count after pair header", path))?.wrap_err("reading match file")?;
        let count = parse_field::<usize>(&count_line, 0, "match count")?;

        let mut pair_matches = Vec::<IndexedMatch>::with_capacity(count);
        for _ in 0..count {
            let match_line = lines.next().ok_or_else(|| eyre!("match file {:?}: truncated match block for pair ({},{})", path, image_i, image_j))?.wrap_err("reading match file")?;
            let match_fields = match_line.split_whitespace().collect::<Vec<&str>>();
            if match_fields.len() != 2 {
                return Err(eyre!("match file {:?}: malformed match line '{}'", path, match_line));
            }
            let i = parse_field::<usize>(match_fields[0], 0, "feature index")?;
            let j = parse_field::<usize>(match_fields[1], 0, "feature index")?;
            pair_matches.push(IndexedMatch::new(i, j));
        }
        matches.set_pair(image_i, image_j, pair_matches);
    }
    info!("match file {:?}: {} pairs, {} matches", path, matches.pair_count(), matches.match_count());
    Ok(matches)
}

pub fn write_match_file(path: &Path, matches: &PairwiseMatches) -> Result<()> {
    let file = File::create(path).wrap_err_with(|| format!("creating match file {:?}", path))?;
    let mut writer = BufWriter::new(file);

    for (&(image_i, image_j), pair_matches) in matches.pairs() {
        writeln!(writer, "{} {}", image_i, image_j)?;
        writeln!(writer, "{}", pair_matches.len())?;
        for m in pair_matches {
            writeln!(writer, "{} {}", m.i, m.j)?;
        }
    }
    Ok(())
}

/**
 * ASCII PLY export of the sparse structure plus the camera centers.
 * Points default to white unless per-point colors are given; camera
 * centers are written green.
 */
pub fn export_ply(path: &Path, points: &[Vector3<Float>], colors: Option<&[[u8; 3]]>, camera_centers: &[Vector3<Float>]) -> Result<()> {
    if let Some(colors) = colors {
        if colors.len() != points.len() {
            return Err(eyre!("ply export: {} colors for {} points", colors.len(), points.len()));
        }
    }

    let file = File::create(path).wrap_err_with(|| format!("creating ply file {:?}", path))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "ply")?;
    writeln!(writer, "format ascii 1.0")?;
    writeln!(writer, "element vertex {}", points.len() + camera_centers.len())?;
    writeln!(writer, "property double x")?;
    writeln!(writer, "property double y")?;
    writeln!(writer, "property double z")?;
    writeln!(writer, "property uchar red")?;
    writeln!(writer, "property uchar green")?;
    writeln!(writer, "property uchar blue")?;
    writeln!(writer, "end_header")?;

    for center in camera_centers {
        writeln!(writer, "{} {} {} 0 255 0", center[0], center[1], center[2])?;
    }
    for (idx, point) in points.iter().enumerate() {
        let [r, g, b] = match colors {
            Some(colors) => colors[idx],
            None => [255, 255, 255]
        };
        writeln!(writer, "{} {} {} {} {} {}", point[0], point[1], point[2], r, g, b)?;
    }
    info!("ply export: {} points, {} cameras to {:?}", points.len(), camera_centers.len(), path);
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CameraSerial {
    pub image: ImageId,
    /// fx, fy, cx, cy, skew
    pub intrinsic: [Float; 5],
    pub rotation: [[Float; 3]; 3],
    pub translation: [Float; 3]
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PointSerial {
    pub track: usize,
    pub position: [Float; 3]
}

/**
 * Serialized camera+structure export for downstream consumers.
 */
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconstructionSerial {
    pub cameras: Vec<CameraSerial>,
    pub points: Vec<PointSerial>
}

impl ReconstructionSerial {
    pub fn from_state(state: &ReconstructionState) -> ReconstructionSerial {
        let mut cameras = state.cameras().iter().map(|(&image, camera)| {
            let mut rotation = [[0.0 as Float; 3]; 3];
            for r in 0..3 {
                for c in 0..3 {
                    rotation[r][c] = camera.rotation[(r, c)];
                }
            }
            CameraSerial{
                image,
                intrinsic: [
                    camera.intrinsic.get_fx(),
                    camera.intrinsic.get_fy(),
                    camera.intrinsic.get_cx(),
                    camera.intrinsic.get_cy(),
                    camera.intrinsic.get_s()
                ],
                rotation,
                translation: [camera.translation[0], camera.translation[1], camera.translation[2]]
            }
        }).collect::<Vec<CameraSerial>>();
        cameras.sort_unstable_by_key(|c| c.image);

        let mut points = state.points().iter().map(|(&track, position)| {
            PointSerial{track, position: [position[0], position[1], position[2]]}
        }).collect::<Vec<PointSerial>>();
        points.sort_unstable_by_key(|p| p.track);

        ReconstructionSerial{cameras, points}
    }
}

pub fn export_reconstruction_yaml(path: &Path, serial: &ReconstructionSerial) -> Result<()> {
    let yaml = serde_yaml::to_string(serial).wrap_err("serializing reconstruction")?;
    let mut file = File::create(path).wrap_err_with(|| format!("creating reconstruction export {:?}", path))?;
    file.write_all(yaml.as_bytes()).wrap_err("writing reconstruction export")?;
    Ok(())
}
