//! Name-based pairing of videos and images for batch jobs.
//!
//! Three tiers, each consuming only what earlier tiers left behind:
//! exact base-name match, character-set similarity, then sequential
//! pairing by sorted order.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Video file extensions eligible for batch pairing
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "m4v"];

/// Image file extensions eligible for batch pairing
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "tiff"];

/// Minimum similarity score for the tier-2 match. A tunable heuristic,
/// not a guarantee of optimal pairing.
pub const SIMILARITY_THRESHOLD: f64 = 0.5;

/// A video/image association plus the derived output file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPair {
    pub video: PathBuf,
    pub image: PathBuf,
    pub output_name: String,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_video_file(path: &Path) -> bool {
    has_extension(path, VIDEO_EXTENSIONS)
}

pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

fn scan_folder(folder: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .max_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file() && has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Sorted video files directly inside `folder`.
pub fn scan_videos(folder: &Path) -> Vec<PathBuf> {
    scan_folder(folder, VIDEO_EXTENSIONS)
}

/// Sorted image files directly inside `folder`.
pub fn scan_images(folder: &Path) -> Vec<PathBuf> {
    scan_folder(folder, IMAGE_EXTENSIONS)
}

fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Output file name derived from the video: `<basename>_with_images.mp4`.
pub fn output_name(video: &Path) -> String {
    format!("{}_with_images.mp4", base_name(video))
}

/// Jaccard index of the lower-cased character sets of two names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<char> = a.to_lowercase().chars().collect();
    let set_b: HashSet<char> = b.to_lowercase().chars().collect();

    let common = set_a.intersection(&set_b).count();
    let total = set_a.union(&set_b).count();

    if total == 0 {
        0.0
    } else {
        common as f64 / total as f64
    }
}

/// Tier 1: identical base names, case-sensitive, in image order.
fn match_exact(videos: &[PathBuf], images: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
    let by_base: HashMap<String, &PathBuf> =
        videos.iter().map(|v| (base_name(v), v)).collect();

    images
        .iter()
        .filter_map(|image| {
            by_base
                .get(&base_name(image))
                .map(|video| ((*video).clone(), image.clone()))
        })
        .collect()
}

/// Tier 2: highest-scoring image above the threshold per video,
/// first-encountered order breaking ties, both sides consumed.
fn match_similar(videos: &[PathBuf], images: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
    let mut matches = Vec::new();
    let mut used_images: HashSet<&PathBuf> = HashSet::new();

    for video in videos {
        let video_base = base_name(video);

        let mut best: Option<&PathBuf> = None;
        let mut best_score = 0.0;
        for image in images {
            if used_images.contains(image) {
                continue;
            }
            let score = name_similarity(&video_base, &base_name(image));
            if score > best_score && score > SIMILARITY_THRESHOLD {
                best_score = score;
                best = Some(image);
            }
        }

        if let Some(image) = best {
            used_images.insert(image);
            matches.push((video.clone(), image.clone()));
        }
    }

    matches
}

/// Tier 3: pair by sorted order up to the shorter remaining list.
fn match_sequential(videos: &[PathBuf], images: &[PathBuf]) -> Vec<(PathBuf, PathBuf)> {
    videos
        .iter()
        .zip(images.iter())
        .map(|(v, i)| (v.clone(), i.clone()))
        .collect()
}

fn remaining_pools(
    matched: &[(PathBuf, PathBuf)],
    videos: &[PathBuf],
    images: &[PathBuf],
) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let used_videos: HashSet<&PathBuf> = matched.iter().map(|(v, _)| v).collect();
    let used_images: HashSet<&PathBuf> = matched.iter().map(|(_, i)| i).collect();

    (
        videos
            .iter()
            .filter(|v| !used_videos.contains(v))
            .cloned()
            .collect(),
        images
            .iter()
            .filter(|i| !used_images.contains(i))
            .cloned()
            .collect(),
    )
}

/// Run all three tiers over pre-scanned file lists.
pub fn match_pairs(videos: &[PathBuf], images: &[PathBuf]) -> Vec<MatchPair> {
    let mut matches = match_exact(videos, images);

    let (rest_videos, rest_images) = remaining_pools(&matches, videos, images);
    matches.extend(match_similar(&rest_videos, &rest_images));

    let (rest_videos, rest_images) = remaining_pools(&matches, videos, images);
    matches.extend(match_sequential(&rest_videos, &rest_images));

    matches
        .into_iter()
        .map(|(video, image)| {
            let output_name = output_name(&video);
            MatchPair {
                video,
                image,
                output_name,
            }
        })
        .collect()
}

/// Scan both folders and pair their contents.
pub fn scan_and_match(video_folder: &Path, image_folder: &Path) -> Vec<MatchPair> {
    let videos = scan_videos(video_folder);
    let images = scan_images(image_folder);

    if videos.is_empty() || images.is_empty() {
        return Vec::new();
    }

    match_pairs(&videos, &images)
}
