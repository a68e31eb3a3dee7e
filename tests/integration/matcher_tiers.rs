// Tests for the three-tier video/image matcher

use bookend::engine::{MatchPair, SIMILARITY_THRESHOLD, match_pairs, name_similarity};
use std::path::PathBuf;

fn paths(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

fn pair_names(pairs: &[MatchPair]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|p| {
            (
                p.video.to_string_lossy().into_owned(),
                p.image.to_string_lossy().into_owned(),
            )
        })
        .collect()
}

#[test]
fn test_exact_matches_come_first() {
    let videos = paths(&["a.mp4", "b.mp4"]);
    let images = paths(&["a.png", "x.png"]);

    let pairs = match_pairs(&videos, &images);
    assert_eq!(
        pair_names(&pairs),
        vec![
            ("a.mp4".to_string(), "a.png".to_string()),
            ("b.mp4".to_string(), "x.png".to_string()),
        ],
        "exact match first, remainder resolved by later tiers"
    );
}

#[test]
fn test_no_pair_left_behind_while_both_pools_nonempty() {
    let videos = paths(&["clip_one.mp4", "clip_two.mp4", "zz.mp4"]);
    let images = paths(&["unrelated.png", "clip_one.png"]);

    let pairs = match_pairs(&videos, &images);
    // Two images, three videos: every image must end up paired.
    assert_eq!(pairs.len(), 2);

    let images_used: Vec<_> = pairs.iter().map(|p| p.image.clone()).collect();
    assert!(images_used.contains(&PathBuf::from("unrelated.png")));
    assert!(images_used.contains(&PathBuf::from("clip_one.png")));
}

#[test]
fn test_similarity_tier_consumes_best_pair() {
    // No exact matches; "summer_trip" vs "summer-trip" shares nearly
    // all characters, "qqq" shares none.
    let videos = paths(&["summer_trip.mp4", "qqq.mp4"]);
    let images = paths(&["zebra.png", "summer-trip.png"]);

    let pairs = match_pairs(&videos, &images);
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].video, PathBuf::from("summer_trip.mp4"));
    assert_eq!(pairs[0].image, PathBuf::from("summer-trip.png"));
    // qqq falls through to the sequential tier
    assert_eq!(pairs[1].video, PathBuf::from("qqq.mp4"));
    assert_eq!(pairs[1].image, PathBuf::from("zebra.png"));
}

#[test]
fn test_similarity_tier_ignores_scores_at_threshold() {
    // "ab" vs "ba": identical character sets, score 1.0 (match).
    // "ab" vs "ac": {a,b} vs {a,c} = 1/3, below threshold.
    assert!(name_similarity("ab", "ba") > SIMILARITY_THRESHOLD);
    assert!(name_similarity("ab", "ac") < SIMILARITY_THRESHOLD);

    // Exactly at the threshold must NOT match: {a,b} vs {a,c,b,d}? no,
    // use {a,b} vs {b,c}: 1/3. Build a 0.5 case: {a,b,c} vs {b,c,d}
    // = 2/4 = 0.5 exactly.
    let score = name_similarity("abc", "bcd");
    assert!((score - 0.5).abs() < 1e-9);

    let videos = paths(&["abc.mp4"]);
    let images = paths(&["bcd.png"]);
    let pairs = match_pairs(&videos, &images);
    // Similarity refuses the 0.5 score; the sequential tier still
    // pairs them, so the pools never stay non-empty.
    assert_eq!(pairs.len(), 1);
}

#[test]
fn test_sequential_tier_pairs_by_sorted_order() {
    let videos = paths(&["111.mp4", "222.mp4", "333.mp4"]);
    let images = paths(&["aaa.png", "bbb.png"]);

    let pairs = match_pairs(&videos, &images);
    assert_eq!(
        pair_names(&pairs),
        vec![
            ("111.mp4".to_string(), "aaa.png".to_string()),
            ("222.mp4".to_string(), "bbb.png".to_string()),
        ],
        "sequential pairs stop at the shorter list"
    );
}

#[test]
fn test_output_names_derived_from_video() {
    let videos = paths(&["holiday.mp4"]);
    let images = paths(&["holiday.png"]);

    let pairs = match_pairs(&videos, &images);
    assert_eq!(pairs[0].output_name, "holiday_with_images.mp4");
}

#[test]
fn test_empty_pools() {
    assert!(match_pairs(&[], &paths(&["a.png"])).is_empty());
    assert!(match_pairs(&paths(&["a.mp4"]), &[]).is_empty());
    assert!(match_pairs(&[], &[]).is_empty());
}
