use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::FeatureError;
use crate::features::FeatureStore;

/// Correspondence between keypoint `i` of the left image and keypoint `j` of the right one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndMatch {
    pub i: usize,
    pub j: usize,
}

impl IndMatch {
    pub fn new(i: usize, j: usize) -> IndMatch {
        IndMatch { i, j }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherOptions {
    /// Nearest / second nearest distance ratio (on L2, not squared L2).
    pub distance_ratio: f32,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        MatcherOptions {
            distance_ratio: 0.8,
        }
    }
}

pub fn squared_l2(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = *x as i64 - *y as i64;
            (d * d) as u64
        })
        .sum()
}

/// Nearest and second nearest neighbours of `query` in `store`, as `(index, squared distance)`.
pub fn nearest_two(query: &[u8], store: &FeatureStore) -> Option<[(usize, u64); 2]> {
    let mut best = (usize::MAX, u64::MAX);
    let mut second = (usize::MAX, u64::MAX);
    for (idx, desc) in store.descriptors().enumerate() {
        let d = squared_l2(query, desc);
        if d < best.1 {
            second = best;
            best = (idx, d);
        } else if d < second.1 {
            second = (idx, d);
        }
    }
    if second.0 == usize::MAX {
        None
    } else {
        Some([best, second])
    }
}

/// Brute force nearest neighbour matching of every left descriptor against the right store,
/// keeping only matches passing the distance ratio test.
pub fn distance_ratio_match(
    left: &FeatureStore,
    right: &FeatureStore,
    options: &MatcherOptions,
) -> Result<Vec<IndMatch>, FeatureError> {
    if left.descriptor_len() != right.descriptor_len() {
        return Err(FeatureError::DescriptorLength {
            expected: left.descriptor_len(),
            got: right.descriptor_len(),
        });
    }
    if right.len() < 2 {
        return Ok(Vec::new());
    }
    // squared distances, so the ratio is squared too
    let ratio_sq = (options.distance_ratio as f64).powi(2);
    let query: Vec<&[u8]> = left.descriptors().collect();
    let matches = query
        .par_iter()
        .enumerate()
        .filter_map(|(i, desc)| {
            let [(j, d1), (_, d2)] = nearest_two(desc, right)?;
            if (d1 as f64) < ratio_sq * d2 as f64 {
                Some(IndMatch::new(i, j))
            } else {
                None
            }
        })
        .collect();
    Ok(matches)
}

/// Drops repeated index pairs and repeated pixel coordinate pairs, keeping the first occurrence.
pub fn deduplicate(matches: &[IndMatch], left: &FeatureStore, right: &FeatureStore) -> Vec<IndMatch> {
    let mut seen_pairs = HashSet::new();
    let mut seen_coords = HashSet::new();
    matches
        .iter()
        .filter(|m| {
            let (Some(a), Some(b)) = (left.keypoint(m.i), right.keypoint(m.j)) else {
                return false;
            };
            let coords = [
                a.p2d.x.to_bits(),
                a.p2d.y.to_bits(),
                b.p2d.x.to_bits(),
                b.p2d.y.to_bits(),
            ];
            let fresh_pair = seen_pairs.insert((m.i, m.j));
            let fresh_coords = seen_coords.insert(coords);
            fresh_pair && fresh_coords
        })
        .copied()
        .collect()
}

/// Ratio-test matching followed by deduplication.
pub fn putative_matches(
    left: &FeatureStore,
    right: &FeatureStore,
    options: &MatcherOptions,
) -> Result<Vec<IndMatch>, FeatureError> {
    let raw = distance_ratio_match(left, right, options)?;
    let matches = deduplicate(&raw, left, right);
    log::debug!(
        "{} ratio-test matches, {} after deduplication",
        raw.len(),
        matches.len()
    );
    Ok(matches)
}
