use nalgebra as na;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::camera_model::{CameraModel, Pinhole};
use crate::error::FeatureError;
use crate::features::{FeatureStore, Keypoint};
use crate::matching::IndMatch;
use crate::types::Pose;

/// Parameters of a synthetic two view dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
    pub num_points: usize,
    /// Fraction of correspondences whose right keypoint is moved to a random location.
    pub outlier_ratio: f64,
    /// Uniform pixel noise amplitude.
    pub noise_px: f64,
    pub descriptor_len: usize,
    pub min_depth: f64,
    pub max_depth: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            width: 640,
            height: 480,
            focal: 500.0,
            num_points: 200,
            outlier_ratio: 0.0,
            noise_px: 0.0,
            descriptor_len: 32,
            min_depth: 4.0,
            max_depth: 8.0,
            seed: 0,
        }
    }
}

impl SyntheticConfig {
    pub fn camera(&self) -> Pinhole {
        Pinhole::new(
            self.width,
            self.height,
            self.focal,
            self.width as f64 / 2.0,
            self.height as f64 / 2.0,
        )
    }
}

/// Camera 1 is the world frame; `points[i]` is seen by left keypoint `i`.
#[derive(Debug, Clone)]
pub struct SyntheticTwoView {
    pub k: na::Matrix3<f64>,
    pub pose: Pose,
    pub points: Vec<na::Vector3<f64>>,
    pub left: FeatureStore,
    pub right: FeatureStore,
    pub true_matches: Vec<IndMatch>,
    pub outlier_matches: Vec<IndMatch>,
}

/// Sideways baseline of one unit with a small rotation.
pub fn default_relative_pose() -> Pose {
    let rotation = na::Rotation3::new(na::Vector3::new(0.02, -0.08, 0.03));
    Pose::from_center(rotation, &na::Vector3::new(1.0, 0.1, 0.05))
}

pub fn generate_two_view(config: &SyntheticConfig, pose: &Pose) -> Result<SyntheticTwoView, FeatureError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let camera = config.camera();
    let (w, h) = (config.width as f64, config.height as f64);

    let mut points = Vec::with_capacity(config.num_points);
    let mut obs1 = Vec::with_capacity(config.num_points);
    let mut obs2 = Vec::with_capacity(config.num_points);
    for _ in 0..64 {
        if points.len() >= config.num_points {
            break;
        }
        let candidates: Vec<na::Vector3<f64>> = (0..config.num_points * 2)
            .map(|_| {
                let pixel = na::Vector2::new(rng.random_range(0.0..w), rng.random_range(0.0..h));
                let depth = rng.random_range(config.min_depth..config.max_depth);
                camera.bearing(&pixel) * depth
            })
            .collect();
        let in_cam2: Vec<_> = candidates.iter().map(|p| pose.transform_point(p)).collect();
        let p2d1 = camera.project(&candidates);
        let p2d2 = camera.project(&in_cam2);
        for ((p, a), b) in candidates.iter().zip(p2d1).zip(p2d2) {
            if let (Some(a), Some(b)) = (a, b) {
                if points.len() < config.num_points {
                    points.push(*p);
                    obs1.push(a);
                    obs2.push(b);
                }
            }
        }
    }

    let n = points.len();
    let num_outliers = ((n as f64) * config.outlier_ratio).round() as usize;
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let outliers = &order[..num_outliers.min(n)];
    for i in outliers {
        obs2[*i] = na::Vector2::new(rng.random_range(0.0..w), rng.random_range(0.0..h));
    }
    let mut noise = |p: na::Vector2<f64>| {
        if config.noise_px > 0.0 {
            p + na::Vector2::new(
                rng.random_range(-config.noise_px..config.noise_px),
                rng.random_range(-config.noise_px..config.noise_px),
            )
        } else {
            p
        }
    };
    let obs1: Vec<_> = obs1.into_iter().map(&mut noise).collect();
    let obs2: Vec<_> = obs2.into_iter().map(&mut noise).collect();

    let descriptors: Vec<Vec<u8>> = (0..n)
        .map(|_| (0..config.descriptor_len).map(|_| rng.random()).collect())
        .collect();
    // right keypoints are stored in a different order than the left ones
    let mut right_order: Vec<usize> = (0..n).collect();
    right_order.shuffle(&mut rng);
    let mut right_slot = vec![0; n];
    for (slot, i) in right_order.iter().enumerate() {
        right_slot[*i] = slot;
    }

    let to_kp = |p: &na::Vector2<f64>| Keypoint::new(p.x as f32, p.y as f32);
    let mut left = FeatureStore::new(config.width, config.height, config.descriptor_len);
    let mut right = FeatureStore::new(config.width, config.height, config.descriptor_len);
    for i in 0..n {
        left.push(to_kp(&obs1[i]), &descriptors[i])?;
    }
    for i in &right_order {
        right.push(to_kp(&obs2[*i]), &descriptors[*i])?;
    }

    let (outlier_matches, true_matches): (Vec<_>, Vec<_>) = (0..n)
        .map(|i| IndMatch::new(i, right_slot[i]))
        .partition(|m| outliers.contains(&m.i));

    Ok(SyntheticTwoView {
        k: camera.k_matrix(),
        pose: *pose,
        points,
        left,
        right,
        true_matches,
        outlier_matches,
    })
}
