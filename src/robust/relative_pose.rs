use nalgebra as na;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::ac_ransac::{AcRansacKernel, AcRansacOptions, ac_ransac};
use crate::camera_model::{CameraModel, GenericModel};
use crate::error::EstimationError;
use crate::multiview::{count_in_front, epipolar_distance_sq, essential_five_point, motions_from_essential, select_motion};
use crate::types::Pose;

pub const MINIMUM_SAMPLES: usize = 5;
/// Inlier support required after consensus, relative to the minimal sample.
pub const MINIMUM_INLIER_FACTOR: f64 = 2.5;

/// Essential matrix together with the motion it was disambiguated to.
#[derive(Debug, Clone)]
pub struct EssentialModel {
    pub essential: na::Matrix3<f64>,
    pub motion: Pose,
}

/// Essential matrix estimation on bearing vectors, scored in pixels of the second image.
pub struct EssentialKernel {
    bearings1: Vec<na::Vector3<f64>>,
    bearings2: Vec<na::Vector3<f64>>,
    pixel_scale_sq: f64,
    log_alpha0: f64,
}

impl EssentialKernel {
    pub fn new(
        bearings1: Vec<na::Vector3<f64>>,
        bearings2: Vec<na::Vector3<f64>>,
        focal2: f64,
        image_size2: (u32, u32),
    ) -> EssentialKernel {
        let (w, h) = (image_size2.0 as f64, image_size2.1 as f64);
        let diagonal = (w * w + h * h).sqrt();
        let area = (w * h).max(1.0);
        EssentialKernel {
            bearings1,
            bearings2,
            pixel_scale_sq: focal2 * focal2,
            // point to line: a random point lies within ε of the line with probability 2Dε/A
            log_alpha0: (2.0 * diagonal / area).log10(),
        }
    }
}

impl AcRansacKernel for EssentialKernel {
    type Model = EssentialModel;
    const MINIMUM_SAMPLES: usize = MINIMUM_SAMPLES;
    const MAX_MODELS: usize = 10;

    fn num_samples(&self) -> usize {
        self.bearings1.len()
    }

    fn fit(&self, sample: &[usize]) -> Vec<EssentialModel> {
        let b1: Vec<_> = sample.iter().map(|i| self.bearings1[*i]).collect();
        let b2: Vec<_> = sample.iter().map(|i| self.bearings2[*i]).collect();
        essential_five_point(&b1, &b2)
            .into_iter()
            .filter_map(|essential| {
                motions_from_essential(&essential)
                    .into_iter()
                    .find(|m| count_in_front(m, &b1, &b2) == sample.len())
                    .map(|motion| EssentialModel { essential, motion })
            })
            .collect()
    }

    fn error(&self, index: usize, model: &EssentialModel) -> f64 {
        epipolar_distance_sq(&model.essential, &self.bearings1[index], &self.bearings2[index]) * self.pixel_scale_sq
    }

    fn log_alpha0(&self) -> f64 {
        self.log_alpha0
    }

    fn mult_error(&self) -> f64 {
        0.5
    }
}

/// Relative pose of camera 2 w.r.t. camera 1 (at identity).
#[derive(Debug, Clone)]
pub struct RelativePoseInfo {
    pub essential: na::Matrix3<f64>,
    /// Unit norm translation.
    pub pose: Pose,
    /// Indices into the correspondence list.
    pub inliers: Vec<usize>,
    /// Selected residual threshold, in pixels.
    pub found_residual_precision: f64,
    pub log_nfa: f64,
}

/// Robust essential matrix and motion from pixel correspondences `x1[i] <-> x2[i]`.
pub fn robust_relative_pose(
    camera1: &GenericModel,
    camera2: &GenericModel,
    x1: &[na::Vector2<f64>],
    x2: &[na::Vector2<f64>],
    options: &AcRansacOptions,
) -> Result<RelativePoseInfo, EstimationError> {
    let n = x1.len().min(x2.len());
    if n < MINIMUM_SAMPLES {
        return Err(EstimationError::InsufficientCorrespondences {
            found: n,
            required: MINIMUM_SAMPLES,
        });
    }
    let bearings1: Vec<_> = x1[..n].iter().map(|p| camera1.bearing(p)).collect();
    let bearings2: Vec<_> = x2[..n].iter().map(|p| camera2.bearing(p)).collect();
    let kernel = EssentialKernel::new(
        bearings1.clone(),
        bearings2.clone(),
        camera2.focal(),
        (camera2.width(), camera2.height()),
    );

    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    let output = ac_ransac(&kernel, options, &mut rng).ok_or(EstimationError::NoModel)?;

    let required = (MINIMUM_INLIER_FACTOR * MINIMUM_SAMPLES as f64).ceil() as usize;
    if output.inliers.len() < required {
        return Err(EstimationError::InsufficientInliers {
            found: output.inliers.len(),
            required,
        });
    }

    let inlier_b1: Vec<_> = output.inliers.iter().map(|i| bearings1[*i]).collect();
    let inlier_b2: Vec<_> = output.inliers.iter().map(|i| bearings2[*i]).collect();
    let (motion, in_front) =
        select_motion(&output.model.essential, &inlier_b1, &inlier_b2).ok_or(EstimationError::NoValidMotion)?;
    log::debug!(
        "{} of {} inliers in front of both cameras",
        in_front,
        output.inliers.len()
    );

    Ok(RelativePoseInfo {
        essential: output.model.essential,
        pose: motion,
        inliers: output.inliers,
        found_residual_precision: output.threshold.sqrt(),
        log_nfa: output.log_nfa,
    })
}
