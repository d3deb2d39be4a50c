use std::path::{Path, PathBuf};

use nalgebra as na;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::export::{TwoViewResult, export_two_view};
use crate::features::FeatureStore;
use crate::io;
use crate::matching::{IndMatch, putative_matches};
use crate::optimization::{AdjustmentSummary, BundleAdjuster};
use crate::robust::{RelativePoseInfo, robust_relative_pose};
use crate::scene::{IntrinsicMode, Scene, TriangulationStats, intrinsics_from_k, initialize_scene};

/// Everything produced by one successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub matches: Vec<IndMatch>,
    pub relative_pose: RelativePoseInfo,
    pub triangulation: TriangulationStats,
    pub initial_scene: Scene,
    pub refined_scene: Scene,
    pub adjustment: AdjustmentSummary,
    pub result: TwoViewResult,
}

impl PipelineOutput {
    /// Writes the result text files and the scene snapshots before and after refinement.
    pub fn write(&self, output_dir: &Path, prefix: &str) -> Result<Vec<PathBuf>, PipelineError> {
        std::fs::create_dir_all(output_dir).map_err(|source| PipelineError::Output {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let mut written = io::write_two_view_result(output_dir, prefix, &self.result)?;
        written.extend(io::write_scene_snapshot(
            output_dir,
            &format!("EssentialGeometry_start_{prefix}"),
            &self.initial_scene,
        )?);
        written.extend(io::write_scene_snapshot(
            output_dir,
            &format!("EssentialGeometry_refined_{prefix}"),
            &self.refined_scene,
        )?);
        Ok(written)
    }
}

pub struct TwoViewPipeline {
    pub config: PipelineConfig,
}

impl TwoViewPipeline {
    pub fn new(config: PipelineConfig) -> TwoViewPipeline {
        TwoViewPipeline { config }
    }

    /// Matching, robust relative pose, triangulation, bundle adjustment and export.
    ///
    /// `k` is the calibration shared by both images.
    pub fn run(&self, left: &FeatureStore, right: &FeatureStore, k: &na::Matrix3<f64>) -> Result<PipelineOutput, PipelineError> {
        let config = &self.config;
        log::info!("left image: {} features", left.len());
        log::info!("right image: {} features", right.len());

        let matches = putative_matches(left, right, &config.matcher)?;
        log::info!("{} putative matches", matches.len());

        let (x1, x2): (Vec<_>, Vec<_>) = matches
            .iter()
            .filter_map(|m| Some((left.keypoint(m.i)?, right.keypoint(m.j)?)))
            .map(|(a, b)| {
                (
                    na::Vector2::new(a.p2d.x as f64, a.p2d.y as f64),
                    na::Vector2::new(b.p2d.x as f64, b.p2d.y as f64),
                )
            })
            .unzip();
        // pose estimation always works on undistorted pinhole intrinsics
        let camera_mode = match config.intrinsic_mode {
            IntrinsicMode::SharedRadialK3 => IntrinsicMode::Shared,
            mode => mode,
        };
        let camera1 = intrinsics_from_k(camera_mode, k, left.image_size());
        let camera2 = intrinsics_from_k(camera_mode, k, right.image_size());
        let relative_pose = robust_relative_pose(&camera1, &camera2, &x1, &x2, &config.ransac)?;
        log::info!(
            "found an essential matrix: precision {:.4} px, {} inliers",
            relative_pose.found_residual_precision,
            relative_pose.inliers.len()
        );

        let (initial_scene, triangulation) = initialize_scene(
            left,
            right,
            &matches,
            &relative_pose,
            k,
            config.intrinsic_mode,
            config.cheirality,
        )?;

        let mut refined_scene = initial_scene.clone();
        let adjustment = BundleAdjuster::new(config.adjustment.clone()).adjust(&mut refined_scene)?;
        log::info!(
            "bundle adjustment: initial rmse {:.4} px, final rmse {:.4} px, {} free parameters ({:?})",
            adjustment.initial_rmse,
            adjustment.final_rmse,
            adjustment.num_parameters,
            adjustment.termination
        );

        let result = export_two_view(&refined_scene, left, right)?;
        Ok(PipelineOutput {
            matches,
            relative_pose,
            triangulation,
            initial_scene,
            refined_scene,
            adjustment,
            result,
        })
    }
}
