use nalgebra as na;

use crate::error::ExportError;
use crate::features::FeatureStore;
use crate::scene::{IndexT, LEFT_VIEW, RIGHT_VIEW, Scene};
use crate::types::Pose;

/// One landmark expressed in the first camera frame, with both measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkRecord {
    pub id: IndexT,
    pub x: na::Vector3<f64>,
    pub x1: na::Vector2<f64>,
    pub x2: na::Vector2<f64>,
    pub desc1: Vec<u8>,
    pub desc2: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TwoViewResult {
    /// Maps camera 2 coordinates to camera 1 coordinates, `R = R1 R2ᵀ`, `t = t1 - R1 R2ᵀ t2`.
    pub relative: Pose,
    pub landmarks: Vec<LandmarkRecord>,
}

impl TwoViewResult {
    pub fn rotation(&self) -> na::Matrix3<f64> {
        *self.relative.rotation.matrix()
    }
    /// Center of camera 2 in the camera 1 frame.
    pub fn translation(&self) -> na::Vector3<f64> {
        self.relative.translation
    }
}

fn view_pose(scene: &Scene, id_view: IndexT) -> Result<Pose, ExportError> {
    let view = scene.views.get(&id_view).ok_or(ExportError::MissingView(id_view))?;
    scene
        .poses
        .get(&view.id_pose)
        .copied()
        .ok_or(ExportError::MissingPose(view.id_pose))
}

/// Re-expresses the refined scene in the frame of camera 1.
pub fn export_two_view(scene: &Scene, left: &FeatureStore, right: &FeatureStore) -> Result<TwoViewResult, ExportError> {
    let pose1 = view_pose(scene, LEFT_VIEW)?;
    let pose2 = view_pose(scene, RIGHT_VIEW)?;
    let relative = pose1.compose(&pose2.inverse());

    let landmarks = scene
        .structure
        .iter()
        .map(|(id, lm)| {
            let obs1 = lm.obs.get(&LEFT_VIEW).ok_or(ExportError::MissingObservation {
                landmark: *id,
                view: LEFT_VIEW,
            })?;
            let obs2 = lm.obs.get(&RIGHT_VIEW).ok_or(ExportError::MissingObservation {
                landmark: *id,
                view: RIGHT_VIEW,
            })?;
            let desc1 = left
                .descriptor(obs1.id_feat)
                .ok_or(ExportError::MissingFeature(obs1.id_feat))?;
            let desc2 = right
                .descriptor(obs2.id_feat)
                .ok_or(ExportError::MissingFeature(obs2.id_feat))?;
            Ok(LandmarkRecord {
                id: *id,
                x: pose1.transform_point(&lm.x),
                x1: obs1.x,
                x2: obs2.x,
                desc1: desc1.to_vec(),
                desc2: desc2.to_vec(),
            })
        })
        .collect::<Result<Vec<_>, ExportError>>()?;

    Ok(TwoViewResult {
        relative,
        landmarks,
    })
}
