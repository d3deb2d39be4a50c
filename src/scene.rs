use std::collections::BTreeMap;

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::camera_model::{CameraModel, GenericModel, Pinhole, PinholeRadialK3};
use crate::error::SceneError;
use crate::features::FeatureStore;
use crate::matching::IndMatch;
use crate::multiview::triangulate_pixels;
use crate::robust::RelativePoseInfo;
use crate::types::Pose;

pub type IndexT = u32;

pub const LEFT_VIEW: IndexT = 0;
pub const RIGHT_VIEW: IndexT = 1;

/// How intrinsic records are attached to the two views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicMode {
    /// One pinhole record per view.
    PerView,
    /// A single pinhole record shared by both views.
    #[default]
    Shared,
    /// A single radial K3 record shared by both views.
    SharedRadialK3,
}

/// When a triangulated point is rejected for lying behind the cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CheiralityPolicy {
    /// Reject only points behind both cameras.
    #[default]
    BehindBoth,
    /// Reject points behind either camera.
    BehindEither,
}

impl CheiralityPolicy {
    pub fn rejects(&self, depth1: f64, depth2: f64) -> bool {
        match self {
            CheiralityPolicy::BehindBoth => depth1 < 0.0 && depth2 < 0.0,
            CheiralityPolicy::BehindEither => depth1 < 0.0 || depth2 < 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id_view: IndexT,
    pub id_intrinsic: IndexT,
    pub id_pose: IndexT,
    pub width: u32,
    pub height: u32,
}

/// A 2D measurement of a landmark, `id_feat` indexes the view's feature store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub x: na::Vector2<f64>,
    pub id_feat: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub x: na::Vector3<f64>,
    pub obs: BTreeMap<IndexT, Observation>,
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub views: BTreeMap<IndexT, View>,
    pub intrinsics: BTreeMap<IndexT, GenericModel>,
    pub poses: BTreeMap<IndexT, Pose>,
    pub structure: BTreeMap<IndexT, Landmark>,
}

impl Scene {
    pub fn num_observations(&self) -> usize {
        self.structure.values().map(|l| l.obs.len()).sum()
    }

    /// Camera model and pose observing through `id_view`.
    pub fn view_camera(&self, id_view: IndexT) -> Option<(&GenericModel, &Pose)> {
        let view = self.views.get(&id_view)?;
        Some((
            self.intrinsics.get(&view.id_intrinsic)?,
            self.poses.get(&view.id_pose)?,
        ))
    }

    /// Root mean square reprojection error over all observations, in pixels.
    pub fn rmse(&self) -> f64 {
        let (sum, count) = self
            .structure
            .values()
            .flat_map(|l| l.obs.iter().map(move |(v, o)| (l, *v, o)))
            .filter_map(|(l, v, o)| {
                let (cam, pose) = self.view_camera(v)?;
                Some(cam.residual(pose, &l.x, &o.x).norm_squared())
            })
            .fold((0.0, 0usize), |(s, c), e| (s + e, c + 1));
        if count == 0 { 0.0 } else { (sum / count as f64).sqrt() }
    }
}

/// Counts reported by [`initialize_scene`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriangulationStats {
    pub inliers: usize,
    pub landmarks: usize,
    pub rejected_cheirality: usize,
    pub rejected_degenerate: usize,
}

pub fn intrinsics_from_k(mode: IntrinsicMode, k: &na::Matrix3<f64>, size: (u32, u32)) -> GenericModel {
    let pinhole = Pinhole::from_k(size.0, size.1, k);
    match mode {
        IntrinsicMode::PerView | IntrinsicMode::Shared => GenericModel::Pinhole(pinhole),
        IntrinsicMode::SharedRadialK3 => GenericModel::PinholeRadialK3(PinholeRadialK3::new(
            pinhole.width,
            pinhole.height,
            pinhole.focal,
            pinhole.cx,
            pinhole.cy,
            [0.0; 3],
        )),
    }
}

/// Views, intrinsics and poses of the two view scene, without structure.
pub fn two_view_graph(
    mode: IntrinsicMode,
    k: &na::Matrix3<f64>,
    left: &FeatureStore,
    right: &FeatureStore,
    relative: &Pose,
) -> Scene {
    let mut scene = Scene::default();
    let right_intrinsic = match mode {
        IntrinsicMode::PerView => RIGHT_VIEW,
        IntrinsicMode::Shared | IntrinsicMode::SharedRadialK3 => LEFT_VIEW,
    };
    for (id_view, id_intrinsic, store) in [(LEFT_VIEW, LEFT_VIEW, left), (RIGHT_VIEW, right_intrinsic, right)] {
        let (width, height) = store.image_size();
        scene.views.insert(
            id_view,
            View {
                id_view,
                id_intrinsic,
                id_pose: id_view,
                width,
                height,
            },
        );
        scene
            .intrinsics
            .entry(id_intrinsic)
            .or_insert_with(|| intrinsics_from_k(mode, k, (width, height)));
    }
    scene.poses.insert(LEFT_VIEW, Pose::identity());
    scene.poses.insert(RIGHT_VIEW, *relative);
    scene
}

/// Builds the two view scene and triangulates every inlier correspondence.
///
/// Landmark ids are inlier ordinals. Observations keep the keypoint coordinates of the stores.
pub fn initialize_scene(
    left: &FeatureStore,
    right: &FeatureStore,
    matches: &[IndMatch],
    relative: &RelativePoseInfo,
    k: &na::Matrix3<f64>,
    mode: IntrinsicMode,
    policy: CheiralityPolicy,
) -> Result<(Scene, TriangulationStats), SceneError> {
    let mut scene = two_view_graph(mode, k, left, right, &relative.pose);
    let mut stats = TriangulationStats {
        inliers: relative.inliers.len(),
        ..Default::default()
    };
    let (cam1, pose1) = scene.view_camera(LEFT_VIEW).map(|(c, p)| (*c, *p)).ok_or(SceneError::MissingView(LEFT_VIEW))?;
    let (cam2, pose2) = scene.view_camera(RIGHT_VIEW).map(|(c, p)| (*c, *p)).ok_or(SceneError::MissingView(RIGHT_VIEW))?;
    let p1 = cam1.projection_matrix(&pose1);
    let p2 = cam2.projection_matrix(&pose2);

    for (ordinal, match_idx) in relative.inliers.iter().enumerate() {
        let m = matches
            .get(*match_idx)
            .ok_or(SceneError::InvalidCorrespondence { index: *match_idx })?;
        let (Some(kp1), Some(kp2)) = (left.keypoint(m.i), right.keypoint(m.j)) else {
            return Err(SceneError::InvalidCorrespondence { index: *match_idx });
        };
        let x1 = na::Vector2::new(kp1.p2d.x as f64, kp1.p2d.y as f64);
        let x2 = na::Vector2::new(kp2.p2d.x as f64, kp2.p2d.y as f64);
        let Some(x) = triangulate_pixels(&p1, &cam1.undistort_pixel(&x1), &p2, &cam2.undistort_pixel(&x2)) else {
            stats.rejected_degenerate += 1;
            continue;
        };
        if policy.rejects(pose1.depth(&x), pose2.depth(&x)) {
            stats.rejected_cheirality += 1;
            continue;
        }
        let obs = BTreeMap::from([
            (LEFT_VIEW, Observation { x: x1, id_feat: m.i }),
            (RIGHT_VIEW, Observation { x: x2, id_feat: m.j }),
        ]);
        scene.structure.insert(ordinal as IndexT, Landmark { x, obs });
    }
    stats.landmarks = scene.structure.len();
    log::info!(
        "triangulated {} of {} inliers ({} behind the cameras, {} degenerate)",
        stats.landmarks,
        stats.inliers,
        stats.rejected_cheirality,
        stats.rejected_degenerate
    );
    if scene.structure.is_empty() {
        return Err(SceneError::EmptyStructure {
            inliers: stats.inliers,
        });
    }
    Ok((scene, stats))
}
