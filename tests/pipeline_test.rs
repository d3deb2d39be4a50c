use std::collections::BTreeMap;

use approx::assert_relative_eq;
use nalgebra as na;
use two_view_reconstruction::error::{EstimationError, ExportError};
use two_view_reconstruction::export::export_two_view;
use two_view_reconstruction::features::{FeatureStore, Keypoint};
use two_view_reconstruction::io::SceneSnapshot;
use two_view_reconstruction::scene::{
    IntrinsicMode, LEFT_VIEW, Landmark, Observation, RIGHT_VIEW, Scene, two_view_graph,
};
use two_view_reconstruction::synthetic::{SyntheticConfig, SyntheticTwoView, default_relative_pose, generate_two_view};
use two_view_reconstruction::types::{Pose, rotation_angle};
use two_view_reconstruction::{PipelineConfig, PipelineError, TwoViewPipeline};

fn dataset(outlier_ratio: f64, noise_px: f64) -> SyntheticTwoView {
    let config = SyntheticConfig {
        outlier_ratio,
        noise_px,
        ..Default::default()
    };
    generate_two_view(&config, &default_relative_pose()).unwrap()
}

#[test]
fn test_noise_free_reconstruction() {
    let data = dataset(0.0, 0.0);
    let output = TwoViewPipeline::new(PipelineConfig::default())
        .run(&data.left, &data.right, &data.k)
        .unwrap();

    // relative maps camera 2 coordinates into camera 1
    let estimated = output.result.relative.inverse();
    assert!(rotation_angle(&estimated.rotation, &data.pose.rotation) < 1e-5);
    let t_est = estimated.translation.normalize();
    let t_true = data.pose.translation.normalize();
    assert!((t_est - t_true).norm() < 1e-4);
    assert!(output.adjustment.final_rmse < 1e-3);
    assert_eq!(output.result.landmarks.len(), data.true_matches.len());

    let scale = data.pose.translation.norm() / estimated.translation.norm();
    for lm in &output.result.landmarks {
        let kp = lm.x1;
        let m = output.matches[output.relative_pose.inliers[lm.id as usize]];
        assert_eq!(kp, {
            let p = data.left.keypoint(m.i).unwrap().p2d;
            na::Vector2::new(p.x as f64, p.y as f64)
        });
        assert_eq!(lm.desc1, data.left.descriptor(m.i).unwrap());
        assert_eq!(lm.desc2, data.right.descriptor(m.j).unwrap());
        assert_relative_eq!(lm.x * scale, data.points[m.i], epsilon = 1e-3);
    }
}

#[test]
fn test_reconstruction_with_outliers() {
    let data = dataset(0.25, 0.5);
    let output = TwoViewPipeline::new(PipelineConfig::default())
        .run(&data.left, &data.right, &data.k)
        .unwrap();
    let estimated = output.result.relative.inverse();
    let rotation_error = rotation_angle(&estimated.rotation, &data.pose.rotation).to_degrees();
    let direction = estimated
        .translation
        .normalize()
        .dot(&data.pose.translation.normalize())
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees();
    assert!(rotation_error < 0.5, "rotation error {rotation_error} deg");
    assert!(direction < 2.0, "translation error {direction} deg");
    assert!(output.adjustment.final_rmse < 1.0);
    assert!(output.triangulation.landmarks <= output.relative_pose.inliers.len());
}

#[test]
fn test_radial_mode_runs() {
    let data = dataset(0.0, 0.3);
    let config = PipelineConfig {
        intrinsic_mode: IntrinsicMode::SharedRadialK3,
        ..Default::default()
    };
    let output = TwoViewPipeline::new(config).run(&data.left, &data.right, &data.k).unwrap();
    assert_eq!(output.refined_scene.intrinsics.len(), 1);
    assert!(output.adjustment.final_rmse < 1.0);
}

#[test]
fn test_featureless_images_fail_estimation() {
    let left = FeatureStore::new(640, 480, 8);
    let right = FeatureStore::new(640, 480, 8);
    let k = na::Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
    let err = TwoViewPipeline::new(PipelineConfig::default())
        .run(&left, &right, &k)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Estimation(EstimationError::InsufficientCorrespondences { found: 0, .. })
    ));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_descriptor_mismatch_fails_matching() {
    let data = dataset(0.0, 0.0);
    let mut right = FeatureStore::new(640, 480, 4);
    right.push(Keypoint::new(1.0, 1.0), &[0, 0, 0, 0]).unwrap();
    right.push(Keypoint::new(2.0, 2.0), &[9, 9, 9, 9]).unwrap();
    let err = TwoViewPipeline::new(PipelineConfig::default())
        .run(&data.left, &right, &data.k)
        .unwrap_err();
    assert!(matches!(err, PipelineError::Matching(_)));
    assert_eq!(err.exit_code(), 3);
}

fn small_scene(pose1: Pose, pose2: Pose) -> (Scene, FeatureStore, FeatureStore) {
    let mut left = FeatureStore::new(640, 480, 2);
    let mut right = FeatureStore::new(640, 480, 2);
    left.push(Keypoint::new(10.0, 20.0), &[1, 2]).unwrap();
    right.push(Keypoint::new(30.0, 40.0), &[3, 4]).unwrap();
    let k = na::Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
    let mut scene = two_view_graph(IntrinsicMode::Shared, &k, &left, &right, &pose2);
    scene.poses.insert(LEFT_VIEW, pose1);
    scene.structure.insert(
        7,
        Landmark {
            x: na::Vector3::new(0.5, -0.2, 6.0),
            obs: BTreeMap::from([
                (
                    LEFT_VIEW,
                    Observation {
                        x: na::Vector2::new(10.0, 20.0),
                        id_feat: 0,
                    },
                ),
                (
                    RIGHT_VIEW,
                    Observation {
                        x: na::Vector2::new(30.0, 40.0),
                        id_feat: 0,
                    },
                ),
            ]),
        },
    );
    (scene, left, right)
}

#[test]
fn test_export_in_first_camera_frame() {
    let pose1 = Pose::new(
        na::Rotation3::new(na::Vector3::new(0.2, 0.1, -0.3)),
        na::Vector3::new(1.0, -2.0, 0.5),
    );
    let pose2 = Pose::new(
        na::Rotation3::new(na::Vector3::new(-0.1, 0.3, 0.2)),
        na::Vector3::new(-0.5, 0.4, 2.0),
    );
    let (scene, left, right) = small_scene(pose1, pose2);
    let result = export_two_view(&scene, &left, &right).unwrap();

    let expected_rotation = pose1.rotation.matrix() * pose2.rotation.matrix().transpose();
    assert_relative_eq!(result.rotation(), expected_rotation, epsilon = 1e-12);
    // camera 2 center seen from camera 1
    assert_relative_eq!(result.translation(), pose1.transform_point(&pose2.center()), epsilon = 1e-12);

    let lm = &result.landmarks[0];
    let x = scene.structure[&7].x;
    assert_eq!(lm.id, 7);
    assert_relative_eq!(lm.x, pose1.transform_point(&x), epsilon = 1e-12);
    // same point in camera 2 coordinates, through the relative transform
    assert_relative_eq!(result.relative.inverse().transform_point(&lm.x), pose2.transform_point(&x), epsilon = 1e-9);
    assert_eq!(lm.desc1, vec![1, 2]);
    assert_eq!(lm.desc2, vec![3, 4]);
}

#[test]
fn test_export_missing_feature() {
    let (mut scene, left, right) = small_scene(Pose::identity(), default_relative_pose());
    if let Some(obs) = scene
        .structure
        .get_mut(&7)
        .and_then(|lm| lm.obs.get_mut(&RIGHT_VIEW))
    {
        obs.id_feat = 3;
    }
    assert!(matches!(
        export_two_view(&scene, &left, &right),
        Err(ExportError::MissingFeature(3))
    ));

    scene.poses.remove(&RIGHT_VIEW);
    assert!(matches!(
        export_two_view(&scene, &left, &right),
        Err(ExportError::MissingPose(1))
    ));
}

#[test]
fn test_write_outputs() {
    let data = dataset(0.1, 0.3);
    let output = TwoViewPipeline::new(PipelineConfig::default())
        .run(&data.left, &data.right, &data.k)
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let written = output.write(dir.path(), "run").unwrap();
    assert_eq!(written.len(), 11);
    assert!(written.iter().all(|p| p.exists()));

    let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
    let n = output.result.landmarks.len();

    let posture = read("posture_run.txt");
    assert_eq!(posture.lines().count(), 3);
    assert!(posture.lines().all(|l| l.split_whitespace().count() == 3));
    assert_eq!(read("center_run.txt").lines().count(), 3);
    for (name, width) in [("X_run.txt", 3), ("x1_run.txt", 2), ("x2_run.txt", 2), ("desc1_run.txt", 32), ("desc2_run.txt", 32)] {
        let contents = read(name);
        assert_eq!(contents.lines().count(), n, "{name}");
        assert!(contents.lines().all(|l| l.split_whitespace().count() == width), "{name}");
    }
    let first_desc: Vec<u8> = read("desc1_run.txt")
        .lines()
        .next()
        .unwrap()
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(first_desc, output.result.landmarks[0].desc1);

    let ply = read("EssentialGeometry_refined_run.ply");
    assert!(ply.starts_with("ply\nformat ascii 1.0\n"));
    assert!(ply.contains(&format!("element vertex {}\n", n + 2)));
    assert!(ply.trim_end().ends_with("0 255 0"));

    let snapshot: SceneSnapshot = serde_json::from_str(&read("EssentialGeometry_start_run.json")).unwrap();
    assert_eq!(snapshot.views.len(), 2);
    assert_eq!(snapshot.poses.len(), 2);
    assert_eq!(snapshot.structure.len(), output.initial_scene.structure.len());
}
