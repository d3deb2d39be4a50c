use nalgebra as na;
use two_view_reconstruction::PipelineConfig;
use two_view_reconstruction::error::{FeatureError, InputError};
use two_view_reconstruction::features::{FeatureStore, Keypoint};
use two_view_reconstruction::io::{
    load_features, object_from_json, object_to_json, parse_intrinsic, read_intrinsic, write_intrinsic,
};
use two_view_reconstruction::optimization::{IntrinsicAdjustment, LossFunction};
use two_view_reconstruction::scene::{CheiralityPolicy, IntrinsicMode};

#[test]
fn test_parse_intrinsic() {
    let k = parse_intrinsic("500 0 320\n0 500 240\n0 0 1\n").unwrap();
    assert_eq!(k, na::Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0));

    assert!(parse_intrinsic("500 0 320 0 500 240 0 0").is_err());
    assert!(parse_intrinsic("500 0 320 0 500 240 0 0 1 1").is_err());
    assert!(parse_intrinsic("500 0 320 0 500 abc 0 0 1").is_err());
    assert!(parse_intrinsic("-500 0 320 0 500 240 0 0 1").is_err());
    assert!(parse_intrinsic("0 0 320 0 0 240 0 0 1").is_err());
    assert!(parse_intrinsic("inf 0 320 0 500 240 0 0 1").is_err());
}

#[test]
fn test_intrinsic_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("K.txt");
    let k = na::Matrix3::new(712.5, 0.0, 301.25, 0.0, 712.5, 199.75, 0.0, 0.0, 1.0);
    write_intrinsic(&path, &k).unwrap();
    assert_eq!(read_intrinsic(&path).unwrap(), k);
}

#[test]
fn test_intrinsic_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = read_intrinsic(&dir.path().join("nope.txt"));
    assert!(matches!(missing, Err(InputError::Io { .. })));

    let path = dir.path().join("K.txt");
    std::fs::write(&path, "1 2 3").unwrap();
    assert!(matches!(
        read_intrinsic(&path),
        Err(InputError::MalformedCalibration { .. })
    ));
}

#[test]
fn test_feature_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.json");
    let store = FeatureStore::from_parts(
        320,
        240,
        vec![Keypoint::new(1.5, 2.5), Keypoint::new(100.0, 50.25)],
        &[vec![1, 2, 3], vec![4, 5, 6]],
    )
    .unwrap();
    object_to_json(&path, &store).unwrap();

    let loaded = load_features(&path).unwrap();
    assert_eq!(loaded.image_size(), (320, 240));
    assert_eq!(loaded.keypoints(), store.keypoints());
    assert_eq!(loaded.descriptor(1), Some(&[4u8, 5, 6][..]));
    assert_eq!(loaded.descriptor(2), None);
}

#[test]
fn test_feature_file_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.json");

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(load_features(&path), Err(InputError::Json { .. })));

    // two keypoints but only one 3 byte descriptor
    std::fs::write(
        &path,
        r#"{"width": 10, "height": 10, "descriptor_len": 3,
            "keypoints": [{"p2d": [1.0, 2.0]}, {"p2d": [3.0, 4.0]}],
            "descriptors": [1, 2, 3]}"#,
    )
    .unwrap();
    assert!(matches!(
        load_features(&path),
        Err(InputError::Features {
            source: FeatureError::CountMismatch { keypoints: 2, descriptors: 1 },
            ..
        })
    ));
}

#[test]
fn test_feature_store_push() {
    let mut store = FeatureStore::new(10, 10, 2);
    assert!(store.is_empty());
    assert_eq!(store.push(Keypoint::new(0.0, 0.0), &[1, 2]).unwrap(), 0);
    assert!(matches!(
        store.push(Keypoint::new(0.0, 0.0), &[1]),
        Err(FeatureError::DescriptorLength { expected: 2, got: 1 })
    ));
    assert_eq!(store.len(), 1);
    assert!(matches!(
        FeatureStore::from_parts(10, 10, vec![Keypoint::new(0.0, 0.0)], &[]),
        Err(FeatureError::CountMismatch { keypoints: 1, descriptors: 0 })
    ));
}

#[test]
fn test_config_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.matcher.distance_ratio, 0.8);
    assert_eq!(config.ransac.max_iterations, 256);
    assert_eq!(config.ransac.max_threshold, None);
    assert_eq!(config.intrinsic_mode, IntrinsicMode::Shared);
    assert_eq!(config.cheirality, CheiralityPolicy::BehindBoth);
    assert_eq!(config.adjustment.intrinsics, IntrinsicAdjustment::Fixed);
    assert_eq!(config.adjustment.loss, LossFunction::Huber { delta: 16.0 });
}

#[test]
fn test_partial_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"ransac": {"seed": 3, "max_threshold": 2.0},
            "cheirality": "behind_either",
            "adjustment": {"intrinsics": "focal_length", "loss": "trivial"}}"#,
    )
    .unwrap();
    let config: PipelineConfig = object_from_json(&path).unwrap();
    assert_eq!(config.ransac.seed, 3);
    assert_eq!(config.ransac.max_threshold, Some(2.0));
    assert_eq!(config.ransac.max_iterations, 256);
    assert_eq!(config.cheirality, CheiralityPolicy::BehindEither);
    assert_eq!(config.intrinsic_mode, IntrinsicMode::Shared);
    assert_eq!(config.adjustment.intrinsics, IntrinsicAdjustment::FocalLength);
    assert_eq!(config.adjustment.loss, LossFunction::Trivial);
    assert_eq!(config.adjustment.max_iterations, 500);
    assert_eq!(config.matcher.distance_ratio, 0.8);

    // a full config survives serialization
    let out = dir.path().join("full.json");
    object_to_json(&out, &config).unwrap();
    let back: PipelineConfig = object_from_json(&out).unwrap();
    assert_eq!(back.adjustment.intrinsics, IntrinsicAdjustment::FocalLength);
    assert_eq!(back.ransac.max_threshold, Some(2.0));
}
