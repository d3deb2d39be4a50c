use criterion::{Criterion, criterion_group, criterion_main};
use nalgebra as na;
use std::hint::black_box;
use two_view_reconstruction::camera_model::{CameraModel, GenericModel};
use two_view_reconstruction::matching::{IndMatch, MatcherOptions, putative_matches};
use two_view_reconstruction::multiview::essential_five_point;
use two_view_reconstruction::optimization::{AdjustmentOptions, BundleAdjuster};
use two_view_reconstruction::robust::{AcRansacOptions, RelativePoseInfo, robust_relative_pose};
use two_view_reconstruction::scene::{CheiralityPolicy, IntrinsicMode, initialize_scene};
use two_view_reconstruction::synthetic::{SyntheticConfig, SyntheticTwoView, default_relative_pose, generate_two_view};

fn dataset(outlier_ratio: f64, noise_px: f64) -> SyntheticTwoView {
    let config = SyntheticConfig {
        outlier_ratio,
        noise_px,
        ..Default::default()
    };
    generate_two_view(&config, &default_relative_pose()).unwrap()
}

fn pixels(data: &SyntheticTwoView, matches: &[IndMatch]) -> (Vec<na::Vector2<f64>>, Vec<na::Vector2<f64>>) {
    matches
        .iter()
        .map(|m| {
            let a = data.left.keypoint(m.i).unwrap().p2d;
            let b = data.right.keypoint(m.j).unwrap().p2d;
            (
                na::Vector2::new(a.x as f64, a.y as f64),
                na::Vector2::new(b.x as f64, b.y as f64),
            )
        })
        .unzip()
}

fn bench_five_point(c: &mut Criterion) {
    let data = dataset(0.0, 0.0);
    let camera = SyntheticConfig::default().camera();
    let (x1, x2) = pixels(&data, &data.true_matches[..5]);
    let b1: Vec<_> = x1.iter().map(|p| camera.bearing(p)).collect();
    let b2: Vec<_> = x2.iter().map(|p| camera.bearing(p)).collect();

    c.bench_function("essential_five_point", |b| {
        b.iter(|| essential_five_point(black_box(b1.as_slice()), black_box(b2.as_slice())))
    });
}

fn bench_matching(c: &mut Criterion) {
    let data = dataset(0.2, 0.5);
    let options = MatcherOptions::default();
    c.bench_function("putative_matches", |b| {
        b.iter(|| putative_matches(black_box(&data.left), black_box(&data.right), &options))
    });
}

fn bench_relative_pose(c: &mut Criterion) {
    let data = dataset(0.3, 0.5);
    let camera = GenericModel::Pinhole(SyntheticConfig::default().camera());
    let mut matches = data.true_matches.clone();
    matches.extend(&data.outlier_matches);
    let (x1, x2) = pixels(&data, &matches);
    let options = AcRansacOptions::default();

    c.bench_function("robust_relative_pose", |b| {
        b.iter(|| robust_relative_pose(&camera, &camera, black_box(x1.as_slice()), black_box(x2.as_slice()), &options))
    });
}

fn bench_bundle_adjustment(c: &mut Criterion) {
    let data = dataset(0.0, 0.5);
    let camera = GenericModel::Pinhole(SyntheticConfig::default().camera());
    let (x1, x2) = pixels(&data, &data.true_matches);
    let relative: RelativePoseInfo =
        robust_relative_pose(&camera, &camera, &x1, &x2, &AcRansacOptions::default()).unwrap();
    let (scene, _) = initialize_scene(
        &data.left,
        &data.right,
        &data.true_matches,
        &relative,
        &data.k,
        IntrinsicMode::Shared,
        CheiralityPolicy::BehindBoth,
    )
    .unwrap();
    let adjuster = BundleAdjuster::new(AdjustmentOptions::default());

    c.bench_function("bundle_adjustment", |b| {
        b.iter(|| {
            let mut s = scene.clone();
            adjuster.adjust(&mut s)
        })
    });
}

criterion_group!(
    benches,
    bench_five_point,
    bench_matching,
    bench_relative_pose,
    bench_bundle_adjustment
);
criterion_main!(benches);
