use approx::assert_relative_eq;
use nalgebra as na;
use two_view_reconstruction::camera_model::{CameraModel, GenericModel, Pinhole, PinholeRadialK3};
use two_view_reconstruction::types::Pose;

fn radial() -> PinholeRadialK3 {
    PinholeRadialK3::new(640, 480, 500.0, 321.0, 239.0, [-0.2, 0.05, -0.01])
}

#[test]
fn test_projection_matrix_matches_projection() {
    let camera = GenericModel::Pinhole(Pinhole::new(640, 480, 500.0, 320.0, 240.0));
    let pose = Pose::from_center(
        na::Rotation3::new(na::Vector3::new(0.1, -0.05, 0.2)),
        &na::Vector3::new(0.5, -0.2, 0.1),
    );
    let p = camera.projection_matrix(&pose);
    for x in [
        na::Vector3::new(0.3, 0.2, 5.0),
        na::Vector3::new(-1.0, 0.5, 3.0),
        na::Vector3::new(2.0, -1.0, 8.0),
    ] {
        let h = p * x.push(1.0);
        let from_matrix = na::Vector2::new(h.x / h.z, h.y / h.z);
        let direct = camera.project_one(&pose.transform_point(&x));
        assert_relative_eq!(from_matrix, direct, epsilon = 1e-9);
    }
}

#[test]
fn test_k_matrix_round_trip() {
    let k = na::Matrix3::new(450.0, 0.0, 300.0, 0.0, 450.0, 200.0, 0.0, 0.0, 1.0);
    let camera = Pinhole::from_k(600, 400, &k);
    assert_eq!(camera.k_matrix(), k);
    assert_eq!(camera.params(), na::dvector![450.0, 300.0, 200.0]);
}

#[test]
fn test_project_filters_invisible_points() {
    let camera = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
    let projected = camera.project(&[
        na::Vector3::new(0.0, 0.0, 1.0),
        na::Vector3::new(0.0, 0.0, -1.0),
        na::Vector3::new(10.0, 0.0, 1.0),
    ]);
    assert!(projected[0].is_some());
    assert!(projected[1].is_none());
    assert!(projected[2].is_none());
}

#[test]
fn test_radial_bearing_inverts_projection() {
    let camera = radial();
    for p in [
        na::Vector3::new(0.1, 0.2, 1.0),
        na::Vector3::new(-0.4, 0.3, 1.5),
        na::Vector3::new(0.8, -0.5, 2.0),
    ] {
        let pixel = camera.project_one(&p);
        let b = camera.bearing(&pixel);
        assert_relative_eq!(b, p / p.z, epsilon = 1e-9);
    }
}

#[test]
fn test_undistort_pixel() {
    let pinhole = Pinhole::new(640, 480, 500.0, 320.0, 240.0);
    let px = na::Vector2::new(100.0, 400.0);
    assert_relative_eq!(pinhole.undistort_pixel(&px), px, epsilon = 1e-9);

    let camera = radial();
    let p = na::Vector3::new(0.3, -0.2, 1.0);
    let ideal = na::Vector2::new(500.0 * 0.3 + 321.0, 500.0 * -0.2 + 239.0);
    assert_relative_eq!(camera.undistort_pixel(&camera.project_one(&p)), ideal, epsilon = 1e-6);
}

#[test]
fn test_projection_with_params() {
    let p = na::Vector3::new(0.4, -0.3, 2.0);
    for model in [
        GenericModel::Pinhole(Pinhole::new(640, 480, 500.0, 320.0, 240.0)),
        GenericModel::PinholeRadialK3(radial()),
    ] {
        assert_eq!(model.params_len(), model.params().len());
        assert_relative_eq!(model.project_with_params(&model.params(), &p), model.project_one(&p), epsilon = 1e-12);
    }

    // the passed parameters win over the stored ones
    let model = GenericModel::PinholeRadialK3(radial());
    let mut params = model.params();
    params[0] = 600.0;
    params[3] = 0.0;
    let moved = model.new_from_params(&params);
    assert_relative_eq!(model.project_with_params(&params, &p), moved.project_one(&p), epsilon = 1e-12);
}

#[test]
fn test_generic_model_dispatch() {
    let model = GenericModel::PinholeRadialK3(radial());
    assert_eq!(model.model_name(), "pinhole_radial_k3");
    assert_eq!(model.distortion_len(), 3);
    assert_eq!(model.params().len(), 6);
    let moved = model.new_from_params(&na::dvector![510.0, 320.0, 240.0, 0.0, 0.0, 0.0]);
    assert_eq!(moved.focal(), 510.0);
    assert_eq!(model.focal(), 500.0);
}
