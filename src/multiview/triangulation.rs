use nalgebra as na;

use super::essential::skew;

/// Linear two-view triangulation.
///
/// `x1`, `x2` are homogeneous image points of `P1`, `P2`. The cross products `[x]x P X = 0`
/// of both views are stacked into a 6x4 system solved by SVD. Returns `None` for points at
/// infinity.
pub fn triangulate_dlt(
    p1: &na::Matrix3x4<f64>,
    x1: &na::Vector3<f64>,
    p2: &na::Matrix3x4<f64>,
    x2: &na::Vector3<f64>,
) -> Option<na::Vector3<f64>> {
    let mut design = na::SMatrix::<f64, 6, 4>::zeros();
    design
        .fixed_view_mut::<3, 4>(0, 0)
        .copy_from(&(skew(x1) * p1));
    design
        .fixed_view_mut::<3, 4>(3, 0)
        .copy_from(&(skew(x2) * p2));
    let svd = design.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd.singular_values.argmin();
    let xh = v_t.row(min_idx);
    if xh[3].abs() < 1e-12 * (xh[0].abs() + xh[1].abs() + xh[2].abs()).max(1.0) {
        return None;
    }
    let x = na::Vector3::new(xh[0] / xh[3], xh[1] / xh[3], xh[2] / xh[3]);
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Convenience for pixel observations.
pub fn triangulate_pixels(
    p1: &na::Matrix3x4<f64>,
    x1: &na::Vector2<f64>,
    p2: &na::Matrix3x4<f64>,
    x2: &na::Vector2<f64>,
) -> Option<na::Vector3<f64>> {
    triangulate_dlt(p1, &x1.push(1.0), p2, &x2.push(1.0))
}
