use nalgebra as na;

use super::triangulation::triangulate_dlt;
use crate::types::Pose;

pub fn skew(v: &na::Vector3<f64>) -> na::Matrix3<f64> {
    na::Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// `E = [t]x R`, so that `b2ᵀ E b1 = 0` for `b2 ~ R b1 + t`.
pub fn essential_from_motion(rotation: &na::Rotation3<f64>, translation: &na::Vector3<f64>) -> na::Matrix3<f64> {
    skew(translation) * rotation.matrix()
}

/// The four `(R, t)` factorizations of an essential matrix, `t` unit norm.
pub fn motions_from_essential(e: &na::Matrix3<f64>) -> Vec<Pose> {
    let svd = e.svd(true, true);
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Vec::new();
    };
    let mut v = v_t.transpose();
    if u.determinant() < 0.0 {
        u = -u;
    }
    if v.determinant() < 0.0 {
        v = -v;
    }
    let w = na::Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = na::Rotation3::from_matrix_unchecked(u * w * v.transpose());
    let r2 = na::Rotation3::from_matrix_unchecked(u * w.transpose() * v.transpose());
    let t: na::Vector3<f64> = u.column(2).into_owned();
    vec![
        Pose::new(r1, t),
        Pose::new(r1, -t),
        Pose::new(r2, t),
        Pose::new(r2, -t),
    ]
}

/// Squared distance of `b2` to the epipolar line `E b1`, in normalized image units.
pub fn epipolar_distance_sq(e: &na::Matrix3<f64>, b1: &na::Vector3<f64>, b2: &na::Vector3<f64>) -> f64 {
    let line = e * b1;
    let denom = line.x * line.x + line.y * line.y;
    if denom <= f64::EPSILON * f64::EPSILON {
        return f64::INFINITY;
    }
    let d = b2.dot(&line) / b2.z;
    d * d / denom
}

/// Number of bearing pairs that triangulate in front of both cameras, camera 1 at identity.
pub fn count_in_front(motion: &Pose, b1: &[na::Vector3<f64>], b2: &[na::Vector3<f64>]) -> usize {
    let p1 = Pose::identity().to_matrix3x4();
    let p2 = motion.to_matrix3x4();
    b1.iter()
        .zip(b2)
        .filter(|(x1, x2)| match triangulate_dlt(&p1, x1, &p2, x2) {
            Some(x) => x.z > 0.0 && motion.depth(&x) > 0.0,
            None => false,
        })
        .count()
}

/// Picks the factorization of `e` with the most points in front of both cameras.
pub fn select_motion(e: &na::Matrix3<f64>, b1: &[na::Vector3<f64>], b2: &[na::Vector3<f64>]) -> Option<(Pose, usize)> {
    motions_from_essential(e)
        .into_iter()
        .map(|m| {
            let n = count_in_front(&m, b1, b2);
            (m, n)
        })
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
}
