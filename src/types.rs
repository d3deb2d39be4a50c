use nalgebra as na;
use serde::{Deserialize, Serialize};

/// World to camera transform, `x_cam = R * x_world + t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: na::Rotation3<f64>,
    pub translation: na::Vector3<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Pose::identity()
    }
}

impl Pose {
    pub fn new(rotation: na::Rotation3<f64>, translation: na::Vector3<f64>) -> Pose {
        Pose {
            rotation,
            translation,
        }
    }
    pub fn identity() -> Pose {
        Pose::new(na::Rotation3::identity(), na::Vector3::zeros())
    }
    /// Builds the pose of a camera with the given orientation located at `center`.
    pub fn from_center(rotation: na::Rotation3<f64>, center: &na::Vector3<f64>) -> Pose {
        Pose::new(rotation, -(rotation * center))
    }
    pub fn center(&self) -> na::Vector3<f64> {
        -(self.rotation.inverse() * self.translation)
    }
    pub fn transform_point(&self, p: &na::Vector3<f64>) -> na::Vector3<f64> {
        self.rotation * p + self.translation
    }
    /// Z coordinate of `p` in the camera frame.
    pub fn depth(&self, p: &na::Vector3<f64>) -> f64 {
        self.transform_point(p).z
    }
    pub fn inverse(&self) -> Pose {
        let r_inv = self.rotation.inverse();
        Pose::new(r_inv, -(r_inv * self.translation))
    }
    /// `self ∘ other`: applies `other` first.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }
    /// Parameter block `[rx, ry, rz, tx, ty, tz]`, angle-axis rotation then translation.
    pub fn to_params(&self) -> na::DVector<f64> {
        let r = self.rotation.scaled_axis();
        let t = self.translation;
        na::dvector![r.x, r.y, r.z, t.x, t.y, t.z]
    }
    /// Inverse of [`Pose::to_params`]; the rotation is renormalized.
    pub fn from_params(params: &na::DVector<f64>) -> Pose {
        let mut rotation = na::Rotation3::new(na::Vector3::new(params[0], params[1], params[2]));
        rotation.renormalize();
        Pose::new(rotation, na::Vector3::new(params[3], params[4], params[5]))
    }
    /// `[R | t]`
    pub fn to_matrix3x4(&self) -> na::Matrix3x4<f64> {
        let mut m = na::Matrix3x4::zeros();
        m.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.matrix());
        m.set_column(3, &self.translation);
        m
    }
}

/// Angle of `a⁻¹ b` in radians.
///
/// Uses `atan2` of the sine and cosine parts so that nearly equal rotations give `0` instead of `NaN`.
pub fn rotation_angle(a: &na::Rotation3<f64>, b: &na::Rotation3<f64>) -> f64 {
    let m = (a.inverse() * b).into_inner();
    let axis = na::Vector3::new(m[(2, 1)] - m[(1, 2)], m[(0, 2)] - m[(2, 0)], m[(1, 0)] - m[(0, 1)]);
    let sin = 0.5 * axis.norm();
    let cos = 0.5 * (m.trace() - 1.0);
    sin.atan2(cos)
}

/// Angle-axis and translation form of a [`Pose`], used for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RvecTvec {
    pub rvec: [f64; 3],
    pub tvec: [f64; 3],
}

impl RvecTvec {
    pub fn new(rvec: na::Vector3<f64>, tvec: na::Vector3<f64>) -> RvecTvec {
        RvecTvec {
            rvec: rvec.into(),
            tvec: tvec.into(),
        }
    }
    pub fn na_rvec(&self) -> na::Vector3<f64> {
        na::Vector3::from(self.rvec)
    }
    pub fn na_tvec(&self) -> na::Vector3<f64> {
        na::Vector3::from(self.tvec)
    }
    pub fn to_pose(&self) -> Pose {
        Pose::new(na::Rotation3::new(self.na_rvec()), self.na_tvec())
    }
}

impl From<&Pose> for RvecTvec {
    fn from(pose: &Pose) -> Self {
        RvecTvec::new(pose.rotation.scaled_axis(), pose.translation)
    }
}
