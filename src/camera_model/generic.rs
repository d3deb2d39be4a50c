use nalgebra as na;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Pinhole, PinholeRadialK3};
use crate::types::Pose;

pub trait CameraModel
where
    Self: Sync,
{
    fn params(&self) -> na::DVector<f64>;
    fn set_params(&mut self, params: &na::DVector<f64>);
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn focal(&self) -> f64;
    fn principal_point(&self) -> na::Vector2<f64>;
    /// Applies lens distortion to normalized coordinates.
    fn distort(&self, xn: &na::Vector2<f64>) -> na::Vector2<f64>;
    /// Inverse of [`CameraModel::distort`].
    fn undistort(&self, xd: &na::Vector2<f64>) -> na::Vector2<f64>;

    fn k_matrix(&self) -> na::Matrix3<f64> {
        let c = self.principal_point();
        let f = self.focal();
        na::Matrix3::new(f, 0.0, c.x, 0.0, f, c.y, 0.0, 0.0, 1.0)
    }
    fn project_one(&self, p_cam: &na::Vector3<f64>) -> na::Vector2<f64> {
        let xn = na::Vector2::new(p_cam.x / p_cam.z, p_cam.y / p_cam.z);
        let xd = self.distort(&xn);
        xd * self.focal() + self.principal_point()
    }
    /// Projects camera frame points, `None` when behind the camera or outside the image.
    fn project(&self, p3d: &[na::Vector3<f64>]) -> Vec<Option<na::Vector2<f64>>> {
        p3d.par_iter()
            .map(|pt| {
                if pt.z <= 0.0 {
                    return None;
                }
                let p2d = self.project_one(pt);
                if p2d[0] < 0.0
                    || p2d[0] > self.width() as f64
                    || p2d[1] < 0.0
                    || p2d[1] > self.height() as f64
                {
                    None
                } else {
                    Some(p2d)
                }
            })
            .collect()
    }
    /// Undistorted normalized coordinates of a pixel, as a homogeneous bearing `(x, y, 1)`.
    fn bearing(&self, pixel: &na::Vector2<f64>) -> na::Vector3<f64> {
        let xd = (pixel - self.principal_point()) / self.focal();
        self.undistort(&xd).push(1.0)
    }
    /// Pixel as it would be observed without lens distortion.
    fn undistort_pixel(&self, pixel: &na::Vector2<f64>) -> na::Vector2<f64> {
        let b = self.bearing(pixel);
        na::Vector2::new(b.x, b.y) * self.focal() + self.principal_point()
    }
    /// `K [R | t]`
    fn projection_matrix(&self, pose: &Pose) -> na::Matrix3x4<f64> {
        self.k_matrix() * pose.to_matrix3x4()
    }
    fn residual(&self, pose: &Pose, p3d: &na::Vector3<f64>, observed: &na::Vector2<f64>) -> na::Vector2<f64> {
        self.project_one(&pose.transform_point(p3d)) - observed
    }
}

/// Intrinsic parameter index layout shared by all models.
pub const FOCAL_IDX: usize = 0;
pub const PRINCIPAL_POINT_IDX: [usize; 2] = [1, 2];
pub const DISTORTION_START_IDX: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum GenericModel {
    Pinhole(Pinhole),
    PinholeRadialK3(PinholeRadialK3),
}

impl GenericModel {
    pub fn model_name(&self) -> &'static str {
        match self {
            GenericModel::Pinhole(_) => "pinhole",
            GenericModel::PinholeRadialK3(_) => "pinhole_radial_k3",
        }
    }
    pub fn distortion_len(&self) -> usize {
        match self {
            GenericModel::Pinhole(_) => 0,
            GenericModel::PinholeRadialK3(_) => 3,
        }
    }
    pub fn params_len(&self) -> usize {
        DISTORTION_START_IDX + self.distortion_len()
    }
    /// Projects a camera frame point with the parameters in `params` instead of the stored ones.
    pub fn project_with_params<T: na::RealField>(
        &self,
        params: &na::DVector<T>,
        p_cam: &na::Vector3<T>,
    ) -> na::Vector2<T> {
        match self {
            GenericModel::Pinhole(_) => Pinhole::project_params(params, p_cam),
            GenericModel::PinholeRadialK3(_) => PinholeRadialK3::project_params(params, p_cam),
        }
    }
    pub fn new_from_params(&self, params: &na::DVector<f64>) -> GenericModel {
        let mut model = *self;
        model.set_params(params);
        model
    }
}

macro_rules! dispatch {
    ($self:ident, $m:ident => $e:expr) => {
        match $self {
            GenericModel::Pinhole($m) => $e,
            GenericModel::PinholeRadialK3($m) => $e,
        }
    };
}

impl CameraModel for GenericModel {
    fn params(&self) -> na::DVector<f64> {
        dispatch!(self, m => m.params())
    }
    fn set_params(&mut self, params: &na::DVector<f64>) {
        dispatch!(self, m => m.set_params(params))
    }
    fn width(&self) -> u32 {
        dispatch!(self, m => m.width())
    }
    fn height(&self) -> u32 {
        dispatch!(self, m => m.height())
    }
    fn focal(&self) -> f64 {
        dispatch!(self, m => m.focal())
    }
    fn principal_point(&self) -> na::Vector2<f64> {
        dispatch!(self, m => m.principal_point())
    }
    fn distort(&self, xn: &na::Vector2<f64>) -> na::Vector2<f64> {
        dispatch!(self, m => m.distort(xn))
    }
    fn undistort(&self, xd: &na::Vector2<f64>) -> na::Vector2<f64> {
        dispatch!(self, m => m.undistort(xd))
    }
}
