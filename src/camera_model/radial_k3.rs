use nalgebra as na;
use serde::{Deserialize, Serialize};

use super::generic::CameraModel;

const UNDISTORT_MAX_ITERATIONS: usize = 30;
const UNDISTORT_EPS: f64 = 1e-12;

/// Pinhole camera with a 3 coefficient radial distortion, parameters `[f, cx, cy, k1, k2, k3]`.
///
/// `xd = xn * (1 + k1 r² + k2 r⁴ + k3 r⁶)` on normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeRadialK3 {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
}

impl PinholeRadialK3 {
    pub fn new(width: u32, height: u32, focal: f64, cx: f64, cy: f64, k: [f64; 3]) -> PinholeRadialK3 {
        PinholeRadialK3 {
            width,
            height,
            focal,
            cx,
            cy,
            k1: k[0],
            k2: k[1],
            k3: k[2],
        }
    }
    fn radial_factor(&self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }
    pub fn project_params<T: na::RealField>(params: &na::DVector<T>, p_cam: &na::Vector3<T>) -> na::Vector2<T> {
        let xn = p_cam.x.clone() / p_cam.z.clone();
        let yn = p_cam.y.clone() / p_cam.z.clone();
        let r2 = xn.clone() * xn.clone() + yn.clone() * yn.clone();
        let s = na::convert::<f64, T>(1.0)
            + r2.clone() * (params[3].clone() + r2.clone() * (params[4].clone() + r2 * params[5].clone()));
        let f = params[0].clone();
        na::Vector2::new(
            f.clone() * xn * s.clone() + params[1].clone(),
            f * yn * s + params[2].clone(),
        )
    }
}

impl CameraModel for PinholeRadialK3 {
    fn params(&self) -> na::DVector<f64> {
        na::dvector![self.focal, self.cx, self.cy, self.k1, self.k2, self.k3]
    }
    fn set_params(&mut self, params: &na::DVector<f64>) {
        self.focal = params[0];
        self.cx = params[1];
        self.cy = params[2];
        self.k1 = params[3];
        self.k2 = params[4];
        self.k3 = params[5];
    }
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn focal(&self) -> f64 {
        self.focal
    }
    fn principal_point(&self) -> na::Vector2<f64> {
        na::Vector2::new(self.cx, self.cy)
    }
    fn distort(&self, xn: &na::Vector2<f64>) -> na::Vector2<f64> {
        xn * self.radial_factor(xn.norm_squared())
    }
    /// Fixed point iteration `xn = xd / s(|xn|²)`.
    fn undistort(&self, xd: &na::Vector2<f64>) -> na::Vector2<f64> {
        let mut xn = *xd;
        for _ in 0..UNDISTORT_MAX_ITERATIONS {
            let s = self.radial_factor(xn.norm_squared());
            if s.abs() < f64::EPSILON {
                break;
            }
            let next = xd / s;
            let step = (next - xn).norm();
            xn = next;
            if step < UNDISTORT_EPS {
                break;
            }
        }
        xn
    }
}
