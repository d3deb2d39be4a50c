use nalgebra as na;
use serde::{Deserialize, Serialize};

use super::generic::CameraModel;

/// Square pixel pinhole camera, parameters `[f, cx, cy]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pinhole {
    pub width: u32,
    pub height: u32,
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Pinhole {
    pub fn new(width: u32, height: u32, focal: f64, cx: f64, cy: f64) -> Pinhole {
        Pinhole {
            width,
            height,
            focal,
            cx,
            cy,
        }
    }
    /// Reads `f = K(0,0)`, `cx = K(0,2)`, `cy = K(1,2)`.
    pub fn from_k(width: u32, height: u32, k: &na::Matrix3<f64>) -> Pinhole {
        Pinhole::new(width, height, k[(0, 0)], k[(0, 2)], k[(1, 2)])
    }
    pub fn project_params<T: na::RealField>(params: &na::DVector<T>, p_cam: &na::Vector3<T>) -> na::Vector2<T> {
        let xn = p_cam.x.clone() / p_cam.z.clone();
        let yn = p_cam.y.clone() / p_cam.z.clone();
        let f = params[0].clone();
        na::Vector2::new(f.clone() * xn + params[1].clone(), f * yn + params[2].clone())
    }
}

impl CameraModel for Pinhole {
    fn params(&self) -> na::DVector<f64> {
        na::dvector![self.focal, self.cx, self.cy]
    }
    fn set_params(&mut self, params: &na::DVector<f64>) {
        self.focal = params[0];
        self.cx = params[1];
        self.cy = params[2];
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
        *xn
    }
    fn undistort(&self, xd: &na::Vector2<f64>) -> na::Vector2<f64> {
        *xd
    }
}
