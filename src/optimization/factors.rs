use nalgebra as na;
use num_dual::{Derivative, DualDVec64};
use tiny_solver::factors::Factor;

use crate::camera_model::GenericModel;

pub const POSE_DIM: usize = 6;
pub const POINT_DIM: usize = 3;

/// A parameter block of a factor, either a solver variable or a value baked into the factor.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamBlock {
    Variable,
    Constant(na::DVector<f64>),
}

impl ParamBlock {
    pub fn is_variable(&self) -> bool {
        matches!(self, ParamBlock::Variable)
    }
    fn take<'a, T: na::RealField>(
        &self,
        variables: &mut impl Iterator<Item = &'a na::DVector<T>>,
        dim: usize,
    ) -> na::DVector<T> {
        match self {
            ParamBlock::Constant(v) => v.map(|x| na::convert(x)),
            ParamBlock::Variable => variables
                .next()
                .cloned()
                .unwrap_or_else(|| na::DVector::zeros(dim)),
        }
    }
}

/// `R p` with `R = exp([ω]x)`, first order below machine precision so that the derivative at `ω = 0` exists.
pub fn angle_axis_rotate_point<T: na::RealField>(omega: &na::Vector3<T>, p: &na::Vector3<T>) -> na::Vector3<T> {
    let theta2 = omega.norm_squared();
    if theta2 > na::convert(f64::EPSILON) {
        let theta = theta2.sqrt();
        let (sin, cos) = theta.clone().sin_cos();
        let axis = omega / theta;
        let k_dot_p = axis.dot(p);
        p * cos.clone() + axis.cross(p) * sin + axis * (k_dot_p * (na::convert::<f64, T>(1.0) - cos))
    } else {
        p + omega.cross(p)
    }
}

/// Projected minus observed pixel of one observation.
///
/// Parameters are `[intrinsics, pose, point]` with the constant blocks left out.
#[derive(Debug, Clone)]
pub struct ReprojectionFactor {
    pub camera: GenericModel,
    pub observed: na::Vector2<f64>,
    pub intrinsics: ParamBlock,
    pub pose: ParamBlock,
    pub point: ParamBlock,
}

impl ReprojectionFactor {
    pub fn new(
        camera: GenericModel,
        observed: na::Vector2<f64>,
        intrinsics: ParamBlock,
        pose: ParamBlock,
        point: ParamBlock,
    ) -> ReprojectionFactor {
        ReprojectionFactor {
            camera,
            observed,
            intrinsics,
            pose,
            point,
        }
    }

    pub fn num_variables(&self) -> usize {
        [&self.intrinsics, &self.pose, &self.point]
            .into_iter()
            .filter(|b| b.is_variable())
            .count()
    }

    /// Residual and its Jacobian w.r.t. the stacked variable blocks, by forward mode dual numbers.
    pub fn residual_with_jacobian(&self, params: &[na::DVector<f64>]) -> (na::Vector2<f64>, na::DMatrix<f64>) {
        let n: usize = params.iter().map(|p| p.len()).sum();
        let mut offset = 0;
        let dual: Vec<na::DVector<DualDVec64>> = params
            .iter()
            .map(|p| {
                let start = offset;
                offset += p.len();
                na::DVector::from_fn(p.len(), |i, _| {
                    let mut eps = na::DVector::zeros(n);
                    eps[start + i] = 1.0;
                    DualDVec64::new(p[i], Derivative::some(eps))
                })
            })
            .collect();
        let residual = Factor::<DualDVec64>::residual_func(self, &dual);
        let rows: Vec<na::DVector<f64>> = residual
            .iter()
            .map(|r| r.eps.clone().unwrap_generic(na::Dyn(n), na::U1))
            .collect();
        let jacobian = na::DMatrix::from_fn(rows.len(), n, |i, j| rows[i][j]);
        (na::Vector2::new(residual[0].re, residual[1].re), jacobian)
    }
}

impl<T: na::RealField> Factor<T> for ReprojectionFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        let mut variables = params.iter();
        let intrinsics = self.intrinsics.take(&mut variables, self.camera.params_len());
        let pose = self.pose.take(&mut variables, POSE_DIM);
        let point = self.point.take(&mut variables, POINT_DIM);

        let omega = na::Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let t = na::Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());
        let x = na::Vector3::new(point[0].clone(), point[1].clone(), point[2].clone());
        let p_cam = angle_axis_rotate_point(&omega, &x) + t;
        let pixel = self.camera.project_with_params(&intrinsics, &p_cam);
        na::dvector![
            pixel[0].clone() - na::convert::<f64, T>(self.observed.x),
            pixel[1].clone() - na::convert::<f64, T>(self.observed.y)
        ]
    }
}
