use serde::{Deserialize, Serialize};

use crate::camera_model::GenericModel;
use crate::camera_model::generic::{DISTORTION_START_IDX, FOCAL_IDX, PRINCIPAL_POINT_IDX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrinsicAdjustment {
    #[default]
    Fixed,
    FocalLength,
    PrincipalPoint,
    Distortion,
    AdjustAll,
}

impl IntrinsicAdjustment {
    /// Indices of the free parameters of `model`.
    pub fn free_params(&self, model: &GenericModel) -> Vec<usize> {
        let distortion = DISTORTION_START_IDX..DISTORTION_START_IDX + model.distortion_len();
        match self {
            IntrinsicAdjustment::Fixed => Vec::new(),
            IntrinsicAdjustment::FocalLength => vec![FOCAL_IDX],
            IntrinsicAdjustment::PrincipalPoint => PRINCIPAL_POINT_IDX.to_vec(),
            IntrinsicAdjustment::Distortion => distortion.collect(),
            IntrinsicAdjustment::AdjustAll => (0..DISTORTION_START_IDX).chain(distortion).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtrinsicAdjustment {
    Fixed,
    Rotation,
    Translation,
    #[default]
    AdjustAll,
}

impl ExtrinsicAdjustment {
    /// Free entries of the pose block, `0..3` angle-axis then `3..6` translation.
    pub fn free_params(&self) -> Vec<usize> {
        match self {
            ExtrinsicAdjustment::Fixed => Vec::new(),
            ExtrinsicAdjustment::Rotation => vec![0, 1, 2],
            ExtrinsicAdjustment::Translation => vec![3, 4, 5],
            ExtrinsicAdjustment::AdjustAll => (0..6).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureAdjustment {
    Fixed,
    #[default]
    AdjustAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFunction {
    Trivial,
    /// Quadratic below `delta` pixels, linear above.
    Huber { delta: f64 },
}

impl Default for LossFunction {
    fn default() -> Self {
        LossFunction::Huber { delta: 16.0 }
    }
}

impl LossFunction {
    /// `ρ(s)` of a squared residual norm.
    pub fn rho(&self, s: f64) -> f64 {
        match self {
            LossFunction::Trivial => s,
            LossFunction::Huber { delta } => {
                let d2 = delta * delta;
                if s <= d2 { s } else { 2.0 * delta * s.sqrt() - d2 }
            }
        }
    }
    /// `ρ'(s)`
    pub fn weight(&self, s: f64) -> f64 {
        match self {
            LossFunction::Trivial => 1.0,
            LossFunction::Huber { delta } => {
                if s <= delta * delta {
                    1.0
                } else {
                    delta / s.sqrt()
                }
            }
        }
    }
    pub fn is_valid(&self) -> bool {
        match self {
            LossFunction::Trivial => true,
            LossFunction::Huber { delta } => delta.is_finite() && *delta > 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentOptions {
    pub intrinsics: IntrinsicAdjustment,
    pub extrinsics: ExtrinsicAdjustment,
    pub structure: StructureAdjustment,
    pub loss: LossFunction,
    pub max_iterations: usize,
    /// Stops once the relative cost decrease of an iteration falls below this.
    pub function_tolerance: f64,
    /// Stops once the absolute cost decrease of an iteration falls below this.
    pub absolute_tolerance: f64,
    /// Stops once the cost falls below this.
    pub min_cost: f64,
    /// Max-norm of the gradient under which a run that moved nothing counts as stationary.
    pub gradient_tolerance: f64,
}

impl Default for AdjustmentOptions {
    fn default() -> Self {
        AdjustmentOptions {
            intrinsics: IntrinsicAdjustment::Fixed,
            extrinsics: ExtrinsicAdjustment::AdjustAll,
            structure: StructureAdjustment::AdjustAll,
            loss: LossFunction::default(),
            max_iterations: 500,
            function_tolerance: 1e-6,
            absolute_tolerance: 1e-12,
            min_cost: 1e-14,
            gradient_tolerance: 1e-6,
        }
    }
}

impl AdjustmentOptions {
    pub fn to_solver_options(&self) -> tiny_solver::OptimizerOptions {
        tiny_solver::OptimizerOptions {
            max_iteration: self.max_iterations,
            min_rel_error_decrease_threshold: self.function_tolerance,
            min_abs_error_decrease_threshold: self.absolute_tolerance,
            min_error_threshold: self.min_cost,
            verbosity_level: 0,
            ..Default::default()
        }
    }
}
