//! Bundle adjustment of a [`Scene`] on top of `tiny-solver`.
//!
//! Each intrinsic, pose and landmark with at least one free entry becomes a solver variable and
//! partially free blocks pin their remaining entries with `fix_variable`. Fully fixed blocks are
//! baked into the factors as constants. Both poses follow the same extrinsic mask, so the gauge
//! stays free and the exporter re-expresses the result in the first camera.

use std::collections::HashMap;

use nalgebra as na;
use rayon::prelude::*;
use tiny_solver::Optimizer;
use tiny_solver::factors::Factor;

use super::factors::{ParamBlock, ReprojectionFactor};
use super::options::{AdjustmentOptions, LossFunction, StructureAdjustment};
use crate::camera_model::CameraModel;
use crate::error::AdjustmentError;
use crate::scene::{IndexT, Scene};
use crate::types::Pose;

/// Relative slack on the final cost before a run counts as diverged.
const DIVERGENCE_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The solver moved the free parameters.
    Converged,
    /// No step was accepted and the gradient is below tolerance.
    Stationary,
    /// No step was accepted while the gradient is above tolerance. The scene is left as it was.
    NoImprovement,
    NothingToAdjust,
}

impl Termination {
    fn after_solve(moved: bool, gradient_max_norm: f64, gradient_tolerance: f64) -> Termination {
        if moved {
            Termination::Converged
        } else if gradient_max_norm <= gradient_tolerance {
            Termination::Stationary
        } else {
            Termination::NoImprovement
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdjustmentSummary {
    pub initial_cost: f64,
    pub final_cost: f64,
    pub initial_rmse: f64,
    pub final_rmse: f64,
    pub termination: Termination,
    pub num_observations: usize,
    /// Free scalar parameters seen by the solver.
    pub num_parameters: usize,
    /// Max-norm of the cost gradient w.r.t. the free parameters at the returned point.
    pub gradient_max_norm: f64,
}

fn intrinsic_key(id: IndexT) -> String {
    format!("intrinsic_{id}")
}

fn pose_key(id: IndexT) -> String {
    format!("pose_{id}")
}

fn landmark_key(id: IndexT) -> String {
    format!("landmark_{id}")
}

struct Term {
    factor: ReprojectionFactor,
    keys: Vec<String>,
}

impl Term {
    fn params(&self, values: &HashMap<String, na::DVector<f64>>) -> Result<Vec<na::DVector<f64>>, AdjustmentError> {
        self.keys
            .iter()
            .map(|k| {
                values
                    .get(k)
                    .cloned()
                    .ok_or_else(|| AdjustmentError::MissingVariable(k.clone()))
            })
            .collect()
    }
}

#[derive(Default)]
struct Variables {
    values: HashMap<String, na::DVector<f64>>,
    fixed: HashMap<String, Vec<usize>>,
}

impl Variables {
    /// Registers a block, `Constant` when none of its entries is free.
    fn insert(&mut self, key: String, value: na::DVector<f64>, free: &[usize]) -> ParamBlock {
        if free.is_empty() {
            return ParamBlock::Constant(value);
        }
        let fixed: Vec<usize> = (0..value.len()).filter(|i| !free.contains(i)).collect();
        if !fixed.is_empty() {
            self.fixed.insert(key.clone(), fixed);
        }
        self.values.insert(key, value);
        ParamBlock::Variable
    }

    fn num_free(&self) -> usize {
        self.values
            .iter()
            .map(|(k, v)| v.len() - self.fixed.get(k).map_or(0, |f| f.len()))
            .sum()
    }
}

fn build_problem(scene: &Scene, options: &AdjustmentOptions) -> Result<(Variables, Vec<Term>), AdjustmentError> {
    let mut variables = Variables::default();

    let intrinsics: HashMap<IndexT, ParamBlock> = scene
        .intrinsics
        .iter()
        .map(|(id, cam)| {
            let free = options.intrinsics.free_params(cam);
            (*id, variables.insert(intrinsic_key(*id), cam.params(), &free))
        })
        .collect();
    let pose_free = options.extrinsics.free_params();
    let poses: HashMap<IndexT, ParamBlock> = scene
        .poses
        .iter()
        .map(|(id, pose)| (*id, variables.insert(pose_key(*id), pose.to_params(), &pose_free)))
        .collect();
    let point_free: Vec<usize> = match options.structure {
        StructureAdjustment::Fixed => Vec::new(),
        StructureAdjustment::AdjustAll => vec![0, 1, 2],
    };

    let mut terms = Vec::new();
    for (id, landmark) in &scene.structure {
        let point = variables.insert(
            landmark_key(*id),
            na::DVector::from_column_slice(landmark.x.as_slice()),
            &point_free,
        );
        for (id_view, obs) in &landmark.obs {
            let unknown = || AdjustmentError::UnknownView {
                landmark: *id,
                view: *id_view,
            };
            let view = scene.views.get(id_view).ok_or_else(unknown)?;
            let (Some(camera), Some(intrinsic), Some(pose)) = (
                scene.intrinsics.get(&view.id_intrinsic),
                intrinsics.get(&view.id_intrinsic),
                poses.get(&view.id_pose),
            ) else {
                return Err(unknown());
            };

            let mut keys = Vec::with_capacity(3);
            if intrinsic.is_variable() {
                keys.push(intrinsic_key(view.id_intrinsic));
            }
            if pose.is_variable() {
                keys.push(pose_key(view.id_pose));
            }
            if point.is_variable() {
                keys.push(landmark_key(*id));
            }
            terms.push(Term {
                factor: ReprojectionFactor::new(*camera, obs.x, intrinsic.clone(), pose.clone(), point.clone()),
                keys,
            });
        }
    }
    Ok((variables, terms))
}

/// `(0.5 Σ ρ(|r|²), Σ |r|²)`
fn evaluate(
    terms: &[Term],
    values: &HashMap<String, na::DVector<f64>>,
    loss: &LossFunction,
) -> Result<(f64, f64), AdjustmentError> {
    let squared: Vec<f64> = terms
        .par_iter()
        .map(|t| {
            let params = t.params(values)?;
            let r: na::DVector<f64> = Factor::<f64>::residual_func(&t.factor, &params);
            Ok(r.norm_squared())
        })
        .collect::<Result<_, AdjustmentError>>()?;
    Ok(squared
        .iter()
        .fold((0.0, 0.0), |(c, sq), s| (c + 0.5 * loss.rho(*s), sq + s)))
}

fn gradient_max_norm(
    terms: &[Term],
    variables: &Variables,
    values: &HashMap<String, na::DVector<f64>>,
    loss: &LossFunction,
) -> Result<f64, AdjustmentError> {
    let partials: Vec<(Vec<na::DVector<f64>>, na::DVector<f64>)> = terms
        .par_iter()
        .map(|t| {
            let params = t.params(values)?;
            let (r, jacobian) = t.factor.residual_with_jacobian(&params);
            let g = jacobian.transpose() * r * loss.weight(r.norm_squared());
            Ok((params, g))
        })
        .collect::<Result<_, AdjustmentError>>()?;

    let mut gradient: HashMap<&str, na::DVector<f64>> = HashMap::new();
    for (term, (params, g)) in terms.iter().zip(&partials) {
        let mut offset = 0;
        for (key, p) in term.keys.iter().zip(params) {
            let block = gradient
                .entry(key.as_str())
                .or_insert_with(|| na::DVector::zeros(p.len()));
            *block += g.rows(offset, p.len());
            offset += p.len();
        }
    }
    for (key, fixed) in &variables.fixed {
        if let Some(block) = gradient.get_mut(key.as_str()) {
            for i in fixed {
                block[*i] = 0.0;
            }
        }
    }
    Ok(gradient.values().fold(0.0, |m, g| m.max(g.amax())))
}

fn rmse(sq_sum: f64, n: usize) -> f64 {
    if n == 0 { 0.0 } else { (sq_sum / n as f64).sqrt() }
}

fn write_back(scene: &mut Scene, values: &HashMap<String, na::DVector<f64>>) {
    for (id, cam) in scene.intrinsics.iter_mut() {
        if let Some(p) = values.get(&intrinsic_key(*id)) {
            cam.set_params(p);
        }
    }
    for (id, pose) in scene.poses.iter_mut() {
        if let Some(p) = values.get(&pose_key(*id)) {
            *pose = Pose::from_params(p);
        }
    }
    for (id, landmark) in scene.structure.iter_mut() {
        if let Some(p) = values.get(&landmark_key(*id)) {
            landmark.x = na::Vector3::new(p[0], p[1], p[2]);
        }
    }
}

pub struct BundleAdjuster {
    pub options: AdjustmentOptions,
}

impl BundleAdjuster {
    pub fn new(options: AdjustmentOptions) -> BundleAdjuster {
        BundleAdjuster { options }
    }

    /// Refines the free parameters of `scene` in place.
    ///
    /// The scene is left untouched on error.
    pub fn adjust(&self, scene: &mut Scene) -> Result<AdjustmentSummary, AdjustmentError> {
        let options = &self.options;
        if let LossFunction::Huber { delta } = options.loss {
            if !options.loss.is_valid() {
                return Err(AdjustmentError::InvalidLoss { delta });
            }
        }
        let (variables, terms) = build_problem(scene, options)?;
        let (initial_cost, sq) = evaluate(&terms, &variables.values, &options.loss)?;
        if !initial_cost.is_finite() {
            return Err(AdjustmentError::NonFiniteCost { cost: initial_cost });
        }
        let initial_rmse = rmse(sq, terms.len());
        let mut summary = AdjustmentSummary {
            initial_cost,
            final_cost: initial_cost,
            initial_rmse,
            final_rmse: initial_rmse,
            termination: Termination::NothingToAdjust,
            num_observations: terms.len(),
            num_parameters: variables.num_free(),
            gradient_max_norm: 0.0,
        };
        if summary.num_parameters == 0 || terms.is_empty() {
            return Ok(summary);
        }
        log::debug!(
            "bundle adjustment: {} landmarks, {} observations, {} free parameters",
            scene.structure.len(),
            terms.len(),
            summary.num_parameters
        );

        let mut problem = tiny_solver::Problem::new();
        for term in &terms {
            let keys: Vec<&str> = term.keys.iter().map(String::as_str).collect();
            problem.add_residual_block(
                2,
                &keys,
                Box::new(term.factor.clone()),
                match options.loss {
                    LossFunction::Trivial => None,
                    LossFunction::Huber { delta } => Some(Box::new(tiny_solver::loss_functions::HuberLoss::new(delta))),
                },
            );
        }
        for (key, fixed) in &variables.fixed {
            for i in fixed {
                problem.fix_variable(key, *i);
            }
        }

        let optimizer = tiny_solver::LevenbergMarquardtOptimizer::default();
        let result = optimizer
            .optimize(&problem, &variables.values, Some(options.to_solver_options()))
            .ok_or(AdjustmentError::SolverFailed)?;
        let refined = variables
            .values
            .keys()
            .map(|k| {
                result
                    .get(k)
                    .map(|v| (k.clone(), v.clone()))
                    .ok_or_else(|| AdjustmentError::MissingVariable(k.clone()))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        let (final_cost, sq) = evaluate(&terms, &refined, &options.loss)?;
        if !final_cost.is_finite() {
            return Err(AdjustmentError::NonFiniteCost { cost: final_cost });
        }
        if final_cost > initial_cost * (1.0 + DIVERGENCE_SLACK) + f64::EPSILON {
            return Err(AdjustmentError::Diverged {
                initial_cost,
                final_cost,
            });
        }

        let moved = refined != variables.values;
        let gradient = gradient_max_norm(&terms, &variables, &refined, &options.loss)?;
        let termination = Termination::after_solve(moved, gradient, options.gradient_tolerance);
        if moved {
            write_back(scene, &refined);
            summary.final_cost = final_cost;
            summary.final_rmse = rmse(sq, terms.len());
        } else if termination == Termination::NoImprovement {
            log::warn!("bundle adjustment accepted no step, gradient max-norm {gradient:.3e}");
        }
        summary.termination = termination;
        summary.gradient_max_norm = gradient;
        log::debug!("bundle adjustment stopped: {termination:?}");
        Ok(summary)
    }
}
