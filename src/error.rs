use std::path::PathBuf;

use thiserror::Error;

use crate::scene::IndexT;

/// Inconsistent feature store content.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("descriptor length mismatch: expected {expected}, got {got}")]
    DescriptorLength { expected: usize, got: usize },
    #[error("{keypoints} keypoints but {descriptors} descriptors")]
    CountMismatch { keypoints: usize, descriptors: usize },
}

/// Failures while reading the pipeline inputs.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed calibration file {path}: {reason}")]
    MalformedCalibration { path: PathBuf, reason: String },
    #[error("invalid feature file {path}: {source}")]
    Features {
        path: PathBuf,
        #[source]
        source: FeatureError,
    },
}

#[derive(Debug, Error)]
pub enum EstimationError {
    #[error("{found} correspondences, at least {required} required")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("no meaningful essential matrix found")]
    NoModel,
    #[error("{found} inliers, at least {required} required")]
    InsufficientInliers { found: usize, required: usize },
    #[error("no motion hypothesis places the inliers in front of both cameras")]
    NoValidMotion,
}

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("view {0} has no camera")]
    MissingView(IndexT),
    #[error("inlier {index} does not reference a valid keypoint")]
    InvalidCorrespondence { index: usize },
    #[error("no landmark survived triangulation ({inliers} inliers)")]
    EmptyStructure { inliers: usize },
}

#[derive(Debug, Error)]
pub enum AdjustmentError {
    #[error("cost is not finite ({cost})")]
    NonFiniteCost { cost: f64 },
    #[error("Huber width must be positive, got {delta}")]
    InvalidLoss { delta: f64 },
    #[error("the solver failed to solve the damped normal equations")]
    SolverFailed,
    #[error("solver result has no value for {0}")]
    MissingVariable(String),
    #[error("cost increased from {initial_cost:e} to {final_cost:e}")]
    Diverged { initial_cost: f64, final_cost: f64 },
    #[error("landmark {landmark} observes unknown view {view}")]
    UnknownView { landmark: IndexT, view: IndexT },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("view {0} is missing from the scene")]
    MissingView(IndexT),
    #[error("pose {0} is missing from the scene")]
    MissingPose(IndexT),
    #[error("landmark {landmark} has no observation in view {view}")]
    MissingObservation { landmark: IndexT, view: IndexT },
    #[error("feature {0} is out of range")]
    MissingFeature(usize),
}

/// Every way the two-view pipeline can stop.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("matching failed: {0}")]
    Matching(#[from] FeatureError),
    #[error("pose estimation failed: {0}")]
    Estimation(#[from] EstimationError),
    #[error("scene initialization failed: {0}")]
    Scene(#[from] SceneError),
    #[error("bundle adjustment failed: {0}")]
    Adjustment(#[from] AdjustmentError),
    #[error("export failed: {0}")]
    Export(#[from] ExportError),
    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// Process exit status for this failure class.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Input(_) => 2,
            PipelineError::Matching(_) => 3,
            PipelineError::Estimation(_) => 4,
            PipelineError::Scene(_) => 5,
            PipelineError::Adjustment(_) => 6,
            PipelineError::Export(_) | PipelineError::Output { .. } => 7,
        }
    }
}
