use serde::{Deserialize, Serialize};

use crate::matching::MatcherOptions;
use crate::optimization::AdjustmentOptions;
use crate::robust::AcRansacOptions;
use crate::scene::{CheiralityPolicy, IntrinsicMode};

/// Settings of every pipeline stage. Missing JSON fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub matcher: MatcherOptions,
    pub ransac: AcRansacOptions,
    pub intrinsic_mode: IntrinsicMode,
    pub cheirality: CheiralityPolicy,
    pub adjustment: AdjustmentOptions,
}
