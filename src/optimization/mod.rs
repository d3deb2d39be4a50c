pub mod bundle_adjustment;
pub mod factors;
pub mod options;

pub use bundle_adjustment::{AdjustmentSummary, BundleAdjuster, Termination};
pub use factors::{ParamBlock, ReprojectionFactor};
pub use options::*;
