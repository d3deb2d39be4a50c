pub mod ac_ransac;
pub mod relative_pose;

pub use ac_ransac::{AcRansacKernel, AcRansacOptions, AcRansacOutput, ac_ransac};
pub use relative_pose::{EssentialKernel, EssentialModel, RelativePoseInfo, robust_relative_pose};
