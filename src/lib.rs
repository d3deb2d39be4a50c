pub mod camera_model;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod io;
pub mod matching;
pub mod multiview;
pub mod optimization;
pub mod pipeline;
pub mod robust;
pub mod scene;
pub mod synthetic;
pub mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{PipelineOutput, TwoViewPipeline};
