pub mod generic;
pub mod pinhole;
pub mod radial_k3;

pub use generic::{CameraModel, GenericModel};
pub use pinhole::Pinhole;
pub use radial_k3::PinholeRadialK3;
