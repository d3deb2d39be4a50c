pub mod essential;
pub mod five_point;
pub mod triangulation;

pub use essential::{
    count_in_front, epipolar_distance_sq, essential_from_motion, motions_from_essential,
    select_motion, skew,
};
pub use five_point::essential_five_point;
pub use triangulation::{triangulate_dlt, triangulate_pixels};
