//! Projection math.
//!
//! - [`matrix`]: flips, viewport correction and frustum decomposition
//! - [`stabilization`]: camera orientation stabilization (keyhole yaw)
//! - [`layer`]: layer classes and HUD plane placement
//! - [`solver`]: the mono and stereo projection paths

pub mod layer;
pub mod matrix;
pub mod solver;
pub mod stabilization;

pub use layer::{HudPlane, LayerClass, PlaneInputs};
pub use matrix::{
    ProjectionParams, expand_4x3, flip_axis, is_perspective, safe_div, translate_and_scale,
    viewport_scale,
};
pub use solver::{ProjectionOutput, ProjectionSolver, eye_projection};
pub use stabilization::CameraStabilization;
