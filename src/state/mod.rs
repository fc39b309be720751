//! Render state read by the shader core.
//!
//! - [`GpuState`]: decoded GE registers
//! - [`DerivedState`]: viewport / texture / render-target values computed by
//!   the draw pipeline
//! - [`VertexFormat`] / [`PrimitiveKind`]: per-draw vertex description
//! - [`FrameContext`]: frame-scoped VR and classification state
//! - [`HeadTracking`]: head-mounted display seam

pub mod derived;
pub mod frame;
pub mod gpu_state;
pub mod tracking;
pub mod vertex_format;

pub use derived::{DerivedState, UvScaleOffset};
pub use frame::{AnomalyClass, FovSample, FrameContext, ViewportType};
pub use gpu_state::{
    BlendEquation, BlendFactor, CompareFunc, GpuState, LightComputation, LightKind, LightState,
    StencilToAlpha, TexFunction, UvGenMode, UvProjMode, float24, to_float24,
};
pub use tracking::{Eye, EyeFov, HeadPose, HeadTracking, StaticHeadset};
pub use vertex_format::{PrimitiveKind, VertexFormat, can_use_hardware_transform};
