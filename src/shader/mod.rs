//! Shader stage / program cache and uniform refresh.
//!
//! - [`id`]: packed stage identities
//! - [`generator`]: the source generation seam
//! - [`stage`]: compiled stages (and failure sentinels)
//! - [`dirty`]: uniform groups and the dirty ledger
//! - [`uniforms`]: uniform slots and attribute bindings
//! - [`program`]: linked programs and uniform upload
//! - [`manager`]: the per-draw entry points

pub mod dirty;
pub mod generator;
pub mod id;
pub mod manager;
pub mod program;
pub mod stage;
pub mod uniforms;

pub use dirty::{DirtyLedger, DirtyUniforms};
pub use generator::ShaderSourceGenerator;
pub use id::{FragmentShaderId, GeometryShaderId, ProgramKey, VertexShaderId};
pub use manager::{
    DebugString, DrawContext, GEOMETRY_FALLBACK_NOTICE, GeometryStage,
    HW_TRANSFORM_FALLBACK_NOTICE, ProgramId, ShaderCacheStats, ShaderManager, VertexStage,
};
pub use program::{LinkedProgram, sanitize_fog};
pub use stage::CompiledShaderStage;
pub use uniforms::{ATTRIBUTE_BINDINGS, AttributeMask, LightSlots, UniformSlots, color3, color4};
