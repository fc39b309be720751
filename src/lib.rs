#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

//! GE shader core.
//!
//! Selects, compiles, links and caches the GPU programs that emulate the PSP
//! graphics engine, keeps their uniforms in sync with GE register state, and
//! computes mono or per-eye stereo projections for VR.
//!
//! | Module         | Contents                                               |
//! |----------------|--------------------------------------------------------|
//! | [`gpu`]        | Graphics device seam, recording device, diagnostics    |
//! | [`state`]      | GE registers, derived draw state, frame context        |
//! | [`shader`]     | Identities, stage / program caches, uniform refresh    |
//! | [`projection`] | Matrix helpers, layer classification, stereo solver    |
//! | [`settings`]   | Render and VR settings                                 |

pub mod errors;
pub mod gpu;
pub mod projection;
pub mod settings;
pub mod shader;
pub mod state;

pub use errors::{Result, ShaderError};
pub use gpu::{
    CollectingDiagnostics, DiagnosticsSink, GraphicsDevice, LogDiagnostics, RecordingDevice,
    StageKind,
};
pub use projection::{ProjectionOutput, ProjectionSolver};
pub use settings::{RenderSettings, RenderingMode, VrSettings};
pub use shader::{
    DirtyUniforms, DrawContext, ProgramId, ShaderManager, ShaderSourceGenerator, VertexStage,
};
pub use state::{
    DerivedState, FrameContext, GpuState, HeadTracking, PrimitiveKind, StaticHeadset,
    VertexFormat,
};
