//! Graphics device abstraction.
//!
//! - [`device`]: the [`GraphicsDevice`] trait and typed handles
//! - [`diagnostics`]: failure reporting / on-screen notices
//! - [`recording`]: a headless device that records every call

pub mod device;
pub mod diagnostics;
pub mod recording;

pub use device::{
    DeviceFeatures, GraphicsDevice, LinkRequest, ProgramHandle, ShaderHandle, StageKind,
    UniformLocation,
};
pub use diagnostics::{CollectingDiagnostics, DiagnosticsSink, LogDiagnostics};
pub use recording::{DeviceCounters, RecordingDevice, UniformUpload, UniformValue};
