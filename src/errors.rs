//! Error Types
//!
//! This module defines the error types used throughout the shader core.
//!
//! # Overview
//!
//! The main error type [`ShaderError`] covers the failure modes a draw can hit
//! while its program is being assembled:
//! - Stage source generation and compilation failures
//! - Program link failures
//! - Configuration parsing errors
//!
//! Numeric anomalies (degenerate projections, NaN fog terms) are *not* errors:
//! they are corrected where they occur and only logged.
//!
//! # Usage
//!
//! Shader manager entry points return [`Result<T>`]; an `Err` tells the draw
//! dispatcher to skip the current draw.
//!
//! ```rust,ignore
//! use ge_shaders::errors::Result;
//!
//! fn draw(manager: &mut ShaderManager<MyDevice>) -> Result<()> {
//!     let vs = manager.apply_vertex_shader(&mut ctx, prim, fmt)?;
//!     // ...
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::gpu::StageKind;

/// The main error type for the shader core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShaderError {
    // ========================================================================
    // Stage Errors
    // ========================================================================
    /// The device rejected a stage's source.
    #[error("{kind} shader compilation failed: {info_log}")]
    StageCompile {
        /// Which stage failed
        kind: StageKind,
        /// Compiler output reported by the device
        info_log: String,
    },

    /// The source generator could not produce code for the requested identity.
    #[error("{0} shader source generation failed")]
    SourceGeneration(StageKind),

    /// A stage that previously failed to compile was handed back in.
    #[error("{0} shader stage is in a failed state")]
    FailedStage(StageKind),

    // ========================================================================
    // Program Errors
    // ========================================================================
    /// The device could not link the stage triple.
    #[error("shader program link failed: {info_log}")]
    ProgramLink {
        /// Linker output reported by the device
        info_log: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings could not be parsed.
    #[error("settings parse error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ShaderError {
    fn from(err: serde_json::Error) -> Self {
        ShaderError::Config(err.to_string())
    }
}

/// Alias for `Result<T, ShaderError>`.
pub type Result<T> = std::result::Result<T, ShaderError>;
