//! Compiled shader stages.

use xxhash_rust::xxh3::xxh3_64;

use crate::errors::{Result, ShaderError};
use crate::gpu::{GraphicsDevice, ShaderHandle, StageKind};

/// One compiled stage, cached by identity.
///
/// A stage that failed to compile is kept as a sentinel (`handle == None`) so
/// the same identity is not recompiled on every draw.
#[derive(Debug, Clone)]
pub struct CompiledShaderStage {
    kind: StageKind,
    handle: Option<ShaderHandle>,
    source: String,
    source_hash: u64,
    use_hw_transform: bool,
}

impl CompiledShaderStage {
    /// Compiles `source` through the device.
    ///
    /// On failure the error carries the info log; use [`failed`](Self::failed)
    /// to build the cache sentinel.
    pub fn compile<D: GraphicsDevice>(
        device: &mut D,
        kind: StageKind,
        source: String,
        use_hw_transform: bool,
    ) -> Result<Self> {
        let handle = device
            .compile_stage(kind, &source)
            .map_err(|info_log| ShaderError::StageCompile { kind, info_log })?;
        let source_hash = xxh3_64(source.as_bytes());
        log::trace!("compiled {kind} stage {source_hash:016x}");
        Ok(Self {
            kind,
            handle: Some(handle),
            source,
            source_hash,
            use_hw_transform,
        })
    }

    /// Failed-stage sentinel that keeps the rejected source for diagnostics.
    #[must_use]
    pub fn failed(kind: StageKind, source: String, use_hw_transform: bool) -> Self {
        let source_hash = xxh3_64(source.as_bytes());
        Self {
            kind,
            handle: None,
            source,
            source_hash,
            use_hw_transform,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.handle.is_none()
    }

    /// Device handle, or [`ShaderError::FailedStage`] for a sentinel.
    pub fn handle(&self) -> Result<ShaderHandle> {
        self.handle.ok_or(ShaderError::FailedStage(self.kind))
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> u64 {
        self.source_hash
    }

    /// `false` when this stage is a software-transform fallback.
    #[inline]
    #[must_use]
    pub fn use_hw_transform(&self) -> bool {
        self.use_hw_transform
    }

    #[must_use]
    pub fn describe(&self) -> String {
        let state = if self.is_failed() { "failed" } else { "ok" };
        format!("{} {:016x} ({state})", self.kind, self.source_hash)
    }

    pub(crate) fn delete<D: GraphicsDevice>(&mut self, device: &mut D) {
        if let Some(handle) = self.handle.take() {
            device.delete_shader(handle);
        }
    }
}
