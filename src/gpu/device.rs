//! Graphics device seam.
//!
//! The shader core never talks to a graphics API directly. Everything it needs
//! from GL (or an equivalent binding layer) goes through [`GraphicsDevice`]:
//! compile, link, location lookup, typed uniform setters and vertex attribute
//! toggles. Handles are thin `Copy` newtypes so stage and program handles
//! cannot be mixed up.

use std::fmt;

use bitflags::bitflags;
use glam::{Mat4, Vec2, Vec3, Vec4};

// ─── Handles ──────────────────────────────────────────────────────────────────

/// Device handle of a compiled stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

/// Device handle of a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// Resolved uniform slot inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

// ─── Stage kinds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vertex,
    Geometry,
    Fragment,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        })
    }
}

bitflags! {
    /// Optional device capabilities that change how programs are linked or
    /// how uniforms are encoded.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFeatures: u32 {
        /// Fragment outputs can be bound for dual-source blending.
        const DUAL_SOURCE_BLEND     = 1 << 0;
        /// Alpha/color test references must be uploaded normalized to 0..1
        /// (some mobile drivers lose precision on 0..255 floats).
        const NORMALIZED_ALPHA_REF  = 1 << 1;
    }
}

/// Everything the device needs to link one program.
#[derive(Debug, Clone)]
pub struct LinkRequest<'a> {
    pub stages: &'a [ShaderHandle],
    /// `(index, name)` pairs bound before linking so every program shares the
    /// same attribute layout.
    pub attribute_bindings: &'a [(u32, &'static str)],
    /// Bind `fragColor0` / `fragColor1` as dual-source outputs.
    pub dual_source_blend: bool,
}

// ─── GraphicsDevice ───────────────────────────────────────────────────────────

/// The opaque graphics capability consumed by the shader core.
///
/// Compile and link failures are reported as `Err(info_log)`; the caller
/// decides whether they are recoverable. Uniform setters with a location that
/// does not belong to the currently bound program are a caller bug.
pub trait GraphicsDevice {
    fn features(&self) -> DeviceFeatures {
        DeviceFeatures::empty()
    }

    fn compile_stage(&mut self, kind: StageKind, source: &str) -> Result<ShaderHandle, String>;
    fn link_program(&mut self, request: &LinkRequest<'_>) -> Result<ProgramHandle, String>;

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn use_program(&mut self, program: ProgramHandle);

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32);
    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32);
    fn set_uniform_vec2(&mut self, location: UniformLocation, value: Vec2);
    fn set_uniform_vec3(&mut self, location: UniformLocation, value: Vec3);
    fn set_uniform_vec4(&mut self, location: UniformLocation, value: Vec4);
    fn set_uniform_ivec4(&mut self, location: UniformLocation, value: [i32; 4]);
    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4);
    /// Uploads consecutive matrices starting at `location`.
    fn set_uniform_mat4_array(&mut self, location: UniformLocation, values: &[Mat4]);

    fn enable_vertex_attribute(&mut self, index: u32);
    fn disable_vertex_attribute(&mut self, index: u32);

    fn delete_program(&mut self, program: ProgramHandle);
    fn delete_shader(&mut self, shader: ShaderHandle);
}
