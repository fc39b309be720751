//! Decoded GE register state.
//!
//! [`GpuState`] mirrors the subset of the emulated GPU's registers the shader
//! core reads: render modes, texture / fog / lighting / blend configuration,
//! and the transform matrices. It is mutated by command decoding between draws
//! and treated as read-only while a draw is being prepared.
//!
//! Colors are packed `0x00BBGGRR` words as the hardware stores them. Several
//! scalars (fog coefficients, light vectors, specular power) are kept in the
//! GE's 24-bit float encoding; decode them with [`float24`].

use glam::Mat4;

/// Decodes a GE 24-bit float (the top 24 bits of an IEEE-754 single).
#[inline]
#[must_use]
pub fn float24(bits: u32) -> f32 {
    f32::from_bits(bits << 8)
}

/// Encodes `value` as a GE 24-bit float, dropping the low mantissa byte.
#[inline]
#[must_use]
pub fn to_float24(value: f32) -> u32 {
    value.to_bits() >> 8
}

/// Identity in the GE's 4x3 column layout.
pub const IDENTITY_4X3: [f32; 12] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];

// ─── Register enums ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TexFunction {
    #[default]
    Modulate = 0,
    Decal = 1,
    Blend = 2,
    Replace = 3,
    Add = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompareFunc {
    Never = 0,
    #[default]
    Always = 1,
    Equal = 2,
    NotEqual = 3,
    Less = 4,
    LessEqual = 5,
    Greater = 6,
    GreaterEqual = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlendEquation {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
    AbsDiff = 5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlendFactor {
    SrcColor = 0,
    InvSrcColor = 1,
    #[default]
    SrcAlpha = 2,
    InvSrcAlpha = 3,
    DstAlpha = 4,
    InvDstAlpha = 5,
    DoubleSrcAlpha = 6,
    DoubleInvSrcAlpha = 7,
    DoubleDstAlpha = 8,
    DoubleInvDstAlpha = 9,
    /// Use the fixed color register (`fix_a` / `fix_b`).
    Fix = 10,
}

/// How texture coordinates are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum UvGenMode {
    #[default]
    TextureCoords = 0,
    TextureMatrix = 1,
    EnvironmentMap = 2,
    /// Seen in the wild; behaves like `TextureCoords`.
    Unknown = 3,
}

/// Source of the texture-matrix projection input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum UvProjMode {
    #[default]
    Position = 0,
    Uv = 1,
    NormalizedNormal = 2,
    Normal = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LightKind {
    #[default]
    Directional = 0,
    Point = 1,
    Spot = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LightComputation {
    #[default]
    Diffuse = 0,
    DiffuseSpecular = 1,
    PoweredDiffuse = 2,
}

/// What the stencil operation writes into destination alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StencilToAlpha {
    #[default]
    Off = 0,
    Zero = 1,
    /// Write the stencil reference (`u_stencilReplaceValue`).
    Replace = 2,
    Keep = 3,
}

// ─── Lights ───────────────────────────────────────────────────────────────────

/// One of the four hardware lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    pub enabled: bool,
    pub kind: LightKind,
    pub computation: LightComputation,
    /// Position (or direction for directional lights), float24 triple.
    pub position: [u32; 3],
    /// Spot direction, float24 triple.
    pub direction: [u32; 3],
    /// Constant / linear / quadratic attenuation, float24 triple.
    pub attenuation: [u32; 3],
    /// Spot cutoff, float24.
    pub cutoff: u32,
    /// Spot exponent, float24.
    pub convergence: u32,
    pub ambient: u32,
    pub diffuse: u32,
    pub specular: u32,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: LightKind::Directional,
            computation: LightComputation::Diffuse,
            position: [0; 3],
            direction: [0; 3],
            attenuation: [to_float24(1.0), 0, 0],
            cutoff: 0,
            convergence: 0,
            ambient: 0,
            diffuse: 0x00FF_FFFF,
            specular: 0,
        }
    }
}

// ─── GpuState ─────────────────────────────────────────────────────────────────

/// Decoded GE register block read by identity computation and uniform refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct GpuState {
    // === Modes ===
    /// Vertices are pre-transformed screen coordinates.
    pub through_mode: bool,
    pub clear_mode: bool,
    pub flat_shading: bool,
    /// Normals are negated before lighting.
    pub reverse_normals: bool,

    // === Texturing ===
    pub texture_enabled: bool,
    pub tex_function: TexFunction,
    /// Texture function uses texture alpha (RGBA vs RGB).
    pub tex_alpha: bool,
    pub color_doubling: bool,
    pub tex_clamp_s: bool,
    pub tex_clamp_t: bool,
    pub uv_gen_mode: UvGenMode,
    pub uv_proj_mode: UvProjMode,
    /// Environment-map light sources for U and V.
    pub uv_light_sources: [u8; 2],
    /// Level 0 size in texels.
    pub texture_width: u32,
    pub texture_height: u32,
    pub texenv_color: u32,

    // === Fog ===
    pub fog_enabled: bool,
    pub fog_color: u32,
    /// Fog end, float24.
    pub fog1: u32,
    /// Fog 1 / (end - start), float24.
    pub fog2: u32,

    // === Per-fragment tests ===
    pub alpha_test_enabled: bool,
    pub alpha_test_func: CompareFunc,
    pub alpha_test_ref: u8,
    pub alpha_test_mask: u8,
    pub color_test_enabled: bool,
    pub color_test_func: CompareFunc,
    pub color_test_ref: u32,
    pub color_test_mask: u32,
    pub stencil_test_ref: u8,
    pub stencil_to_alpha: StencilToAlpha,

    // === Blending ===
    pub blend_enabled: bool,
    pub blend_equation: BlendEquation,
    pub blend_src: BlendFactor,
    pub blend_dst: BlendFactor,
    pub blend_fix_a: u32,
    pub blend_fix_b: u32,

    // === Lighting ===
    pub lighting_enabled: bool,
    pub lights: [LightState; 4],
    /// Separate specular color (lighting mode 1).
    pub separate_specular: bool,
    pub ambient_color: u32,
    pub ambient_alpha: u8,
    pub material_ambient: u32,
    pub material_ambient_alpha: u8,
    pub material_diffuse: u32,
    pub material_specular: u32,
    pub material_emissive: u32,
    /// Specular power, float24.
    pub material_specular_coef: u32,
    /// Bit 0 ambient, bit 1 diffuse, bit 2 specular take the vertex color.
    pub material_update: u8,

    // === Transform ===
    pub world_matrix: [f32; 12],
    pub view_matrix: [f32; 12],
    pub tgen_matrix: [f32; 12],
    pub bone_matrices: [[f32; 12]; 8],
    pub proj_matrix: Mat4,
    pub viewport_z_scale: f32,
    pub viewport_z_center: f32,
}

impl Default for GpuState {
    fn default() -> Self {
        Self {
            through_mode: false,
            clear_mode: false,
            flat_shading: false,
            reverse_normals: false,
            texture_enabled: false,
            tex_function: TexFunction::Modulate,
            tex_alpha: false,
            color_doubling: false,
            tex_clamp_s: false,
            tex_clamp_t: false,
            uv_gen_mode: UvGenMode::TextureCoords,
            uv_proj_mode: UvProjMode::Position,
            uv_light_sources: [0, 0],
            texture_width: 256,
            texture_height: 256,
            texenv_color: 0,
            fog_enabled: false,
            fog_color: 0,
            fog1: 0,
            fog2: 0,
            alpha_test_enabled: false,
            alpha_test_func: CompareFunc::Always,
            alpha_test_ref: 0,
            alpha_test_mask: 0xFF,
            color_test_enabled: false,
            color_test_func: CompareFunc::Always,
            color_test_ref: 0,
            color_test_mask: 0x00FF_FFFF,
            stencil_test_ref: 0,
            stencil_to_alpha: StencilToAlpha::Off,
            blend_enabled: false,
            blend_equation: BlendEquation::Add,
            blend_src: BlendFactor::SrcAlpha,
            blend_dst: BlendFactor::InvSrcAlpha,
            blend_fix_a: 0,
            blend_fix_b: 0,
            lighting_enabled: false,
            lights: [LightState::default(); 4],
            separate_specular: false,
            ambient_color: 0,
            ambient_alpha: 0,
            material_ambient: 0,
            material_ambient_alpha: 0xFF,
            material_diffuse: 0x00FF_FFFF,
            material_specular: 0,
            material_emissive: 0,
            material_specular_coef: to_float24(1.0),
            material_update: 0,
            world_matrix: IDENTITY_4X3,
            view_matrix: IDENTITY_4X3,
            tgen_matrix: IDENTITY_4X3,
            bone_matrices: [IDENTITY_4X3; 8],
            proj_matrix: Mat4::IDENTITY,
            viewport_z_scale: 32767.5,
            viewport_z_center: 32767.5,
        }
    }
}

impl GpuState {
    /// Blending needs two distinct constant colors, which the fixed blend
    /// unit cannot express; the fragment stage blends with `u_blendFixA/B`.
    #[must_use]
    pub fn needs_shader_blend(&self) -> bool {
        self.blend_enabled
            && self.blend_src == BlendFactor::Fix
            && self.blend_dst == BlendFactor::Fix
            && (self.blend_fix_a & 0x00FF_FFFF) != (self.blend_fix_b & 0x00FF_FFFF)
    }

    #[inline]
    #[must_use]
    pub fn is_directional_light(&self, index: usize) -> bool {
        self.lights[index].kind == LightKind::Directional
    }

    /// Camera position encoded in the view matrix translation (negated).
    #[must_use]
    pub fn camera_position(&self) -> [f32; 3] {
        [
            -self.view_matrix[9],
            -self.view_matrix[10],
            -self.view_matrix[11],
        ]
    }

    /// Alpha test reference as seen by the test (masked).
    #[inline]
    #[must_use]
    pub fn masked_alpha_ref(&self) -> u8 {
        self.alpha_test_ref & self.alpha_test_mask
    }
}
