//! Shader identities.
//!
//! A shader identity canonically encodes the subset of GPU state that
//! changes one stage's generated source. Equality of identities is what the
//! stage caches key on, so two rules hold for every bit group:
//!
//! - identical relevant state always produces the same bits;
//! - a group is only written when the state that enables it is on, so
//!   irrelevant registers never split the cache.
//!
//! # Vertex layout (`u64`)
//!
//! | Bits   | Field                                          | Written when            |
//! |--------|------------------------------------------------|-------------------------|
//! | 0      | through mode                                   | always                  |
//! | 1      | fog                                            | not through             |
//! | 2      | vertex color                                   | always                  |
//! | 3      | texturing                                      | always                  |
//! | 4      | flat shading                                   | always                  |
//! | 5      | hardware transform                             | always                  |
//! | 6-7    | normal, reverse normal                         | hw transform            |
//! | 8      | texcoord present                               | hw transform            |
//! | 9-10   | uv generation mode                             | hw + texturing          |
//! | 11-12  | uv projection mode                             | texture matrix mode     |
//! | 13-16  | environment-map light sources                  | environment map mode    |
//! | 17-20  | skinning + bone count                          | hw + weights            |
//! | 21     | lighting                                       | hw transform            |
//! | 22-41  | per light: enable, type, computation           | lighting                |
//! | 42-44  | material update                                | lighting                |
//! | 45-48  | texcoord / weight formats                      | hw transform            |
//!
//! # Fragment layout (`u64`)
//!
//! Clear draws short-circuit to bit 0 alone.

use std::fmt;

use crate::state::{
    BlendEquation, CompareFunc, DerivedState, GpuState, PrimitiveKind, UvGenMode, VertexFormat,
};

// ─── Bit packing ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct IdBits(u64);

impl IdBits {
    #[inline]
    fn set_bit(&mut self, bit: u32, on: bool) {
        if on {
            self.0 |= 1 << bit;
        }
    }

    #[inline]
    fn set_bits(&mut self, shift: u32, width: u32, value: u64) {
        let mask = (1u64 << width) - 1;
        self.0 |= (value & mask) << shift;
    }
}

// ─── Vertex ───────────────────────────────────────────────────────────────────

/// Identity of a vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexShaderId(pub u64);

impl VertexShaderId {
    pub const THROUGH: u32 = 0;
    pub const FOG: u32 = 1;
    pub const HAS_COLOR: u32 = 2;
    pub const DO_TEXTURE: u32 = 3;
    pub const FLAT_SHADE: u32 = 4;
    pub const USE_HW_TRANSFORM: u32 = 5;
    pub const HAS_NORMAL: u32 = 6;
    pub const REVERSE_NORMAL: u32 = 7;
    pub const HAS_TEXCOORD: u32 = 8;
    pub const UV_GEN_MODE: u32 = 9;
    pub const UV_PROJ_MODE: u32 = 11;
    pub const UV_LIGHT_SOURCE_0: u32 = 13;
    pub const UV_LIGHT_SOURCE_1: u32 = 15;
    pub const ENABLE_BONES: u32 = 17;
    pub const BONE_COUNT: u32 = 18;
    pub const LIGHTING: u32 = 21;
    pub const LIGHTS: u32 = 22;
    pub const MATERIAL_UPDATE: u32 = 42;
    pub const TEXCOORD_FORMAT: u32 = 45;
    pub const WEIGHT_FORMAT: u32 = 47;

    #[must_use]
    pub fn compute(gstate: &GpuState, vertex_format: VertexFormat, use_hw_transform: bool) -> Self {
        let mut id = IdBits::default();
        let through = gstate.through_mode;
        let texturing = gstate.texture_enabled;

        id.set_bit(Self::THROUGH, through);
        id.set_bit(Self::FOG, !through && gstate.fog_enabled);
        id.set_bit(Self::HAS_COLOR, vertex_format.has_color());
        id.set_bit(Self::DO_TEXTURE, texturing);
        id.set_bit(Self::FLAT_SHADE, gstate.flat_shading);
        id.set_bit(Self::USE_HW_TRANSFORM, use_hw_transform);

        if use_hw_transform {
            let has_normal = vertex_format.has_normal();
            id.set_bit(Self::HAS_NORMAL, has_normal);
            id.set_bit(Self::REVERSE_NORMAL, has_normal && gstate.reverse_normals);
            id.set_bit(Self::HAS_TEXCOORD, vertex_format.has_texcoord());

            if texturing {
                id.set_bits(Self::UV_GEN_MODE, 2, gstate.uv_gen_mode as u64);
                match gstate.uv_gen_mode {
                    UvGenMode::TextureMatrix => {
                        id.set_bits(Self::UV_PROJ_MODE, 2, gstate.uv_proj_mode as u64);
                    }
                    UvGenMode::EnvironmentMap => {
                        id.set_bits(Self::UV_LIGHT_SOURCE_0, 2, u64::from(gstate.uv_light_sources[0]));
                        id.set_bits(Self::UV_LIGHT_SOURCE_1, 2, u64::from(gstate.uv_light_sources[1]));
                    }
                    UvGenMode::TextureCoords | UvGenMode::Unknown => {}
                }
            }

            if vertex_format.has_weights() {
                id.set_bit(Self::ENABLE_BONES, true);
                id.set_bits(Self::BONE_COUNT, 3, (vertex_format.bone_weight_count() - 1) as u64);
            }

            id.set_bit(Self::LIGHTING, gstate.lighting_enabled);
            if gstate.lighting_enabled {
                for (i, light) in gstate.lights.iter().enumerate() {
                    let shift = Self::LIGHTS + 5 * i as u32;
                    id.set_bit(shift, light.enabled);
                    if light.enabled {
                        id.set_bits(shift + 1, 2, light.kind as u64);
                        id.set_bits(shift + 3, 2, light.computation as u64);
                    }
                }
                id.set_bits(Self::MATERIAL_UPDATE, 3, u64::from(gstate.material_update));
            }

            if vertex_format.has_texcoord() {
                id.set_bits(Self::TEXCOORD_FORMAT, 2, u64::from(vertex_format.texcoord_format()));
            }
            if vertex_format.has_weights() {
                id.set_bits(Self::WEIGHT_FORMAT, 2, u64::from(vertex_format.weight_format()));
            }
        }

        Self(id.0)
    }

    #[inline]
    #[must_use]
    pub fn bit(self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    #[inline]
    #[must_use]
    pub fn bits(self, shift: u32, width: u32) -> u64 {
        (self.0 >> shift) & ((1 << width) - 1)
    }

    #[inline]
    #[must_use]
    pub fn use_hw_transform(self) -> bool {
        self.bit(Self::USE_HW_TRANSFORM)
    }

    /// Short human-readable summary for diagnostics.
    #[must_use]
    pub fn describe(self) -> String {
        let mut desc = String::new();
        let flags = [
            (Self::THROUGH, "THR"),
            (Self::FOG, "Fog"),
            (Self::HAS_COLOR, "C"),
            (Self::DO_TEXTURE, "T"),
            (Self::FLAT_SHADE, "Flat"),
            (Self::USE_HW_TRANSFORM, "HWX"),
            (Self::HAS_NORMAL, "N"),
            (Self::REVERSE_NORMAL, "RevN"),
            (Self::HAS_TEXCOORD, "UV"),
        ];
        for (bit, name) in flags {
            if self.bit(bit) {
                desc.push_str(name);
                desc.push(' ');
            }
        }
        if self.bit(Self::DO_TEXTURE) && self.use_hw_transform() {
            let gen_mode = ["UV", "Mtx", "Env", "Unk"][self.bits(Self::UV_GEN_MODE, 2) as usize];
            desc.push_str(&format!("Tex:{gen_mode} "));
        }
        if self.bit(Self::ENABLE_BONES) {
            desc.push_str(&format!("Bones:{} ", self.bits(Self::BONE_COUNT, 3) + 1));
        }
        if self.bit(Self::LIGHTING) {
            desc.push_str("Light:");
            for i in 0..4 {
                if self.bit(Self::LIGHTS + 5 * i) {
                    desc.push_str(&i.to_string());
                }
            }
            desc.push(' ');
        }
        desc.trim_end().to_owned()
    }

    /// Parses the [`Display`](fmt::Display) form.
    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        u64::from_str_radix(text, 16).ok().map(Self)
    }
}

impl fmt::Display for VertexShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ─── Geometry ─────────────────────────────────────────────────────────────────

/// Identity of a geometry stage: the primitive topology alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryShaderId(pub u8);

impl GeometryShaderId {
    #[inline]
    #[must_use]
    pub fn compute(primitive: PrimitiveKind) -> Self {
        Self(primitive as u8)
    }

    #[must_use]
    pub fn describe(self) -> String {
        let name = match self.0 {
            0 => "Points",
            1 => "Lines",
            2 => "LineStrip",
            3 => "Triangles",
            4 => "TriangleStrip",
            5 => "TriangleFan",
            6 => "Rectangles",
            _ => "Unknown",
        };
        format!("Prim:{name}")
    }

    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        u8::from_str_radix(text, 16).ok().map(Self)
    }
}

impl fmt::Display for GeometryShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}", self.0)
    }
}

// ─── Fragment ─────────────────────────────────────────────────────────────────

/// Identity of a fragment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentShaderId(pub u64);

impl FragmentShaderId {
    pub const CLEAR: u32 = 0;
    pub const DO_TEXTURE: u32 = 1;
    pub const TEX_FUNCTION: u32 = 2;
    pub const TEX_ALPHA: u32 = 5;
    pub const TEX_DOUBLE: u32 = 6;
    pub const TEX_PROJ: u32 = 7;
    pub const TEX_CLAMP_S: u32 = 8;
    pub const TEX_CLAMP_T: u32 = 9;
    pub const SHADER_TEX_CLAMP: u32 = 10;
    pub const ALPHA_TEST: u32 = 11;
    pub const ALPHA_TEST_FUNC: u32 = 12;
    pub const ALPHA_AGAINST_ZERO: u32 = 15;
    pub const COLOR_TEST: u32 = 16;
    pub const COLOR_TEST_FUNC: u32 = 17;
    pub const COLOR_AGAINST_ZERO: u32 = 19;
    pub const FOG: u32 = 20;
    pub const FLAT_SHADE: u32 = 21;
    pub const STENCIL_TO_ALPHA: u32 = 22;
    pub const SHADER_BLEND: u32 = 24;
    pub const BLEND_EQUATION: u32 = 25;
    pub const BLEND_SRC: u32 = 28;
    pub const BLEND_DST: u32 = 32;
    pub const SEPARATE_SPECULAR: u32 = 36;
    pub const COLOR_DOUBLE: u32 = 37;

    #[must_use]
    pub fn compute(gstate: &GpuState, derived: &DerivedState, vertex_format: VertexFormat) -> Self {
        let mut id = IdBits::default();
        if gstate.clear_mode {
            id.set_bit(Self::CLEAR, true);
            return Self(id.0);
        }

        if gstate.texture_enabled {
            id.set_bit(Self::DO_TEXTURE, true);
            id.set_bits(Self::TEX_FUNCTION, 3, gstate.tex_function as u64);
            id.set_bit(Self::TEX_ALPHA, gstate.tex_alpha);
            id.set_bit(Self::TEX_DOUBLE, gstate.color_doubling);
            id.set_bit(
                Self::TEX_PROJ,
                gstate.uv_gen_mode == UvGenMode::TextureMatrix && !gstate.through_mode,
            );
            if derived.need_shader_tex_clamp {
                id.set_bit(Self::SHADER_TEX_CLAMP, true);
                id.set_bit(Self::TEX_CLAMP_S, gstate.tex_clamp_s);
                id.set_bit(Self::TEX_CLAMP_T, gstate.tex_clamp_t);
            }
        }

        // An ALWAYS test is a no-op and never reaches the shader.
        if gstate.alpha_test_enabled && gstate.alpha_test_func != CompareFunc::Always {
            id.set_bit(Self::ALPHA_TEST, true);
            id.set_bits(Self::ALPHA_TEST_FUNC, 3, gstate.alpha_test_func as u64);
            id.set_bit(Self::ALPHA_AGAINST_ZERO, gstate.masked_alpha_ref() == 0);
        }
        if gstate.color_test_enabled && gstate.color_test_func != CompareFunc::Always {
            id.set_bit(Self::COLOR_TEST, true);
            id.set_bits(Self::COLOR_TEST_FUNC, 2, gstate.color_test_func as u64);
            id.set_bit(
                Self::COLOR_AGAINST_ZERO,
                gstate.color_test_ref & gstate.color_test_mask & 0x00FF_FFFF == 0,
            );
        }

        id.set_bit(Self::FOG, gstate.fog_enabled && !gstate.through_mode);
        id.set_bit(Self::FLAT_SHADE, gstate.flat_shading);
        id.set_bits(Self::STENCIL_TO_ALPHA, 2, gstate.stencil_to_alpha as u64);

        if gstate.needs_shader_blend() {
            id.set_bit(Self::SHADER_BLEND, true);
            id.set_bits(Self::BLEND_EQUATION, 3, gstate.blend_equation as u64);
            id.set_bits(Self::BLEND_SRC, 4, gstate.blend_src as u64);
            id.set_bits(Self::BLEND_DST, 4, gstate.blend_dst as u64);
        }

        let lit = gstate.lighting_enabled && !gstate.through_mode;
        id.set_bit(Self::SEPARATE_SPECULAR, lit && gstate.separate_specular);
        id.set_bit(
            Self::COLOR_DOUBLE,
            gstate.color_doubling && (vertex_format.has_color() || lit),
        );

        Self(id.0)
    }

    #[inline]
    #[must_use]
    pub fn bit(self, bit: u32) -> bool {
        self.0 & (1 << bit) != 0
    }

    #[inline]
    #[must_use]
    pub fn bits(self, shift: u32, width: u32) -> u64 {
        (self.0 >> shift) & ((1 << width) - 1)
    }

    #[must_use]
    pub fn describe(self) -> String {
        if self.bit(Self::CLEAR) {
            return "Clear".to_owned();
        }
        let mut desc = String::new();
        if self.bit(Self::DO_TEXTURE) {
            let func = ["Mod", "Decal", "Blend", "Repl", "Add", "?", "?", "?"]
                [self.bits(Self::TEX_FUNCTION, 3) as usize];
            desc.push_str(&format!("Tex:{func} "));
            if self.bit(Self::TEX_ALPHA) {
                desc.push_str("TexAlpha ");
            }
            if self.bit(Self::TEX_PROJ) {
                desc.push_str("TexProj ");
            }
            if self.bit(Self::SHADER_TEX_CLAMP) {
                desc.push_str("TClamp ");
            }
        }
        if self.bit(Self::ALPHA_TEST) {
            desc.push_str(&format!("AlphaTest{} ", self.bits(Self::ALPHA_TEST_FUNC, 3)));
            if self.bit(Self::ALPHA_AGAINST_ZERO) {
                desc.push_str("Zero ");
            }
        }
        if self.bit(Self::COLOR_TEST) {
            desc.push_str(&format!("ColorTest{} ", self.bits(Self::COLOR_TEST_FUNC, 2)));
        }
        let flags = [
            (Self::FOG, "Fog"),
            (Self::FLAT_SHADE, "Flat"),
            (Self::SHADER_BLEND, "ShaderBlend"),
            (Self::SEPARATE_SPECULAR, "SepSpec"),
            (Self::COLOR_DOUBLE, "Double"),
        ];
        for (bit, name) in flags {
            if self.bit(bit) {
                desc.push_str(name);
                desc.push(' ');
            }
        }
        let stencil = self.bits(Self::STENCIL_TO_ALPHA, 2);
        if stencil != 0 {
            desc.push_str(&format!("Stencil:{stencil}"));
        }
        desc.trim_end().to_owned()
    }

    #[must_use]
    pub fn from_hex(text: &str) -> Option<Self> {
        u64::from_str_radix(text, 16).ok().map(Self)
    }

    /// Whether this identity blends in the shader (`u_blendFixA/B`).
    #[inline]
    #[must_use]
    pub fn shader_blend(self) -> bool {
        self.bit(Self::SHADER_BLEND)
    }

    #[inline]
    #[must_use]
    pub fn blend_equation(self) -> u64 {
        self.bits(Self::BLEND_EQUATION, 3)
    }
}

impl fmt::Display for FragmentShaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Program cache key: the exact stage triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramKey {
    pub vs: VertexShaderId,
    pub gs: Option<GeometryShaderId>,
    pub fs: FragmentShaderId,
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gs {
            Some(gs) => write!(f, "{}:{}:{}", self.vs, gs, self.fs),
            None => write!(f, "{}:--:{}", self.vs, self.fs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LightKind;
    use crate::state::vertex_format::format;

    fn lit_state() -> GpuState {
        let mut state = GpuState {
            lighting_enabled: true,
            ..Default::default()
        };
        state.lights[0].enabled = true;
        state.lights[0].kind = LightKind::Point;
        state
    }

    #[test]
    fn test_vertex_id_is_deterministic() {
        let fmt = VertexFormat::new().with_normal(format::FLOAT).with_color(7);
        let a = VertexShaderId::compute(&lit_state(), fmt, true);
        let b = VertexShaderId::compute(&lit_state(), fmt, true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lighting_bits_ignored_without_lighting() {
        let fmt = VertexFormat::new().with_normal(format::FLOAT);
        let mut a = GpuState::default();
        let mut b = GpuState::default();
        a.lights[2].enabled = true;
        a.lights[2].kind = LightKind::Spot;
        b.material_update = 7;
        assert_eq!(
            VertexShaderId::compute(&a, fmt, true),
            VertexShaderId::compute(&b, fmt, true)
        );
    }

    #[test]
    fn test_fog_ignored_in_through_mode() {
        let fmt = VertexFormat::new();
        let foggy = GpuState {
            through_mode: true,
            fog_enabled: true,
            ..Default::default()
        };
        let clear = GpuState {
            through_mode: true,
            ..Default::default()
        };
        assert_eq!(
            VertexShaderId::compute(&foggy, fmt, false),
            VertexShaderId::compute(&clear, fmt, false)
        );
    }

    #[test]
    fn test_software_transform_drops_hw_groups() {
        let fmt = VertexFormat::new()
            .with_normal(format::FLOAT)
            .with_weights(format::FLOAT, 4);
        let hw = VertexShaderId::compute(&lit_state(), fmt, true);
        let sw = VertexShaderId::compute(&lit_state(), fmt, false);
        assert!(hw.use_hw_transform());
        assert!(!sw.use_hw_transform());
        assert!(!sw.bit(VertexShaderId::LIGHTING));
        assert!(!sw.bit(VertexShaderId::ENABLE_BONES));
        assert_eq!(hw.bits(VertexShaderId::BONE_COUNT, 3), 3);
    }

    #[test]
    fn test_clear_fragment_id_short_circuits() {
        let derived = DerivedState::default();
        let a = GpuState {
            clear_mode: true,
            texture_enabled: true,
            fog_enabled: true,
            ..Default::default()
        };
        let b = GpuState {
            clear_mode: true,
            ..Default::default()
        };
        let fmt = VertexFormat::new();
        let id = FragmentShaderId::compute(&a, &derived, fmt);
        assert_eq!(id, FragmentShaderId::compute(&b, &derived, fmt));
        assert_eq!(id.0, 1);
        assert_eq!(id.describe(), "Clear");
    }

    #[test]
    fn test_alpha_test_bits() {
        let derived = DerivedState::default();
        let fmt = VertexFormat::new();
        let mut state = GpuState {
            alpha_test_enabled: true,
            alpha_test_func: CompareFunc::Always,
            alpha_test_ref: 0x40,
            ..Default::default()
        };
        assert!(!FragmentShaderId::compute(&state, &derived, fmt).bit(FragmentShaderId::ALPHA_TEST));

        state.alpha_test_func = CompareFunc::Greater;
        let id = FragmentShaderId::compute(&state, &derived, fmt);
        assert!(id.bit(FragmentShaderId::ALPHA_TEST));
        assert!(!id.bit(FragmentShaderId::ALPHA_AGAINST_ZERO));

        state.alpha_test_ref = 0;
        let id = FragmentShaderId::compute(&state, &derived, fmt);
        assert!(id.bit(FragmentShaderId::ALPHA_AGAINST_ZERO));
    }

    #[test]
    fn test_geometry_id_depends_on_topology_only() {
        assert_eq!(
            GeometryShaderId::compute(PrimitiveKind::Triangles),
            GeometryShaderId::compute(PrimitiveKind::Triangles)
        );
        assert_ne!(
            GeometryShaderId::compute(PrimitiveKind::Triangles),
            GeometryShaderId::compute(PrimitiveKind::Lines)
        );
    }

    #[test]
    fn test_hex_display_round_trip() {
        let id = VertexShaderId(0x0123_4567_89ab_cdef);
        assert_eq!(id.to_string(), "0123456789abcdef");
        assert_eq!(VertexShaderId::from_hex(&id.to_string()), Some(id));
        assert_eq!(FragmentShaderId::from_hex("zz"), None);
    }

    #[test]
    fn test_describe_lists_active_features() {
        let fmt = VertexFormat::new().with_weights(format::U8, 2);
        let id = VertexShaderId::compute(&lit_state(), fmt, true);
        let desc = id.describe();
        assert!(desc.contains("HWX"));
        assert!(desc.contains("Bones:2"));
        assert!(desc.contains("Light:0"));
    }
}
