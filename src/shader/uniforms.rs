//! Resolved uniform and attribute tables.
//!
//! Locations are looked up once at link time. Per-light and per-bone slots are
//! indexed arrays so refresh code iterates instead of unrolling.

use bitflags::bitflags;
use glam::{Vec3, Vec4};

use super::dirty::DirtyUniforms;
use crate::gpu::{GraphicsDevice, ProgramHandle, UniformLocation};

// ─── Colors ───────────────────────────────────────────────────────────────────

/// Unpacks a `0x00BBGGRR` color into normalized RGB.
#[inline]
#[must_use]
pub fn color3(color: u32) -> Vec3 {
    Vec3::new(
        (color & 0xFF) as f32 / 255.0,
        ((color >> 8) & 0xFF) as f32 / 255.0,
        ((color >> 16) & 0xFF) as f32 / 255.0,
    )
}

/// [`color3`] with a separate 8-bit alpha.
#[inline]
#[must_use]
pub fn color4(color: u32, alpha: u8) -> Vec4 {
    color3(color).extend(f32::from(alpha) / 255.0)
}

// ─── Vertex attributes ────────────────────────────────────────────────────────

/// Fixed attribute indices bound before every link.
pub const ATTRIBUTE_BINDINGS: [(u32, &str); 7] = [
    (0, "position"),
    (1, "texcoord"),
    (2, "normal"),
    (3, "w1"),
    (4, "w2"),
    (5, "color0"),
    (6, "color1"),
];

bitflags! {
    /// Vertex attributes a linked program reads, one bit per bound index.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct AttributeMask: u8 {
        const POSITION = 1 << 0;
        const TEXCOORD = 1 << 1;
        const NORMAL   = 1 << 2;
        const W1       = 1 << 3;
        const W2       = 1 << 4;
        const COLOR0   = 1 << 5;
        const COLOR1   = 1 << 6;
    }
}

impl AttributeMask {
    /// Attributes the program actually kept after linking.
    pub fn resolve<D: GraphicsDevice>(device: &mut D, program: ProgramHandle) -> Self {
        ATTRIBUTE_BINDINGS
            .iter()
            .filter_map(|&(_, name)| device.attribute_location(program, name))
            .fold(Self::empty(), |mask, index| {
                mask | Self::from_bits_truncate(1 << index)
            })
    }

    /// Attribute indices set in this mask.
    pub fn indices(self) -> impl Iterator<Item = u32> {
        (0..7u32).filter(move |i| self.bits() & (1 << i) != 0)
    }
}

// ─── Uniform slots ────────────────────────────────────────────────────────────

/// Locations of one hardware light's uniforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightSlots {
    pub position: Option<UniformLocation>,
    pub direction: Option<UniformLocation>,
    pub attenuation: Option<UniformLocation>,
    pub angle: Option<UniformLocation>,
    pub spot_coef: Option<UniformLocation>,
    pub ambient: Option<UniformLocation>,
    pub diffuse: Option<UniformLocation>,
    pub specular: Option<UniformLocation>,
}

impl LightSlots {
    fn resolve<D: GraphicsDevice>(device: &mut D, program: ProgramHandle, index: usize) -> Self {
        let mut slot = |base: &str| device.uniform_location(program, &format!("{base}{index}"));
        Self {
            position: slot("u_lightpos"),
            direction: slot("u_lightdir"),
            attenuation: slot("u_lightatt"),
            angle: slot("u_lightangle"),
            spot_coef: slot("u_lightspotCoef"),
            ambient: slot("u_lightambient"),
            diffuse: slot("u_lightdiffuse"),
            specular: slot("u_lightspecular"),
        }
    }

    /// A light counts as present when any of the slots that distinguish it
    /// from ambient-only lighting are declared.
    #[inline]
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.direction.is_some() || self.specular.is_some() || self.position.is_some()
    }
}

/// Every uniform location a program may declare. `None` = not declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformSlots {
    // Samplers
    pub tex: Option<UniformLocation>,
    pub fbo_tex: Option<UniformLocation>,
    pub test_tex: Option<UniformLocation>,

    // Transforms
    pub proj: Option<UniformLocation>,
    pub proj_through: Option<UniformLocation>,
    pub stereo_params: Option<UniformLocation>,
    pub world: Option<UniformLocation>,
    pub view: Option<UniformLocation>,
    pub tex_mtx: Option<UniformLocation>,
    pub depth_range: Option<UniformLocation>,
    pub bones: [Option<UniformLocation>; 8],

    // Fragment state
    pub texenv: Option<UniformLocation>,
    pub fog_color: Option<UniformLocation>,
    pub fog_coef: Option<UniformLocation>,
    pub alpha_color_ref: Option<UniformLocation>,
    pub alpha_color_mask: Option<UniformLocation>,
    pub stencil_replace: Option<UniformLocation>,
    pub blend_fix_a: Option<UniformLocation>,
    pub blend_fix_b: Option<UniformLocation>,
    pub fbo_tex_size: Option<UniformLocation>,
    pub uv_scale_offset: Option<UniformLocation>,
    pub tex_clamp: Option<UniformLocation>,
    pub tex_clamp_off: Option<UniformLocation>,

    // Lighting
    pub ambient: Option<UniformLocation>,
    pub mat_ambient_alpha: Option<UniformLocation>,
    pub mat_diffuse: Option<UniformLocation>,
    pub mat_specular: Option<UniformLocation>,
    pub mat_emissive: Option<UniformLocation>,
    pub lights: [LightSlots; 4],
}

impl UniformSlots {
    pub fn resolve<D: GraphicsDevice>(device: &mut D, program: ProgramHandle) -> Self {
        let mut slot = |name: &str| device.uniform_location(program, name);
        let mut slots = Self {
            tex: slot("tex"),
            fbo_tex: slot("fbotex"),
            test_tex: slot("testtex"),
            proj: slot("u_proj"),
            proj_through: slot("u_proj_through"),
            stereo_params: slot("u_StereoParams"),
            world: slot("u_world"),
            view: slot("u_view"),
            tex_mtx: slot("u_texmtx"),
            depth_range: slot("u_depthRange"),
            bones: [None; 8],
            texenv: slot("u_texenv"),
            fog_color: slot("u_fogcolor"),
            fog_coef: slot("u_fogcoef"),
            alpha_color_ref: slot("u_alphacolorref"),
            alpha_color_mask: slot("u_alphacolormask"),
            stencil_replace: slot("u_stencilReplaceValue"),
            blend_fix_a: slot("u_blendFixA"),
            blend_fix_b: slot("u_blendFixB"),
            fbo_tex_size: slot("u_fbotexSize"),
            uv_scale_offset: slot("u_uvscaleoffset"),
            tex_clamp: slot("u_texclamp"),
            tex_clamp_off: slot("u_texclampoff"),
            ambient: slot("u_ambient"),
            mat_ambient_alpha: slot("u_matambientalpha"),
            mat_diffuse: slot("u_matdiffuse"),
            mat_specular: slot("u_matspecular"),
            mat_emissive: slot("u_matemissive"),
            lights: [LightSlots::default(); 4],
        };
        for (i, bone) in slots.bones.iter_mut().enumerate() {
            *bone = device.uniform_location(program, &format!("u_bone{i}"));
        }
        for (i, light) in slots.lights.iter_mut().enumerate() {
            *light = LightSlots::resolve(device, program, i);
        }
        slots
    }

    /// Groups this program can satisfy. Computed once at link time.
    #[must_use]
    pub fn available(&self, num_bones: usize) -> DirtyUniforms {
        let mut available = DirtyUniforms::empty();
        let groups = [
            (self.proj, DirtyUniforms::PROJ_MATRIX),
            (self.proj_through, DirtyUniforms::PROJ_THROUGH_MATRIX),
            (self.texenv, DirtyUniforms::TEXENV),
            (self.alpha_color_ref, DirtyUniforms::ALPHA_COLOR_REF),
            (self.alpha_color_mask, DirtyUniforms::ALPHA_COLOR_MASK),
            (self.fog_color, DirtyUniforms::FOG_COLOR),
            (self.fog_coef, DirtyUniforms::FOG_COEF),
            (self.uv_scale_offset, DirtyUniforms::UV_SCALE_OFFSET),
            (self.tex_clamp, DirtyUniforms::TEX_CLAMP),
            (self.world, DirtyUniforms::WORLD_MATRIX),
            (self.view, DirtyUniforms::VIEW_MATRIX),
            (self.tex_mtx, DirtyUniforms::TEX_MATRIX),
            (self.depth_range, DirtyUniforms::DEPTH_RANGE),
            (self.stencil_replace, DirtyUniforms::STENCIL_REPLACE_VALUE),
            (self.ambient, DirtyUniforms::AMBIENT),
            (self.mat_ambient_alpha, DirtyUniforms::MAT_AMBIENT_ALPHA),
            (self.mat_diffuse, DirtyUniforms::MAT_DIFFUSE),
            (self.mat_emissive, DirtyUniforms::MAT_EMISSIVE),
            (self.mat_specular, DirtyUniforms::MAT_SPECULAR),
        ];
        for (slot, group) in groups {
            if slot.is_some() {
                available |= group;
            }
        }
        if self.blend_fix_a.is_some() || self.blend_fix_b.is_some() || self.fbo_tex_size.is_some() {
            available |= DirtyUniforms::SHADER_BLEND;
        }
        for (i, bone) in self.bones.iter().enumerate().take(num_bones) {
            if bone.is_some() {
                available |= DirtyUniforms::bone(i);
            }
        }
        for (i, light) in self.lights.iter().enumerate() {
            if light.is_present() {
                available |= DirtyUniforms::light(i);
            }
        }
        available
    }
}
