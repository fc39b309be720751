//! Linked programs and uniform refresh.
//!
//! A [`LinkedProgram`] owns the resolved uniform table of one stage triple and
//! its own stale mask. [`refresh_uniforms`](LinkedProgram::refresh_uniforms)
//! uploads exactly the groups that are both stale and declared by the program.

use glam::{Mat4, Vec2, Vec3, Vec4};
use smallvec::SmallVec;

use super::dirty::{DirtyLedger, DirtyUniforms};
use super::id::ProgramKey;
use super::manager::DrawContext;
use super::stage::CompiledShaderStage;
use super::uniforms::{ATTRIBUTE_BINDINGS, AttributeMask, UniformSlots, color3, color4};
use crate::errors::{Result, ShaderError};
use crate::gpu::{DeviceFeatures, GraphicsDevice, LinkRequest, ProgramHandle, UniformLocation};
use crate::projection::{expand_4x3, flip_axis, safe_div};
use crate::state::{AnomalyClass, UvGenMode, VertexFormat, float24};

/// Per-component scale undoing the GE's fixed-point texcoord normalization,
/// indexed by texcoord format.
const TEXCOORD_RESCALE: [f32; 4] = [1.0, 2.0 * 127.5 / 128.0, 2.0 * 32767.5 / 32768.0, 1.0];

/// Fog end substituted for an infinite fog slope.
const FOG_INF_SUBSTITUTE: f32 = 10000.0;
/// Fog placed far away (at a finite distance) when the slope is NaN.
const FOG_NAN_END: f32 = 100_000.0;

/// Sampler texture units.
const TEX_UNIT: i32 = 0;
const FBO_TEX_UNIT: i32 = 1;
const TEST_TEX_UNIT: i32 = 2;

/// Replaces non-finite fog coefficients with values every GPU evaluates the
/// same way.
///
/// Returns the sanitized `(end, slope)` pair and whether an unhandled
/// combination (non-finite `end` with a finite slope) was seen.
#[must_use]
pub fn sanitize_fog(end: f32, slope: f32) -> (Vec2, bool) {
    if slope.is_infinite() {
        let slope = if slope < 0.0 { -FOG_INF_SUBSTITUTE } else { FOG_INF_SUBSTITUTE };
        (Vec2::new(end, slope), false)
    } else if slope.is_nan() {
        (Vec2::new(FOG_NAN_END, 1.0), false)
    } else {
        (Vec2::new(end, slope), !end.is_finite())
    }
}

#[inline]
fn float24_vec3(bits: [u32; 3]) -> Vec3 {
    Vec3::new(float24(bits[0]), float24(bits[1]), float24(bits[2]))
}

/// `slot` when `group` is stale, else `None`.
#[inline]
fn stale(dirty: DirtyUniforms, group: DirtyUniforms, slot: Option<UniformLocation>) -> Option<UniformLocation> {
    if dirty.contains(group) { slot } else { None }
}

/// One linked stage triple.
#[derive(Debug)]
pub struct LinkedProgram {
    handle: ProgramHandle,
    key: ProgramKey,
    slots: UniformSlots,
    attributes: AttributeMask,
    dirty: DirtyUniforms,
    available: DirtyUniforms,
    num_bones: usize,
    synced_generation: u64,
    use_hw_transform: bool,
    /// Still bound from linking; the first `use_program` skips the bind.
    bound: bool,
}

impl LinkedProgram {
    /// Links the stages, resolves every uniform and attribute and binds the
    /// sampler units. The new program is bound and fully dirty.
    pub fn link<D: GraphicsDevice>(
        device: &mut D,
        key: ProgramKey,
        vs: &CompiledShaderStage,
        gs: Option<&CompiledShaderStage>,
        fs: &CompiledShaderStage,
        vertex_format: VertexFormat,
    ) -> Result<Self> {
        let mut stages: SmallVec<[_; 3]> = SmallVec::new();
        stages.push(vs.handle()?);
        if let Some(gs) = gs {
            stages.push(gs.handle()?);
        }
        stages.push(fs.handle()?);

        let request = LinkRequest {
            stages: &stages,
            attribute_bindings: &ATTRIBUTE_BINDINGS,
            dual_source_blend: device.features().contains(DeviceFeatures::DUAL_SOURCE_BLEND),
        };
        let handle = device
            .link_program(&request)
            .map_err(|info_log| ShaderError::ProgramLink { info_log })?;

        let use_hw_transform = vs.use_hw_transform();
        let num_bones = if use_hw_transform {
            vertex_format.num_bones()
        } else {
            0
        };
        let slots = UniformSlots::resolve(device, handle);
        let attributes = AttributeMask::resolve(device, handle);
        let available = slots.available(num_bones);

        device.use_program(handle);
        for (slot, unit) in [
            (slots.tex, TEX_UNIT),
            (slots.fbo_tex, FBO_TEX_UNIT),
            (slots.test_tex, TEST_TEX_UNIT),
        ] {
            if let Some(location) = slot {
                device.set_uniform_i32(location, unit);
            }
        }

        log::info!(
            "linked program {key} (bones: {num_bones}, attributes: {:?})",
            attributes
        );

        Ok(Self {
            handle,
            key,
            slots,
            attributes,
            dirty: DirtyUniforms::all(),
            available,
            num_bones,
            synced_generation: 0,
            use_hw_transform,
            bound: true,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> ProgramKey {
        self.key
    }

    #[inline]
    #[must_use]
    pub fn slots(&self) -> &UniformSlots {
        &self.slots
    }

    #[inline]
    #[must_use]
    pub fn attributes(&self) -> AttributeMask {
        self.attributes
    }

    /// Groups still waiting for an upload.
    #[inline]
    #[must_use]
    pub fn dirty(&self) -> DirtyUniforms {
        self.dirty
    }

    /// Groups this program declares uniforms for.
    #[inline]
    #[must_use]
    pub fn available(&self) -> DirtyUniforms {
        self.available
    }

    #[inline]
    #[must_use]
    pub fn num_bones(&self) -> usize {
        self.num_bones
    }

    #[inline]
    #[must_use]
    pub fn synced_generation(&self) -> u64 {
        self.synced_generation
    }

    #[inline]
    #[must_use]
    pub fn use_hw_transform(&self) -> bool {
        self.use_hw_transform
    }

    // ── Dirty bookkeeping ────────────────────────────────────────────────────

    pub(crate) fn mark_dirty(&mut self, mask: DirtyUniforms) {
        self.dirty |= mask;
    }

    /// Pulls every group stamped since this program last synced.
    pub(crate) fn pull(&mut self, ledger: &DirtyLedger) {
        self.dirty |= ledger.pending_since(self.synced_generation);
        self.synced_generation = ledger.generation();
    }

    pub(crate) fn sync_to(&mut self, generation: u64) {
        self.synced_generation = generation;
    }

    // ── Binding ──────────────────────────────────────────────────────────────

    /// Binds the program, refreshes its uniforms and reconciles vertex
    /// attributes against the previously bound program.
    ///
    /// Returns the groups still dirty afterwards.
    pub fn use_program<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        ctx: &mut DrawContext<'_>,
        previous: Option<AttributeMask>,
        vertex_format: VertexFormat,
        is_clear: bool,
    ) -> DirtyUniforms {
        if !std::mem::take(&mut self.bound) {
            device.use_program(self.handle);
        }
        let still_dirty = self.refresh_uniforms(device, ctx, vertex_format, is_clear);

        let (enable, disable) = match previous {
            Some(previous) => (self.attributes - previous, previous - self.attributes),
            None => (self.attributes, self.attributes.complement()),
        };
        for index in enable.indices() {
            device.enable_vertex_attribute(index);
        }
        for index in disable.indices() {
            device.disable_vertex_attribute(index);
        }
        still_dirty
    }

    /// Disables every attribute this program enabled.
    pub fn stop<D: GraphicsDevice>(&self, device: &mut D) {
        for index in self.attributes.indices() {
            device.disable_vertex_attribute(index);
        }
    }

    pub(crate) fn delete<D: GraphicsDevice>(&self, device: &mut D) {
        device.delete_program(self.handle);
    }

    // ── Uniform refresh ──────────────────────────────────────────────────────

    /// Uploads every stale group the program declares.
    ///
    /// Bits are cleared as they are uploaded. Projection bits survive until a
    /// projection is actually written, which depends on through / clear mode
    /// of the draw. Returns the groups that are still dirty.
    pub fn refresh_uniforms<D: GraphicsDevice>(
        &mut self,
        device: &mut D,
        ctx: &mut DrawContext<'_>,
        vertex_format: VertexFormat,
        is_clear: bool,
    ) -> DirtyUniforms {
        let dirty = self.dirty & self.available;
        self.dirty = dirty & DirtyUniforms::PROJECTION;

        let vr_active = ctx.vr_active();
        let frame_refresh = ctx.frame.frame_changed && vr_active;
        if dirty.is_empty() && !ctx.frame.free_look_changed && !frame_refresh {
            return self.dirty;
        }

        let gstate = ctx.gstate;
        let derived = ctx.derived;
        let settings = ctx.settings;
        let slots = self.slots;

        // ── Texture environment and per-fragment tests ──

        if let Some(location) = stale(dirty, DirtyUniforms::TEXENV, slots.texenv) {
            device.set_uniform_vec3(location, color3(gstate.texenv_color));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::ALPHA_COLOR_REF, slots.alpha_color_ref) {
            let c = gstate.color_test_ref;
            let reference = Vec4::new(
                (c & 0xFF) as f32,
                ((c >> 8) & 0xFF) as f32,
                ((c >> 16) & 0xFF) as f32,
                f32::from(gstate.masked_alpha_ref()),
            );
            let reference = if device.features().contains(DeviceFeatures::NORMALIZED_ALPHA_REF) {
                reference / 255.0
            } else {
                reference
            };
            device.set_uniform_vec4(location, reference);
        }
        if let Some(location) = stale(dirty, DirtyUniforms::ALPHA_COLOR_MASK, slots.alpha_color_mask) {
            let m = gstate.color_test_mask;
            device.set_uniform_ivec4(
                location,
                [
                    (m & 0xFF) as i32,
                    ((m >> 8) & 0xFF) as i32,
                    ((m >> 16) & 0xFF) as i32,
                    i32::from(gstate.alpha_test_mask),
                ],
            );
        }
        if let Some(location) = stale(dirty, DirtyUniforms::FOG_COLOR, slots.fog_color) {
            device.set_uniform_vec3(location, color3(gstate.fog_color));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::FOG_COEF, slots.fog_coef) {
            let (end, slope) = (float24(gstate.fog1), float24(gstate.fog2));
            let (coef, unhandled) = sanitize_fog(end, slope);
            if unhandled && ctx.frame.report_anomaly(AnomalyClass::FOG_NAN_INF) {
                log::error!("unhandled fog NaN/Inf combination: {end} {slope}");
            }
            device.set_uniform_vec2(location, coef);
        }

        // ── Texturing ──

        let inv_width = safe_div(1.0, derived.cur_texture_width as f32);
        let inv_height = safe_div(1.0, derived.cur_texture_height as f32);
        let width_factor = gstate.texture_width as f32 * inv_width;
        let height_factor = gstate.texture_height as f32 * inv_height;

        if let Some(location) = stale(dirty, DirtyUniforms::UV_SCALE_OFFSET, slots.uv_scale_offset) {
            let uv = derived.uv;
            let scale_offset = match gstate.uv_gen_mode {
                UvGenMode::TextureCoords | UvGenMode::Unknown if !settings.prescale_uv => {
                    let factor = TEXCOORD_RESCALE[(vertex_format.texcoord_format() & 3) as usize];
                    Vec4::new(
                        uv.u_scale * factor * width_factor,
                        uv.v_scale * factor * height_factor,
                        uv.u_offset * width_factor,
                        uv.v_offset * height_factor,
                    )
                }
                // Prescaled coordinates, matrix and environment map modes
                // only need the texture size correction.
                _ => Vec4::new(width_factor, height_factor, 0.0, 0.0),
            };
            device.set_uniform_vec4(location, scale_offset);
        }
        if let Some(location) = stale(dirty, DirtyUniforms::TEX_CLAMP, slots.tex_clamp) {
            device.set_uniform_vec4(
                location,
                Vec4::new(width_factor, height_factor, inv_width * 0.5, inv_height * 0.5),
            );
            if let Some(offset) = slots.tex_clamp_off {
                device.set_uniform_vec2(
                    offset,
                    Vec2::new(
                        derived.cur_texture_x_offset * inv_width,
                        derived.cur_texture_y_offset * inv_height,
                    ),
                );
            }
        }

        // ── Transforms ──

        if let Some(location) = stale(dirty, DirtyUniforms::WORLD_MATRIX, slots.world) {
            device.set_uniform_mat4(location, &expand_4x3(&gstate.world_matrix));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::VIEW_MATRIX, slots.view) {
            device.set_uniform_mat4(location, &expand_4x3(&gstate.view_matrix));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::TEX_MATRIX, slots.tex_mtx) {
            device.set_uniform_mat4(location, &expand_4x3(&gstate.tgen_matrix));
        }

        let mut skybox_changed = false;
        if dirty.intersects(DirtyUniforms::WORLD_MATRIX | DirtyUniforms::VIEW_MATRIX) {
            let is_skybox = settings.detect_skybox && gstate.camera_position() == [0.0; 3];
            if is_skybox != ctx.frame.is_skybox {
                ctx.frame.is_skybox = is_skybox;
                skybox_changed = true;
            }
        }

        if let Some(location) = stale(dirty, DirtyUniforms::DEPTH_RANGE, slots.depth_range) {
            let scale = safe_div(gstate.viewport_z_scale, derived.vp_depth_scale);
            let center = gstate.viewport_z_center - 65535.0 * derived.vp_z_offset;
            let inv_scale = if scale == 0.0 { 0.0 } else { 1.0 / scale };
            device.set_uniform_vec4(location, Vec4::new(scale, center, center, inv_scale));
        }

        // ── Projection ──

        let through = gstate.through_mode;
        let buffered = settings.rendering_mode.is_buffered();
        let mut wrote_projection = false;

        if !through
            && !is_clear
            && let Some(location) = slots.proj
            && (dirty.contains(DirtyUniforms::PROJ_MATRIX)
                || ctx.frame.free_look_changed
                || frame_refresh
                || (skybox_changed && vr_active))
        {
            let observe = dirty.contains(DirtyUniforms::PROJ_MATRIX);
            let mut solver = ctx.solver();
            let mut matrix = if vr_active {
                let out = solver.stereo(&gstate.proj_matrix, observe, false);
                if let Some(params) = slots.stereo_params {
                    device.set_uniform_vec4(params, out.stereo_params);
                }
                out.matrix
            } else {
                solver.mono(&gstate.proj_matrix)
            };
            if buffered {
                matrix = flip_axis(&matrix, 1);
            }
            device.set_uniform_mat4(location, &matrix);
            self.dirty.remove(DirtyUniforms::PROJ_MATRIX);
            ctx.frame.free_look_changed = false;
            wrote_projection = true;
        }

        if through
            && !is_clear
            && let Some(location) = slots.proj_through
            && (dirty.contains(DirtyUniforms::PROJ_THROUGH_MATRIX) || frame_refresh)
        {
            let mut solver = ctx.solver();
            let ortho = solver.through_matrix();
            let mut matrix = if vr_active {
                let out = solver.stereo(&ortho, false, true);
                if let Some(params) = slots.stereo_params {
                    device.set_uniform_vec4(params, out.stereo_params);
                }
                out.matrix
            } else {
                ortho
            };
            if buffered {
                matrix = flip_axis(&matrix, 1);
            }
            device.set_uniform_mat4(location, &matrix);
            self.dirty.remove(DirtyUniforms::PROJ_THROUGH_MATRIX);
            wrote_projection = true;
        }

        if wrote_projection && vr_active {
            ctx.frame.frame_changed = false;
        }

        // ── Stencil and skinning ──

        if let Some(location) = stale(dirty, DirtyUniforms::STENCIL_REPLACE_VALUE, slots.stencil_replace) {
            device.set_uniform_f32(location, f32::from(gstate.stencil_test_ref) / 255.0);
        }

        let num_bones = self.num_bones.min(gstate.bone_matrices.len());
        let all_bones = DirtyUniforms::first_bones(num_bones);
        let dirty_bones = dirty & all_bones;
        if !dirty_bones.is_empty() {
            let bones: SmallVec<[Mat4; 8]> = gstate.bone_matrices[..num_bones]
                .iter()
                .map(expand_4x3)
                .collect();
            match slots.bones[0] {
                Some(first) if dirty_bones == all_bones => {
                    device.set_uniform_mat4_array(first, &bones);
                }
                _ => {
                    for (i, bone) in bones.iter().enumerate() {
                        if let Some(location) = stale(dirty, DirtyUniforms::bone(i), slots.bones[i]) {
                            device.set_uniform_mat4(location, bone);
                        }
                    }
                }
            }
        }

        // ── Shader blending ──

        if dirty.contains(DirtyUniforms::SHADER_BLEND) {
            if let Some(location) = slots.blend_fix_a {
                device.set_uniform_vec3(location, color3(gstate.blend_fix_a));
            }
            if let Some(location) = slots.blend_fix_b {
                device.set_uniform_vec3(location, color3(gstate.blend_fix_b));
            }
            if let Some(location) = slots.fbo_tex_size {
                device.set_uniform_vec2(
                    location,
                    Vec2::new(
                        safe_div(1.0, derived.cur_rt_render_width as f32),
                        safe_div(1.0, derived.cur_rt_render_height as f32),
                    ),
                );
            }
        }

        // ── Lighting ──

        if let Some(location) = stale(dirty, DirtyUniforms::AMBIENT, slots.ambient) {
            device.set_uniform_vec4(location, color4(gstate.ambient_color, gstate.ambient_alpha));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::MAT_AMBIENT_ALPHA, slots.mat_ambient_alpha) {
            device.set_uniform_vec4(
                location,
                color4(gstate.material_ambient, gstate.material_ambient_alpha),
            );
        }
        if let Some(location) = stale(dirty, DirtyUniforms::MAT_DIFFUSE, slots.mat_diffuse) {
            device.set_uniform_vec3(location, color3(gstate.material_diffuse));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::MAT_EMISSIVE, slots.mat_emissive) {
            device.set_uniform_vec3(location, color3(gstate.material_emissive));
        }
        if let Some(location) = stale(dirty, DirtyUniforms::MAT_SPECULAR, slots.mat_specular) {
            device.set_uniform_vec4(
                location,
                color3(gstate.material_specular).extend(float24(gstate.material_specular_coef)),
            );
        }

        for (i, light_slots) in slots.lights.iter().enumerate() {
            if !dirty.contains(DirtyUniforms::light(i)) {
                continue;
            }
            let light = &gstate.lights[i];
            if let Some(location) = light_slots.position {
                let position = float24_vec3(light.position);
                let position = if gstate.is_directional_light(i) {
                    let len = position.length();
                    if len == 0.0 { position } else { position / len }
                } else {
                    position
                };
                device.set_uniform_vec3(location, position);
            }
            if let Some(location) = light_slots.direction {
                device.set_uniform_vec3(location, float24_vec3(light.direction));
            }
            if let Some(location) = light_slots.attenuation {
                device.set_uniform_vec3(location, float24_vec3(light.attenuation));
            }
            if let Some(location) = light_slots.angle {
                device.set_uniform_f32(location, float24(light.cutoff));
            }
            if let Some(location) = light_slots.spot_coef {
                device.set_uniform_f32(location, float24(light.convergence));
            }
            if let Some(location) = light_slots.ambient {
                device.set_uniform_vec3(location, color3(light.ambient));
            }
            if let Some(location) = light_slots.diffuse {
                device.set_uniform_vec3(location, color3(light.diffuse));
            }
            if let Some(location) = light_slots.specular {
                device.set_uniform_vec3(location, color3(light.specular));
            }
        }

        self.dirty
    }
}
