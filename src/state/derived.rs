//! State derived from registers by the draw pipeline.
//!
//! Viewport transforms, the currently bound texture's real size and the render
//! target size are not GE registers; they are computed by the framebuffer and
//! texture managers and published here before a draw.

/// Per-vertex UV scale and offset from the GE `UVSCALE` / `UVOFFSET` registers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvScaleOffset {
    pub u_scale: f32,
    pub v_scale: f32,
    pub u_offset: f32,
    pub v_offset: f32,
}

impl Default for UvScaleOffset {
    fn default() -> Self {
        Self {
            u_scale: 1.0,
            v_scale: 1.0,
            u_offset: 0.0,
            v_offset: 0.0,
        }
    }
}

/// Derived viewport / texture / render-target state.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedState {
    // === Viewport correction (applied by translate-and-scale) ===
    pub vp_x_offset: f32,
    pub vp_y_offset: f32,
    pub vp_z_offset: f32,
    pub vp_width_scale: f32,
    pub vp_height_scale: f32,
    pub vp_depth_scale: f32,

    // === Raw viewport extents (sign encodes flips) ===
    pub vp_width: f32,
    pub vp_height: f32,

    // === Bound texture ===
    /// Allocated size of the bound texture (may exceed the GE's level-0 size).
    pub cur_texture_width: u32,
    pub cur_texture_height: u32,
    pub cur_texture_x_offset: f32,
    pub cur_texture_y_offset: f32,
    /// Clamping must be emulated in the fragment stage (the bound texture is
    /// larger than the GE texture or is a sub-rectangle of a framebuffer).
    pub need_shader_tex_clamp: bool,
    pub uv: UvScaleOffset,

    // === Render target ===
    pub cur_rt_width: u32,
    pub cur_rt_height: u32,
    /// Size of the backing framebuffer after render scaling.
    pub cur_rt_render_width: u32,
    pub cur_rt_render_height: u32,
}

impl Default for DerivedState {
    fn default() -> Self {
        Self {
            vp_x_offset: 0.0,
            vp_y_offset: 0.0,
            vp_z_offset: 0.0,
            vp_width_scale: 1.0,
            vp_height_scale: 1.0,
            vp_depth_scale: 1.0,
            vp_width: 480.0,
            vp_height: -272.0,
            cur_texture_width: 256,
            cur_texture_height: 256,
            cur_texture_x_offset: 0.0,
            cur_texture_y_offset: 0.0,
            need_shader_tex_clamp: false,
            uv: UvScaleOffset::default(),
            cur_rt_width: 480,
            cur_rt_height: 272,
            cur_rt_render_width: 480,
            cur_rt_render_height: 272,
        }
    }
}
