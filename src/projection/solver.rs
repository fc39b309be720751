//! Projection solver.
//!
//! Turns the game's projection matrix into the matrix actually uploaded.
//!
//! - **Mono** ([`ProjectionSolver::mono`]): undo viewport flips, apply
//!   free-look and correct for the rendered viewport.
//! - **Stereo** ([`ProjectionSolver::stereo`]): classify the layer, rebuild
//!   the projection from the headset's per-eye FOV and compose a view matrix
//!   from head tracking, camera stabilization and HUD placement. The right
//!   eye is derived in the geometry stage from the returned stereo params.

use glam::{Mat4, Vec3, Vec4};

use super::layer::{HudPlane, LayerClass, PlaneInputs};
use super::matrix::{
    ProjectionParams, flip_axis, is_perspective, safe_div, viewport_scale,
};
use crate::settings::{MotionSicknessSkybox, RenderSettings, ScreenRotation};
use crate::state::{
    AnomalyClass, DerivedState, Eye, EyeFov, FrameContext, GpuState, HeadTracking, ViewportType,
};

/// Near plane used when no 3D scene has been seen, in metres.
const DEFAULT_NEAR_METRES: f32 = 0.02;
/// Far plane used when no 3D scene has been seen, in metres.
const DEFAULT_FAR_METRES: f32 = 500.0;
/// Horizontal FOV of the virtual screen when no 3D scene has been seen.
const DEFAULT_HFOV: f32 = 70.0;
/// Flash frames (of [`FLASH_PERIOD`](crate::state::frame::FLASH_PERIOD)) during
/// which the selected layer is hidden.
const FLASH_VISIBLE_FRAMES: u32 = 5;

/// Matrix to upload plus the stereo parameters for `u_StereoParams`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionOutput {
    pub matrix: Mat4,
    /// `(left.xx * eye_left.x, right.xx * eye_right.x, left.zx, right.zx)`.
    pub stereo_params: Vec4,
}

impl ProjectionOutput {
    /// Collapses every vertex: the layer is not drawn.
    pub const HIDDEN: Self = Self {
        matrix: Mat4::ZERO,
        stereo_params: Vec4::ZERO,
    };

    #[inline]
    #[must_use]
    pub fn mono(matrix: Mat4) -> Self {
        Self {
            matrix,
            stereo_params: Vec4::ZERO,
        }
    }
}

/// Borrowed view of everything a projection depends on.
pub struct ProjectionSolver<'a> {
    gstate: &'a GpuState,
    derived: &'a DerivedState,
    settings: &'a RenderSettings,
    frame: &'a mut FrameContext,
    headset: Option<&'a dyn HeadTracking>,
}

impl<'a> ProjectionSolver<'a> {
    pub fn new(
        gstate: &'a GpuState,
        derived: &'a DerivedState,
        settings: &'a RenderSettings,
        frame: &'a mut FrameContext,
        headset: Option<&'a dyn HeadTracking>,
    ) -> Self {
        Self {
            gstate,
            derived,
            settings,
            frame,
            headset,
        }
    }

    /// A headset is attached and VR rendering is enabled.
    #[inline]
    #[must_use]
    pub fn vr_active(&self) -> bool {
        self.settings.vr.enabled && self.headset.is_some()
    }

    fn flipped(&self, proj: &Mat4) -> Mat4 {
        let mut m = *proj;
        if self.derived.vp_height > 0.0 {
            m = flip_axis(&m, 1);
        }
        if self.derived.vp_width < 0.0 {
            m = flip_axis(&m, 0);
        }
        m
    }

    fn viewport_scaled(&self, m: &Mat4) -> Mat4 {
        viewport_scale(m, self.derived, self.settings.rendering_mode)
    }

    // ── Mono ─────────────────────────────────────────────────────────────────

    /// Projection for a non-VR draw.
    ///
    /// Orthographic matrices only get the viewport flips.
    #[must_use]
    pub fn mono(&self, proj: &Mat4) -> Mat4 {
        let m = self.flipped(proj);
        if !is_perspective(&m) {
            return m;
        }
        let upm = self.settings.vr.game_units_per_metre();
        self.viewport_scaled(&m) * Mat4::from_translation(self.frame.free_look() * upm)
    }

    /// Orthographic projection for through-mode (screen space) vertices.
    #[must_use]
    pub fn through_matrix(&self) -> Mat4 {
        Mat4::orthographic_rh_gl(
            0.0,
            self.derived.cur_rt_width as f32,
            self.derived.cur_rt_height as f32,
            0.0,
            0.0,
            1.0,
        )
    }

    // ── Stereo ───────────────────────────────────────────────────────────────

    /// Classifies the current layer. Updates the skyplane flag as a side effect.
    ///
    /// Returns the class and whether the layer is treated as a skybox.
    pub fn classify(&mut self, perspective: bool) -> (LayerClass, bool) {
        let vr = &self.settings.vr;
        let frame = &mut *self.frame;

        let fullscreen_layer = vr.hud_fullscreen && !perspective;
        let flashing = vr.selected_layer.is_some() && vr.selected_layer == frame.current_layer();

        if vr.before_3d_is_background {
            frame.is_skyplane =
                frame.last_frame_had_3d && !perspective && !frame.this_frame_has_3d;
        }
        let is_skybox = (frame.is_skybox && perspective) || frame.is_skyplane;

        let other_player = match frame.viewport_type {
            ViewportType::Player(n) => u32::from(n) != vr.vr_player,
            _ => false,
        };
        let vr_active = vr.enabled && self.headset.is_some();
        let hide = (vr_active && (frame.viewport_type == ViewportType::Offscreen || other_player))
            || (flashing && frame.flash_state > FLASH_VISIBLE_FRAMES)
            || (is_skybox && vr.motion_sickness_skybox == MotionSicknessSkybox::Hide)
            || frame.black_screen;
        let hidden = hide && (flashing || vr_active);

        let class = if hidden {
            LayerClass::Hidden
        } else if frame.viewport_type == ViewportType::RenderToTexture {
            LayerClass::RenderToTexture
        } else if fullscreen_layer {
            LayerClass::FullscreenCopy
        } else {
            LayerClass::Compose
        };
        (class, is_skybox)
    }

    /// Projection for one eye of a VR draw.
    ///
    /// `observe` records the projection in the frame context (widest FOV,
    /// new-scene detection, layer counter); pass it only when the game
    /// actually changed its projection.
    pub fn stereo(&mut self, proj: &Mat4, observe: bool, through: bool) -> ProjectionOutput {
        let Some(headset) = self.headset else {
            let matrix = if through { *proj } else { self.mono(proj) };
            return ProjectionOutput::mono(matrix);
        };
        let settings = self.settings;
        let vr = &settings.vr;
        let upm = vr.game_units_per_metre();

        // 1-3: classify, flip and decompose.
        let perspective = is_perspective(proj);
        let m = if through { *proj } else { self.flipped(proj) };
        let params = ProjectionParams::decompose(&m);
        if observe {
            self.frame.record_projection(&m, &params, vr.max_scene_fov);
            if perspective
                && (params.hfov == 0.0 || params.zfar == params.znear)
                && self.frame.report_anomaly(AnomalyClass::DEGENERATE_PROJECTION)
            {
                log::warn!("degenerate perspective projection: {params:?}");
            }
        }

        // 4: special layers.
        let (class, is_skybox) = self.classify(perspective);
        match class {
            LayerClass::Hidden => return ProjectionOutput::HIDDEN,
            LayerClass::RenderToTexture => return ProjectionOutput::mono(m),
            LayerClass::FullscreenCopy => return ProjectionOutput::mono(self.viewport_scaled(&m)),
            LayerClass::Compose => {}
        }

        let widest = self.frame.widest_3d;
        let half_tan = |degrees: f32| (degrees.to_radians() * 0.5).tan();

        let telescope_eyes = if vr.telescope_eye & 3 != 0
            && widest.vfov > 1.0
            && widest.vfov <= vr.telescope_max_fov
            && (vr.telescope_max_fov <= vr.min_fov || widest.vfov > vr.min_fov)
        {
            vr.telescope_eye & 3
        } else {
            0
        };
        let no_forward = telescope_eyes != 0;
        let (mut width_hack, mut height_hack) = (1.0, 1.0);
        if telescope_eyes & 1 != 0 {
            let scale = safe_div(headset.projection_half_tan(), half_tan(widest.vfov)).abs();
            width_hack *= scale;
            height_hack *= scale;
        }

        // Dolly forward until objects at the aim distance fill the minimum FOV.
        let zoom_forward = if widest.hfov > 0.0 && widest.hfov <= vr.min_fov && telescope_eyes == 0 {
            vr.aim_distance * half_tan(vr.min_fov) / half_tan(widest.hfov) - vr.aim_distance
        } else {
            0.0
        };

        // 5: depth range and FOV of the scene this layer belongs to.
        let real_3d = perspective
            && !matches!(
                self.frame.viewport_type,
                ViewportType::HudElement | ViewportType::Offscreen
            );
        let better_near = |znear: f32| (znear / 20.0).max(DEFAULT_NEAR_METRES * upm);
        let (zfar, hfov, vfov, near_plane);
        if real_3d {
            self.frame.this_frame_has_3d = true;
            zfar = params.zfar;
            hfov = params.hfov.abs();
            vfov = params.vfov.abs();
            near_plane = better_near(params.znear);
            if !self.frame.had_3d_already {
                self.frame.stabilization.update(&self.gstate.view_matrix, vr);
                self.frame.had_3d_already = true;
            }
        } else if widest.is_set() {
            zfar = widest.zfar;
            if zoom_forward == 0.0 {
                hfov = widest.hfov;
                vfov = widest.vfov;
            } else {
                hfov = vr.min_fov;
                vfov = vr.min_fov * widest.vfov / widest.hfov;
            }
            near_plane = better_near(widest.znear);
        } else {
            zfar = DEFAULT_FAR_METRES * upm;
            hfov = DEFAULT_HFOV;
            vfov = 2.0 * (half_tan(DEFAULT_HFOV) * 9.0 / 16.0).atan().to_degrees();
            near_plane = DEFAULT_NEAR_METRES * upm;
        }

        // 7: per-eye projections from the headset lenses.
        let mut proj_left = eye_projection(headset.eye_fov(Eye::Left), near_plane, zfar);
        let proj_right = eye_projection(headset.eye_fov(Eye::Right), near_plane, zfar);
        let mut stereo_params = Vec4::new(
            proj_left.x_axis.x,
            proj_right.x_axis.x,
            proj_left.z_axis.x,
            proj_right.z_axis.x,
        );
        proj_left = facing_forward(proj_left);
        proj_left.x_axis.x *= width_hack;
        proj_left.y_axis.y *= height_hack;
        if vr.geometry_shader_stereo {
            proj_left.z_axis.x = 0.0;
        }

        // 6: view chain.
        let pose = headset.pose();
        let rotation = if vr.orientation_tracking {
            pose.orientation
        } else {
            Mat4::IDENTITY
        };
        let lean_back = Mat4::from_rotation_x(vr.lean_back_angle.to_radians());
        let user_pitch_degrees = if perspective || widest.is_set() {
            vr.camera_pitch
        } else {
            vr.screen_pitch
        };
        let user_pitch = Mat4::from_rotation_x(-user_pitch_degrees.to_radians());
        let stabilized = vr.stabilizes_rotation()
            && vr.can_read_camera_angles
            && !(is_skybox && vr.motion_sickness_skybox == MotionSicknessSkybox::Lock);
        let camera_pitch = match (stabilized, vr.stabilize_pitch) {
            (true, true) => self.frame.stabilization.rotation,
            (true, false) => user_pitch * self.frame.stabilization.rotation,
            (false, _) => user_pitch,
        };

        let (head_position, free_look, camera_position) = if is_skybox {
            (Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
        } else {
            let head = if vr.position_tracking {
                Mat4::from_translation(pose.position * upm)
            } else {
                Mat4::IDENTITY
            };
            let camera = if vr.stabilizes_position() {
                Mat4::from_translation(-self.frame.stabilization.position * upm)
            } else {
                Mat4::IDENTITY
            };
            (head, Mat4::from_translation(self.frame.free_look() * upm), camera)
        };
        let tracking = rotation * head_position * lean_back * free_look * camera_pitch * camera_position;
        let portrait = (vr.screen_rotation != ScreenRotation::LockedHorizontal)
            .then(|| Mat4::from_rotation_z(90f32.to_radians()));

        let look = if real_3d {
            let camera_forward = if no_forward || is_skybox {
                Mat4::IDENTITY
            } else {
                Mat4::from_translation(Vec3::new(
                    0.0,
                    0.0,
                    (vr.camera_forward + zoom_forward) * upm,
                ))
            };
            let mut look = tracking * camera_forward;
            if params.flip_x() || params.flip_y() || params.left_handed {
                look *= Mat4::from_scale(Vec3::new(
                    if params.flip_x() { -1.0 } else { 1.0 },
                    if params.flip_y() { -1.0 } else { 1.0 },
                    if params.left_handed { -1.0 } else { 1.0 },
                ));
            }
            if let Some(portrait) = portrait {
                look *= portrait;
            }
            look
        } else {
            let plane = HudPlane::place(
                vr,
                &PlaneInputs {
                    has_widest_3d: widest.is_set(),
                    is_skybox,
                    hfov,
                    vfov,
                    zfar,
                    zoom_forward,
                    no_forward,
                    units_per_metre: upm,
                },
            );
            let (scale, position) = if perspective {
                plane.perspective_element(&m, vr.hud_3d_closer)
            } else {
                let invert = if through {
                    vr.invert_2d_through_depth
                } else {
                    vr.invert_2d_ortho_depth
                };
                plane.flat_layer(&m, &params, invert)
            };
            let mut look = tracking;
            if let Some(portrait) = portrait {
                look *= portrait;
            }
            look * Mat4::from_translation(position) * Mat4::from_scale(scale)
        };

        // 8: eye separation. Skyboxes are infinitely far and get none.
        if !is_skybox {
            stereo_params.x *= headset.eye_offset(Eye::Left).x * upm;
            stereo_params.y *= headset.eye_offset(Eye::Right).x * upm;
        } else {
            stereo_params.x = 0.0;
            stereo_params.y = 0.0;
        }

        // 9
        let mut matrix = proj_left * look;
        if !through {
            matrix = self.viewport_scaled(&matrix);
        }
        ProjectionOutput {
            matrix,
            stereo_params,
        }
    }
}

/// Makes the x/y scales of a lens projection positive. Off-axis terms follow
/// the sign of their axis so a mirrored lens keeps its direction.
#[must_use]
pub fn facing_forward(lens: Mat4) -> Mat4 {
    let (sign_x, sign_y) = (lens.x_axis.x.signum(), lens.y_axis.y.signum());
    let mut m = lens;
    m.x_axis.x *= sign_x;
    m.y_axis.y *= sign_y;
    m.z_axis.x *= sign_x;
    m.z_axis.y *= sign_y;
    m
}

/// Asymmetric GL projection from lens half-angle tangents.
#[must_use]
pub fn eye_projection(fov: EyeFov, znear: f32, zfar: f32) -> Mat4 {
    let width = fov.left_tan + fov.right_tan;
    let height = fov.up_tan + fov.down_tan;
    Mat4::from_cols(
        Vec4::new(safe_div(2.0, width), 0.0, 0.0, 0.0),
        Vec4::new(0.0, safe_div(2.0, height), 0.0, 0.0),
        Vec4::new(
            safe_div(fov.right_tan - fov.left_tan, width),
            safe_div(fov.up_tan - fov.down_tan, height),
            safe_div(zfar + znear, znear - zfar),
            -1.0,
        ),
        Vec4::new(0.0, 0.0, safe_div(2.0 * zfar * znear, znear - zfar), 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StaticHeadset;

    #[test]
    fn test_symmetric_eye_projection_matches_glam() {
        let fov = EyeFov::symmetric(90.0, 90.0);
        let ours = eye_projection(fov, 0.1, 100.0);
        let glam = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, 0.1, 100.0);
        assert!(ours.abs_diff_eq(glam, 1e-4));
    }

    #[test]
    fn test_asymmetric_eye_projection_has_off_axis_term() {
        let fov = EyeFov {
            left_tan: 1.0,
            right_tan: 0.5,
            up_tan: 1.0,
            down_tan: 1.0,
        };
        let m = eye_projection(fov, 0.1, 10.0);
        assert!(m.z_axis.x < 0.0);
        assert_eq!(m.z_axis.y, 0.0);
    }

    #[test]
    fn test_mono_flips_inverted_viewport() {
        let gstate = GpuState::default();
        let derived = DerivedState {
            vp_height: 272.0,
            ..Default::default()
        };
        let settings = RenderSettings::default();
        let mut frame = FrameContext::new();
        let solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);

        let proj = Mat4::orthographic_rh_gl(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0);
        let out = solver.mono(&proj);
        assert_eq!(out.y_axis.y, -proj.y_axis.y);
        assert_eq!(out.x_axis.x, proj.x_axis.x);
    }

    #[test]
    fn test_mono_scales_perspective_only() {
        let gstate = GpuState::default();
        let derived = DerivedState {
            vp_width_scale: 2.0,
            vp_x_offset: 0.5,
            ..Default::default()
        };
        let settings = RenderSettings::default();
        let mut frame = FrameContext::new();
        let solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);

        let ortho = Mat4::orthographic_rh_gl(0.0, 480.0, 272.0, 0.0, 0.0, 1.0);
        assert_eq!(solver.mono(&ortho), ortho);

        let perspective = Mat4::perspective_rh_gl(1.0, 1.5, 1.0, 50.0);
        let out = solver.mono(&perspective);
        assert_eq!(out.x_axis.x, 2.0 * perspective.x_axis.x);
        assert_eq!(out.z_axis.x, perspective.z_axis.x * 2.0 + perspective.z_axis.w * 0.5);
    }

    #[test]
    fn test_mirrored_lens_faces_forward() {
        let lens = eye_projection(
            EyeFov {
                left_tan: -1.0,
                right_tan: -0.5,
                up_tan: 1.0,
                down_tan: 1.0,
            },
            0.1,
            10.0,
        );
        assert!(lens.x_axis.x < 0.0);

        let m = facing_forward(lens);
        assert_eq!(m.x_axis.x, -lens.x_axis.x);
        assert_eq!(m.z_axis.x, -lens.z_axis.x);
        assert_eq!(m.y_axis.y, lens.y_axis.y);
        assert_eq!(m.z_axis.z, lens.z_axis.z);
    }

    #[test]
    fn test_hide_needs_vr_or_flashing() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let settings = RenderSettings::default();
        let mut frame = FrameContext::new();
        frame.black_screen = true;
        frame.viewport_type = ViewportType::Offscreen;
        let mut solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);

        assert_eq!(solver.classify(true).0, LayerClass::Compose);
    }

    #[test]
    fn test_flashing_layer_hides_without_vr() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let mut settings = RenderSettings::default();
        settings.vr.selected_layer = Some(0);
        let mut frame = FrameContext::new();
        frame.layer_count = 1;
        frame.flash_state = FLASH_VISIBLE_FRAMES + 1;
        let mut solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);
        assert_eq!(solver.classify(true).0, LayerClass::Hidden);

        frame.flash_state = 0;
        let mut solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);
        assert_eq!(solver.classify(true).0, LayerClass::Compose);
    }

    #[test]
    fn test_offscreen_hides_in_vr() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let mut settings = RenderSettings::default();
        settings.vr.enabled = true;
        let mut frame = FrameContext::new();
        frame.viewport_type = ViewportType::Offscreen;
        let headset = StaticHeadset::default();
        let mut solver =
            ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, Some(&headset));

        assert_eq!(solver.classify(true).0, LayerClass::Hidden);
    }

    #[test]
    fn test_stereo_without_headset_falls_back_to_mono() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let settings = RenderSettings::default();
        let mut frame = FrameContext::new();
        let mut solver = ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, None);
        assert!(!solver.vr_active());

        let proj = Mat4::perspective_rh_gl(1.0, 1.5, 1.0, 50.0);
        let expected = solver.mono(&proj);
        let out = solver.stereo(&proj, true, false);
        assert_eq!(out, ProjectionOutput::mono(expected));
    }

    #[test]
    fn test_black_screen_hides_layer() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let mut settings = RenderSettings::default();
        settings.vr.enabled = true;
        let mut frame = FrameContext::new();
        frame.black_screen = true;
        let headset = StaticHeadset::default();
        let mut solver =
            ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, Some(&headset));

        let proj = Mat4::perspective_rh_gl(1.0, 1.5, 1.0, 50.0);
        assert_eq!(solver.stereo(&proj, true, false), ProjectionOutput::HIDDEN);
    }

    #[test]
    fn test_render_to_texture_is_mono() {
        let gstate = GpuState::default();
        let derived = DerivedState::default();
        let mut settings = RenderSettings::default();
        settings.vr.enabled = true;
        let mut frame = FrameContext::new();
        frame.viewport_type = ViewportType::RenderToTexture;
        let headset = StaticHeadset::default();
        let mut solver =
            ProjectionSolver::new(&gstate, &derived, &settings, &mut frame, Some(&headset));

        let proj = Mat4::perspective_rh_gl(1.0, 1.5, 1.0, 50.0);
        let out = solver.stereo(&proj, false, false);
        assert_eq!(out.stereo_params, Vec4::ZERO);
        assert_eq!(out.matrix, proj);
    }
}
