//! Layer classification and HUD plane placement.
//!
//! In a headset every projection the game sets up is a *layer*. The real 3D
//! scene is composed with head tracking; everything else (HUDs, menus, 2D
//! backgrounds) becomes a box floating in front of the player.

use glam::{Mat4, Vec3};

use super::matrix::{ProjectionParams, safe_div};
use crate::settings::VrSettings;

/// What the stereo path does with one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerClass {
    /// Not drawn: zero matrix, zero stereo params.
    Hidden,
    /// Mono, exactly as the game asked.
    RenderToTexture,
    /// Already covers the full view; viewport correction only.
    FullscreenCopy,
    /// Composed into the virtual world.
    Compose,
}

/// Size and placement of the box a 2D layer is drawn into, in game units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HudPlane {
    pub width: f32,
    pub height: f32,
    pub thickness: f32,
    /// Distance from the eye to depth 0 of the layer.
    pub distance: f32,
    pub up: f32,
    pub forward: f32,
    pub aim: f32,
}

/// Inputs of HUD placement that come from the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneInputs {
    /// A 3D scene has been seen recently.
    pub has_widest_3d: bool,
    pub is_skybox: bool,
    /// Horizontal / vertical FOV of the scene the layer is aligned with.
    pub hfov: f32,
    pub vfov: f32,
    pub zfar: f32,
    pub zoom_forward: f32,
    pub no_forward: bool,
    pub units_per_metre: f32,
}

impl HudPlane {
    #[must_use]
    pub fn place(settings: &VrSettings, inputs: &PlaneInputs) -> Self {
        let upm = inputs.units_per_metre;
        let half_tan = |fov: f32| (fov.to_radians() * 0.5).tan();

        match (inputs.has_widest_3d, inputs.is_skybox) {
            // Skybox far behind everything: a 90 degree sky cube face.
            (false, true) => {
                let distance = inputs.zfar * 2.0;
                Self {
                    width: distance * 2.0,
                    height: distance * 2.0,
                    thickness: 0.0,
                    distance,
                    up: settings.screen_up * upm,
                    forward: 0.0,
                    aim: distance,
                }
            }
            // Virtual screen: nothing 3D to line up with.
            (false, false) => {
                let distance = settings.screen_distance * upm;
                let height = settings.screen_height * upm;
                Self {
                    width: height * 16.0 / 9.0,
                    height,
                    thickness: settings.screen_thickness * upm,
                    distance,
                    up: settings.screen_up * upm,
                    forward: 0.0,
                    aim: distance,
                }
            }
            (true, true) => {
                let distance = inputs.zfar * 2.0;
                Self {
                    width: 2.0 * half_tan(inputs.hfov) * distance,
                    height: 2.0 * half_tan(inputs.vfov) * distance,
                    thickness: 0.0,
                    distance,
                    up: 0.0,
                    forward: 0.0,
                    aim: distance,
                }
            }
            // HUD over a 3D world, sized to cover the game's FOV at the aim distance.
            (true, false) => {
                let distance = settings.hud_distance * upm;
                let forward = if inputs.no_forward {
                    0.0
                } else {
                    (settings.camera_forward + inputs.zoom_forward) * upm
                };
                let mut aim = settings.aim_distance * upm;
                if aim <= 0.0 {
                    aim = distance;
                }
                let grow = (aim + forward) / aim;
                Self {
                    width: 2.0 * half_tan(inputs.hfov) * distance * grow,
                    height: 2.0 * half_tan(inputs.vfov) * distance * grow,
                    thickness: settings.hud_thickness * upm,
                    distance,
                    up: 0.0,
                    forward,
                    aim,
                }
            }
        }
    }

    /// Scale and translation mapping a perspective HUD element onto the plane.
    ///
    /// The element's near-plane rectangle is pushed out to `z_obj`, between
    /// its near and far planes by `hud_3d_closer`. Depth scale follows the
    /// width scale even when the element's depth range is degenerate.
    #[must_use]
    pub fn perspective_element(&self, m: &Mat4, hud_3d_closer: f32) -> (Vec3, Vec3) {
        let xx = m.x_axis.x;
        let yy = m.y_axis.y;
        let left = safe_div(-(m.z_axis.x + 1.0), xx);
        let right = left + safe_div(2.0, xx);
        let bottom = safe_div(-(m.z_axis.y + 1.0), yy);
        let top = bottom + safe_div(2.0, yy);
        let zfar = safe_div(1.0 - m.w_axis.z, m.z_axis.z);
        let znear = safe_div(-1.0 - m.w_axis.z, m.z_axis.z);
        let z_obj = znear + (zfar - znear) * hud_3d_closer;

        let (left, right, bottom, top) = (left * z_obj, right * z_obj, bottom * z_obj, top * z_obj);

        let sx = if xx == 0.0 || right == left { 0.0 } else { self.width / (right - left) };
        let sy = if yy == 0.0 || top == bottom { 0.0 } else { self.height / (top - bottom) };
        let sz = sx;

        let scale = Vec3::new(sx, sy, sz);
        let position = Vec3::new(
            sx * (-(right + left) * 0.5),
            sy * (-(top + bottom) * 0.5) + self.up,
            sz * z_obj - self.distance,
        );
        (scale, position)
    }

    /// Scale and translation mapping an orthographic layer's box onto the plane.
    #[must_use]
    pub fn flat_layer(&self, m: &Mat4, params: &ProjectionParams, invert_depth: bool) -> (Vec3, Vec3) {
        let ProjectionParams {
            left,
            right,
            bottom,
            top,
            znear,
            zfar,
            ..
        } = *params;

        let sx = if m.x_axis.x == 0.0 || right == left { 0.0 } else { self.width / (right - left) };
        let sy = if m.y_axis.y == 0.0 || top == bottom { 0.0 } else { self.height / (top - bottom) };
        let mut sz = if zfar == znear { 0.0 } else { self.thickness / (zfar - znear) };
        if invert_depth {
            sz = -sz;
        }

        let scale = Vec3::new(sx, sy, sz);
        let position = Vec3::new(
            sx * (-(right + left) * 0.5),
            sy * (-(top + bottom) * 0.5) + self.up,
            -self.distance,
        );
        (scale, position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> PlaneInputs {
        PlaneInputs {
            has_widest_3d: false,
            is_skybox: false,
            hfov: 90.0,
            vfov: 60.0,
            zfar: 100.0,
            zoom_forward: 0.0,
            no_forward: false,
            units_per_metre: 1.0,
        }
    }

    #[test]
    fn test_virtual_screen_is_16_by_9() {
        let settings = VrSettings::default();
        let plane = HudPlane::place(&settings, &inputs());
        assert_eq!(plane.height, settings.screen_height);
        assert!((plane.width - settings.screen_height * 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(plane.distance, settings.screen_distance);
    }

    #[test]
    fn test_skybox_plane_sits_behind_far_plane() {
        let settings = VrSettings::default();
        let plane = HudPlane::place(
            &settings,
            &PlaneInputs {
                is_skybox: true,
                ..inputs()
            },
        );
        assert_eq!(plane.distance, 200.0);
        assert_eq!(plane.width, 400.0);
        assert_eq!(plane.thickness, 0.0);
    }

    #[test]
    fn test_hud_over_3d_covers_scene_fov() {
        let settings = VrSettings::default();
        let plane = HudPlane::place(
            &settings,
            &PlaneInputs {
                has_widest_3d: true,
                ..inputs()
            },
        );
        // tan(45 deg) = 1, no camera forward
        assert!((plane.width - 2.0 * settings.hud_distance).abs() < 1e-5);
        assert_eq!(plane.aim, settings.aim_distance);
    }

    #[test]
    fn test_flat_layer_centers_box() {
        let plane = HudPlane {
            width: 4.0,
            height: 2.0,
            thickness: 1.0,
            distance: 3.0,
            ..Default::default()
        };
        let m = Mat4::orthographic_rh_gl(0.0, 480.0, 272.0, 0.0, 0.0, 1.0);
        let params = ProjectionParams::decompose(&m);
        let (scale, position) = plane.flat_layer(&m, &params, false);
        assert!((scale.x - 4.0 / 480.0).abs() < 1e-6);
        assert!((position.x + 2.0).abs() < 1e-5);
        assert_eq!(position.z, -3.0);

        let (inverted, _) = plane.flat_layer(&m, &params, true);
        assert_eq!(inverted.z, -scale.z);
    }

    #[test]
    fn test_degenerate_flat_layer_has_zero_scale() {
        let plane = HudPlane {
            width: 4.0,
            height: 2.0,
            thickness: 1.0,
            distance: 3.0,
            ..Default::default()
        };
        let params = ProjectionParams::default();
        let (scale, _) = plane.flat_layer(&Mat4::ZERO, &params, false);
        assert_eq!(scale, Vec3::ZERO);
    }

    #[test]
    fn test_perspective_element_depth_follows_width() {
        let plane = HudPlane {
            width: 2.0,
            height: 2.0,
            distance: 1.5,
            ..Default::default()
        };
        let m = Mat4::perspective_rh_gl(90f32.to_radians(), 1.0, 1.0, 3.0);
        let (scale, position) = plane.perspective_element(&m, 0.5);
        assert_eq!(scale.z, scale.x);
        assert!(scale.x.is_finite() && scale.x != 0.0);
        assert!(position.x.abs() < 1e-5);
    }
}
