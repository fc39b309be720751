//! Render & VR Settings
//!
//! This module defines the user-facing configuration read by the shader core.
//!
//! Two groups are provided:
//!
//! - [`RenderSettings`]: options that change how uniforms are computed in
//!   every mode (framebuffer mode, UV prescaling, skybox detection).
//! - [`VrSettings`]: options consumed by the stereoscopic projection path
//!   (distances in metres, FOV limits, stabilization toggles, hacks).
//!
//! Settings that change *generated shader source* must be followed by
//! [`ShaderManager::clear_cache`](crate::shader::ShaderManager::clear_cache).
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ge_shaders::settings::{RenderSettings, VrSettings};
//!
//! let settings = RenderSettings {
//!     vr: VrSettings {
//!         enabled: true,
//!         hud_distance: 2.0,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//!
//! // Or from a JSON fragment; missing fields take their defaults.
//! let settings = RenderSettings::from_json(r#"{ "vr": { "enabled": true } }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ---------------------------------------------------------------------------
// RenderingMode
// ---------------------------------------------------------------------------

/// How the emulated framebuffer is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderingMode {
    /// Draw directly to the backbuffer. GL's inverted Y has to be undone in
    /// the viewport offset.
    NonBuffered,
    /// Draw to framebuffer objects. Projections get an extra Y flip.
    #[default]
    Buffered,
}

impl RenderingMode {
    #[inline]
    #[must_use]
    pub fn is_buffered(self) -> bool {
        matches!(self, Self::Buffered)
    }
}

// ---------------------------------------------------------------------------
// VR enums
// ---------------------------------------------------------------------------

/// What to do with skyboxes to reduce motion sickness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionSicknessSkybox {
    /// Draw the skybox normally.
    #[default]
    Normal,
    /// Don't draw the skybox at all.
    Hide,
    /// Lock the skybox to the real world (camera stabilization is skipped).
    Lock,
}

/// Rotation of the emulated screen inside the headset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenRotation {
    #[default]
    LockedHorizontal,
    LockedVertical,
    Auto,
}

// ---------------------------------------------------------------------------
// VrSettings
// ---------------------------------------------------------------------------

/// Configuration of the stereoscopic projection path.
///
/// Distances are in metres and converted to game units with
/// [`game_units_per_metre`](Self::game_units_per_metre).
/// Angles are in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VrSettings {
    // === Master switch ===
    /// Render in VR when a head-tracking device is available.
    pub enabled: bool,
    /// Emit stereo through a geometry stage (zeroes the left eye's off-axis term).
    pub geometry_shader_stereo: bool,

    // === World scale ===
    /// Game units per real-world metre.
    pub units_per_metre: f32,
    /// Player scale. Larger values make the world appear smaller.
    pub scale: f32,

    // === Layers ===
    /// Render orthographic layers as fullscreen copies (no stereo).
    pub hud_fullscreen: bool,
    /// Draw 2D layers on top of the 3D world.
    pub hud_on_top: bool,
    /// Layer index to flash for debugging, if any.
    pub selected_layer: Option<u32>,
    /// Treat 2D layers drawn before the first 3D draw as a background plane.
    pub before_3d_is_background: bool,
    /// Which split-screen player is shown in the headset.
    pub vr_player: u32,
    pub motion_sickness_skybox: MotionSicknessSkybox,
    pub screen_rotation: ScreenRotation,

    // === HUD placement ===
    pub hud_distance: f32,
    pub hud_thickness: f32,
    /// Fraction of the 3D HUD depth range where HUD objects sit (0 = near plane).
    pub hud_3d_closer: f32,
    pub invert_2d_through_depth: bool,
    pub invert_2d_ortho_depth: bool,

    // === 2D screen placement (no 3D seen yet) ===
    pub screen_distance: f32,
    pub screen_height: f32,
    pub screen_thickness: f32,
    pub screen_up: f32,
    pub screen_pitch: f32,

    // === Camera ===
    pub camera_forward: f32,
    pub camera_pitch: f32,
    pub aim_distance: f32,
    /// Narrowest horizontal FOV before the camera gets dollied forward.
    pub min_fov: f32,
    /// Widest horizontal FOV still accepted as a 3D scene. Wider projections
    /// are ignored when lining 2D layers up with the world.
    pub max_scene_fov: f32,
    pub lean_back_angle: f32,

    // === Telescope hack ===
    /// Bit 0 = left eye, bit 1 = right eye.
    pub telescope_eye: u32,
    pub telescope_max_fov: f32,

    // === Head tracking ===
    pub orientation_tracking: bool,
    pub position_tracking: bool,

    // === Camera stabilization ===
    pub can_read_camera_angles: bool,
    pub stabilize_pitch: bool,
    pub stabilize_roll: bool,
    pub stabilize_yaw: bool,
    pub stabilize_x: bool,
    pub stabilize_y: bool,
    pub stabilize_z: bool,
    /// Extra pitch applied to the game camera before reading angles.
    pub read_pitch: f32,
    pub keyhole: bool,
    pub keyhole_width: f32,
    pub keyhole_snap: bool,
    pub keyhole_snap_size: f32,
}

impl Default for VrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            geometry_shader_stereo: true,
            units_per_metre: 1.0,
            scale: 1.0,
            hud_fullscreen: false,
            hud_on_top: false,
            selected_layer: None,
            before_3d_is_background: false,
            vr_player: 0,
            motion_sickness_skybox: MotionSicknessSkybox::Normal,
            screen_rotation: ScreenRotation::LockedHorizontal,
            hud_distance: 1.5,
            hud_thickness: 0.5,
            hud_3d_closer: 0.5,
            invert_2d_through_depth: false,
            invert_2d_ortho_depth: false,
            screen_distance: 1.5,
            screen_height: 2.0,
            screen_thickness: 0.5,
            screen_up: 0.0,
            screen_pitch: 0.0,
            camera_forward: 0.0,
            camera_pitch: 0.0,
            aim_distance: 7.0,
            min_fov: 10.0,
            max_scene_fov: 125.0,
            lean_back_angle: 0.0,
            telescope_eye: 0,
            telescope_max_fov: 30.0,
            orientation_tracking: true,
            position_tracking: true,
            can_read_camera_angles: false,
            stabilize_pitch: false,
            stabilize_roll: false,
            stabilize_yaw: false,
            stabilize_x: false,
            stabilize_y: false,
            stabilize_z: false,
            read_pitch: 0.0,
            keyhole: false,
            keyhole_width: 45.0,
            keyhole_snap: false,
            keyhole_snap_size: 30.0,
        }
    }
}

impl VrSettings {
    /// Game units per metre after applying the player scale.
    #[inline]
    #[must_use]
    pub fn game_units_per_metre(&self) -> f32 {
        self.units_per_metre / self.scale
    }

    #[inline]
    #[must_use]
    pub fn stabilizes_rotation(&self) -> bool {
        self.stabilize_pitch || self.stabilize_roll || self.stabilize_yaw
    }

    #[inline]
    #[must_use]
    pub fn stabilizes_position(&self) -> bool {
        self.stabilize_x || self.stabilize_y || self.stabilize_z
    }
}

// ---------------------------------------------------------------------------
// RenderSettings
// ---------------------------------------------------------------------------

/// Global configuration read while refreshing uniforms.
///
/// | Field                | Description                                  | Default    |
/// |----------------------|----------------------------------------------|------------|
/// | `rendering_mode`     | Framebuffer presentation mode                | `Buffered` |
/// | `hardware_transform` | Transform vertices in the vertex stage       | `true`     |
/// | `prescale_uv`        | UVs are prescaled by the vertex decoder      | `false`    |
/// | `detect_skybox`      | Camera-at-origin draws are treated as skybox | `false`    |
/// | `vr`                 | Stereoscopic projection configuration        | disabled   |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub rendering_mode: RenderingMode,
    pub hardware_transform: bool,
    pub prescale_uv: bool,
    pub detect_skybox: bool,
    pub vr: VrSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            rendering_mode: RenderingMode::Buffered,
            hardware_transform: true,
            prescale_uv: false,
            detect_skybox: false,
            vr: VrSettings::default(),
        }
    }
}

impl RenderSettings {
    /// Parses settings from JSON. Missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        // Plain data; serialization cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
