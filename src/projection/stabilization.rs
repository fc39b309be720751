//! Camera orientation stabilization.
//!
//! Some games swing their camera independently of the player's head, which is
//! uncomfortable in a headset. When the game's camera angles can be read from
//! its view matrix, the stereo path cancels selected axes of that rotation.
//!
//! Yaw can additionally go through a *keyhole*: a window of `keyhole_width`
//! degrees inside which game yaw is cancelled. When the game turns past the
//! window edge the window follows, optionally snapping by `keyhole_snap_size`
//! degrees so the view turns in visible steps instead of continuously.

use std::f32::consts::{PI, TAU};

use glam::{EulerRot, Mat3, Mat4, Quat, Vec3};

use super::matrix::expand_4x3;
use crate::settings::VrSettings;

/// Roll beyond this is read as an upside-down camera (menus, cutscenes).
const UPSIDE_DOWN_ROLL_DEGREES: f32 = 160.0;

/// Rotation and translation read from the game camera on the first 3D draw of
/// a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraStabilization {
    pub rotation: Mat4,
    /// Camera position to cancel, in metres.
    pub position: Vec3,
    keyhole_center: f32,
}

impl Default for CameraStabilization {
    fn default() -> Self {
        Self {
            rotation: Mat4::IDENTITY,
            position: Vec3::ZERO,
            keyhole_center: 0.0,
        }
    }
}

impl CameraStabilization {
    /// Keyhole window centre in radians.
    #[inline]
    #[must_use]
    pub fn keyhole_center(&self) -> f32 {
        self.keyhole_center
    }

    fn reset(&mut self) {
        self.rotation = Mat4::IDENTITY;
        self.position = Vec3::ZERO;
    }

    /// Reads the game camera orientation from its 4x3 view matrix.
    pub fn update(&mut self, view: &[f32; 12], settings: &VrSettings) {
        let active = settings.can_read_camera_angles
            && (settings.stabilizes_rotation() || settings.stabilizes_position());
        if !active {
            self.reset();
            return;
        }

        let mut rot = Mat3::from_mat4(expand_4x3(view));
        let scale = rot.x_axis.length();
        if scale > f32::EPSILON {
            rot *= 1.0 / scale;
        }
        if settings.read_pitch != 0.0 {
            rot *= Mat3::from_rotation_x(settings.read_pitch.to_radians());
        }

        let (mut yaw, pitch, roll) =
            Quat::from_mat3(&rot.transpose()).to_euler(EulerRot::YXZ);

        if roll.abs() > UPSIDE_DOWN_ROLL_DEGREES.to_radians() {
            self.reset();
            return;
        }

        if settings.keyhole {
            yaw = self.clamp_to_keyhole(yaw, settings);
        }

        let mut rotation = Mat4::IDENTITY;
        if settings.stabilize_yaw {
            rotation *= Mat4::from_rotation_y(yaw);
        }
        if settings.stabilize_pitch {
            rotation *= Mat4::from_rotation_x(-pitch);
        }
        if settings.stabilize_roll {
            rotation *= Mat4::from_rotation_z(-roll);
        }
        self.rotation = rotation;
        self.position = Vec3::ZERO;
    }

    /// Moves the keyhole window to contain `yaw` and returns the yaw left to
    /// cancel, relative to the window centre.
    fn clamp_to_keyhole(&mut self, yaw: f32, settings: &VrSettings) -> f32 {
        let half_width = (settings.keyhole_width * 0.5).to_radians();
        let snap = if settings.keyhole_snap {
            settings.keyhole_snap_size.to_radians()
        } else {
            0.0
        };

        let offset = wrap_angle(yaw - self.keyhole_center);
        if offset < -half_width {
            self.keyhole_center = wrap_angle(yaw + half_width - snap);
        } else if offset > half_width {
            self.keyhole_center = wrap_angle(yaw - half_width + snap);
        }
        wrap_angle(yaw - self.keyhole_center)
    }
}

/// Wraps an angle into `[-PI, PI)`.
fn wrap_angle(angle: f32) -> f32 {
    (angle + PI).rem_euclid(TAU) - PI
}
