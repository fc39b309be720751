//! Head-tracking seam.
//!
//! The stereo projection path polls a [`HeadTracking`] implementation once per
//! projection refresh. Drivers live outside this crate; [`StaticHeadset`] is a
//! fixed-pose implementation for tests and for running without a device.

use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

/// Per-eye field of view as tangents of the half angles (all positive for a
/// normal lens).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeFov {
    pub left_tan: f32,
    pub right_tan: f32,
    pub up_tan: f32,
    pub down_tan: f32,
}

impl EyeFov {
    /// Symmetric FOV from full horizontal / vertical angles in degrees.
    #[must_use]
    pub fn symmetric(hfov_degrees: f32, vfov_degrees: f32) -> Self {
        let h = (hfov_degrees.to_radians() * 0.5).tan();
        let v = (vfov_degrees.to_radians() * 0.5).tan();
        Self {
            left_tan: h,
            right_tan: h,
            up_tan: v,
            down_tan: v,
        }
    }
}

/// Tracked head orientation and position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    /// Rotation applied to the world (already inverted for view use).
    pub orientation: Mat4,
    /// Head position in metres.
    pub position: Vec3,
}

impl Default for HeadPose {
    fn default() -> Self {
        Self {
            orientation: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// Head-mounted display capability consumed by the stereo projection path.
pub trait HeadTracking {
    fn eye_fov(&self, eye: Eye) -> EyeFov;

    /// Eye position relative to the head centre, in metres.
    fn eye_offset(&self, eye: Eye) -> Vec3;

    fn pose(&self) -> HeadPose;

    /// Vertical half-angle tangent of the display, used to size telescopes.
    fn projection_half_tan(&self) -> f32 {
        self.eye_fov(Eye::Left).up_tan
    }
}

/// Headset with a fixed FOV, interpupillary distance and pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticHeadset {
    pub fov: EyeFov,
    /// Interpupillary distance in metres.
    pub ipd: f32,
    pub pose: HeadPose,
}

impl Default for StaticHeadset {
    fn default() -> Self {
        Self {
            fov: EyeFov::symmetric(90.0, 90.0),
            ipd: 0.064,
            pose: HeadPose::default(),
        }
    }
}

impl HeadTracking for StaticHeadset {
    fn eye_fov(&self, _eye: Eye) -> EyeFov {
        self.fov
    }

    fn eye_offset(&self, eye: Eye) -> Vec3 {
        let half = self.ipd * 0.5;
        match eye {
            Eye::Left => Vec3::new(-half, 0.0, 0.0),
            Eye::Right => Vec3::new(half, 0.0, 0.0),
        }
    }

    fn pose(&self) -> HeadPose {
        self.pose
    }
}
