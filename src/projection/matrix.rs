//! Projection matrix helpers.
//!
//! Matrices are `glam` column-major. The GE stores its world/view/texgen/bone
//! matrices as four 3-component columns ([`expand_4x3`]).

use glam::{Mat4, Vec3, Vec4};

use crate::settings::RenderingMode;
use crate::state::DerivedState;

/// Divisors smaller than this are treated as zero.
const DEGENERATE_EPSILON: f32 = 1e-12;

/// `num / den`, or `0.0` for a degenerate divisor.
#[inline]
#[must_use]
pub fn safe_div(num: f32, den: f32) -> f32 {
    if den.abs() < DEGENERATE_EPSILON { 0.0 } else { num / den }
}

/// A projection is perspective when its `w` output comes from `z`.
#[inline]
#[must_use]
pub fn is_perspective(m: &Mat4) -> bool {
    m.z_axis.w == -1.0 || m.z_axis.w == 1.0
}

/// Negates output component `axis` (0 = x, 1 = y, 2 = z).
#[must_use]
pub fn flip_axis(m: &Mat4, axis: usize) -> Mat4 {
    let mut out = *m;
    for col in 0..4 {
        let c = out.col_mut(col);
        c[axis] = -c[axis];
    }
    out
}

/// Scales then translates the clip-space output: `xyz' = xyz * scale + w * trans`.
#[must_use]
pub fn translate_and_scale(m: &Mat4, trans: Vec3, scale: Vec3) -> Mat4 {
    let mut out = *m;
    for col in 0..4 {
        let c = out.col_mut(col);
        c.x = c.x * scale.x + c.w * trans.x;
        c.y = c.y * scale.y + c.w * trans.y;
        c.z = c.z * scale.z + c.w * trans.z;
    }
    out
}

/// Corrects for the difference between the requested and rendered viewport.
///
/// Without buffered rendering the GL framebuffer is upside down relative to
/// the GE's, so the y offset changes sign.
#[must_use]
pub fn viewport_scale(m: &Mat4, derived: &DerivedState, mode: RenderingMode) -> Mat4 {
    let y_offset = if mode == RenderingMode::NonBuffered {
        -derived.vp_y_offset
    } else {
        derived.vp_y_offset
    };
    let trans = Vec3::new(derived.vp_x_offset, y_offset, derived.vp_z_offset * 2.0);
    let scale = Vec3::new(
        derived.vp_width_scale,
        derived.vp_height_scale,
        derived.vp_depth_scale,
    );
    translate_and_scale(m, trans, scale)
}

/// Expands a GE 4x3 matrix (four xyz columns) to a homogeneous `Mat4`.
#[must_use]
pub fn expand_4x3(m: &[f32; 12]) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(m[0], m[1], m[2], 0.0),
        Vec4::new(m[3], m[4], m[5], 0.0),
        Vec4::new(m[6], m[7], m[8], 0.0),
        Vec4::new(m[9], m[10], m[11], 1.0),
    )
}

// ─── Decomposition ────────────────────────────────────────────────────────────

/// Frustum / box parameters recovered from an OpenGL-style projection.
///
/// Perspective edges are at the near plane. FOVs are full angles in degrees
/// and keep their sign: a negative FOV means the game flipped that axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProjectionParams {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub znear: f32,
    pub zfar: f32,
    pub hfov: f32,
    pub vfov: f32,
    pub perspective: bool,
    /// The matrix looks down +z (z column negated relative to GL).
    pub left_handed: bool,
}

impl ProjectionParams {
    /// Inverts `glFrustum` / `glOrtho`. Degenerate terms yield zero.
    #[must_use]
    pub fn decompose(m: &Mat4) -> Self {
        let perspective = is_perspective(m);
        let left_handed = perspective && m.z_axis.w > 0.0;

        let xx = m.x_axis.x;
        let yy = m.y_axis.y;
        let (zx, zy, zz) = if left_handed {
            (-m.z_axis.x, -m.z_axis.y, -m.z_axis.z)
        } else {
            (m.z_axis.x, m.z_axis.y, m.z_axis.z)
        };
        let wz = m.w_axis.z;

        if perspective {
            let znear = safe_div(wz, zz - 1.0);
            let zfar = safe_div(wz, zz + 1.0);
            Self {
                left: safe_div(znear * (zx - 1.0), xx),
                right: safe_div(znear * (zx + 1.0), xx),
                bottom: safe_div(znear * (zy - 1.0), yy),
                top: safe_div(znear * (zy + 1.0), yy),
                znear,
                zfar,
                hfov: fov_degrees(xx),
                vfov: fov_degrees(yy),
                perspective,
                left_handed,
            }
        } else {
            let left = safe_div(-(m.w_axis.x + 1.0), xx);
            let bottom = safe_div(-(m.w_axis.y + 1.0), yy);
            Self {
                left,
                right: left + safe_div(2.0, xx),
                bottom,
                top: bottom + safe_div(2.0, yy),
                znear: safe_div(wz + 1.0, zz),
                zfar: safe_div(wz - 1.0, zz),
                hfov: 0.0,
                vfov: 0.0,
                perspective,
                left_handed,
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn flip_x(&self) -> bool {
        if self.perspective { self.hfov < 0.0 } else { self.right < self.left }
    }

    #[inline]
    #[must_use]
    pub fn flip_y(&self) -> bool {
        if self.perspective { self.vfov < 0.0 } else { self.top < self.bottom }
    }
}

/// Full FOV in degrees for a projection scale term.
fn fov_degrees(scale: f32) -> f32 {
    if scale.abs() < DEGENERATE_EPSILON {
        return 0.0;
    }
    2.0 * (1.0 / scale).atan().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() <= 1e-4 * b.abs().max(1.0)
    }

    #[test]
    fn test_perspective_round_trip() {
        let m = Mat4::perspective_rh_gl(60f32.to_radians(), 16.0 / 9.0, 0.5, 250.0);
        let p = ProjectionParams::decompose(&m);
        assert!(p.perspective);
        assert!(!p.left_handed);
        assert!(close(p.vfov, 60.0));
        assert!(close(p.znear, 0.5));
        assert!(close(p.zfar, 250.0));
        assert!(close(p.right, -p.left));
        assert!(!p.flip_x());
    }

    #[test]
    fn test_left_handed_perspective_round_trip() {
        let m = Mat4::perspective_lh(45f32.to_radians(), 1.5, 1.0, 100.0);
        let p = ProjectionParams::decompose(&m);
        assert!(p.perspective);
        assert!(p.left_handed);
        assert!(close(p.vfov, 45.0));
    }

    #[test]
    fn test_ortho_round_trip() {
        let m = Mat4::orthographic_rh_gl(-2.0, 6.0, -1.0, 3.0, 0.5, 20.0);
        let p = ProjectionParams::decompose(&m);
        assert!(!p.perspective);
        assert!(close(p.left, -2.0));
        assert!(close(p.right, 6.0));
        assert!(close(p.bottom, -1.0));
        assert!(close(p.top, 3.0));
        assert!(close(p.znear, 0.5));
        assert!(close(p.zfar, 20.0));
        assert_eq!(p.hfov, 0.0);
    }

    #[test]
    fn test_degenerate_matrix_yields_zero_terms() {
        let p = ProjectionParams::decompose(&Mat4::ZERO);
        assert_eq!(p.left, 0.0);
        assert_eq!(p.znear, 0.0);
        assert!(p.left.is_finite() && p.right.is_finite() && p.top.is_finite());
    }

    #[test]
    fn test_flip_axis_negates_output_row() {
        let m = Mat4::perspective_rh_gl(1.0, 1.0, 1.0, 10.0);
        let flipped = flip_axis(&m, 1);
        assert_eq!(flipped.y_axis.y, -m.y_axis.y);
        assert_eq!(flipped.x_axis.x, m.x_axis.x);
        assert!(ProjectionParams::decompose(&flipped).flip_y());
    }

    #[test]
    fn test_translate_and_scale_matches_composition() {
        let m = Mat4::perspective_rh_gl(1.0, 1.3, 1.0, 10.0);
        let trans = Vec3::new(0.25, -0.5, 0.1);
        let scale = Vec3::new(2.0, 0.5, 1.0);
        let expected = Mat4::from_translation(trans) * Mat4::from_scale(scale) * m;
        let actual = translate_and_scale(&m, trans, scale);
        assert!(actual.abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_expand_4x3_places_translation() {
        let mut m = [0.0; 12];
        m[0] = 1.0;
        m[4] = 1.0;
        m[8] = 1.0;
        m[9] = 5.0;
        m[11] = -2.0;
        let full = expand_4x3(&m);
        assert_eq!(full.transform_point3(Vec3::ZERO), Vec3::new(5.0, 0.0, -2.0));
    }
}
