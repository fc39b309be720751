//! Uniform Refresh Integration Tests
//!
//! Tests for:
//! - Fog coefficient sanitization and once-per-run anomaly reporting
//! - Through-mode and clear-mode projections
//! - Skinning uploads (whole array vs single bones)
//! - Lighting uploads, stencil replace value, skybox detection
//! - Free-look propagation to every program

mod common;

use common::Harness;
use ge_shaders::gpu::UniformValue;
use ge_shaders::projection::flip_axis;
use ge_shaders::shader::DirtyUniforms;
use ge_shaders::state::vertex_format::format;
use ge_shaders::state::{AnomalyClass, LightKind, PrimitiveKind, VertexFormat, to_float24};
use glam::{Mat4, Vec2, Vec3};

const TRIANGLES: PrimitiveKind = PrimitiveKind::Triangles;

fn assert_vec3_near(value: Option<&UniformValue>, expected: Vec3) {
    match value {
        Some(UniformValue::Vec3(v)) => {
            assert!((*v - expected).length() < 1e-5, "{v} != {expected}");
        }
        other => panic!("expected a vec3 upload, got {other:?}"),
    }
}

// ============================================================================
// Fog
// ============================================================================

#[test]
fn infinite_fog_slope_is_clamped() {
    let mut h = Harness::new();
    h.gstate.fog_enabled = true;
    h.gstate.fog1 = to_float24(50.0);
    h.gstate.fog2 = to_float24(f32::INFINITY);

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    assert_eq!(
        h.device().last_upload("u_fogcoef"),
        Some(&UniformValue::Vec2(Vec2::new(50.0, 10000.0)))
    );
}

#[test]
fn nan_fog_slope_moves_fog_far_away() {
    let mut h = Harness::new();
    h.gstate.fog_enabled = true;
    h.gstate.fog1 = to_float24(50.0);
    h.gstate.fog2 = to_float24(f32::NAN);

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    assert_eq!(
        h.device().last_upload("u_fogcoef"),
        Some(&UniformValue::Vec2(Vec2::new(100_000.0, 1.0)))
    );
}

#[test]
fn non_finite_fog_end_is_reported_once() {
    let mut h = Harness::new();
    h.gstate.fog_enabled = true;
    h.gstate.fog1 = to_float24(f32::INFINITY);
    h.gstate.fog2 = to_float24(1.0);

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    // Already reported by the refresh.
    assert!(!h.frame.report_anomaly(AnomalyClass::FOG_NAN_INF));
    assert!(h.frame.report_anomaly(AnomalyClass::DEGENERATE_PROJECTION));
}

// ============================================================================
// Projection modes
// ============================================================================

#[test]
fn through_mode_uploads_render_target_ortho() {
    let mut h = Harness::new();
    h.gstate.through_mode = true;

    h.draw(PrimitiveKind::Rectangles, VertexFormat::new().with_through()).unwrap();

    let ortho = Mat4::orthographic_rh_gl(0.0, 480.0, 272.0, 0.0, 0.0, 1.0);
    assert_eq!(
        h.device().last_upload("u_proj_through"),
        Some(&UniformValue::Mat4(flip_axis(&ortho, 1)))
    );
    assert_eq!(h.device().upload_count("u_proj"), 0);
}

#[test]
fn clear_mode_defers_projection() {
    let mut h = Harness::new();
    h.gstate.clear_mode = true;

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    assert_eq!(h.device().upload_count("u_proj"), 0);

    // Still pending: written by the first non-clear draw.
    h.gstate.clear_mode = false;
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    assert_eq!(h.device().upload_count("u_proj"), 1);
}

#[test]
fn projection_change_is_uploaded_once() {
    let mut h = Harness::new();
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    h.gstate.proj_matrix = Mat4::perspective_rh_gl(1.2, 480.0 / 272.0, 1.0, 1000.0);
    h.manager.mark_dirty(DirtyUniforms::PROJ_MATRIX);
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    assert_eq!(h.device().upload_count("u_proj"), 2);
}

#[test]
fn free_look_reaches_every_program() {
    let mut h = Harness::new();
    let plain = VertexFormat::new();
    let lit = VertexFormat::new().with_normal(format::FLOAT);
    h.draw(TRIANGLES, plain).unwrap();
    h.draw(TRIANGLES, lit).unwrap();
    h.device_mut().reset_counters();

    h.frame.set_free_look(Vec3::new(0.5, 0.0, 0.0));
    h.draw(TRIANGLES, lit).unwrap();
    assert_eq!(h.device().upload_count("u_proj"), 1);
    assert!(!h.frame.free_look_changed);

    h.draw(TRIANGLES, plain).unwrap();
    assert_eq!(h.device().upload_count("u_proj"), 2);

    h.draw(TRIANGLES, lit).unwrap();
    assert_eq!(h.device().upload_count("u_proj"), 2);
}

// ============================================================================
// Skinning
// ============================================================================

#[test]
fn all_dirty_bones_go_up_as_one_array() {
    let mut h = Harness::new();
    let skinned = VertexFormat::new().with_weights(format::FLOAT, 4);

    h.draw(TRIANGLES, skinned).unwrap();

    match h.device().last_upload("u_bone0") {
        Some(UniformValue::Mat4Array(values)) => assert_eq!(values.len(), 4 * 16),
        other => panic!("expected one array upload, got {other:?}"),
    }
    assert_eq!(h.device().upload_count("u_bone1"), 0);
}

#[test]
fn single_dirty_bone_is_uploaded_alone() {
    let mut h = Harness::new();
    let skinned = VertexFormat::new().with_weights(format::FLOAT, 4);
    h.draw(TRIANGLES, skinned).unwrap();
    h.device_mut().reset_counters();

    h.gstate.bone_matrices[2][9] = 3.0;
    h.manager.mark_dirty(DirtyUniforms::bone(2));
    h.draw(TRIANGLES, skinned).unwrap();

    assert_eq!(h.device().upload_count("u_bone0"), 0);
    assert_eq!(h.device().upload_count("u_bone2"), 1);
    match h.device().last_upload("u_bone2") {
        Some(UniformValue::Mat4(m)) => assert_eq!(m.w_axis.x, 3.0),
        other => panic!("expected a mat4 upload, got {other:?}"),
    }
}

// ============================================================================
// Lighting & misc
// ============================================================================

#[test]
fn directional_light_position_is_normalized() {
    let mut h = Harness::new();
    h.gstate.lighting_enabled = true;
    h.gstate.lights[0].enabled = true;
    h.gstate.lights[0].kind = LightKind::Directional;
    h.gstate.lights[0].position = [to_float24(0.0), to_float24(3.0), to_float24(4.0)];

    h.draw(TRIANGLES, VertexFormat::new().with_normal(format::FLOAT)).unwrap();

    assert_vec3_near(h.device().last_upload("u_lightpos0"), Vec3::new(0.0, 0.6, 0.8));
}

#[test]
fn zero_length_directional_light_is_left_alone() {
    let mut h = Harness::new();
    h.gstate.lighting_enabled = true;
    h.gstate.lights[0].enabled = true;
    h.gstate.lights[0].position = [0; 3];

    h.draw(TRIANGLES, VertexFormat::new().with_normal(format::FLOAT)).unwrap();

    assert_vec3_near(h.device().last_upload("u_lightpos0"), Vec3::ZERO);
}

#[test]
fn point_light_position_is_passed_through() {
    let mut h = Harness::new();
    h.gstate.lighting_enabled = true;
    h.gstate.lights[0].enabled = true;
    h.gstate.lights[0].kind = LightKind::Point;
    h.gstate.lights[0].position = [to_float24(0.0), to_float24(3.0), to_float24(4.0)];

    h.draw(TRIANGLES, VertexFormat::new().with_normal(format::FLOAT)).unwrap();

    assert_vec3_near(h.device().last_upload("u_lightpos0"), Vec3::new(0.0, 3.0, 4.0));
}

#[test]
fn stencil_replace_value_is_normalized() {
    let mut h = Harness::new();
    h.gstate.stencil_test_ref = 0xFF;

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();

    assert_eq!(
        h.device().last_upload("u_stencilReplaceValue"),
        Some(&UniformValue::Float(1.0))
    );
}

#[test]
fn camera_at_origin_is_detected_as_skybox() {
    let mut h = Harness::new();
    h.settings.detect_skybox = true;

    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    assert!(h.frame.is_skybox);

    h.gstate.view_matrix[11] = -5.0;
    h.manager.mark_dirty(DirtyUniforms::VIEW_MATRIX);
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    assert!(!h.frame.is_skybox);
}

#[test]
fn skybox_detection_is_off_by_default() {
    let mut h = Harness::new();
    h.draw(TRIANGLES, VertexFormat::new()).unwrap();
    assert!(!h.frame.is_skybox);
}
