//! Per-frame render context.
//!
//! State that lives across draws but is scoped to one emulated frame: the
//! widest perspective FOV seen (used to line 2D layers up with the 3D world),
//! skybox flags, the layer counter, free-look input and camera stabilization.
//!
//! The frame boundary is explicit. Call [`FrameContext::end_frame`] after the
//! last draw of a frame and [`FrameContext::begin_frame`] before the first
//! draw of the next one.

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::projection::{CameraStabilization, ProjectionParams};

/// Number of projections per frame remembered for new-scene detection.
pub const SCENE_SIGNATURE_SLOTS: usize = 64;

/// Period of the selected-layer flash, in frames.
pub const FLASH_PERIOD: u32 = 10;

/// FOV and depth range of one perspective projection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FovSample {
    /// Horizontal FOV in degrees (0 = unset).
    pub hfov: f32,
    pub vfov: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl FovSample {
    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.hfov > 0.0
    }
}

/// What the current viewport is being used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ViewportType {
    #[default]
    Fullscreen,
    Letterboxed,
    HudElement,
    Offscreen,
    RenderToTexture,
    /// Split-screen quadrant of player 0..=3.
    Player(u8),
    Skybox,
}

impl ViewportType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fullscreen => "Fullscreen",
            Self::Letterboxed => "Letterboxed",
            Self::HudElement => "HUD element",
            Self::Offscreen => "Offscreen",
            Self::RenderToTexture => "Render to Texture",
            Self::Player(0) => "Player 1",
            Self::Player(1) => "Player 2",
            Self::Player(2) => "Player 3",
            Self::Player(3) => "Player 4",
            Self::Player(_) => "Error",
            Self::Skybox => "Skybox",
        }
    }
}

bitflags! {
    /// Numeric anomaly classes that are logged at most once per run.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct AnomalyClass: u32 {
        const FOG_NAN_INF            = 1 << 0;
        const DEGENERATE_PROJECTION  = 1 << 1;
    }
}

/// Explicit per-frame context shared by every draw of a frame.
#[derive(Debug, Clone)]
pub struct FrameContext {
    // === Widest 3D FOV ===
    /// Persisted across frames; what 2D layers are aligned with.
    pub widest_3d: FovSample,
    /// Layer index that produced `widest_3d`, when known.
    pub widest_3d_layer: Option<u32>,
    pub this_frame_widest: FovSample,
    pub this_frame_has_3d: bool,
    pub last_frame_had_3d: bool,

    // === Layer classification ===
    pub is_skybox: bool,
    pub is_skyplane: bool,
    pub viewport_type: ViewportType,
    /// Hide everything (e.g. while loading).
    pub black_screen: bool,
    /// Projections seen so far this frame.
    pub layer_count: u32,
    pub flash_state: u32,

    // === Change tracking ===
    pub frame_changed: bool,
    free_look: Vec3,
    pub free_look_changed: bool,

    // === New-scene detection ===
    pub new_scene: bool,
    next_scene: bool,
    scene_signatures: Vec<[f32; 7]>,

    // === Camera ===
    /// Camera orientation constants have been read from the first 3D draw.
    pub had_3d_already: bool,
    pub stabilization: CameraStabilization,

    reported: AnomalyClass,
}

impl Default for FrameContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            widest_3d: FovSample::default(),
            widest_3d_layer: None,
            this_frame_widest: FovSample::default(),
            this_frame_has_3d: false,
            last_frame_had_3d: false,
            is_skybox: false,
            is_skyplane: false,
            viewport_type: ViewportType::Fullscreen,
            black_screen: false,
            layer_count: 0,
            flash_state: 0,
            frame_changed: true,
            free_look: Vec3::ZERO,
            free_look_changed: true,
            new_scene: false,
            next_scene: false,
            scene_signatures: vec![[0.0; 7]; SCENE_SIGNATURE_SLOTS],
            had_3d_already: false,
            stabilization: CameraStabilization::default(),
            reported: AnomalyClass::empty(),
        }
    }

    // ── Frame boundary ───────────────────────────────────────────────────────

    /// Resets frame-scoped values. Must run before the first draw of a frame.
    pub fn begin_frame(&mut self) {
        self.frame_changed = true;
        self.layer_count = 0;
        self.this_frame_has_3d = false;
        self.this_frame_widest = FovSample::default();
        self.had_3d_already = false;
        self.is_skybox = false;
        self.is_skyplane = false;
        self.flash_state = (self.flash_state + 1) % FLASH_PERIOD;
    }

    /// Commits this frame's widest FOV into the persisted value.
    ///
    /// A HUD only falls back to a plain 2D screen after two frames without 3D,
    /// which avoids flicker in games that alternate.
    pub fn end_frame(&mut self) {
        self.new_scene = self.next_scene;
        self.next_scene = false;
        if self.new_scene {
            log::debug!("new scene detected after {} layers", self.layer_count);
            self.widest_3d_layer = None;
        }

        if !self.this_frame_has_3d && !self.last_frame_had_3d {
            self.widest_3d = FovSample::default();
        } else if self.this_frame_widest.is_set() {
            self.widest_3d = self.this_frame_widest;
        }
        self.last_frame_had_3d = self.this_frame_has_3d;
    }

    // ── Free look ────────────────────────────────────────────────────────────

    #[inline]
    #[must_use]
    pub fn free_look(&self) -> Vec3 {
        self.free_look
    }

    /// Sets the free-look translation in metres.
    pub fn set_free_look(&mut self, translation: Vec3) {
        if translation != self.free_look {
            self.free_look = translation;
            self.free_look_changed = true;
        }
    }

    // ── Layers ───────────────────────────────────────────────────────────────

    /// Index of the most recently recorded projection in this frame.
    #[inline]
    #[must_use]
    pub fn current_layer(&self) -> Option<u32> {
        self.layer_count.checked_sub(1)
    }

    /// Records one game projection: feeds the widest-FOV accumulator and the
    /// new-scene detector, then advances the layer counter.
    ///
    /// `max_hfov` is the widest horizontal FOV, in degrees, still accepted as
    /// a 3D scene.
    pub fn record_projection(&mut self, matrix: &Mat4, params: &ProjectionParams, max_hfov: f32) {
        let signature = if params.perspective {
            [
                matrix.x_axis.x,
                matrix.z_axis.x,
                matrix.y_axis.y,
                matrix.z_axis.y,
                matrix.z_axis.z,
                matrix.w_axis.z,
                matrix.z_axis.w,
            ]
        } else {
            [
                matrix.x_axis.x,
                matrix.w_axis.x,
                matrix.y_axis.y,
                matrix.w_axis.y,
                matrix.z_axis.z,
                matrix.w_axis.z,
                matrix.z_axis.w,
            ]
        };

        if params.perspective {
            let sample = FovSample {
                hfov: params.hfov.abs(),
                vfov: params.vfov.abs(),
                znear: params.znear.abs(),
                zfar: params.zfar.abs(),
            };
            let square = matrix.y_axis.y.abs() == matrix.x_axis.x.abs();
            self.offer_fov(sample, square, max_hfov);
        }

        let slot = self.layer_count as usize;
        if slot < SCENE_SIGNATURE_SLOTS {
            if self.new_scene {
                self.next_scene = false;
            } else if self.scene_signatures[slot] != signature {
                self.scene_signatures[slot] = signature;
                self.next_scene = true;
            }
        }
        self.layer_count += 1;
    }

    /// Offers a perspective sample to the widest-FOV accumulator.
    ///
    /// A candidate must be wider than this frame's widest, no wider than
    /// `max_hfov`, and not have equal x/y scales (`square`), which marks
    /// shadow maps and other non-scene projections.
    pub fn offer_fov(&mut self, sample: FovSample, square: bool, max_hfov: f32) {
        let plausible = sample.hfov <= max_hfov && !square;
        if plausible && sample.hfov > self.this_frame_widest.hfov {
            self.this_frame_widest = sample;
            if sample.hfov > self.widest_3d.hfov {
                self.widen(sample);
            }
        }
        if self.new_scene && plausible && sample.hfov > self.widest_3d.hfov {
            self.widen(sample);
        }
    }

    fn widen(&mut self, sample: FovSample) {
        log::debug!(
            "widest 3D FOV now {:.2}x{:.2} deg (layer {}), n={} f={}",
            sample.hfov,
            sample.vfov,
            self.layer_count,
            sample.znear,
            sample.zfar
        );
        self.widest_3d = sample;
        self.widest_3d_layer = Some(self.layer_count);
    }

    // ── Anomalies ────────────────────────────────────────────────────────────

    /// Returns `true` the first time `class` is reported in this context.
    pub fn report_anomaly(&mut self, class: AnomalyClass) -> bool {
        let first = !self.reported.contains(class);
        self.reported |= class;
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX_HFOV: f32 = 125.0;

    fn perspective(hfov_degrees: f32, aspect: f32) -> (Mat4, ProjectionParams) {
        let vfov = 2.0 * ((hfov_degrees.to_radians() * 0.5).tan() / aspect).atan();
        let m = Mat4::perspective_rh_gl(vfov, aspect, 1.0, 100.0);
        let params = ProjectionParams::decompose(&m);
        (m, params)
    }

    #[test]
    fn test_widest_fov_keeps_maximum() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        for h in [30.0, 75.0, 50.0] {
            let (m, p) = perspective(h, 16.0 / 9.0);
            frame.record_projection(&m, &p, MAX_HFOV);
        }
        frame.this_frame_has_3d = true;
        frame.end_frame();

        assert!((frame.widest_3d.hfov - 75.0).abs() < 1e-3);
        assert_eq!(frame.layer_count, 3);
    }

    #[test]
    fn test_implausible_fov_is_ignored() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        let (m, p) = perspective(170.0, 16.0 / 9.0);
        frame.record_projection(&m, &p, MAX_HFOV);
        frame.end_frame();
        assert_eq!(frame.widest_3d.hfov, 0.0);
    }

    #[test]
    fn test_fov_ceiling_is_caller_supplied() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        let (m, p) = perspective(100.0, 16.0 / 9.0);
        frame.record_projection(&m, &p, 90.0);
        assert!(!frame.this_frame_widest.is_set());

        frame.record_projection(&m, &p, MAX_HFOV);
        assert!((frame.this_frame_widest.hfov - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_square_projection_is_not_a_candidate() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        let (m, p) = perspective(60.0, 1.0);
        frame.record_projection(&m, &p, MAX_HFOV);
        assert_eq!(frame.this_frame_widest.hfov, 0.0);
    }

    #[test]
    fn test_widest_resets_after_two_frames_without_3d() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        let (m, p) = perspective(60.0, 16.0 / 9.0);
        frame.record_projection(&m, &p, MAX_HFOV);
        frame.this_frame_has_3d = true;
        frame.end_frame();
        assert!(frame.widest_3d.is_set());

        // One frame without 3D keeps the remembered value.
        frame.begin_frame();
        frame.end_frame();
        assert!(frame.widest_3d.is_set());

        frame.begin_frame();
        frame.end_frame();
        assert!(!frame.widest_3d.is_set());
    }

    #[test]
    fn test_changed_projection_flags_new_scene() {
        let mut frame = FrameContext::new();
        let (m, p) = perspective(60.0, 16.0 / 9.0);

        frame.begin_frame();
        frame.record_projection(&m, &p, MAX_HFOV);
        frame.end_frame();
        assert!(frame.new_scene);

        frame.begin_frame();
        frame.record_projection(&m, &p, MAX_HFOV);
        frame.end_frame();
        frame.begin_frame();
        frame.record_projection(&m, &p, MAX_HFOV);
        frame.end_frame();
        assert!(!frame.new_scene);
    }

    #[test]
    fn test_skybox_flags_are_frame_scoped() {
        let mut frame = FrameContext::new();
        frame.begin_frame();
        frame.is_skybox = true;
        frame.is_skyplane = true;
        frame.end_frame();

        frame.begin_frame();
        assert!(!frame.is_skybox);
        assert!(!frame.is_skyplane);
    }

    #[test]
    fn test_free_look_change_tracking() {
        let mut frame = FrameContext::new();
        frame.free_look_changed = false;
        frame.set_free_look(Vec3::ZERO);
        assert!(!frame.free_look_changed);
        frame.set_free_look(Vec3::X);
        assert!(frame.free_look_changed);
    }

    #[test]
    fn test_anomaly_reported_once() {
        let mut frame = FrameContext::new();
        assert!(frame.report_anomaly(AnomalyClass::FOG_NAN_INF));
        assert!(!frame.report_anomaly(AnomalyClass::FOG_NAN_INF));
        assert!(frame.report_anomaly(AnomalyClass::DEGENERATE_PROJECTION));
    }
}
