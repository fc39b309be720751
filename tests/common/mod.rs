//! Shared fixtures for the integration tests.
//!
//! [`DeclaringGenerator`] emits just enough GLSL-shaped text for
//! [`RecordingDevice`] to see which uniforms and attributes each identity
//! declares. Hardware-transform vertex sources carry the line `// hwtransform`
//! so tests can make exactly those fail to compile.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fmt::Write;
use std::rc::Rc;

use ge_shaders::gpu::{CollectingDiagnostics, RecordingDevice};
use ge_shaders::shader::{
    DrawContext, FragmentShaderId, ProgramId, ShaderManager,
    ShaderSourceGenerator, VertexShaderId,
};
use ge_shaders::state::{
    DerivedState, FrameContext, GpuState, HeadTracking, PrimitiveKind, VertexFormat,
};
use ge_shaders::{RenderSettings, Result};

pub const HW_MARKER: &str = "// hwtransform";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Source generator
// ============================================================================

#[derive(Debug, Default)]
pub struct DeclaringGenerator;

impl ShaderSourceGenerator for DeclaringGenerator {
    fn vertex_source(&mut self, id: VertexShaderId) -> Option<String> {
        let mut src = format!("// vs {id}\n");
        if id.use_hw_transform() {
            src.push_str(HW_MARKER);
            src.push('\n');
        }
        src.push_str("attribute vec4 position;\n");
        if id.bit(VertexShaderId::HAS_TEXCOORD) || !id.use_hw_transform() {
            src.push_str("attribute vec3 texcoord;\n");
        }
        if id.bit(VertexShaderId::HAS_NORMAL) {
            src.push_str("attribute vec3 normal;\n");
        }
        if id.bit(VertexShaderId::HAS_COLOR) {
            src.push_str("attribute lowp vec4 color0;\n");
        }

        if id.bit(VertexShaderId::THROUGH) {
            src.push_str("uniform mat4 u_proj_through;\n");
        } else {
            src.push_str("uniform mat4 u_proj;\n");
        }
        for line in [
            "uniform mat4 u_world;",
            "uniform mat4 u_view;",
            "uniform mat4 u_texmtx;",
            "uniform vec4 u_depthRange;",
            "uniform vec4 u_uvscaleoffset;",
            "uniform vec4 u_StereoParams;",
        ] {
            src.push_str(line);
            src.push('\n');
        }

        if id.bit(VertexShaderId::ENABLE_BONES) {
            let count = id.bits(VertexShaderId::BONE_COUNT, 3) + 1;
            let count = if count < 4 { 4 } else { count };
            for i in 0..count {
                let _ = writeln!(src, "uniform mat4 u_bone{i};");
            }
        }

        if id.bit(VertexShaderId::LIGHTING) {
            src.push_str("uniform lowp vec4 u_ambient;\n");
            src.push_str("uniform lowp vec4 u_matambientalpha;\n");
            src.push_str("uniform lowp vec3 u_matdiffuse;\n");
            src.push_str("uniform lowp vec4 u_matspecular;\n");
            src.push_str("uniform lowp vec3 u_matemissive;\n");
            for base in [
                "u_lightpos",
                "u_lightdir",
                "u_lightatt",
                "u_lightambient",
                "u_lightdiffuse",
                "u_lightspecular",
            ] {
                let _ = writeln!(src, "uniform vec3 {base}0;");
            }
        }
        Some(src)
    }

    fn geometry_source(&mut self, primitive: PrimitiveKind, use_hw_transform: bool) -> Option<String> {
        Some(format!(
            "// gs {primitive:?} hw={use_hw_transform}\nuniform vec4 u_StereoParams;\n"
        ))
    }

    fn fragment_source(&mut self, id: FragmentShaderId) -> Option<String> {
        let mut src = format!("// fs {id}\n");
        for line in [
            "uniform sampler2D tex;",
            "uniform vec3 u_texenv;",
            "uniform vec3 u_fogcolor;",
            "uniform vec2 u_fogcoef;",
            "uniform vec4 u_alphacolorref;",
            "uniform ivec4 u_alphacolormask;",
            "uniform float u_stencilReplaceValue;",
        ] {
            src.push_str(line);
            src.push('\n');
        }
        if id.shader_blend() {
            src.push_str("uniform sampler2D fbotex;\n");
            src.push_str("uniform vec3 u_blendFixA;\n");
            src.push_str("uniform vec3 u_blendFixB;\n");
            src.push_str("uniform vec2 u_fbotexSize;\n");
        }
        Some(src)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// A manager over a [`RecordingDevice`] plus the state one draw reads.
pub struct Harness {
    pub manager: ShaderManager<RecordingDevice>,
    pub diagnostics: Rc<RefCell<CollectingDiagnostics>>,
    pub gstate: GpuState,
    pub derived: DerivedState,
    pub settings: RenderSettings,
    pub frame: FrameContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_device(RecordingDevice::new())
    }

    pub fn with_device(device: RecordingDevice) -> Self {
        init_logging();
        let diagnostics = Rc::new(RefCell::new(CollectingDiagnostics::default()));
        let manager = ShaderManager::new(
            device,
            Box::new(DeclaringGenerator),
            Box::new(Rc::clone(&diagnostics)),
        );
        Self {
            manager,
            diagnostics,
            gstate: GpuState::default(),
            derived: DerivedState::default(),
            settings: RenderSettings::default(),
            frame: FrameContext::new(),
        }
    }

    pub fn device(&self) -> &RecordingDevice {
        self.manager.device()
    }

    pub fn device_mut(&mut self) -> &mut RecordingDevice {
        self.manager.device_mut()
    }

    /// Runs the vertex / geometry / fragment selection of one draw.
    pub fn draw(&mut self, primitive: PrimitiveKind, vertex_format: VertexFormat) -> Result<ProgramId> {
        let mut ctx = DrawContext::new(&self.gstate, &self.derived, &self.settings, &mut self.frame);
        Self::run(&mut self.manager, &mut ctx, primitive, vertex_format, self.gstate.clear_mode)
    }

    pub fn draw_in_headset(
        &mut self,
        headset: &dyn HeadTracking,
        primitive: PrimitiveKind,
        vertex_format: VertexFormat,
    ) -> Result<ProgramId> {
        let mut ctx = DrawContext::new(&self.gstate, &self.derived, &self.settings, &mut self.frame)
            .with_headset(headset);
        Self::run(&mut self.manager, &mut ctx, primitive, vertex_format, self.gstate.clear_mode)
    }

    fn run(
        manager: &mut ShaderManager<RecordingDevice>,
        ctx: &mut DrawContext<'_>,
        primitive: PrimitiveKind,
        vertex_format: VertexFormat,
        is_clear: bool,
    ) -> Result<ProgramId> {
        let vs = manager.apply_vertex_shader(ctx, primitive, vertex_format)?;
        let gs = manager.apply_geometry_shader(vs, primitive)?;
        manager.apply_fragment_shader(ctx, vs, Some(gs), vertex_format, is_clear)
    }

    pub fn reports(&self) -> Vec<String> {
        self.diagnostics.borrow().reports.clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.diagnostics.borrow().notices.clone()
    }
}
