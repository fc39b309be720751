//! Headless recording device.
//!
//! [`RecordingDevice`] implements [`GraphicsDevice`] without a GPU. It parses
//! `uniform` / `attribute` / `in` declarations out of the submitted sources to
//! decide which locations a linked program exposes, and records every call so
//! tests and capture tools can inspect exactly what the shader core did.
//!
//! Failures can be injected: a compile fails when the source contains the
//! configured marker, and links fail while [`RecordingDevice::fail_links`] is
//! set.

use glam::{Mat4, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use super::device::{
    DeviceFeatures, GraphicsDevice, LinkRequest, ProgramHandle, ShaderHandle, StageKind,
    UniformLocation,
};

/// A value passed to one of the typed uniform setters.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    IVec4([i32; 4]),
    Mat4(Mat4),
    /// Flattened column-major matrices from one array upload.
    Mat4Array(Vec<f32>),
}

/// One recorded uniform upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformUpload {
    pub program: ProgramHandle,
    pub name: String,
    pub value: UniformValue,
}

/// Call counters. Reset with [`RecordingDevice::reset_counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub compiles: u32,
    pub failed_compiles: u32,
    pub links: u32,
    pub failed_links: u32,
    pub program_binds: u32,
    pub uniform_uploads: u32,
    pub attribute_enables: u32,
    pub attribute_disables: u32,
    pub deleted_programs: u32,
    pub deleted_shaders: u32,
}

#[derive(Debug, Clone)]
struct RecordedShader {
    kind: StageKind,
    uniforms: Vec<String>,
    attributes: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct RecordedProgram {
    uniforms: FxHashMap<String, UniformLocation>,
    attributes: FxHashMap<String, u32>,
}

/// [`GraphicsDevice`] that records instead of rendering.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    features: DeviceFeatures,
    next_handle: u32,
    next_location: i32,

    shaders: FxHashMap<ShaderHandle, RecordedShader>,
    programs: FxHashMap<ProgramHandle, RecordedProgram>,
    location_names: FxHashMap<UniformLocation, String>,

    bound_program: Option<ProgramHandle>,
    enabled_attributes: u32,

    fail_compile_marker: Option<String>,
    /// While set, every link request fails.
    pub fail_links: bool,

    counters: DeviceCounters,
    uploads: Vec<UniformUpload>,
}

impl RecordingDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_features(mut self, features: DeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Fails every compile whose source contains `marker`.
    pub fn fail_compiles_containing(&mut self, marker: impl Into<String>) {
        self.fail_compile_marker = Some(marker.into());
    }

    pub fn clear_compile_failures(&mut self) {
        self.fail_compile_marker = None;
    }

    #[inline]
    #[must_use]
    pub fn counters(&self) -> DeviceCounters {
        self.counters
    }

    /// Resets counters and forgets recorded uploads.
    pub fn reset_counters(&mut self) {
        self.counters = DeviceCounters::default();
        self.uploads.clear();
    }

    #[must_use]
    pub fn uploads(&self) -> &[UniformUpload] {
        &self.uploads
    }

    /// Most recent value uploaded to the uniform called `name`.
    #[must_use]
    pub fn last_upload(&self, name: &str) -> Option<&UniformValue> {
        self.uploads
            .iter()
            .rev()
            .find(|u| u.name == name)
            .map(|u| &u.value)
    }

    /// Number of uploads to the uniform called `name`.
    #[must_use]
    pub fn upload_count(&self, name: &str) -> usize {
        self.uploads.iter().filter(|u| u.name == name).count()
    }

    #[inline]
    #[must_use]
    pub fn bound_program(&self) -> Option<ProgramHandle> {
        self.bound_program
    }

    /// Bitmask of currently enabled vertex attribute indices.
    #[inline]
    #[must_use]
    pub fn enabled_attributes(&self) -> u32 {
        self.enabled_attributes
    }

    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    fn allocate_handle(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, location: UniformLocation, value: UniformValue) {
        self.counters.uniform_uploads += 1;
        let Some(name) = self.location_names.get(&location) else {
            log::warn!("upload to unknown uniform location {}", location.0);
            return;
        };
        let Some(program) = self.bound_program else {
            log::warn!("upload to '{name}' with no program bound");
            return;
        };
        self.uploads.push(UniformUpload {
            program,
            name: name.clone(),
            value,
        });
    }
}

// ─── Source scanning ──────────────────────────────────────────────────────────

/// Name declared by a `<keyword> [qualifiers] <type> <name>[...];` line.
fn declared_name<'a>(line: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let line = line.trim().strip_suffix(';')?;
    let mut tokens = line.split_whitespace();
    let first = tokens.next()?;
    if !keywords.contains(&first) {
        return None;
    }
    let last = tokens.last()?;
    let name = last.split('[').next().unwrap_or(last);
    (!name.is_empty()).then_some(name)
}

fn scan_declarations(kind: StageKind, source: &str) -> RecordedShader {
    let mut uniforms = Vec::new();
    let mut attributes = Vec::new();
    for line in source.lines() {
        if let Some(name) = declared_name(line, &["uniform"]) {
            uniforms.push(name.to_owned());
        } else if kind == StageKind::Vertex
            && let Some(name) = declared_name(line, &["attribute", "in"])
        {
            attributes.push(name.to_owned());
        }
    }
    RecordedShader {
        kind,
        uniforms,
        attributes,
    }
}

// ─── GraphicsDevice ───────────────────────────────────────────────────────────

impl GraphicsDevice for RecordingDevice {
    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn compile_stage(&mut self, kind: StageKind, source: &str) -> Result<ShaderHandle, String> {
        if let Some(marker) = &self.fail_compile_marker
            && source.contains(marker.as_str())
        {
            self.counters.failed_compiles += 1;
            return Err(format!("0:1: error: {kind} stage rejected ('{marker}')"));
        }
        self.counters.compiles += 1;
        let handle = ShaderHandle(self.allocate_handle());
        self.shaders.insert(handle, scan_declarations(kind, source));
        Ok(handle)
    }

    fn link_program(&mut self, request: &LinkRequest<'_>) -> Result<ProgramHandle, String> {
        if self.fail_links {
            self.counters.failed_links += 1;
            return Err("error: linking with uncompiled/unspecialized shader".to_owned());
        }

        let mut program = RecordedProgram::default();
        for stage in request.stages {
            let Some(shader) = self.shaders.get(stage) else {
                self.counters.failed_links += 1;
                return Err(format!("error: unknown shader object {}", stage.0));
            };
            for name in &shader.uniforms {
                if !program.uniforms.contains_key(name) {
                    self.next_location += 1;
                    let location = UniformLocation(self.next_location);
                    self.location_names.insert(location, name.clone());
                    program.uniforms.insert(name.clone(), location);
                }
            }
            if shader.kind == StageKind::Vertex {
                for name in &shader.attributes {
                    if let Some(&(index, _)) = request
                        .attribute_bindings
                        .iter()
                        .find(|(_, bound)| bound == name)
                    {
                        program.attributes.insert(name.clone(), index);
                    }
                }
            }
        }

        self.counters.links += 1;
        let handle = ProgramHandle(self.allocate_handle());
        self.programs.insert(handle, program);
        Ok(handle)
    }

    fn uniform_location(&mut self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.programs.get(&program)?.uniforms.get(name).copied()
    }

    fn attribute_location(&mut self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.programs.get(&program)?.attributes.get(name).copied()
    }

    fn use_program(&mut self, program: ProgramHandle) {
        self.counters.program_binds += 1;
        self.bound_program = Some(program);
    }

    fn set_uniform_i32(&mut self, location: UniformLocation, value: i32) {
        self.record(location, UniformValue::Int(value));
    }

    fn set_uniform_f32(&mut self, location: UniformLocation, value: f32) {
        self.record(location, UniformValue::Float(value));
    }

    fn set_uniform_vec2(&mut self, location: UniformLocation, value: Vec2) {
        self.record(location, UniformValue::Vec2(value));
    }

    fn set_uniform_vec3(&mut self, location: UniformLocation, value: Vec3) {
        self.record(location, UniformValue::Vec3(value));
    }

    fn set_uniform_vec4(&mut self, location: UniformLocation, value: Vec4) {
        self.record(location, UniformValue::Vec4(value));
    }

    fn set_uniform_ivec4(&mut self, location: UniformLocation, value: [i32; 4]) {
        self.record(location, UniformValue::IVec4(value));
    }

    fn set_uniform_mat4(&mut self, location: UniformLocation, value: &Mat4) {
        self.record(location, UniformValue::Mat4(*value));
    }

    fn set_uniform_mat4_array(&mut self, location: UniformLocation, values: &[Mat4]) {
        let flat: &[f32] = bytemuck::cast_slice(values);
        self.record(location, UniformValue::Mat4Array(flat.to_vec()));
    }

    fn enable_vertex_attribute(&mut self, index: u32) {
        self.counters.attribute_enables += 1;
        self.enabled_attributes |= 1 << index;
    }

    fn disable_vertex_attribute(&mut self, index: u32) {
        self.counters.attribute_disables += 1;
        self.enabled_attributes &= !(1 << index);
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.counters.deleted_programs += 1;
        if self.programs.remove(&program).is_some() && self.bound_program == Some(program) {
            self.bound_program = None;
        }
    }

    fn delete_shader(&mut self, shader: ShaderHandle) {
        self.counters.deleted_shaders += 1;
        self.shaders.remove(&shader);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec4 position;\nin vec3 normal;\nuniform mat4 u_proj;\nuniform highp vec4 u_bone[8];\nvoid main() {}\n";
    const FS: &str = "uniform vec3 u_fogcolor;\nuniform mat4 u_proj;\nvoid main() {}\n";

    fn link(device: &mut RecordingDevice) -> ProgramHandle {
        let vs = device.compile_stage(StageKind::Vertex, VS).unwrap();
        let fs = device.compile_stage(StageKind::Fragment, FS).unwrap();
        device
            .link_program(&LinkRequest {
                stages: &[vs, fs],
                attribute_bindings: &[(0, "position"), (2, "normal"), (5, "color0")],
                dual_source_blend: false,
            })
            .unwrap()
    }

    #[test]
    fn test_declaration_scanning() {
        assert_eq!(declared_name("uniform mat4 u_proj;", &["uniform"]), Some("u_proj"));
        assert_eq!(declared_name("  uniform lowp vec4 u_bone[8];", &["uniform"]), Some("u_bone"));
        assert_eq!(declared_name("uniform mat4 u_proj", &["uniform"]), None);
        assert_eq!(declared_name("varying vec4 v_color;", &["uniform"]), None);
    }

    #[test]
    fn test_link_resolves_declared_names_only() {
        let mut device = RecordingDevice::new();
        let program = link(&mut device);

        assert!(device.uniform_location(program, "u_proj").is_some());
        assert!(device.uniform_location(program, "u_fogcolor").is_some());
        assert!(device.uniform_location(program, "u_bone").is_some());
        assert!(device.uniform_location(program, "u_world").is_none());

        assert_eq!(device.attribute_location(program, "position"), Some(0));
        assert_eq!(device.attribute_location(program, "normal"), Some(2));
        assert_eq!(device.attribute_location(program, "color0"), None);
    }

    #[test]
    fn test_compile_failure_marker() {
        let mut device = RecordingDevice::new();
        device.fail_compiles_containing("BROKEN");
        assert!(device.compile_stage(StageKind::Fragment, "// BROKEN").is_err());
        assert!(device.compile_stage(StageKind::Fragment, "// fine").is_ok());
        assert_eq!(device.counters().failed_compiles, 1);
        assert_eq!(device.counters().compiles, 1);
    }

    #[test]
    fn test_uploads_are_recorded_by_name() {
        let mut device = RecordingDevice::new();
        let program = link(&mut device);
        device.use_program(program);

        let loc = device.uniform_location(program, "u_fogcolor").unwrap();
        device.set_uniform_vec3(loc, Vec3::ONE);
        let bones = device.uniform_location(program, "u_bone").unwrap();
        device.set_uniform_mat4_array(bones, &[Mat4::IDENTITY, Mat4::IDENTITY]);

        assert_eq!(device.last_upload("u_fogcolor"), Some(&UniformValue::Vec3(Vec3::ONE)));
        match device.last_upload("u_bone") {
            Some(UniformValue::Mat4Array(flat)) => assert_eq!(flat.len(), 32),
            other => panic!("unexpected upload {other:?}"),
        }
        assert_eq!(device.counters().uniform_uploads, 2);
    }

    #[test]
    fn test_attribute_toggles_track_mask() {
        let mut device = RecordingDevice::new();
        device.enable_vertex_attribute(0);
        device.enable_vertex_attribute(5);
        device.disable_vertex_attribute(0);
        assert_eq!(device.enabled_attributes(), 1 << 5);
    }
}
