//! Shader Manager
//!
//! Turns per-draw GE state into a bound program with up-to-date uniforms.
//!
//! # Caches
//!
//! | Cache            | Key                 | Value                 |
//! |------------------|---------------------|-----------------------|
//! | vertex stages    | `VertexShaderId`    | `CompiledShaderStage` |
//! | geometry stages  | `GeometryShaderId`  | `CompiledShaderStage` |
//! | fragment stages  | `FragmentShaderId`  | `CompiledShaderStage` |
//! | programs         | `ProgramKey`        | `LinkedProgram`       |
//!
//! Failed stages are cached as sentinels; failed links are remembered in a
//! separate set and never enter the program cache.
//!
//! # Per-draw flow
//!
//! ```rust,ignore
//! let mut ctx = DrawContext::new(&gstate, &derived, &settings, &mut frame);
//! let vs = manager.apply_vertex_shader(&mut ctx, prim, fmt)?;
//! let gs = manager.apply_geometry_shader(vs, prim)?;
//! let program = manager.apply_fragment_shader(&mut ctx, vs, Some(gs), fmt, is_clear)?;
//! // ... issue the draw
//! ```
//!
//! When the vertex, geometry and fragment identities all match the bound
//! program's key, only its uniforms are refreshed. A failed stage anywhere in
//! the flow leaves the bound program in place but disables that shortcut for
//! the next draw.

use rustc_hash::{FxHashMap, FxHashSet};

use super::dirty::{DirtyLedger, DirtyUniforms};
use super::generator::ShaderSourceGenerator;
use super::id::{FragmentShaderId, GeometryShaderId, ProgramKey, VertexShaderId};
use super::program::LinkedProgram;
use super::stage::CompiledShaderStage;
use crate::errors::{Result, ShaderError};
use crate::gpu::{DiagnosticsSink, GraphicsDevice, LogDiagnostics, StageKind};
use crate::projection::ProjectionSolver;
use crate::settings::RenderSettings;
use crate::state::{
    DerivedState, FrameContext, GpuState, HeadTracking, PrimitiveKind, VertexFormat,
    can_use_hardware_transform,
};

/// On-screen notice shown after a vertex stage falls back to software transform.
pub const HW_TRANSFORM_FALLBACK_NOTICE: &str = "hardware transform error - falling back to software";
/// On-screen notice shown after a geometry stage falls back to software transform.
pub const GEOMETRY_FALLBACK_NOTICE: &str =
    "Geometry hardware transform error - falling back to software";
const NOTICE_SECONDS: f32 = 2.5;

// ─── Draw context ─────────────────────────────────────────────────────────────

/// Everything one draw reads, plus the frame context it may update.
pub struct DrawContext<'a> {
    pub gstate: &'a GpuState,
    pub derived: &'a DerivedState,
    pub settings: &'a RenderSettings,
    pub frame: &'a mut FrameContext,
    pub headset: Option<&'a dyn HeadTracking>,
}

impl<'a> DrawContext<'a> {
    pub fn new(
        gstate: &'a GpuState,
        derived: &'a DerivedState,
        settings: &'a RenderSettings,
        frame: &'a mut FrameContext,
    ) -> Self {
        Self {
            gstate,
            derived,
            settings,
            frame,
            headset: None,
        }
    }

    #[must_use]
    pub fn with_headset(mut self, headset: &'a dyn HeadTracking) -> Self {
        self.headset = Some(headset);
        self
    }

    /// VR rendering is enabled and a headset is attached.
    #[inline]
    #[must_use]
    pub fn vr_active(&self) -> bool {
        self.settings.vr.enabled && self.headset.is_some()
    }

    /// Projection solver over this draw's state.
    pub fn solver(&mut self) -> ProjectionSolver<'_> {
        ProjectionSolver::new(
            self.gstate,
            self.derived,
            self.settings,
            self.frame,
            self.headset,
        )
    }
}

// ─── Handles & stats ──────────────────────────────────────────────────────────

/// Index of a linked program inside one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub(crate) u32);

impl ProgramId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Vertex stage chosen for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexStage {
    pub id: VertexShaderId,
    /// `false` when the stage fell back to software transform; the caller
    /// must then transform vertices on the CPU.
    pub use_hw_transform: bool,
}

/// Geometry stage chosen for a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryStage {
    pub id: GeometryShaderId,
}

/// Which text [`ShaderManager::debug_shader_string`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugString {
    Source,
    ShortDesc,
}

/// Cache activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderCacheStats {
    pub vertex_compiles: u32,
    pub geometry_compiles: u32,
    pub fragment_compiles: u32,
    pub failed_compiles: u32,
    pub fallbacks: u32,
    pub links: u32,
    pub failed_links: u32,
    /// Vertex identity matched the bound program; no cache lookup was done.
    pub fast_path_hits: u32,
    /// All identities matched; only uniforms were refreshed.
    pub uniform_only_refreshes: u32,
    pub program_switches: u32,
}

impl ShaderCacheStats {
    fn count_compile(&mut self, kind: StageKind) {
        match kind {
            StageKind::Vertex => self.vertex_compiles += 1,
            StageKind::Geometry => self.geometry_compiles += 1,
            StageKind::Fragment => self.fragment_compiles += 1,
        }
    }
}

/// A stage that could not be built, with the sentinel to cache for it.
struct StageFailure {
    sentinel: CompiledShaderStage,
    error: ShaderError,
}

// ─── ShaderManager ────────────────────────────────────────────────────────────

/// Shader stage / program cache and dirty-uniform state machine.
pub struct ShaderManager<D: GraphicsDevice> {
    device: D,
    generator: Box<dyn ShaderSourceGenerator>,
    diagnostics: Box<dyn DiagnosticsSink>,

    // === Caches ===
    vertex_cache: FxHashMap<VertexShaderId, CompiledShaderStage>,
    geometry_cache: FxHashMap<GeometryShaderId, CompiledShaderStage>,
    fragment_cache: FxHashMap<FragmentShaderId, CompiledShaderStage>,
    programs: Vec<LinkedProgram>,
    program_lookup: FxHashMap<ProgramKey, ProgramId>,
    failed_links: FxHashSet<ProgramKey>,

    // === Last draw ===
    last_program: Option<ProgramId>,
    /// Vertex stage of `last_program`.
    last_vertex: Option<VertexStage>,
    last_gs: Option<GeometryShaderId>,
    last_fs: Option<FragmentShaderId>,
    vertex_same: bool,

    // === Dirty tracking ===
    global_dirty: DirtyUniforms,
    ledger: DirtyLedger,

    stats: ShaderCacheStats,
}

impl<D: GraphicsDevice> ShaderManager<D> {
    pub fn new(
        device: D,
        generator: Box<dyn ShaderSourceGenerator>,
        diagnostics: Box<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            device,
            generator,
            diagnostics,
            vertex_cache: FxHashMap::default(),
            geometry_cache: FxHashMap::default(),
            fragment_cache: FxHashMap::default(),
            programs: Vec::new(),
            program_lookup: FxHashMap::default(),
            failed_links: FxHashSet::default(),
            last_program: None,
            last_vertex: None,
            last_gs: None,
            last_fs: None,
            vertex_same: false,
            global_dirty: DirtyUniforms::all(),
            ledger: DirtyLedger::new(),
            stats: ShaderCacheStats::default(),
        }
    }

    /// Manager reporting through [`LogDiagnostics`].
    pub fn with_log_diagnostics(device: D, generator: Box<dyn ShaderSourceGenerator>) -> Self {
        Self::new(device, generator, Box::new(LogDiagnostics))
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> &ShaderCacheStats {
        &self.stats
    }

    #[must_use]
    pub fn program(&self, id: ProgramId) -> Option<&LinkedProgram> {
        self.programs.get(id.index())
    }

    #[must_use]
    pub fn last_program(&self) -> Option<&LinkedProgram> {
        self.last_program.and_then(|id| self.program(id))
    }

    #[inline]
    #[must_use]
    pub fn last_program_id(&self) -> Option<ProgramId> {
        self.last_program
    }

    /// Groups waiting to be folded into the programs on the next draw.
    #[inline]
    #[must_use]
    pub fn global_dirty(&self) -> DirtyUniforms {
        self.global_dirty
    }

    #[inline]
    #[must_use]
    pub fn num_programs(&self) -> usize {
        self.programs.len()
    }

    #[must_use]
    pub fn num_stages(&self, kind: StageKind) -> usize {
        match kind {
            StageKind::Vertex => self.vertex_cache.len(),
            StageKind::Geometry => self.geometry_cache.len(),
            StageKind::Fragment => self.fragment_cache.len(),
        }
    }

    // ── Dirty marking ────────────────────────────────────────────────────────

    /// Marks every group stale.
    pub fn mark_all_dirty(&mut self) {
        self.global_dirty = DirtyUniforms::all();
    }

    /// Marks groups stale. Folded into the bound program and the ledger on the
    /// next [`apply_vertex_shader`](Self::apply_vertex_shader).
    pub fn mark_dirty(&mut self, mask: DirtyUniforms) {
        self.global_dirty |= mask;
    }

    /// Marks groups stale for every program; each reconciles when it is next
    /// activated.
    pub fn mark_shader_switch_dirty(&mut self, mask: DirtyUniforms) {
        self.ledger.record(mask);
    }

    /// Unbinds the last program and forgets it, so the next draw goes through
    /// a full switch. Used when something else changed the bound program.
    pub fn dirty_last_program(&mut self) {
        if let Some(id) = self.last_program.take() {
            self.programs[id.index()].stop(&mut self.device);
        }
        self.vertex_same = false;
    }

    fn flush_global_dirty(&mut self) {
        if !self.global_dirty.is_empty() {
            self.ledger.record(self.global_dirty);
            self.global_dirty = DirtyUniforms::empty();
        }
        if let Some(id) = self.last_program {
            self.programs[id.index()].pull(&self.ledger);
        }
    }

    /// Bookkeeping after a program refreshed its uniforms.
    ///
    /// Bits the program could not upload go back into the global mask. A
    /// projection driven by frame-level flags (free look, a new VR frame) was
    /// consumed by this program only, so every other program is told too.
    fn after_refresh(&mut self, id: ProgramId, still_dirty: DirtyUniforms, consumed_projection: bool) {
        self.global_dirty |= still_dirty;
        if consumed_projection {
            self.ledger.record(DirtyUniforms::PROJECTION);
            self.programs[id.index()].sync_to(self.ledger.generation());
        }
    }

    // ── Stage compilation ────────────────────────────────────────────────────

    /// Compiles generated source. A failure comes back with a sentinel that
    /// keeps the rejected source.
    fn compile_source(
        &mut self,
        kind: StageKind,
        source: Option<String>,
        use_hw_transform: bool,
        label: &str,
    ) -> std::result::Result<CompiledShaderStage, StageFailure> {
        let Some(source) = source else {
            log::error!("no {kind} shader source for {label}");
            self.stats.failed_compiles += 1;
            return Err(StageFailure {
                sentinel: CompiledShaderStage::failed(kind, String::new(), use_hw_transform),
                error: ShaderError::SourceGeneration(kind),
            });
        };

        match CompiledShaderStage::compile(&mut self.device, kind, source.clone(), use_hw_transform) {
            Ok(stage) => {
                self.stats.count_compile(kind);
                Ok(stage)
            }
            Err(error) => {
                log::error!("{kind} shader {label} failed to compile: {error}\n{source}");
                self.stats.failed_compiles += 1;
                self.diagnostics
                    .report(&format!("{error}\nshader: {label}\n{source}"));
                Err(StageFailure {
                    sentinel: CompiledShaderStage::failed(kind, source, use_hw_transform),
                    error,
                })
            }
        }
    }

    fn compile_vertex(
        &mut self,
        gstate: &GpuState,
        vertex_format: VertexFormat,
        id: VertexShaderId,
    ) -> std::result::Result<CompiledShaderStage, StageFailure> {
        let label = self.generator.describe_vertex(id);
        let source = self.generator.vertex_source(id);
        let failure = match self.compile_source(StageKind::Vertex, source, id.use_hw_transform(), &label) {
            Ok(stage) => return Ok(stage),
            Err(failure) => failure,
        };
        if !id.use_hw_transform() {
            return Err(failure);
        }

        self.stats.fallbacks += 1;
        self.diagnostics.notify(HW_TRANSFORM_FALLBACK_NOTICE, NOTICE_SECONDS);
        let software = VertexShaderId::compute(gstate, vertex_format, false);
        log::warn!("vertex shader {id} retried as {software} (software transform)");
        let source = self.generator.vertex_source(software);
        self.compile_source(StageKind::Vertex, source, false, &label)
    }

    fn compile_geometry(
        &mut self,
        primitive: PrimitiveKind,
        id: GeometryShaderId,
        use_hw_transform: bool,
    ) -> std::result::Result<CompiledShaderStage, StageFailure> {
        let label = self.generator.describe_geometry(id);
        let source = self.generator.geometry_source(primitive, use_hw_transform);
        let failure = match self.compile_source(StageKind::Geometry, source, use_hw_transform, &label) {
            Ok(stage) => return Ok(stage),
            Err(failure) => failure,
        };
        if !use_hw_transform {
            return Err(failure);
        }

        self.stats.fallbacks += 1;
        self.diagnostics.notify(GEOMETRY_FALLBACK_NOTICE, NOTICE_SECONDS);
        log::warn!("geometry shader {id} retried with software transform");
        let source = self.generator.geometry_source(primitive, false);
        self.compile_source(StageKind::Geometry, source, false, &label)
    }

    // ── Per-draw entry points ────────────────────────────────────────────────

    /// Selects (compiling on a miss) the vertex stage for this draw.
    pub fn apply_vertex_shader(
        &mut self,
        ctx: &mut DrawContext<'_>,
        primitive: PrimitiveKind,
        vertex_format: VertexFormat,
    ) -> Result<VertexStage> {
        self.flush_global_dirty();

        let use_hw_transform = can_use_hardware_transform(primitive, ctx.gstate, ctx.settings);
        let id = VertexShaderId::compute(ctx.gstate, vertex_format, use_hw_transform);

        if self.last_program.is_some()
            && let Some(last) = self.last_vertex
            && last.id == id
        {
            self.vertex_same = true;
            self.stats.fast_path_hits += 1;
            return Ok(last);
        }
        self.vertex_same = false;

        let use_hw_transform = match self.vertex_cache.get(&id) {
            Some(stage) if stage.is_failed() => {
                return Err(ShaderError::FailedStage(StageKind::Vertex));
            }
            Some(stage) => stage.use_hw_transform(),
            None => match self.compile_vertex(ctx.gstate, vertex_format, id) {
                Ok(stage) => {
                    let use_hw_transform = stage.use_hw_transform();
                    self.vertex_cache.insert(id, stage);
                    use_hw_transform
                }
                Err(StageFailure { sentinel, error }) => {
                    self.vertex_cache.insert(id, sentinel);
                    return Err(error);
                }
            },
        };

        Ok(VertexStage { id, use_hw_transform })
    }

    /// Selects (compiling on a miss) the geometry stage for `primitive`,
    /// drawn after the vertex stage `vs`.
    pub fn apply_geometry_shader(
        &mut self,
        vs: VertexStage,
        primitive: PrimitiveKind,
    ) -> Result<GeometryStage> {
        let id = GeometryShaderId::compute(primitive);
        let stage = GeometryStage { id };
        if self.last_program.is_some() && self.last_gs == Some(id) {
            return Ok(stage);
        }

        let result = match self.geometry_cache.get(&id) {
            Some(cached) if cached.is_failed() => Err(ShaderError::FailedStage(StageKind::Geometry)),
            Some(_) => Ok(stage),
            None => match self.compile_geometry(primitive, id, vs.use_hw_transform) {
                Ok(compiled) => {
                    self.geometry_cache.insert(id, compiled);
                    Ok(stage)
                }
                Err(StageFailure { sentinel, error }) => {
                    self.geometry_cache.insert(id, sentinel);
                    Err(error)
                }
            },
        };
        if result.is_err() {
            self.vertex_same = false;
        }
        result
    }

    fn ensure_fragment_stage(&mut self, id: FragmentShaderId) -> Result<()> {
        match self.fragment_cache.get(&id) {
            Some(stage) if stage.is_failed() => Err(ShaderError::FailedStage(StageKind::Fragment)),
            Some(_) => Ok(()),
            None => {
                let label = self.generator.describe_fragment(id);
                let source = self.generator.fragment_source(id);
                match self.compile_source(StageKind::Fragment, source, true, &label) {
                    Ok(stage) => {
                        self.fragment_cache.insert(id, stage);
                        Ok(())
                    }
                    Err(StageFailure { sentinel, error }) => {
                        self.fragment_cache.insert(id, sentinel);
                        Err(error)
                    }
                }
            }
        }
    }

    /// Selects the fragment stage, then binds the program for the stage
    /// triple (linking on a miss) and refreshes its uniforms.
    pub fn apply_fragment_shader(
        &mut self,
        ctx: &mut DrawContext<'_>,
        vs: VertexStage,
        gs: Option<GeometryStage>,
        vertex_format: VertexFormat,
        is_clear: bool,
    ) -> Result<ProgramId> {
        let fs_id = FragmentShaderId::compute(ctx.gstate, ctx.derived, vertex_format);
        let gs_id = gs.map(|gs| gs.id);
        let flags_before = (ctx.frame.free_look_changed, ctx.frame.frame_changed);
        let key = ProgramKey {
            vs: vs.id,
            gs: gs_id,
            fs: fs_id,
        };

        // Uniform-only fast path.
        if let Some(last) = self.last_program
            && self.vertex_same
            && self.last_gs == gs_id
            && self.last_fs == Some(fs_id)
            && self.programs[last.index()].key() == key
        {
            self.stats.uniform_only_refreshes += 1;
            let still_dirty = self.programs[last.index()].refresh_uniforms(
                &mut self.device,
                ctx,
                vertex_format,
                is_clear,
            );
            let consumed = consumed_projection(flags_before, ctx.frame);
            self.after_refresh(last, still_dirty, consumed);
            return Ok(last);
        }

        if let Err(error) = self.ensure_fragment_stage(fs_id) {
            self.last_fs = None;
            self.vertex_same = false;
            return Err(error);
        }

        let previous = self.last_program.map(|id| self.programs[id.index()].attributes());

        let id = if let Some(&id) = self.program_lookup.get(&key) {
            self.stats.program_switches += 1;
            self.programs[id.index()].pull(&self.ledger);
            id
        } else {
            match self.link(key, vertex_format) {
                Ok(id) => {
                    ctx.frame.frame_changed = true;
                    id
                }
                Err(error) => {
                    self.last_fs = None;
                    self.vertex_same = false;
                    return Err(error);
                }
            }
        };

        let still_dirty = self.programs[id.index()].use_program(
            &mut self.device,
            ctx,
            previous,
            vertex_format,
            is_clear,
        );
        let consumed = consumed_projection(flags_before, ctx.frame);
        self.after_refresh(id, still_dirty, consumed);

        self.last_program = Some(id);
        self.last_vertex = Some(vs);
        self.last_gs = gs_id;
        self.last_fs = Some(fs_id);
        Ok(id)
    }

    fn link(&mut self, key: ProgramKey, vertex_format: VertexFormat) -> Result<ProgramId> {
        if self.failed_links.contains(&key) {
            return Err(ShaderError::ProgramLink {
                info_log: format!("program {key} failed to link earlier"),
            });
        }

        let vs = self
            .vertex_cache
            .get(&key.vs)
            .ok_or(ShaderError::FailedStage(StageKind::Vertex))?;
        let gs = match key.gs {
            Some(gs) => Some(
                self.geometry_cache
                    .get(&gs)
                    .ok_or(ShaderError::FailedStage(StageKind::Geometry))?,
            ),
            None => None,
        };
        let fs = self
            .fragment_cache
            .get(&key.fs)
            .ok_or(ShaderError::FailedStage(StageKind::Fragment))?;

        match LinkedProgram::link(&mut self.device, key, vs, gs, fs, vertex_format) {
            Ok(mut program) => {
                program.sync_to(self.ledger.generation());
                let id = ProgramId(self.programs.len() as u32);
                self.programs.push(program);
                self.program_lookup.insert(key, id);
                self.stats.links += 1;
                Ok(id)
            }
            Err(error) => {
                let report = format!(
                    "{error}\nVS: {}\nFS: {}\n--- vertex ---\n{}\n--- fragment ---\n{}",
                    self.generator.describe_vertex(key.vs),
                    self.generator.describe_fragment(key.fs),
                    vs.source(),
                    fs.source(),
                );
                log::error!("could not link program {key}: {error}");
                self.diagnostics.report(&report);
                self.failed_links.insert(key);
                self.stats.failed_links += 1;
                Err(error)
            }
        }
    }

    // ── Cache lifetime ───────────────────────────────────────────────────────

    /// Deletes every program and stage. Required after settings that change
    /// generated source.
    pub fn clear_cache(&mut self) {
        self.dirty_last_program();

        let programs = self.programs.len();
        for program in self.programs.drain(..) {
            program.delete(&mut self.device);
        }
        self.program_lookup.clear();
        self.failed_links.clear();

        let stages = self
            .vertex_cache
            .drain()
            .map(|(_, stage)| stage)
            .chain(self.geometry_cache.drain().map(|(_, stage)| stage))
            .chain(self.fragment_cache.drain().map(|(_, stage)| stage));
        for mut stage in stages {
            stage.delete(&mut self.device);
        }

        self.last_vertex = None;
        self.last_gs = None;
        self.last_fs = None;
        self.ledger.reset();
        self.global_dirty = DirtyUniforms::all();
        log::debug!("shader cache cleared ({programs} programs)");
    }

    // ── Debug surface ────────────────────────────────────────────────────────

    /// Identities cached for `kind`, as sorted hex strings.
    #[must_use]
    pub fn debug_shader_ids(&self, kind: StageKind) -> Vec<String> {
        let mut ids: Vec<String> = match kind {
            StageKind::Vertex => self.vertex_cache.keys().map(ToString::to_string).collect(),
            StageKind::Geometry => self.geometry_cache.keys().map(ToString::to_string).collect(),
            StageKind::Fragment => self.fragment_cache.keys().map(ToString::to_string).collect(),
        };
        ids.sort_unstable();
        ids
    }

    /// Source or short description of a cached stage. Empty when `id` is not
    /// a cached identity of `kind`.
    #[must_use]
    pub fn debug_shader_string(&self, id: &str, kind: StageKind, what: DebugString) -> String {
        let found = match kind {
            StageKind::Vertex => VertexShaderId::from_hex(id).and_then(|id| {
                let stage = self.vertex_cache.get(&id)?;
                Some((stage, self.generator.describe_vertex(id)))
            }),
            StageKind::Geometry => GeometryShaderId::from_hex(id).and_then(|id| {
                let stage = self.geometry_cache.get(&id)?;
                Some((stage, self.generator.describe_geometry(id)))
            }),
            StageKind::Fragment => FragmentShaderId::from_hex(id).and_then(|id| {
                let stage = self.fragment_cache.get(&id)?;
                Some((stage, self.generator.describe_fragment(id)))
            }),
        };
        match (found, what) {
            (Some((stage, _)), DebugString::Source) => stage.source().to_owned(),
            (Some((_, desc)), DebugString::ShortDesc) => desc,
            (None, _) => String::new(),
        }
    }
}

impl<D: GraphicsDevice> Drop for ShaderManager<D> {
    fn drop(&mut self) {
        self.clear_cache();
    }
}

/// A frame-level projection trigger was set before the refresh and cleared by it.
fn consumed_projection(before: (bool, bool), frame: &FrameContext) -> bool {
    let (free_look, frame_changed) = before;
    (free_look && !frame.free_look_changed) || (frame_changed && !frame.frame_changed)
}
