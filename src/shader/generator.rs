//! Shader source generation seam.
//!
//! Turning an identity into GLSL is outside this crate. The manager asks a
//! [`ShaderSourceGenerator`] for source on every cache miss and treats `None`
//! as "this identity cannot be expressed on the current device".

use super::id::{FragmentShaderId, GeometryShaderId, VertexShaderId};
use crate::state::PrimitiveKind;

/// Produces stage source for shader identities.
pub trait ShaderSourceGenerator {
    fn vertex_source(&mut self, id: VertexShaderId) -> Option<String>;

    /// Source for the geometry stage of `primitive`; `use_hw_transform` is
    /// `false` when regenerating after a hardware-transform failure.
    fn geometry_source(&mut self, primitive: PrimitiveKind, use_hw_transform: bool) -> Option<String>;

    fn fragment_source(&mut self, id: FragmentShaderId) -> Option<String>;

    fn describe_vertex(&self, id: VertexShaderId) -> String {
        id.describe()
    }

    fn describe_geometry(&self, id: GeometryShaderId) -> String {
        id.describe()
    }

    fn describe_fragment(&self, id: FragmentShaderId) -> String {
        id.describe()
    }
}
