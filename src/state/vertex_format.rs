//! Vertex format word and primitive kinds.
//!
//! The GE describes vertex layouts with a packed `VTYPE` word. Only the fields
//! that change generated shaders or uniform values are decoded here.
//!
//! | Bits  | Field                                   |
//! |-------|-----------------------------------------|
//! | 0-1   | texcoord format (none, u8, u16, float)  |
//! | 2-4   | color format (0 = none)                 |
//! | 5-6   | normal format (0 = none)                |
//! | 7-8   | position format                         |
//! | 9-10  | weight format (0 = none)                |
//! | 14-16 | bone weight count - 1                   |
//! | 23    | through mode                            |

use crate::settings::RenderSettings;
use crate::state::GpuState;

pub const TC_SHIFT: u32 = 0;
pub const TC_MASK: u32 = 0x3 << TC_SHIFT;
pub const COLOR_SHIFT: u32 = 2;
pub const COLOR_MASK: u32 = 0x7 << COLOR_SHIFT;
pub const NORMAL_SHIFT: u32 = 5;
pub const NORMAL_MASK: u32 = 0x3 << NORMAL_SHIFT;
pub const POSITION_SHIFT: u32 = 7;
pub const POSITION_MASK: u32 = 0x3 << POSITION_SHIFT;
pub const WEIGHT_SHIFT: u32 = 9;
pub const WEIGHT_MASK: u32 = 0x3 << WEIGHT_SHIFT;
pub const WEIGHT_COUNT_SHIFT: u32 = 14;
pub const WEIGHT_COUNT_MASK: u32 = 0x7 << WEIGHT_COUNT_SHIFT;
pub const THROUGH_BIT: u32 = 1 << 23;

/// Component encodings shared by texcoords, normals, positions and weights.
pub mod format {
    pub const NONE: u32 = 0;
    pub const U8: u32 = 1;
    pub const U16: u32 = 2;
    pub const FLOAT: u32 = 3;
}

/// Packed GE vertex type word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat(pub u32);

impl VertexFormat {
    #[must_use]
    pub const fn new() -> Self {
        Self(format::FLOAT << POSITION_SHIFT)
    }

    #[must_use]
    pub const fn with_texcoord(self, fmt: u32) -> Self {
        Self((self.0 & !TC_MASK) | ((fmt << TC_SHIFT) & TC_MASK))
    }

    /// `fmt` is the GE color encoding (4 = 565 .. 7 = 8888); 0 removes color.
    #[must_use]
    pub const fn with_color(self, fmt: u32) -> Self {
        Self((self.0 & !COLOR_MASK) | ((fmt << COLOR_SHIFT) & COLOR_MASK))
    }

    #[must_use]
    pub const fn with_normal(self, fmt: u32) -> Self {
        Self((self.0 & !NORMAL_MASK) | ((fmt << NORMAL_SHIFT) & NORMAL_MASK))
    }

    /// `count` is the number of weights per vertex, 1..=8.
    #[must_use]
    pub const fn with_weights(self, fmt: u32, count: u32) -> Self {
        let count = if count == 0 { 0 } else { (count - 1) & 0x7 };
        Self(
            (self.0 & !(WEIGHT_MASK | WEIGHT_COUNT_MASK))
                | ((fmt << WEIGHT_SHIFT) & WEIGHT_MASK)
                | (count << WEIGHT_COUNT_SHIFT),
        )
    }

    #[must_use]
    pub const fn with_through(self) -> Self {
        Self(self.0 | THROUGH_BIT)
    }

    #[inline]
    #[must_use]
    pub const fn texcoord_format(self) -> u32 {
        (self.0 & TC_MASK) >> TC_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn has_texcoord(self) -> bool {
        self.0 & TC_MASK != 0
    }

    #[inline]
    #[must_use]
    pub const fn has_color(self) -> bool {
        self.0 & COLOR_MASK != 0
    }

    #[inline]
    #[must_use]
    pub const fn has_normal(self) -> bool {
        self.0 & NORMAL_MASK != 0
    }

    #[inline]
    #[must_use]
    pub const fn weight_format(self) -> u32 {
        (self.0 & WEIGHT_MASK) >> WEIGHT_SHIFT
    }

    #[inline]
    #[must_use]
    pub const fn has_weights(self) -> bool {
        self.0 & WEIGHT_MASK != 0
    }

    /// Weights per vertex, 1..=8 (meaningless without a weight format).
    #[inline]
    #[must_use]
    pub const fn bone_weight_count(self) -> usize {
        (((self.0 & WEIGHT_COUNT_MASK) >> WEIGHT_COUNT_SHIFT) + 1) as usize
    }

    #[inline]
    #[must_use]
    pub const fn is_through(self) -> bool {
        self.0 & THROUGH_BIT != 0
    }

    /// Bone matrices a skinned program uploads: 0, or the weight count
    /// rounded up to 4 (shaders are generated for 4 or more bones only).
    #[must_use]
    pub const fn num_bones(self) -> usize {
        if !self.has_weights() {
            return 0;
        }
        let count = self.bone_weight_count();
        if count < 4 { 4 } else { count }
    }
}

/// GE primitive topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PrimitiveKind {
    Points = 0,
    Lines = 1,
    LineStrip = 2,
    #[default]
    Triangles = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
    /// Sprite rectangles; always expanded on the CPU.
    Rectangles = 6,
}

/// Whether vertices of this draw can be transformed in the vertex stage.
#[must_use]
pub fn can_use_hardware_transform(
    primitive: PrimitiveKind,
    gstate: &GpuState,
    settings: &RenderSettings,
) -> bool {
    settings.hardware_transform && !gstate.through_mode && primitive != PrimitiveKind::Rectangles
}
