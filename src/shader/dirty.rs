//! Dirty-uniform tracking.
//!
//! Every logical uniform group owns one bit in [`DirtyUniforms`]. A program
//! keeps its own stale mask; bits are cleared only by an upload.
//!
//! Dirtying on shader switch is deferred through a [`DirtyLedger`]: instead of
//! walking every cached program when a group goes stale, the ledger stamps the
//! group with a new generation. A program remembers the generation it last
//! synced to and pulls the groups stamped after it when it becomes active.

use bitflags::bitflags;

bitflags! {
    /// Logical uniform groups.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DirtyUniforms: u32 {
        const PROJ_MATRIX           = 1 << 0;
        const PROJ_THROUGH_MATRIX   = 1 << 1;
        const FOG_COLOR             = 1 << 2;
        const FOG_COEF              = 1 << 3;
        const TEXENV                = 1 << 4;
        const ALPHA_COLOR_REF       = 1 << 5;
        const STENCIL_REPLACE_VALUE = 1 << 6;
        const ALPHA_COLOR_MASK      = 1 << 7;
        const LIGHT0                = 1 << 8;
        const LIGHT1                = 1 << 9;
        const LIGHT2                = 1 << 10;
        const LIGHT3                = 1 << 11;
        const WORLD_MATRIX          = 1 << 12;
        const VIEW_MATRIX           = 1 << 13;
        const TEX_MATRIX            = 1 << 14;
        const BONE_MATRIX0          = 1 << 15;
        const BONE_MATRIX1          = 1 << 16;
        const BONE_MATRIX2          = 1 << 17;
        const BONE_MATRIX3          = 1 << 18;
        const BONE_MATRIX4          = 1 << 19;
        const BONE_MATRIX5          = 1 << 20;
        const BONE_MATRIX6          = 1 << 21;
        const BONE_MATRIX7          = 1 << 22;
        const UV_SCALE_OFFSET       = 1 << 23;
        const DEPTH_RANGE           = 1 << 24;
        const MAT_DIFFUSE           = 1 << 25;
        const MAT_SPECULAR          = 1 << 26;
        const MAT_EMISSIVE          = 1 << 27;
        const AMBIENT               = 1 << 28;
        const MAT_AMBIENT_ALPHA     = 1 << 29;
        const SHADER_BLEND          = 1 << 30;
        const TEX_CLAMP             = 1 << 31;

        /// Kept dirty until a projection is actually written.
        const PROJECTION = Self::PROJ_MATRIX.bits() | Self::PROJ_THROUGH_MATRIX.bits();
        const BONES = 0xFF << 15;
        const LIGHTS = 0xF << 8;
    }
}

impl DirtyUniforms {
    /// Bit of light `index` (0..4).
    #[inline]
    #[must_use]
    pub fn light(index: usize) -> Self {
        Self::from_bits_retain(Self::LIGHT0.bits() << index)
    }

    /// Bit of bone matrix `index` (0..8).
    #[inline]
    #[must_use]
    pub fn bone(index: usize) -> Self {
        Self::from_bits_retain(Self::BONE_MATRIX0.bits() << index)
    }

    /// Bits of the first `count` bone matrices.
    #[must_use]
    pub fn first_bones(count: usize) -> Self {
        (0..count.min(8)).fold(Self::empty(), |mask, i| mask | Self::bone(i))
    }
}

/// Generation-stamped record of groups dirtied by shader switches.
#[derive(Debug, Clone)]
pub struct DirtyLedger {
    generation: u64,
    stamps: [u64; 32],
}

impl Default for DirtyLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtyLedger {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: 0,
            stamps: [0; 32],
        }
    }

    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stamps `mask` with a fresh generation.
    pub fn record(&mut self, mask: DirtyUniforms) {
        if mask.is_empty() {
            return;
        }
        self.generation += 1;
        let bits = mask.bits();
        for (bit, stamp) in self.stamps.iter_mut().enumerate() {
            if bits & (1 << bit) != 0 {
                *stamp = self.generation;
            }
        }
    }

    /// Groups stamped after `generation`.
    #[must_use]
    pub fn pending_since(&self, generation: u64) -> DirtyUniforms {
        let bits = self
            .stamps
            .iter()
            .enumerate()
            .filter(|(_, stamp)| **stamp > generation)
            .fold(0u32, |bits, (bit, _)| bits | (1 << bit));
        DirtyUniforms::from_bits_retain(bits)
    }

    /// Forgets every stamp. The generation keeps counting.
    pub fn reset(&mut self) {
        self.stamps = [0; 32];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_helpers() {
        assert_eq!(DirtyUniforms::light(2), DirtyUniforms::LIGHT2);
        assert_eq!(DirtyUniforms::bone(7), DirtyUniforms::BONE_MATRIX7);
        assert_eq!(DirtyUniforms::first_bones(8), DirtyUniforms::BONES);
        assert_eq!(
            DirtyUniforms::first_bones(2),
            DirtyUniforms::BONE_MATRIX0 | DirtyUniforms::BONE_MATRIX1
        );
        assert_eq!(DirtyUniforms::all().bits(), u32::MAX);
    }

    #[test]
    fn test_ledger_reports_only_newer_stamps() {
        let mut ledger = DirtyLedger::new();
        ledger.record(DirtyUniforms::FOG_COLOR);
        let synced = ledger.generation();
        ledger.record(DirtyUniforms::TEXENV | DirtyUniforms::LIGHT1);

        assert_eq!(
            ledger.pending_since(0),
            DirtyUniforms::FOG_COLOR | DirtyUniforms::TEXENV | DirtyUniforms::LIGHT1
        );
        assert_eq!(
            ledger.pending_since(synced),
            DirtyUniforms::TEXENV | DirtyUniforms::LIGHT1
        );
        assert!(ledger.pending_since(ledger.generation()).is_empty());
    }

    #[test]
    fn test_empty_record_keeps_generation() {
        let mut ledger = DirtyLedger::new();
        ledger.record(DirtyUniforms::empty());
        assert_eq!(ledger.generation(), 0);
    }

    #[test]
    fn test_restamped_group_is_pending_again() {
        let mut ledger = DirtyLedger::new();
        ledger.record(DirtyUniforms::WORLD_MATRIX);
        let synced = ledger.generation();
        assert!(ledger.pending_since(synced).is_empty());
        ledger.record(DirtyUniforms::WORLD_MATRIX);
        assert_eq!(ledger.pending_since(synced), DirtyUniforms::WORLD_MATRIX);
    }
}
