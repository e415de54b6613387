//! C2 — version gate.
//!
//! Centralizes ROM version detection so the rest of the engine never reads
//! the marker byte directly; everything else asks `Version::supports_*`.
//! Grounded on `overworld_version_helper.h`'s `OverworldVersionHelper`.

use crate::rom::Rom;

/// PC offset of the single-byte ZCO ("ZSCustomOverworld") marker.
pub const ASM_VERSION_ADDR: usize = 0x140145;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Vanilla,
    V1,
    V2,
    V3,
}

impl Version {
    /// Detects the ROM version from the ZCO marker byte. `0xFF`/`0x00` mean
    /// no patch has been applied; `1`/`2`/`>=3` select the corresponding
    /// custom-overworld generation.
    pub fn detect(rom: &Rom) -> Version {
        let marker = rom.read_u8(ASM_VERSION_ADDR).unwrap_or(0xFF);
        Self::from_marker(marker)
    }

    pub fn from_marker(marker: u8) -> Version {
        match marker {
            0xFF | 0x00 => Version::Vanilla,
            1 => Version::V1,
            2 => Version::V2,
            _ => Version::V3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Version::Vanilla => "Vanilla",
            Version::V1 => "ZSCustomOverworld v1",
            Version::V2 => "ZSCustomOverworld v2",
            Version::V3 => "ZSCustomOverworld v3",
        }
    }

    /// Area-size enum (Small/Large/Wide/Tall) and direct per-area size
    /// queries, as opposed to the legacy large-map-flag + parent scheme.
    pub fn supports_area_enum(self) -> bool {
        self == Version::V3
    }

    /// v1+ ROMs store overworld tables (maps, sprites, message ids) in
    /// expanded space past the vanilla 1 MiB boundary.
    pub fn supports_expanded_space(self) -> bool {
        self != Version::Vanilla
    }

    pub fn supports_custom_bg_colors(self) -> bool {
        matches!(self, Version::V2 | Version::V3)
    }

    pub fn supports_custom_tile_gfx(self) -> bool {
        self == Version::V3
    }

    pub fn supports_animated_gfx(self) -> bool {
        self == Version::V3
    }

    pub fn supports_subscreen_overlay(self) -> bool {
        self == Version::V3
    }

    pub fn supports_main_palette(self) -> bool {
        matches!(self, Version::V2 | Version::V3)
    }

    pub fn supports_parent_table(self) -> bool {
        self != Version::Vanilla
    }

    pub fn supports_per_direction_mosaic(self) -> bool {
        matches!(self, Version::V2 | Version::V3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::Rom;

    fn rom_with_marker(marker: u8) -> Rom {
        let mut data = vec![0u8; 0x200000];
        data[ASM_VERSION_ADDR] = marker;
        Rom::new(data)
    }

    #[test]
    fn vanilla_markers() {
        assert_eq!(Version::detect(&rom_with_marker(0xFF)), Version::Vanilla);
        assert_eq!(Version::detect(&rom_with_marker(0x00)), Version::Vanilla);
    }

    #[test]
    fn v1_v2_v3plus() {
        assert_eq!(Version::detect(&rom_with_marker(1)), Version::V1);
        assert_eq!(Version::detect(&rom_with_marker(2)), Version::V2);
        assert_eq!(Version::detect(&rom_with_marker(3)), Version::V3);
        assert_eq!(Version::detect(&rom_with_marker(7)), Version::V3);
    }

    #[test]
    fn capability_fan_out() {
        assert!(!Version::Vanilla.supports_area_enum());
        assert!(Version::V3.supports_area_enum());
        assert!(!Version::V1.supports_custom_bg_colors());
        assert!(Version::V2.supports_custom_bg_colors());
    }
}
