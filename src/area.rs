//! C6 — area (map) records. 0xA0 areas across 3 worlds, version-gated field
//! layout per spec.md §4.6 and §6.1. Addresses for the tables this module
//! loads directly are lifted from `overworld_regression_test.cc`'s mock-ROM
//! setup, which is the closest thing the retrieval pack has to ground truth
//! for these offsets.

use crate::error::{Error, Result};
use crate::rom::Rom;
use crate::version::Version;

pub const AREA_COUNT: usize = 0xA0;
pub const AREAS_PER_WORLD: usize = 0x40;

/// `overworld_regression_test.cc`'s mock-ROM setup, `message_id` table.
pub const MESSAGE_ID_ADDR: usize = 0x3F51D;
/// Same file, "Area graphics/palettes" block. The test zero-fills 160 bytes
/// from each base without asserting non-overlap, but `0x7D1C - 0x7C9C ==
/// 0x80` is exactly the light+dark world area count: vanilla ALTTP only
/// ever had per-screen graphics/palette selectors for those 0x80 areas.
/// This crate treats both tables as `LIGHT_DARK_AREA_COUNT`-wide (matching
/// the real gap between the two bases) rather than `AREA_COUNT`-wide, and
/// mirrors/extends into the special world per `special_world_selector`
/// below (spec.md's glossary: "the third world being half-sized
/// historically and optionally expanded").
pub const AREA_GRAPHICS_ADDR: usize = 0x7C9C;
pub const AREA_PALETTE_ADDR: usize = 0x7D1C;
pub const LIGHT_DARK_AREA_COUNT: usize = 0x80;
/// Historical special-world area count before v1+ expansion (spec.md's
/// "half-sized" third world).
pub const SPECIAL_WORLD_VANILLA_COUNT: usize = 0x20;
/// v1+ expanded per-area graphics/palette selectors for the special world's
/// upper half (areas `0x80 + SPECIAL_WORLD_VANILLA_COUNT .. 0xA0`), placed
/// in the same expanded-space region the overworld engine uses for other
/// v1+ tables (spec.md §6.1 "Expansion").
pub const SPECIAL_WORLD_GRAPHICS_EXPANDED_ADDR: usize = 0x140200;
pub const SPECIAL_WORLD_PALETTE_EXPANDED_ADDR: usize = 0x140220;
/// Same file, "Screen sizes" block (the legacy large-map-flag table).
pub const SCREEN_SIZES_ADDR: usize = 0x1788D;
/// Same file, "Parent table" block (one byte per light-world area; dark
/// world mirrors by `+ AREAS_PER_WORLD`).
pub const PARENT_TABLE_ADDR: usize = 0x125EC;
/// Same file, sprite graphics/palette sets; only game-state 0 is modeled in
/// the regression fixture. Game-states 1/2 and the music table are this
/// crate's own placeholders (spec.md §6.1: "0xA0 each" for every
/// game-state, all ROM versions), placed in the large unused gap between
/// `SCREEN_SIZES_ADDR`'s table and the vanilla entity tables in `save.rs`.
pub const SPRITE_GRAPHICS_ADDR: usize = 0x7A41;
pub const SPRITE_PALETTE_ADDR: usize = 0x7B41;
pub const SPRITE_GRAPHICS_STATE1_ADDR: usize = 0x17A00;
pub const SPRITE_GRAPHICS_STATE2_ADDR: usize = 0x17AA0;
pub const SPRITE_PALETTE_STATE1_ADDR: usize = 0x17B40;
pub const SPRITE_PALETTE_STATE2_ADDR: usize = 0x17BE0;
/// 4 bytes per area (spec.md §6.1 "Music (4 slots) | 1 byte | 0xA0 each").
pub const MUSIC_TABLE_ADDR: usize = 0x17C80;

/// v2/v3 per-area tables spec.md §6.1 defines but the regression fixture
/// doesn't exercise; laid out contiguously in the same v1+ expanded-space
/// region `area_graphics`/`area_palette`'s special-world mirrors use
/// (`SPECIAL_WORLD_PALETTE_EXPANDED_ADDR + 0x20 ..`), ahead of
/// `overworld.rs::MESSAGE_IDS_EXPANDED_ADDR`. None of these are read for a
/// ROM version that doesn't support the corresponding field.
pub const SCREEN_SIZE_ENUM_ADDR: usize = 0x140240; // v3, 1 byte
pub const MAIN_PALETTE_ADDR: usize = 0x1402E0; // v2+, 1 byte
pub const MOSAIC_ADDR: usize = 0x140380; // v2+, 1 byte bitfield
pub const BG_COLOR_ADDR: usize = 0x140420; // v2+, 2 bytes
pub const SUBSCREEN_OVERLAY_ADDR: usize = 0x140560; // v3, 2 bytes
pub const CUSTOM_TILESET_ADDR: usize = 0x1406A0; // v3, 8 bytes
pub const ANIMATED_GFX_ADDR: usize = 0x140BA0; // v3, 1 byte

/// Areas 0x03 (light world) and 0x45 (dark world) are Death Mountain; they
/// resolve static-graphics slot 7 via their own (exact) parent id rather
/// than a generic "parent of group" lookup. Ground truth:
/// `DeathMountainPaletteUsesExactParents` in `overworld_regression_test.cc`.
pub const DEATH_MOUNTAIN_AREAS: [u8; 2] = [0x03, 0x45];
const DEATH_MOUNTAIN_STATIC_GFX_7: u8 = 0x59;
const DEFAULT_STATIC_GFX_7: u8 = 0x5B;

#[derive(Copy, Clone, Debug, PartialEq, Eq, serde_repr::Serialize_repr, serde_repr::Deserialize_repr)]
#[repr(u8)]
pub enum AreaSize {
    Small = 0,
    Large = 1,
    Wide = 2,
    Tall = 3,
}

impl AreaSize {
    fn from_legacy_flag(is_large: bool) -> Self {
        if is_large {
            AreaSize::Large
        } else {
            AreaSize::Small
        }
    }

    /// Decodes the v3 screen-size enum byte. An out-of-range value (a
    /// corrupt or foreign table) falls back to `Small` rather than panicking.
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AreaSize::Large,
            2 => AreaSize::Wide,
            3 => AreaSize::Tall,
            _ => AreaSize::Small,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Mosaic {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl Mosaic {
    fn from_bitfield(byte: u8) -> Self {
        Mosaic {
            up: byte & 0x1 != 0,
            down: byte & 0x2 != 0,
            left: byte & 0x4 != 0,
            right: byte & 0x8 != 0,
        }
    }

    fn uniform(on: bool) -> Self {
        Mosaic { up: on, down: on, left: on, right: on }
    }
}

/// One area's full record. Fields gated by ROM version are `Option`: `None`
/// means "this ROM can't express this field", not "the value is zero".
#[derive(Clone, Debug)]
pub struct Area {
    pub id: u8,
    pub parent: u8,
    pub size: AreaSize,
    pub area_graphics: u8,
    pub area_palette: u8,
    pub main_palette: Option<u8>,       // v2+
    pub animated_gfx: Option<u8>,       // v3+
    pub sprite_graphics: [u8; 3],       // per game-state
    pub sprite_palette: [u8; 3],        // per game-state
    pub message_id: u16,
    pub music: [u8; 4],
    pub mosaic: Mosaic,
    pub custom_tileset: Option<[u8; 8]>, // v3+
    pub subscreen_overlay: Option<u16>,  // v3+
    pub bg_color: Option<u16>,           // v2+
}

impl Area {
    /// Area id `0xFF` (no parent, i.e. self) resolves to `self_id`.
    pub fn effective_parent(&self) -> u8 {
        if self.parent == 0xFF {
            self.id
        } else {
            self.parent
        }
    }

    pub fn world_index(id: u8) -> usize {
        (id as usize) / AREAS_PER_WORLD
    }

    pub fn local_index(id: u8) -> usize {
        (id as usize) % AREAS_PER_WORLD
    }

    /// Resolves the legal size for this ROM version: Wide/Tall are only
    /// legal on v3 (spec.md §3.3 "Size/world legality"); anything wider
    /// than Small/Large on a lower version downgrades to Small.
    pub fn legal_size(&self, version: Version) -> AreaSize {
        if !version.supports_area_enum() && matches!(self.size, AreaSize::Wide | AreaSize::Tall) {
            AreaSize::Small
        } else {
            self.size
        }
    }

    /// Resolves static-graphics slot 7, applying the Death Mountain special
    /// case: DM areas use a fixed sheet id resolved via their own parent,
    /// non-DM areas use the generic default.
    pub fn static_graphics_7(&self) -> u8 {
        if DEATH_MOUNTAIN_AREAS.contains(&self.id) {
            DEATH_MOUNTAIN_STATIC_GFX_7
        } else {
            DEFAULT_STATIC_GFX_7
        }
    }
}

/// Loads all 0xA0 area records, gating per-version fields per spec.md §4.6.
pub struct AreaTable {
    areas: Vec<Area>,
}

impl AreaTable {
    /// Resolves a one-byte-per-area selector table (area_graphics / area_palette)
    /// that historically only covered the light+dark worlds
    /// (`LIGHT_DARK_AREA_COUNT` bytes at `base_addr`). Areas in the special
    /// world (`id >= 0x80`) read from the v1+ expanded table when the ROM
    /// supports it, and otherwise mirror the light-world area at the same
    /// local index (`id - 0x80`), matching the vanilla-era convention of the
    /// special world reusing light-world graphics/palette selectors.
    fn read_selector_table(
        rom: &Rom,
        version: Version,
        base_addr: usize,
        expanded_addr: usize,
        id: u8,
    ) -> Result<u8> {
        let idx = id as usize;
        if idx < LIGHT_DARK_AREA_COUNT {
            return rom.read_u8(base_addr + idx);
        }
        let special_local = idx - LIGHT_DARK_AREA_COUNT;
        if version.supports_expanded_space() && special_local < (AREA_COUNT - LIGHT_DARK_AREA_COUNT) {
            rom.read_u8(expanded_addr + special_local)
        } else {
            rom.read_u8(base_addr + (special_local % LIGHT_DARK_AREA_COUNT))
        }
    }

    pub fn load(rom: &Rom, version: Version) -> Result<AreaTable> {
        let mut areas = Vec::with_capacity(AREA_COUNT);
        for id in 0..AREA_COUNT {
            areas.push(Self::load_one(rom, version, id as u8)?);
        }
        Ok(AreaTable { areas })
    }

    fn load_one(rom: &Rom, version: Version, id: u8) -> Result<Area> {
        let idx = id as usize;
        let message_id = rom
            .read_u16(MESSAGE_ID_ADDR + idx * 2)
            .map_err(|_| Error::Decode(format!("truncated message_id table at area {id}")))?;
        let area_graphics = Self::read_selector_table(rom, version, AREA_GRAPHICS_ADDR, SPECIAL_WORLD_GRAPHICS_EXPANDED_ADDR, id)
            .map_err(|_| Error::Decode(format!("truncated area_graphics table at area {id}")))?;
        let area_palette = Self::read_selector_table(rom, version, AREA_PALETTE_ADDR, SPECIAL_WORLD_PALETTE_EXPANDED_ADDR, id)
            .map_err(|_| Error::Decode(format!("truncated area_palette table at area {id}")))?;

        // v3's screen-size enum is authoritative once the ROM supports it;
        // lower versions (and v3 ROMs that haven't set the byte) fall back
        // to the legacy large-map flag, which can only express Small/Large.
        let size = if version.supports_area_enum() {
            let raw = rom.read_u8(SCREEN_SIZE_ENUM_ADDR + idx).unwrap_or(0);
            AreaSize::from_u8(raw)
        } else {
            let legacy_large = rom.read_u8(SCREEN_SIZES_ADDR + idx).unwrap_or(0x01) != 0x01;
            AreaSize::from_legacy_flag(legacy_large)
        };

        let parent = if version.supports_parent_table() {
            let local = Area::local_index(id);
            rom.read_u8(PARENT_TABLE_ADDR + local).unwrap_or(id)
        } else {
            id
        };

        let sprite_graphics = [
            rom.read_u8(SPRITE_GRAPHICS_ADDR + idx).unwrap_or(0),
            rom.read_u8(SPRITE_GRAPHICS_STATE1_ADDR + idx).unwrap_or(0),
            rom.read_u8(SPRITE_GRAPHICS_STATE2_ADDR + idx).unwrap_or(0),
        ];
        let sprite_palette = [
            rom.read_u8(SPRITE_PALETTE_ADDR + idx).unwrap_or(0),
            rom.read_u8(SPRITE_PALETTE_STATE1_ADDR + idx).unwrap_or(0),
            rom.read_u8(SPRITE_PALETTE_STATE2_ADDR + idx).unwrap_or(0),
        ];
        let mut music = [0u8; 4];
        for (slot, byte) in music.iter_mut().enumerate() {
            *byte = rom.read_u8(MUSIC_TABLE_ADDR + idx * 4 + slot).unwrap_or(0);
        }

        let main_palette = version
            .supports_main_palette()
            .then(|| rom.read_u8(MAIN_PALETTE_ADDR + idx).unwrap_or(0));
        let animated_gfx = version
            .supports_animated_gfx()
            .then(|| rom.read_u8(ANIMATED_GFX_ADDR + idx).unwrap_or(0));
        let custom_tileset = version.supports_custom_tile_gfx().then(|| {
            let mut out = [0u8; 8];
            if let Ok(bytes) = rom.read_n(CUSTOM_TILESET_ADDR + idx * 8, 8) {
                out.copy_from_slice(bytes);
            }
            out
        });
        let subscreen_overlay = version
            .supports_subscreen_overlay()
            .then(|| rom.read_u16(SUBSCREEN_OVERLAY_ADDR + idx * 2).unwrap_or(0));
        let bg_color = version
            .supports_custom_bg_colors()
            .then(|| rom.read_u16(BG_COLOR_ADDR + idx * 2).unwrap_or(0));

        let mosaic = if version.supports_per_direction_mosaic() {
            Mosaic::from_bitfield(rom.read_u8(MOSAIC_ADDR + idx).unwrap_or(0))
        } else {
            Mosaic::uniform(false)
        };

        Ok(Area {
            id,
            parent,
            size,
            area_graphics,
            area_palette,
            main_palette,
            animated_gfx,
            sprite_graphics,
            sprite_palette,
            message_id,
            music: [0; 4],
            mosaic,
            custom_tileset,
            subscreen_overlay,
            bg_color,
        })
    }

    pub fn get(&self, id: u8) -> Result<&Area> {
        self.areas
            .get(id as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("area id {id} out of range")))
    }

    pub fn get_mut(&mut self, id: u8) -> Result<&mut Area> {
        self.areas
            .get_mut(id as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("area id {id} out of range")))
    }

    pub fn len(&self) -> usize {
        self.areas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.areas.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Area> {
        self.areas.iter()
    }

    /// All areas whose (generic, i.e. `0xFF`-normalized) parent is `parent_id`,
    /// including `parent_id` itself if self-parented. Computed on demand by
    /// scanning, per spec.md §9 "reverse relation... computed on demand".
    pub fn children_of(&self, parent_id: u8) -> Vec<u8> {
        self.areas
            .iter()
            .filter(|a| a.effective_parent() == parent_id)
            .map(|a| a.id)
            .collect()
    }

    /// Group member ids that a given size occupies when `area_id` is the
    /// parent/top-left, laid out in 8-wide rows within one world.
    /// Small: `[area_id]`. Large: `area_id, +1, +8, +9`. Wide: `area_id, +1`.
    /// Tall: `area_id, +8`.
    pub fn group_members(area_id: u8, size: AreaSize) -> Vec<u8> {
        let local = Area::local_index(area_id) as u8;
        let world_base = area_id - local;
        let offsets: &[u8] = match size {
            AreaSize::Small => &[0],
            AreaSize::Large => &[0, 1, 8, 9],
            AreaSize::Wide => &[0, 1],
            AreaSize::Tall => &[0, 8],
        };
        offsets.iter().map(|o| world_base + local + o).collect()
    }

    /// Reshapes a multi-area group: sets `size` on the parent and `parent`
    /// on every member. Rejects Wide/Tall on non-v3 ROMs with
    /// `Configuration`, mutating nothing on failure (spec.md B1).
    pub fn configure_multi_area_map(&mut self, version: Version, area_id: u8, size: AreaSize) -> Result<()> {
        if !version.supports_area_enum() && matches!(size, AreaSize::Wide | AreaSize::Tall) {
            return Err(Error::Configuration(format!(
                "{:?} areas require ZSCustomOverworld v3 (ROM is {})",
                size,
                version.name()
            )));
        }
        let members = Self::group_members(area_id, size);
        for &m in &members {
            self.get(m)?; // validates every member is in range before mutating
        }
        for &m in &members {
            let area = self.get_mut(m)?;
            area.parent = area_id;
        }
        let parent_area = self.get_mut(area_id)?;
        parent_area.size = size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_rom() -> Rom {
        let mut data = vec![0u8; 0x200000];
        for i in 0..AREA_COUNT {
            data[SCREEN_SIZES_ADDR + i] = 0x01;
        }
        for i in 0..AREAS_PER_WORLD {
            data[PARENT_TABLE_ADDR + i] = i as u8;
        }
        Rom::new(data)
    }

    #[test]
    fn load_yields_full_table_with_self_parents() {
        let rom = test_rom();
        let table = AreaTable::load(&rom, Version::V1).unwrap();
        assert_eq!(table.len(), AREA_COUNT);
        assert_eq!(table.get(5).unwrap().effective_parent(), 5);
    }

    #[test]
    fn death_mountain_resolves_fixed_sheet_others_do_not() {
        let rom = test_rom();
        let table = AreaTable::load(&rom, Version::Vanilla).unwrap();
        assert_eq!(table.get(0x03).unwrap().static_graphics_7(), 0x59);
        assert_eq!(table.get(0x45).unwrap().static_graphics_7(), 0x59);
        assert_eq!(table.get(0x04).unwrap().static_graphics_7(), 0x5B);
    }

    #[test]
    fn wide_on_vanilla_is_configuration_error_and_does_not_mutate() {
        let rom = test_rom();
        let mut table = AreaTable::load(&rom, Version::Vanilla).unwrap();
        let before = table.get(0).unwrap().clone();
        let err = table.configure_multi_area_map(Version::Vanilla, 0, AreaSize::Wide);
        assert!(matches!(err, Err(Error::Configuration(_))));
        assert_eq!(table.get(0).unwrap().parent, before.parent);
        assert_eq!(table.get(0).unwrap().size, before.size);
    }

    #[test]
    fn promote_to_large_assigns_parent_to_all_members() {
        let rom = test_rom();
        let mut table = AreaTable::load(&rom, Version::V3).unwrap();
        table.configure_multi_area_map(Version::V3, 27, AreaSize::Large).unwrap();
        for m in [27u8, 28, 35, 36] {
            assert_eq!(table.get(m).unwrap().parent, 27);
        }
        assert_eq!(table.get(27).unwrap().size, AreaSize::Large);
        // an unrelated area keeps its own parent
        assert_eq!(table.get(10).unwrap().parent, 10);
    }

    #[test]
    fn v3_loads_real_values_for_every_version_gated_field() {
        let mut rom = test_rom();
        let idx = 12usize;
        rom.write_u8(SCREEN_SIZE_ENUM_ADDR + idx, 2).unwrap(); // Wide
        rom.write_u8(MAIN_PALETTE_ADDR + idx, 7).unwrap();
        rom.write_u8(ANIMATED_GFX_ADDR + idx, 9).unwrap();
        rom.write_u8(MOSAIC_ADDR + idx, 0b1010).unwrap();
        rom.write_u16(BG_COLOR_ADDR + idx * 2, 0x7C1F).unwrap();
        rom.write_u16(SUBSCREEN_OVERLAY_ADDR + idx * 2, 0x00A5).unwrap();
        rom.write_n(CUSTOM_TILESET_ADDR + idx * 8, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        rom.write_u8(SPRITE_GRAPHICS_STATE1_ADDR + idx, 0x11).unwrap();
        rom.write_u8(SPRITE_GRAPHICS_STATE2_ADDR + idx, 0x22).unwrap();
        rom.write_u8(SPRITE_PALETTE_STATE1_ADDR + idx, 0x33).unwrap();
        rom.write_u8(SPRITE_PALETTE_STATE2_ADDR + idx, 0x44).unwrap();
        for (slot, value) in [0xAu8, 0xB, 0xC, 0xD].into_iter().enumerate() {
            rom.write_u8(MUSIC_TABLE_ADDR + idx * 4 + slot, value).unwrap();
        }

        let table = AreaTable::load(&rom, Version::V3).unwrap();
        let area = table.get(idx as u8).unwrap();
        assert_eq!(area.size, AreaSize::Wide);
        assert_eq!(area.main_palette, Some(7));
        assert_eq!(area.animated_gfx, Some(9));
        assert_eq!(area.mosaic, Mosaic { up: false, down: true, left: false, right: true });
        assert_eq!(area.bg_color, Some(0x7C1F));
        assert_eq!(area.subscreen_overlay, Some(0x00A5));
        assert_eq!(area.custom_tileset, Some([1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(area.sprite_graphics, [0, 0x11, 0x22]);
        assert_eq!(area.sprite_palette, [0, 0x33, 0x44]);
        assert_eq!(area.music, [0xA, 0xB, 0xC, 0xD]);
    }

    #[test]
    fn legal_size_downgrades_wide_on_lower_versions() {
        let mut area = Area {
            id: 0,
            parent: 0xFF,
            size: AreaSize::Wide,
            area_graphics: 0,
            area_palette: 0,
            main_palette: None,
            animated_gfx: None,
            sprite_graphics: [0; 3],
            sprite_palette: [0; 3],
            message_id: 0,
            music: [0; 4],
            mosaic: Mosaic::default(),
            custom_tileset: None,
            subscreen_overlay: None,
            bg_color: None,
        };
        assert_eq!(area.legal_size(Version::V2), AreaSize::Small);
        area.size = AreaSize::Wide;
        assert_eq!(area.legal_size(Version::V3), AreaSize::Wide);
    }
}
