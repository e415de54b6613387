//! C3 — palette engine.
//!
//! Decodes the fixed-address palette groups into `{group_name -> [row ×
//! colors]}`, and composes an area's 256-entry working palette out of its
//! main/aux/BG-override rows. Grounded on the teacher's `import_palette` /
//! `import_all_palettes` (`src/import.rs`), generalized from the three
//! groups it loads (Main/Aux/Animated) to the full set spec.md names.

use hashbrown::HashMap;

use crate::error::{Error, Result};
use crate::rom::Rom;

pub type ColorValue = u8; // 0-31, raw 5-bit SNES channel value
pub type PaletteId = u16;

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ColorRgb {
    pub r: ColorValue,
    pub g: ColorValue,
    pub b: ColorValue,
}

impl ColorRgb {
    /// Scales a 5-bit (0-31) channel value up to 8-bit (0-255).
    pub fn scale_channel(c: u8) -> u8 {
        ((c as u16) * 255 / 31) as u8
    }

    pub fn to_rgb8(self) -> [u8; 3] {
        [
            Self::scale_channel(self.r),
            Self::scale_channel(self.g),
            Self::scale_channel(self.b),
        ]
    }

    pub(crate) fn from_bgr555(word: u16) -> Self {
        ColorRgb {
            r: (word & 0x1F) as u8,
            g: ((word >> 5) & 0x1F) as u8,
            b: ((word >> 10) & 0x1F) as u8,
        }
    }
}

/// One row of a palette group: a list of colors, always normalized so that
/// index 0 is the transparent entry (synthesized for implicit-transparent
/// groups, loaded verbatim for explicit-transparent ones).
#[derive(Clone, Debug, Default)]
pub struct PaletteRow {
    pub id: PaletteId,
    pub colors: Vec<ColorRgb>,
}

impl PaletteRow {
    pub fn color(&self, idx: usize) -> ColorRgb {
        self.colors.get(idx).copied().unwrap_or_default()
    }
}

#[derive(Copy, Clone, Debug)]
enum Transparency {
    /// ROM stores `width` colors; a synthetic black is prepended at index 0.
    Implicit,
    /// ROM stores `width` colors including the (already transparent) slot 0.
    Explicit,
}

#[derive(Clone, Copy, Debug)]
struct GroupSpec {
    name: &'static str,
    base_addr: usize,
    row_count: usize,
    colors_per_row: usize,
    transparency: Transparency,
}

/// Base addresses for `Main`/`Aux`/`Animated` come straight from the
/// teacher's `import_all_palettes`, and are correctly contiguous
/// (`ow_animated` .. `ow_main` .. `ow_aux` spans `0xDE604..0xDEBB4` with no
/// overlap). The remaining groups follow the same 7/15/16/narrow layout
/// rules spec.md documents but have no teacher-grounded addresses; they're
/// packed sequentially right after `ow_aux`'s end so that no two tables
/// claim the same bytes (an earlier by-convention layout had `sprites_aux1`
/// and `sprites_aux2` overlapping). `ow_mini_map` keeps its own isolated,
/// teacher-unrelated address since it lives far away in the low ROM banks.
const GROUPS: &[GroupSpec] = &[
    GroupSpec { name: "ow_main", base_addr: 0xDE6C8, row_count: 30, colors_per_row: 7, transparency: Transparency::Implicit },
    GroupSpec { name: "ow_aux", base_addr: 0xDE86C, row_count: 60, colors_per_row: 7, transparency: Transparency::Implicit },
    GroupSpec { name: "ow_animated", base_addr: 0xDE604, row_count: 14, colors_per_row: 7, transparency: Transparency::Implicit },
    GroupSpec { name: "sprites_aux1", base_addr: 0xDEBB4, row_count: 12, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "sprites_aux2", base_addr: 0xDED1C, row_count: 11, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "sprites_aux3", base_addr: 0xDEE66, row_count: 2, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "dungeon_main", base_addr: 0xDEEA2, row_count: 20, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "global_sprites", base_addr: 0xDF0FA, row_count: 1, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "armors", base_addr: 0xDF118, row_count: 5, colors_per_row: 15, transparency: Transparency::Implicit },
    GroupSpec { name: "hud", base_addr: 0xDF1AE, row_count: 2, colors_per_row: 16, transparency: Transparency::Explicit },
    GroupSpec { name: "ow_mini_map", base_addr: 0x75645, row_count: 2, colors_per_row: 16, transparency: Transparency::Explicit },
    GroupSpec { name: "swords", base_addr: 0xDF1EE, row_count: 4, colors_per_row: 3, transparency: Transparency::Implicit },
    GroupSpec { name: "shields", base_addr: 0xDF206, row_count: 3, colors_per_row: 4, transparency: Transparency::Implicit },
    GroupSpec { name: "grass", base_addr: 0xDF21E, row_count: 1, colors_per_row: 3, transparency: Transparency::Implicit },
    GroupSpec { name: "3d_object", base_addr: 0xDF224, row_count: 1, colors_per_row: 8, transparency: Transparency::Implicit },
];

/// Which palette groups an area bitmap consumes; used to fan out change
/// notifications (spec.md §4.3 "Edit notification").
pub const OVERWORLD_CONSUMED_GROUPS: &[&str] = &["ow_main", "ow_aux", "ow_animated", "grass"];

#[derive(Default)]
pub struct PaletteEngine {
    groups: HashMap<String, Vec<PaletteRow>>,
    next_id: PaletteId,
    listeners: Vec<Box<dyn FnMut(&str, usize) + Send>>,
}

impl PaletteEngine {
    pub fn new() -> Self {
        PaletteEngine::default()
    }

    pub fn load(&mut self, rom: &Rom) -> Result<()> {
        self.groups.clear();
        let mut id = 0u16;
        for spec in GROUPS {
            let mut rows = Vec::with_capacity(spec.row_count);
            for i in 0..spec.row_count {
                rows.push(self.load_row(rom, spec, i, id)?);
                id += 1;
            }
            self.groups.insert(spec.name.to_string(), rows);
        }
        self.next_id = id;
        Ok(())
    }

    fn load_row(&self, rom: &Rom, spec: &GroupSpec, row_idx: usize, id: PaletteId) -> Result<PaletteRow> {
        let stored_addr = spec.base_addr + row_idx * spec.colors_per_row * 2;
        let mut colors = Vec::with_capacity(spec.colors_per_row + 1);
        if matches!(spec.transparency, Transparency::Implicit) {
            colors.push(ColorRgb::default());
        }
        for c in 0..spec.colors_per_row {
            let word = rom
                .read_u16(stored_addr + c * 2)
                .map_err(|_| Error::Decode(format!("truncated palette group {}", spec.name)))?;
            colors.push(ColorRgb::from_bgr555(word));
        }
        Ok(PaletteRow { id, colors })
    }

    pub fn group(&self, name: &str) -> Option<&[PaletteRow]> {
        self.groups.get(name).map(|v| v.as_slice())
    }

    pub fn row(&self, name: &str, row_idx: usize) -> Result<&PaletteRow> {
        self.group(name)
            .and_then(|rows| rows.get(row_idx))
            .ok_or_else(|| Error::Configuration(format!("unknown palette group/row {name}[{row_idx}]")))
    }

    /// Width (including the transparent slot) the sub-palette slice for
    /// `group` should have, per spec.md's "Row layout rule".
    pub fn slice_width(group: &str) -> usize {
        GROUPS
            .iter()
            .find(|s| s.name == group)
            .map(|s| s.colors_per_row + 1)
            .unwrap_or(16)
    }

    pub fn set_color(&mut self, group: &str, row_idx: usize, color_idx: usize, color: ColorRgb) -> Result<()> {
        let rows = self
            .groups
            .get_mut(group)
            .ok_or_else(|| Error::Configuration(format!("unknown palette group {group}")))?;
        let row = rows
            .get_mut(row_idx)
            .ok_or_else(|| Error::Configuration(format!("unknown palette row {group}[{row_idx}]")))?;
        if color_idx >= row.colors.len() {
            return Err(Error::InvalidArgument(format!("color index {color_idx} out of range")));
        }
        row.colors[color_idx] = color;
        self.notify(group, row_idx);
        Ok(())
    }

    pub fn register_listener<F: FnMut(&str, usize) + Send + 'static>(&mut self, f: F) {
        self.listeners.push(Box::new(f));
    }

    fn notify(&mut self, group: &str, row_idx: usize) {
        for listener in &mut self.listeners {
            listener(group, row_idx);
        }
    }

    /// Builds the area's 256-entry working palette: 16 palette-row "pages"
    /// of 16 colors each (matching the 4-bit palette-row field baked into
    /// tile16 sub-tiles), with the requested area/main/aux rows placed at
    /// fixed pages and an optional per-area BG color override at page 0,
    /// index 0.
    pub fn compose_area_palette(
        &self,
        area_palette_row: usize,
        main_palette_row: Option<usize>,
        bg_override: Option<ColorRgb>,
    ) -> Result<[ColorRgb; 256]> {
        let mut out = [ColorRgb::default(); 256];
        let main_rows = self.group("ow_main").ok_or_else(|| Error::Configuration("ow_main not loaded".into()))?;
        let aux_rows = self.group("ow_aux").ok_or_else(|| Error::Configuration("ow_aux not loaded".into()))?;

        let aux = aux_rows
            .get(area_palette_row)
            .ok_or_else(|| Error::Configuration(format!("area palette row {area_palette_row} out of range")))?;
        for (i, c) in aux.colors.iter().enumerate().take(8) {
            out[i] = *c;
        }

        if let Some(main_idx) = main_palette_row {
            let main = main_rows
                .get(main_idx)
                .ok_or_else(|| Error::Configuration(format!("main palette row {main_idx} out of range")))?;
            for (i, c) in main.colors.iter().enumerate().take(8) {
                out[16 + i] = *c;
            }
        }

        if let Some(bg) = bg_override {
            out[0] = bg;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rom() -> Rom {
        Rom::new(vec![0u8; 0x200000])
    }

    #[test]
    fn load_populates_all_groups() {
        let rom = test_rom();
        let mut engine = PaletteEngine::new();
        engine.load(&rom).unwrap();
        for spec in GROUPS {
            assert_eq!(engine.group(spec.name).unwrap().len(), spec.row_count);
        }
    }

    #[test]
    fn implicit_transparent_row_has_black_at_index_zero() {
        let rom = test_rom();
        let mut engine = PaletteEngine::new();
        engine.load(&rom).unwrap();
        let row = engine.row("ow_main", 0).unwrap();
        assert_eq!(row.colors[0], ColorRgb::default());
        assert_eq!(row.colors.len(), 8);
    }

    #[test]
    fn edit_notifies_listener_after_buffer_updated() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        let rom = test_rom();
        let mut engine = PaletteEngine::new();
        engine.load(&rom).unwrap();
        let seen = Arc::new(AtomicBool::new(false));
        let seen2 = seen.clone();
        engine.register_listener(move |g, _| {
            if g == "ow_main" {
                seen2.store(true, Ordering::SeqCst);
            }
        });
        engine.set_color("ow_main", 0, 1, ColorRgb { r: 31, g: 0, b: 0 }).unwrap();
        assert!(seen.load(Ordering::SeqCst));
        assert_eq!(engine.row("ow_main", 0).unwrap().colors[1].r, 31);
    }
}
