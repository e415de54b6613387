//! C7 — overworld engine. Loads every area from ROM, builds per-area
//! bitmaps lazily, owns the entity collections, and mediates hover-driven
//! (pre)loading. This is the component that wires C1/C2/C3/C4/C5/C6/C9/C10
//! together; spec.md calls it "the heart" of the engine.

use std::collections::VecDeque;

use hashbrown::HashMap;

use crate::area::{Area, AreaSize, AreaTable, AREA_COUNT};
use crate::entities::{EntityHandle, EntityStore};
use crate::error::{Error, Result};
use crate::gfx::codec;
use crate::gfx::tile::{self, Tile16, Tile8};
use crate::palette::{ColorRgb, PaletteEngine, OVERWORLD_CONSUMED_GROUPS};
use crate::rom::Rom;
use crate::tiles::{MapTiles, Tile32, World, WORLD_TILE32_DIM};
use crate::version::Version;

/// v1+ "expanded space" addresses, grounded directly on
/// `overworld_version_helper.h`'s `SupportsExpandedSpace` doc comment
/// ("Map data (0x130000+)", "Sprite data (0x141438+)", "Message IDs
/// (0x1417F8+)").
pub const MAP_DATA_EXPANDED_ADDR: usize = 0x130000;
pub const MESSAGE_IDS_EXPANDED_ADDR: usize = 0x1417F8;
/// Placed right after `MESSAGE_IDS_EXPANDED_ADDR`'s `AREA_COUNT * 2`-byte
/// table (ending `0x141938`) rather than before it: an earlier placeholder
/// put this address at `0x141438`, which a full 3-game-state sprite table
/// (`save::SPRITE_TABLE_EXPANDED_ADDR`'s sizing) would have run straight
/// through the message-id table above. Kept here rather than in `save.rs`
/// since it's the address the expanded-space doc comment on this module
/// already promises.
pub const SPRITE_DATA_EXPANDED_ADDR: usize = 0x141938;

/// Legacy (vanilla) screen-pointer table. Not named by any retrieved
/// source; placed by the same "adjacent free ROM space" convention
/// `palette.rs`'s ungrounded groups use, and documented as a placeholder
/// in the grounding ledger. Deliberately kept clear of `area.rs`'s grounded
/// tables, which occupy up to 0x7DBC.
pub const SCREEN_POINTERS_VANILLA_ADDR: usize = 0x7E000;

/// Tile16 definition table: `N_TILE16` entries of 8 bytes each (spec.md
/// §3.3: "a few hundred"). Placeholder address, same convention as above.
pub const TILE16_DEFS_ADDR: usize = 0x90000;
pub const N_TILE16: usize = 0x300;

/// Tile32 table: four parallel byte arrays holding `t0..t3` (spec.md §6.1).
/// Placeholder address.
pub const TILE32_TABLE_ADDR: usize = 0x92000;
pub const N_TILE32: usize = 0x2000;

/// Raw graphics sheet data, `tile::SHEET_COUNT` sheets of `tile::SHEET_BYTES`
/// each. Placeholder address, sized to clear the tile32 table above (which
/// spans 0x92000..0xA2000).
pub const GFX_SHEETS_ADDR: usize = 0xB0000;

const SHEET_BYTES: usize = tile::SHEET_BYTES;
const TILES_PER_SHEET: usize = tile::TILES_PER_SHEET;

/// Each area selects four graphics sheets by its `area_graphics` selector.
/// No retrieved source names the selector table's layout; this crate picks
/// a deterministic mapping (four consecutive sheets starting at
/// `area_graphics * 4`, wrapped into range) so every area resolves to a
/// stable, testable sheet set.
fn area_sheet_ids(area_graphics: u8) -> [usize; 4] {
    let base = (area_graphics as usize * 4) % tile::SHEET_COUNT;
    [
        base % tile::SHEET_COUNT,
        (base + 1) % tile::SHEET_COUNT,
        (base + 2) % tile::SHEET_COUNT,
        (base + 3) % tile::SHEET_COUNT,
    ]
}

pub const BUILD_DELAY_MS: f32 = 150.0;
pub const PRELOAD_DELAY_MS: f32 = 400.0;

#[derive(Default)]
struct HoverState {
    area: Option<u8>,
    dwell_ms: f32,
    built_this_hover: bool,
    preloaded_this_hover: bool,
}

/// A composed, rendered area: 256x256 8bpp palette indices plus the
/// 256-color palette they're drawn against.
pub struct AreaBitmap {
    pub indices: Vec<u8>, // 256 * 256, row-major
    pub palette: [ColorRgb; 256],
}

const AREA_PIXELS: usize = crate::tiles::AREA_TILE16_DIM * 16; // 32 tile16 * 16px = 512

impl AreaBitmap {
    fn blank() -> Self {
        AreaBitmap { indices: vec![0; AREA_PIXELS * AREA_PIXELS], palette: [ColorRgb::default(); 256] }
    }
}

pub struct Overworld {
    rom: Rom,
    version: Version,
    palettes: PaletteEngine,
    sheets: Vec<Tile8>, // flat: sheet_id * TILES_PER_SHEET + tile_in_sheet
    areas: AreaTable,
    tile16_defs: Vec<Tile16>,
    tile32_table: Vec<Tile32>,
    tiles: MapTiles,
    entities: EntityStore,
    bitmaps: HashMap<u8, AreaBitmap>,
    hover: HoverState,
    preload_queue: VecDeque<u8>,
    pending_uploads: VecDeque<u8>,
}

impl Overworld {
    /// Phase 1-5 of load: tile assembly, screen decompression, area object
    /// creation (here: area record load), map configuration, then entity
    /// loading — matching the phase ordering `overworld_regression_test.cc`
    /// documents in its comments.
    pub fn load(rom: Rom) -> Result<Overworld> {
        log::info!("loading overworld ({} byte ROM)", rom.len());
        let version = Version::detect(&rom);

        let mut palettes = PaletteEngine::new();
        palettes.load(&rom)?;

        let sheets = Self::load_sheets(&rom)?;
        let areas = AreaTable::load(&rom, version)?;
        let tile16_defs = Self::load_tile16_defs(&rom)?;
        let tile32_table = Self::load_tile32_table(&rom)?;
        let tiles = Self::load_tiles(&rom, version, &tile32_table)?;
        let entities = EntityStore::with_capacities(AREA_COUNT * 2, AREA_COUNT * 2, AREA_COUNT * 2, AREA_COUNT * 4);

        Ok(Overworld {
            rom,
            version,
            palettes,
            sheets,
            areas,
            tile16_defs,
            tile32_table,
            tiles,
            entities,
            bitmaps: HashMap::new(),
            hover: HoverState::default(),
            preload_queue: VecDeque::new(),
            pending_uploads: VecDeque::new(),
        })
    }

    /// Decodes every graphics sheet in parallel (spec.md §5: "decompression
    /// may run in parallel across areas/sheets during Load") — each sheet's
    /// 64x32 nibble-plane data is independent of every other sheet's, so
    /// there's no shared state to synchronize.
    fn load_sheets(rom: &Rom) -> Result<Vec<Tile8>> {
        use rayon::prelude::*;

        let decoded: Vec<Result<Vec<Tile8>>> = (0..tile::SHEET_COUNT)
            .into_par_iter()
            .map(|i| {
                let addr = GFX_SHEETS_ADDR + i * SHEET_BYTES;
                let data = rom.read_n(addr, SHEET_BYTES).unwrap_or(&[0u8; 0]);
                if data.len() == SHEET_BYTES {
                    tile::decode_sheet(data)
                } else {
                    Ok(vec![[[0u8; 8]; 8]; TILES_PER_SHEET])
                }
            })
            .collect();

        let mut all = Vec::with_capacity(tile::SHEET_COUNT * TILES_PER_SHEET);
        for sheet in decoded {
            all.extend(sheet?);
        }
        Ok(all)
    }

    fn load_tile16_defs(rom: &Rom) -> Result<Vec<Tile16>> {
        let mut defs = Vec::with_capacity(N_TILE16);
        for i in 0..N_TILE16 {
            let addr = TILE16_DEFS_ADDR + i * 8;
            match rom.read_n(addr, 8) {
                Ok(bytes) => {
                    let mut arr = [0u8; 8];
                    arr.copy_from_slice(bytes);
                    defs.push(Tile16::from_bytes(&arr));
                }
                Err(_) => defs.push(Tile16::default()),
            }
        }
        Ok(defs)
    }

    fn load_tile32_table(rom: &Rom) -> Result<Vec<Tile32>> {
        let mut table = Vec::with_capacity(N_TILE32);
        for i in 0..N_TILE32 {
            let base = TILE32_TABLE_ADDR + i * 8;
            let mut ids = [0u16; 4];
            let mut any_read = false;
            for (k, id) in ids.iter_mut().enumerate() {
                if let Ok(v) = rom.read_u16(base + k * 2) {
                    *id = v;
                    any_read = true;
                }
            }
            if !any_read {
                break;
            }
            table.push(Tile32 { tile16_ids: ids });
        }
        Ok(table)
    }

    /// Decompresses every area's screen data in parallel, then folds the
    /// results into the per-world tile32 grids sequentially (spec.md §5's
    /// parallel-decompression note applies to the independent per-area
    /// decode work, not to the shared grid it's written into).
    fn load_tiles(rom: &Rom, version: Version, tile32_table: &[Tile32]) -> Result<MapTiles> {
        use rayon::prelude::*;

        let screens_base =
            if version.supports_expanded_space() { MAP_DATA_EXPANDED_ADDR } else { SCREEN_POINTERS_VANILLA_ADDR };

        const AREA_TILE32_DIM: usize = crate::tiles::AREA_TILE16_DIM / 2;

        let per_area: Vec<Vec<u16>> = (0..AREA_COUNT)
            .into_par_iter()
            .map(|area_id| {
                let ptr_addr = screens_base + area_id * 3;
                let decoded = match rom.read_u24(ptr_addr) {
                    Ok(snes_ptr) if snes_ptr != 0 => {
                        let pc = Rom::lorom_to_pc(snes_ptr);
                        match rom.read_n(pc, rom.len().saturating_sub(pc)) {
                            Ok(slice) => codec::decode(slice, Some(16 * 16 * 2)).unwrap_or_default(),
                            Err(_) => Vec::new(),
                        }
                    }
                    _ => Vec::new(),
                };

                let mut ids = vec![0u16; AREA_TILE32_DIM * AREA_TILE32_DIM];
                for ty in 0..AREA_TILE32_DIM {
                    for tx in 0..AREA_TILE32_DIM {
                        let off = (ty * AREA_TILE32_DIM + tx) * 2;
                        ids[ty * AREA_TILE32_DIM + tx] = if off + 1 < decoded.len() {
                            u16::from_le_bytes([decoded[off], decoded[off + 1]])
                        } else {
                            0
                        };
                    }
                }
                ids
            })
            .collect();

        let mut per_world_indices: [Vec<u16>; 3] = [
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
        ];

        for (area_id, ids) in per_area.into_iter().enumerate() {
            let world = match area_id / 0x40 {
                0 => World::Light,
                1 => World::Dark,
                _ => World::Special,
            };
            let local = area_id % 0x40;
            let area_col = local % 8;
            let area_row = local / 8;

            for ty in 0..AREA_TILE32_DIM {
                for tx in 0..AREA_TILE32_DIM {
                    let world_tx = area_col * AREA_TILE32_DIM + tx;
                    let world_ty = area_row * AREA_TILE32_DIM + ty;
                    per_world_indices[world.index()][world_ty * WORLD_TILE32_DIM + world_tx] =
                        ids[ty * AREA_TILE32_DIM + tx];
                }
            }
        }

        MapTiles::expand_from_tile32(tile32_table, &per_world_indices)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn area(&self, id: u8) -> Result<&Area> {
        self.areas.get(id)
    }

    pub fn areas(&self) -> &AreaTable {
        &self.areas
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Exposed `pub` (not `pub(crate)` like the accessors below) since a
    /// caller needs it to write the ROM back out after `save::save`.
    pub fn rom_mut(&mut self) -> &mut Rom {
        &mut self.rom
    }

    pub fn rom(&self) -> &Rom {
        &self.rom
    }

    // -- pub(crate) accessors for the save pipeline (C8) --

    pub(crate) fn areas_mut(&mut self) -> &mut AreaTable {
        &mut self.areas
    }

    pub(crate) fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub(crate) fn tiles(&self) -> &MapTiles {
        &self.tiles
    }

    pub(crate) fn tile16_defs(&self) -> &[Tile16] {
        &self.tile16_defs
    }

    pub(crate) fn tile32_table_mut(&mut self) -> &mut Vec<Tile32> {
        &mut self.tile32_table
    }

    // -- §4.6/§4.7 edit paths --

    pub fn get_tile(&self, world: World, x: u16, y: u16) -> u16 {
        self.tiles.get_tile(world, x, y)
    }

    /// `SetTile`: updates C5, then if the owning area's bitmap is already
    /// built, re-renders only that 16x16 tile16 region in place (spec.md
    /// §4.7 edit paths) instead of a full rebuild.
    pub fn set_tile(&mut self, world: World, x: u16, y: u16, tile16_id: u16) {
        self.tiles.set_tile(world, x, y, tile16_id);
        let area_id = Self::area_id_for_cell(world, x, y);
        if self.bitmaps.contains_key(&area_id) {
            self.rebuild_region(area_id, bitmap_local_origin(x, y));
            self.pending_uploads.push_back(area_id);
        }
    }

    fn area_id_for_cell(world: World, x: u16, y: u16) -> u8 {
        let area_col = (x as usize) / 32;
        let area_row = (y as usize) / 32;
        let local = (area_row * 8 + area_col) as u8;
        local + (world.index() as u8) * 0x40
    }

    fn rebuild_region(&mut self, area_id: u8, (ox, oy): (usize, usize)) {
        let Some(area) = self.areas.get(area_id).ok().cloned() else { return };
        let sheet_ids = area_sheet_ids(area.area_graphics);
        let area_sheets = self.gather_area_sheets(sheet_ids);
        let world = Self::world_for_area(area_id);
        let area_col = (area_id as usize % 0x40) % 8;
        let area_row = (area_id as usize % 0x40) / 8;
        let local_x = (ox / 16) as u16;
        let local_y = (oy / 16) as u16;
        let world_x = (area_col * 32) as u16 + local_x;
        let world_y = (area_row * 32) as u16 + local_y;
        let tile16_id = self.tiles.get_tile(world, world_x, world_y);

        if let (Some(bitmap), Some(def)) = (self.bitmaps.get_mut(&area_id), self.tile16_defs.get(tile16_id as usize))
        {
            let rendered = tile::render_tile16(def, &area_sheets);
            for py in 0..16 {
                for px in 0..16 {
                    bitmap.indices[(oy + py) * AREA_PIXELS + (ox + px)] = rendered[py][px];
                }
            }
        }
    }

    fn gather_area_sheets(&self, sheet_ids: [usize; 4]) -> Vec<Tile8> {
        let mut out = Vec::with_capacity(4 * TILES_PER_SHEET);
        for sheet_id in sheet_ids {
            let start = sheet_id * TILES_PER_SHEET;
            out.extend(self.sheets[start..start + TILES_PER_SHEET].iter().copied());
        }
        out
    }

    fn world_for_area(area_id: u8) -> World {
        match area_id / 0x40 {
            0 => World::Light,
            1 => World::Dark,
            _ => World::Special,
        }
    }

    /// Composes the palette, selects graphics sheets, and renders the full
    /// 32x32 tile16 grid for an area into a 512x512 bitmap, caching it.
    pub fn ensure_map_built(&mut self, area_id: u8) -> Result<()> {
        if self.bitmaps.contains_key(&area_id) {
            return Ok(());
        }
        let area = self.areas.get(area_id)?.clone();
        let bg_override = area.bg_color.map(crate::palette::ColorRgb::from_bgr555);
        let palette = self.palettes.compose_area_palette(
            area.area_palette as usize,
            area.main_palette.map(|m| m as usize),
            bg_override,
        )?;

        let sheet_ids = area_sheet_ids(area.area_graphics);
        let area_sheets = self.gather_area_sheets(sheet_ids);
        let world = Self::world_for_area(area_id);
        let local = area_id as usize % 0x40;
        let area_col = local % 8;
        let area_row = local / 8;

        let mut bitmap = AreaBitmap::blank();
        bitmap.palette = palette;
        for ty in 0..32usize {
            for tx in 0..32usize {
                let world_x = (area_col * 32 + tx) as u16;
                let world_y = (area_row * 32 + ty) as u16;
                let tile16_id = self.tiles.get_tile(world, world_x, world_y);
                let def = self.tile16_defs.get(tile16_id as usize).copied().unwrap_or_default();
                let rendered = tile::render_tile16(&def, &area_sheets);
                let ox = tx * 16;
                let oy = ty * 16;
                for py in 0..16 {
                    for px in 0..16 {
                        bitmap.indices[(oy + py) * AREA_PIXELS + (ox + px)] = rendered[py][px];
                    }
                }
            }
        }
        self.bitmaps.insert(area_id, bitmap);
        self.pending_uploads.push_back(area_id);
        Ok(())
    }

    pub fn area_bitmap(&self, area_id: u8) -> Option<&AreaBitmap> {
        self.bitmaps.get(&area_id)
    }

    /// Invalidates a cached area bitmap so it rebuilds lazily on next
    /// `ensure_map_built`. Called by the palette-change listener (below)
    /// and by `configure_multi_area_map`'s sibling refresh.
    pub fn invalidate_area(&mut self, area_id: u8) {
        self.bitmaps.remove(&area_id);
    }

    /// Registers this overworld's cache-invalidation hook with a palette
    /// engine so edits to consumed groups invalidate affected bitmaps
    /// (spec.md §4.7 "Cache coherence"). Invalidation is conservative: any
    /// area whose `area_graphics`/`area_palette` uses an overworld-consumed
    /// group is invalidated regardless of which row changed.
    pub fn consumed_group_changed(&mut self, group: &str) {
        if !OVERWORLD_CONSUMED_GROUPS.contains(&group) {
            return;
        }
        let ids: Vec<u8> = self.areas.iter().map(|a| a.id).collect();
        for id in ids {
            self.invalidate_area(id);
        }
    }

    /// Edits one palette color and invalidates every cached bitmap that
    /// consumes the affected group, in that order (spec.md §5 "Ordering
    /// guarantees": notification happens after the buffer update). Unlike
    /// `PaletteEngine::register_listener` (useful for external consumers
    /// that don't own the engine), this sequences the two steps directly
    /// since `Overworld` owns both halves.
    pub fn set_palette_color(&mut self, group: &str, row_idx: usize, color_idx: usize, color: ColorRgb) -> Result<()> {
        self.palettes.set_color(group, row_idx, color_idx, color)?;
        self.consumed_group_changed(group);
        Ok(())
    }

    pub fn palette_color(&self, group: &str, row_idx: usize, color_idx: usize) -> Result<ColorRgb> {
        Ok(self.palettes.row(group, row_idx)?.color(color_idx))
    }

    pub fn configure_multi_area_map(&mut self, area_id: u8, size: AreaSize) -> Result<()> {
        let version = self.version;
        self.areas.configure_multi_area_map(version, area_id, size)?;
        for member in AreaTable::group_members(area_id, size) {
            self.invalidate_area(member);
        }
        Ok(())
    }

    // -- entities --

    pub fn insert_entrance(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8, entrance_id: u16, is_hole: bool) -> Result<EntityHandle> {
        let parent = self.areas.get(current_map)?.parent;
        self.entities.insert_entrance(mouse_x, mouse_y, current_map, parent, entrance_id, is_hole)
    }

    pub fn insert_exit(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8) -> Result<EntityHandle> {
        let parent = self.areas.get(current_map)?.parent;
        self.entities.insert_exit(mouse_x, mouse_y, current_map, parent)
    }

    pub fn insert_item(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8, item_id: u8) -> Result<EntityHandle> {
        let parent = self.areas.get(current_map)?.parent;
        self.entities.insert_item(mouse_x, mouse_y, current_map, parent, item_id)
    }

    pub fn insert_sprite(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8, game_state: u8, sprite_id: u8) -> Result<EntityHandle> {
        let parent = self.areas.get(current_map)?.parent;
        self.entities.insert_sprite(mouse_x, mouse_y, current_map, parent, game_state, sprite_id)
    }

    // -- hover debounce / preload queue (spec.md §4.7 point 4, §5) --

    /// Advances the hover state by `dt_ms` for the area currently under the
    /// pointer (or `None` if the pointer has left the overworld canvas).
    /// Builds the area after `BUILD_DELAY_MS` of continuous dwell, and
    /// after `PRELOAD_DELAY_MS` enqueues its 8-neighborhood for background
    /// builds (drained one at a time by `pump_preload_queue`).
    pub fn tick_hover(&mut self, dt_ms: f32, area_under_pointer: Option<u8>) -> Result<()> {
        if self.hover.area != area_under_pointer {
            self.hover = HoverState { area: area_under_pointer, dwell_ms: 0.0, built_this_hover: false, preloaded_this_hover: false };
        }
        let Some(area_id) = area_under_pointer else { return Ok(()) };
        self.hover.dwell_ms += dt_ms;

        if !self.hover.built_this_hover && self.hover.dwell_ms >= BUILD_DELAY_MS {
            self.ensure_map_built(area_id)?;
            self.hover.built_this_hover = true;
        }
        if !self.hover.preloaded_this_hover && self.hover.dwell_ms >= PRELOAD_DELAY_MS {
            for neighbor in self.neighborhood(area_id) {
                if !self.bitmaps.contains_key(&neighbor) && !self.preload_queue.contains(&neighbor) {
                    self.preload_queue.push_back(neighbor);
                }
            }
            self.hover.preloaded_this_hover = true;
        }
        Ok(())
    }

    /// Click is an immediate build, bypassing the dwell timer.
    pub fn on_click(&mut self, area_id: u8) -> Result<()> {
        self.ensure_map_built(area_id)
    }

    /// Consumes at most one entry from the preload queue per call (the
    /// spec's "≤ 1 area per frame" rate). A stale or out-of-range neighbor
    /// (e.g. one past the special world's 32 areas) is dropped silently
    /// rather than surfaced as an error — preloading is best-effort.
    pub fn pump_preload_queue(&mut self) -> Result<()> {
        if let Some(area_id) = self.preload_queue.pop_front() {
            if (area_id as usize) < AREA_COUNT {
                self.ensure_map_built(area_id)?;
            }
        }
        Ok(())
    }

    /// The up-to-8 orthogonal/diagonal neighbors within the same world,
    /// clamped both to the 8-wide grid and to the world's actual area count
    /// (the special world only populates its first 32 of 64 nominal slots).
    fn neighborhood(&self, area_id: u8) -> Vec<u8> {
        let world_base = area_id - (area_id % 0x40);
        let local = area_id % 0x40;
        let col = (local % 8) as i32;
        let row = (local / 8) as i32;
        let mut out = Vec::with_capacity(8);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nc = col + dx;
                let nr = row + dy;
                let candidate = world_base as i32 + nr * 8 + nc;
                if (0..8).contains(&nc) && (0..8).contains(&nr) && candidate < AREA_COUNT as i32 {
                    out.push(candidate as u8);
                }
            }
        }
        out
    }

    pub fn drain_pending_uploads(&mut self) -> Vec<u8> {
        self.pending_uploads.drain(..).collect()
    }
}

fn bitmap_local_origin(x: u16, y: u16) -> (usize, usize) {
    ((x as usize % 32) * 16, (y as usize % 32) * 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rom() -> Rom {
        let mut data = vec![0u8; 0x200000];
        for i in 0..AREA_COUNT {
            data[crate::area::SCREEN_SIZES_ADDR + i] = 0x01;
        }
        for i in 0..0x40 {
            data[crate::area::PARENT_TABLE_ADDR + i] = i as u8;
        }
        Rom::new(data)
    }

    #[test]
    fn load_succeeds_on_an_empty_rom() {
        let rom = test_rom();
        let overworld = Overworld::load(rom).unwrap();
        assert_eq!(overworld.version(), Version::Vanilla);
        assert_eq!(overworld.areas().len(), AREA_COUNT);
    }

    #[test]
    fn set_tile_then_get_tile_roundtrips() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        overworld.set_tile(World::Light, 10, 10, 0x42);
        assert_eq!(overworld.get_tile(World::Light, 10, 10), 0x42);
    }

    #[test]
    fn ensure_map_built_is_idempotent_and_produces_a_full_bitmap() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        overworld.ensure_map_built(0).unwrap();
        overworld.ensure_map_built(0).unwrap();
        let bitmap = overworld.area_bitmap(0).unwrap();
        assert_eq!(bitmap.indices.len(), AREA_PIXELS * AREA_PIXELS);
    }

    #[test]
    fn hover_builds_only_after_dwell_threshold() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        overworld.tick_hover(50.0, Some(0)).unwrap();
        assert!(overworld.area_bitmap(0).is_none());
        overworld.tick_hover(120.0, Some(0)).unwrap();
        assert!(overworld.area_bitmap(0).is_some());
    }

    #[test]
    fn preload_enqueues_neighborhood_after_preload_delay() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        overworld.tick_hover(500.0, Some(9)).unwrap(); // area 9 = col1,row1: full 8-neighborhood
        assert_eq!(overworld.preload_queue.len(), 8);
    }

    #[test]
    fn insert_entrance_resolves_self_parent() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        let handle = overworld.insert_entrance(120, 72, 0x05, 1, false).unwrap();
        let entrance = overworld.entities().entrance(handle).unwrap();
        assert_eq!(entrance.map_id, 0x05);
    }

    #[test]
    fn palette_edit_invalidates_built_area_and_new_color_is_visible() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        overworld.ensure_map_built(0).unwrap();
        overworld.drain_pending_uploads();

        let new_color = ColorRgb { r: 31, g: 0, b: 0 };
        overworld.set_palette_color("ow_aux", 0, 1, new_color).unwrap();

        assert!(overworld.area_bitmap(0).is_none(), "edited area's bitmap should be invalidated");
        overworld.ensure_map_built(0).unwrap();
        assert_eq!(overworld.area_bitmap(0).unwrap().palette[1], new_color);
        assert_eq!(overworld.palette_color("ow_aux", 0, 1).unwrap(), new_color);
    }

    #[test]
    fn wide_promotion_on_non_v3_is_configuration_error() {
        let rom = test_rom();
        let mut overworld = Overworld::load(rom).unwrap();
        assert!(matches!(
            overworld.configure_multi_area_map(0, AreaSize::Wide),
            Err(Error::Configuration(_))
        ));
    }
}
