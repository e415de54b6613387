//! C8 — save pipeline. Rebuilds the tile32 table from C5's tilemap,
//! compresses screen data, writes the 0xA0 area records and entity
//! collections back to the ROM image, gated by the hack manifest and the
//! project's feature flags (spec.md §4.8).
//!
//! Grounded on the teacher's `persist.rs` for the overall "gather what's
//! dirty, then write it" shape, generalized from JSON files to direct ROM
//! byte writes since this engine's persistence target is the ROM image
//! rather than a sidecar file.

use crate::area::{self, Area, AREAS_PER_WORLD, AREA_COUNT};
use crate::entities::{Entrance, Exit, Item, Sprite};
use crate::error::{Error, Result};
use crate::gfx::codec;
use crate::gfx::tile::Tile16;
use crate::manifest::HackManifest;
use crate::overworld::{
    Overworld, MAP_DATA_EXPANDED_ADDR, N_TILE16, N_TILE32, SCREEN_POINTERS_VANILLA_ADDR,
    SPRITE_DATA_EXPANDED_ADDR, TILE16_DEFS_ADDR, TILE32_TABLE_ADDR,
};
use crate::project::Project;
use crate::rom::Rom;
use crate::tiles::{Tile32, World, AREA_TILE16_DIM, WORLD_TILE32_DIM};
use crate::version::Version;

const AREA_TILE32_DIM: usize = AREA_TILE16_DIM / 2; // 16 tile32s per area edge

/// Legacy (Vanilla) fixed-slot entity tables. Placed right after
/// `area.rs`'s own grounded tables end (`SCREEN_POINTERS_VANILLA_ADDR +
/// AREA_COUNT*3 == 0x7E1E0`), by the same "adjacent free ROM space"
/// convention that address uses. No retrieved source names real vanilla
/// entity-table addresses, so these are placeholders, logged as such in
/// the grounding ledger.
pub const ENTRANCE_TABLE_VANILLA_ADDR: usize = 0x7E200;
pub const EXIT_TABLE_VANILLA_ADDR: usize = 0x7EC00;
pub const ITEM_TABLE_VANILLA_ADDR: usize = 0x80640;
pub const SPRITE_TABLE_VANILLA_ADDR: usize = 0x80DC0;

/// v1+ expanded-space entity tables, placed after
/// `SPRITE_DATA_EXPANDED_ADDR`'s 3-game-state block (`0x141938 +
/// SPRITE_TABLE_ENTRY_BYTES*3*sprite_cap == 0x144638`).
pub const ENTRANCE_TABLE_EXPANDED_ADDR: usize = 0x144638;
pub const EXIT_TABLE_EXPANDED_ADDR: usize = 0x145038;
pub const ITEM_TABLE_EXPANDED_ADDR: usize = 0x146A78;

const ENTRANCE_ENTRY_BYTES: usize = 8;
const EXIT_ENTRY_BYTES: usize = 21;
const ITEM_ENTRY_BYTES: usize = 6;
const SPRITE_ENTRY_BYTES: usize = 6;

/// Sentinel byte an entity entry's first field (`map_id`) is set to when the
/// slot is unused, distinguishing "no entity here" from "entity at area 0".
const DELETED_MARKER: u8 = 0xFF;

/// Saves every enabled phase of `overworld` back into its ROM image,
/// consulting `manifest` (synced to `project`'s `write_policy`, per spec.md
/// §4.9 "C9 is the single source of truth... consulted by C8") before any
/// byte is written. Returns `Conflict` (abort, nothing written) under a
/// `Block` policy, `Encoding` if the tile32 table can't fit the edited
/// tilemap, or an area/entity read/write error.
///
/// Phases run in `Maps` then `Entities` order within this one call, matching
/// spec.md §4.8 "Ordering". If a later phase fails, earlier phases' writes
/// remain in the ROM image; the caller's `Rom::save_to` is simply never
/// reached, so the dirty flag (set by any write) stays set and nothing is
/// flushed to disk.
pub fn save(overworld: &mut Overworld, project: &Project, manifest: &mut HackManifest) -> Result<()> {
    manifest.set_policy(project.write_policy);
    let version = overworld.version();
    let flags = &project.feature_flags;

    let map_plan = if flags.save_overworld_maps {
        Some(plan_maps(overworld, version)?)
    } else {
        None
    };

    let mut projected: Vec<(u32, u32)> = Vec::new();
    if let Some(plan) = &map_plan {
        projected.extend(plan.pc_ranges.iter().flat_map(|&(s, e)| pc_range_to_snes_ranges(s, e)));
    }
    if flags.save_overworld_entrances {
        projected.extend(pc_range_to_snes_ranges(
            entrance_table_addr(version),
            entrance_table_addr(version) + overworld.entities().entrance_capacity() * ENTRANCE_ENTRY_BYTES,
        ));
    }
    if flags.save_overworld_exits {
        projected.extend(pc_range_to_snes_ranges(
            exit_table_addr(version),
            exit_table_addr(version) + overworld.entities().exit_capacity() * EXIT_ENTRY_BYTES,
        ));
    }
    if flags.save_overworld_items {
        projected.extend(pc_range_to_snes_ranges(
            item_table_addr(version),
            item_table_addr(version) + overworld.entities().item_capacity() * ITEM_ENTRY_BYTES,
        ));
    }
    if flags.save_overworld_properties {
        let base = sprite_table_addr(version);
        let per_state = overworld.entities().sprite_capacity(0) * SPRITE_ENTRY_BYTES;
        projected.extend(pc_range_to_snes_ranges(base, base + per_state * 3));
    }

    manifest.analyze_write_ranges(&projected)?;

    if let Some(plan) = map_plan {
        apply_maps(overworld, version, plan)?;
    }
    // Each phase snapshots its live entities into an owned Vec before taking
    // `rom_mut()`: `entities()` and `rom_mut()` each borrow the whole
    // `Overworld`, so they can't be passed as two arguments of one call.
    if flags.save_overworld_entrances {
        let entries: Vec<Entrance> = overworld.entities().entrances().copied().collect();
        let cap = overworld.entities().entrance_capacity();
        write_entrances(overworld.rom_mut(), &entries, cap, version)?;
    }
    if flags.save_overworld_exits {
        let entries: Vec<Exit> = overworld.entities().exits().copied().collect();
        let cap = overworld.entities().exit_capacity();
        write_exits(overworld.rom_mut(), &entries, cap, version)?;
    }
    if flags.save_overworld_items {
        let entries: Vec<Item> = overworld.entities().items().copied().collect();
        let cap = overworld.entities().item_capacity();
        write_items(overworld.rom_mut(), &entries, cap, version)?;
    }
    if flags.save_overworld_properties {
        let mut per_state: [Vec<Sprite>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let mut caps = [0usize; 3];
        for (game_state, slot) in per_state.iter_mut().enumerate() {
            *slot = overworld.entities().sprites(game_state as u8).copied().collect();
            caps[game_state] = overworld.entities().sprite_capacity(game_state as u8);
        }
        write_sprites(overworld.rom_mut(), &per_state, &caps, version)?;
    }

    Ok(())
}

/// Splits a `[start, end)` PC byte range into per-LoROM-bank `(start, end)`
/// SNES address pairs, since a PC range crossing a 0x8000-byte bank
/// boundary does not map to one contiguous SNES range.
fn pc_range_to_snes_ranges(start: usize, end: usize) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    let mut pos = start;
    while pos < end {
        let bank_end = (pos / 0x8000 + 1) * 0x8000;
        let chunk_end = end.min(bank_end);
        out.push((Rom::pc_to_lorom(pos), Rom::pc_to_lorom(chunk_end.saturating_sub(1))));
        pos = chunk_end;
    }
    out
}

fn entrance_table_addr(version: Version) -> usize {
    if version.supports_expanded_space() { ENTRANCE_TABLE_EXPANDED_ADDR } else { ENTRANCE_TABLE_VANILLA_ADDR }
}
fn exit_table_addr(version: Version) -> usize {
    if version.supports_expanded_space() { EXIT_TABLE_EXPANDED_ADDR } else { EXIT_TABLE_VANILLA_ADDR }
}
fn item_table_addr(version: Version) -> usize {
    if version.supports_expanded_space() { ITEM_TABLE_EXPANDED_ADDR } else { ITEM_TABLE_VANILLA_ADDR }
}
fn sprite_table_addr(version: Version) -> usize {
    if version.supports_expanded_space() { SPRITE_DATA_EXPANDED_ADDR } else { SPRITE_TABLE_VANILLA_ADDR }
}

/// Everything computed by the Maps phase before any byte is written:
/// projected PC ranges (for the conflict gate) plus the data to commit.
/// `areas_snapshot`/`tile16_defs_snapshot` are owned copies taken while only
/// an immutable borrow of `overworld` is live, so `apply_maps` can commit
/// them through a single later `&mut` borrow instead of holding an
/// immutable and a mutable accessor call live at once.
struct MapPlan {
    areas_snapshot: Vec<Area>,
    tile16_defs_snapshot: Vec<Tile16>,
    tile32_table: Vec<Tile32>,
    per_world_indices: [Vec<u16>; 3],
    compressed_screens: Vec<Vec<u8>>, // one per area, in area-id order
    screens_base: usize,
    screens_cursor: usize,
    pc_ranges: Vec<(usize, usize)>,
}

fn plan_maps(overworld: &Overworld, version: Version) -> Result<MapPlan> {
    let areas_snapshot: Vec<Area> = overworld.areas().iter().cloned().collect();
    let tile16_defs_snapshot: Vec<Tile16> = overworld.tile16_defs().to_vec();
    let (tile32_table, per_world_indices) = overworld.tiles().compact_tile32(N_TILE32)?;

    let screens_base = if version.supports_expanded_space() { MAP_DATA_EXPANDED_ADDR } else { SCREEN_POINTERS_VANILLA_ADDR };
    let mut pc_ranges = vec![
        (area::AREA_GRAPHICS_ADDR, area::AREA_GRAPHICS_ADDR + area::LIGHT_DARK_AREA_COUNT),
        (area::AREA_PALETTE_ADDR, area::AREA_PALETTE_ADDR + area::LIGHT_DARK_AREA_COUNT),
        (area::SCREEN_SIZES_ADDR, area::SCREEN_SIZES_ADDR + AREA_COUNT),
        (area::PARENT_TABLE_ADDR, area::PARENT_TABLE_ADDR + AREAS_PER_WORLD),
        (area::SPRITE_GRAPHICS_ADDR, area::SPRITE_GRAPHICS_ADDR + AREA_COUNT),
        (area::SPRITE_GRAPHICS_STATE1_ADDR, area::SPRITE_GRAPHICS_STATE1_ADDR + AREA_COUNT),
        (area::SPRITE_GRAPHICS_STATE2_ADDR, area::SPRITE_GRAPHICS_STATE2_ADDR + AREA_COUNT),
        (area::SPRITE_PALETTE_ADDR, area::SPRITE_PALETTE_ADDR + AREA_COUNT),
        (area::SPRITE_PALETTE_STATE1_ADDR, area::SPRITE_PALETTE_STATE1_ADDR + AREA_COUNT),
        (area::SPRITE_PALETTE_STATE2_ADDR, area::SPRITE_PALETTE_STATE2_ADDR + AREA_COUNT),
        (area::MUSIC_TABLE_ADDR, area::MUSIC_TABLE_ADDR + AREA_COUNT * 4),
        (area::MESSAGE_ID_ADDR, area::MESSAGE_ID_ADDR + AREA_COUNT * 2),
        (TILE16_DEFS_ADDR, TILE16_DEFS_ADDR + N_TILE16 * 8),
        (TILE32_TABLE_ADDR, TILE32_TABLE_ADDR + N_TILE32 * 8),
        (screens_base, screens_base + AREA_COUNT * 3),
    ];
    if version.supports_expanded_space() {
        pc_ranges.push((area::SPECIAL_WORLD_GRAPHICS_EXPANDED_ADDR, area::SPECIAL_WORLD_GRAPHICS_EXPANDED_ADDR + area::SPECIAL_WORLD_VANILLA_COUNT));
        pc_ranges.push((area::SPECIAL_WORLD_PALETTE_EXPANDED_ADDR, area::SPECIAL_WORLD_PALETTE_EXPANDED_ADDR + area::SPECIAL_WORLD_VANILLA_COUNT));
    }
    if version.supports_area_enum() {
        pc_ranges.push((area::SCREEN_SIZE_ENUM_ADDR, area::SCREEN_SIZE_ENUM_ADDR + AREA_COUNT));
    }
    if version.supports_main_palette() {
        pc_ranges.push((area::MAIN_PALETTE_ADDR, area::MAIN_PALETTE_ADDR + AREA_COUNT));
    }
    if version.supports_animated_gfx() {
        pc_ranges.push((area::ANIMATED_GFX_ADDR, area::ANIMATED_GFX_ADDR + AREA_COUNT));
    }
    if version.supports_custom_tile_gfx() {
        pc_ranges.push((area::CUSTOM_TILESET_ADDR, area::CUSTOM_TILESET_ADDR + AREA_COUNT * 8));
    }
    if version.supports_subscreen_overlay() {
        pc_ranges.push((area::SUBSCREEN_OVERLAY_ADDR, area::SUBSCREEN_OVERLAY_ADDR + AREA_COUNT * 2));
    }
    if version.supports_custom_bg_colors() {
        pc_ranges.push((area::BG_COLOR_ADDR, area::BG_COLOR_ADDR + AREA_COUNT * 2));
    }
    if version.supports_per_direction_mosaic() {
        pc_ranges.push((area::MOSAIC_ADDR, area::MOSAIC_ADDR + AREA_COUNT));
    }

    let mut compressed_screens = Vec::with_capacity(AREA_COUNT);
    let mut cursor = overworld.rom().len().max(screens_base + AREA_COUNT * 3);
    for area_id in 0..AREA_COUNT as u8 {
        let raw = area_tile32_bytes(area_id, &per_world_indices);
        let compressed = codec::encode(&raw);
        pc_ranges.push((cursor, cursor + compressed.len()));
        cursor += compressed.len();
        compressed_screens.push(compressed);
    }
    let screens_cursor = overworld.rom().len().max(screens_base + AREA_COUNT * 3);

    Ok(MapPlan {
        areas_snapshot,
        tile16_defs_snapshot,
        tile32_table,
        per_world_indices,
        compressed_screens,
        screens_base,
        screens_cursor,
        pc_ranges,
    })
}

/// Extracts one area's 16x16 tile32-id block (little-endian u16 pairs),
/// matching `Overworld::load_tiles`'s read-side layout exactly so the
/// round-trip is lossless.
fn area_tile32_bytes(area_id: u8, per_world_indices: &[Vec<u16>; 3]) -> Vec<u8> {
    let world = match area_id / AREAS_PER_WORLD as u8 {
        0 => World::Light,
        1 => World::Dark,
        _ => World::Special,
    };
    let local = (area_id as usize) % AREAS_PER_WORLD;
    let area_col = local % 8;
    let area_row = local / 8;
    let grid = &per_world_indices[world.index()];

    let mut raw = Vec::with_capacity(AREA_TILE32_DIM * AREA_TILE32_DIM * 2);
    for ty in 0..AREA_TILE32_DIM {
        for tx in 0..AREA_TILE32_DIM {
            let world_tx = area_col * AREA_TILE32_DIM + tx;
            let world_ty = area_row * AREA_TILE32_DIM + ty;
            let id = grid[world_ty * WORLD_TILE32_DIM + world_tx];
            raw.extend_from_slice(&id.to_le_bytes());
        }
    }
    raw
}

fn apply_maps(overworld: &mut Overworld, version: Version, plan: MapPlan) -> Result<()> {
    let rom = overworld.rom_mut();
    write_area_tables(&plan.areas_snapshot, rom, version)?;
    write_tile16_defs(rom, &plan.tile16_defs_snapshot)?;
    write_tile32_table(rom, &plan.tile32_table)?;

    let mut cursor = plan.screens_cursor;
    for (area_id, compressed) in plan.compressed_screens.iter().enumerate() {
        let start = cursor;
        let end = start + compressed.len();
        if end > rom.len() {
            rom.resize(end);
        }
        rom.write_n(start, compressed)?;
        let snes_ptr = Rom::pc_to_lorom(start);
        rom.write_u24(plan.screens_base + area_id * 3, snes_ptr)?;
        cursor = end;
    }

    *overworld.tile32_table_mut() = plan.tile32_table;
    Ok(())
}

fn write_area_tables(areas: &[Area], rom: &mut Rom, version: Version) -> Result<()> {
    for area in areas {
        let idx = area.id as usize;
        write_selector(rom, version, area::AREA_GRAPHICS_ADDR, area::SPECIAL_WORLD_GRAPHICS_EXPANDED_ADDR, area.id, area.area_graphics)?;
        write_selector(rom, version, area::AREA_PALETTE_ADDR, area::SPECIAL_WORLD_PALETTE_EXPANDED_ADDR, area.id, area.area_palette)?;

        // The legacy large-map flag is written on every version (v3 ROMs
        // still carry it for tools that only understand the old scheme);
        // downgraded to Small/Large since it can't express Wide/Tall.
        let legacy_large_flag: u8 = if matches!(area.legal_size(version), area::AreaSize::Small) { 0x01 } else { 0x00 };
        rom.write_u8(area::SCREEN_SIZES_ADDR + idx, legacy_large_flag)?;

        // The v3 size enum is authoritative and round-trips Wide/Tall;
        // only written when the ROM actually supports it.
        if version.supports_area_enum() {
            rom.write_u8(area::SCREEN_SIZE_ENUM_ADDR + idx, area.size as u8)?;
        }

        if version.supports_parent_table() {
            let local = area::Area::local_index(area.id);
            let parent_byte = if area.parent == area.id { 0xFF } else { area.parent };
            rom.write_u8(area::PARENT_TABLE_ADDR + (local % AREAS_PER_WORLD), parent_byte)?;
        }

        rom.write_u8(area::SPRITE_GRAPHICS_ADDR + idx, area.sprite_graphics[0])?;
        rom.write_u8(area::SPRITE_GRAPHICS_STATE1_ADDR + idx, area.sprite_graphics[1])?;
        rom.write_u8(area::SPRITE_GRAPHICS_STATE2_ADDR + idx, area.sprite_graphics[2])?;
        rom.write_u8(area::SPRITE_PALETTE_ADDR + idx, area.sprite_palette[0])?;
        rom.write_u8(area::SPRITE_PALETTE_STATE1_ADDR + idx, area.sprite_palette[1])?;
        rom.write_u8(area::SPRITE_PALETTE_STATE2_ADDR + idx, area.sprite_palette[2])?;
        for (slot, &value) in area.music.iter().enumerate() {
            rom.write_u8(area::MUSIC_TABLE_ADDR + idx * 4 + slot, value)?;
        }
        rom.write_u16(area::MESSAGE_ID_ADDR + idx * 2, area.message_id)?;

        if let Some(main_palette) = area.main_palette {
            rom.write_u8(area::MAIN_PALETTE_ADDR + idx, main_palette)?;
        }
        if let Some(animated_gfx) = area.animated_gfx {
            rom.write_u8(area::ANIMATED_GFX_ADDR + idx, animated_gfx)?;
        }
        if let Some(custom_tileset) = area.custom_tileset {
            rom.write_n(area::CUSTOM_TILESET_ADDR + idx * 8, &custom_tileset)?;
        }
        if let Some(subscreen_overlay) = area.subscreen_overlay {
            rom.write_u16(area::SUBSCREEN_OVERLAY_ADDR + idx * 2, subscreen_overlay)?;
        }
        if let Some(bg_color) = area.bg_color {
            rom.write_u16(area::BG_COLOR_ADDR + idx * 2, bg_color)?;
        }
        if version.supports_per_direction_mosaic() {
            let byte = (area.mosaic.up as u8)
                | (area.mosaic.down as u8) << 1
                | (area.mosaic.left as u8) << 2
                | (area.mosaic.right as u8) << 3;
            rom.write_u8(area::MOSAIC_ADDR + idx, byte)?;
        }
    }
    Ok(())
}

/// Mirrors `area.rs::AreaTable::read_selector_table`'s addressing rule on
/// the write side: light+dark worlds always write their own byte; the
/// special world writes to the expanded table when the ROM supports it,
/// otherwise there is nothing legitimate to write back to (the value is
/// necessarily a mirror of the light-world byte already written).
fn write_selector(rom: &mut Rom, version: Version, base_addr: usize, expanded_addr: usize, id: u8, value: u8) -> Result<()> {
    let idx = id as usize;
    if idx < area::LIGHT_DARK_AREA_COUNT {
        return rom.write_u8(base_addr + idx, value);
    }
    let special_local = idx - area::LIGHT_DARK_AREA_COUNT;
    if version.supports_expanded_space() && special_local < (AREA_COUNT - area::LIGHT_DARK_AREA_COUNT) {
        rom.write_u8(expanded_addr + special_local, value)?;
    }
    Ok(())
}

fn write_tile16_defs(rom: &mut Rom, defs: &[Tile16]) -> Result<()> {
    for (i, def) in defs.iter().enumerate() {
        rom.write_n(TILE16_DEFS_ADDR + i * 8, &def.to_bytes())?;
    }
    Ok(())
}

fn write_tile32_table(rom: &mut Rom, table: &[Tile32]) -> Result<()> {
    if table.len() > N_TILE32 {
        return Err(Error::Encoding(format!("tile32 table has {} entries, capacity is {N_TILE32}", table.len())));
    }
    for (i, entry) in table.iter().enumerate() {
        let base = TILE32_TABLE_ADDR + i * 8;
        for (k, id) in entry.tile16_ids.iter().enumerate() {
            rom.write_u16(base + k * 2, *id)?;
        }
    }
    Ok(())
}

fn write_entrances(rom: &mut Rom, entries: &[Entrance], cap: usize, version: Version) -> Result<()> {
    let base = entrance_table_addr(version);
    let mut slot = 0usize;
    for entrance in entries {
        let addr = base + slot * ENTRANCE_ENTRY_BYTES;
        rom.write_u8(addr, entrance.map_id)?;
        rom.write_u16(addr + 1, entrance.x as u16)?;
        rom.write_u16(addr + 3, entrance.y as u16)?;
        rom.write_u16(addr + 5, entrance.entrance_id)?;
        rom.write_u8(addr + 7, if entrance.is_hole { 1 } else { 0 })?;
        slot += 1;
    }
    clear_remaining_slots(rom, base, slot, cap, ENTRANCE_ENTRY_BYTES)
}

fn write_exits(rom: &mut Rom, entries: &[Exit], cap: usize, version: Version) -> Result<()> {
    let base = exit_table_addr(version);
    let mut slot = 0usize;
    for exit in entries {
        let addr = base + slot * EXIT_ENTRY_BYTES;
        rom.write_u8(addr, exit.map_id)?;
        rom.write_u16(addr + 1, exit.x as u16)?;
        rom.write_u16(addr + 3, exit.y as u16)?;
        rom.write_u16(addr + 5, exit.room_id)?;
        rom.write_u16(addr + 7, exit.scroll.0 as u16)?;
        rom.write_u16(addr + 9, exit.scroll.1 as u16)?;
        rom.write_u16(addr + 11, exit.camera.0 as u16)?;
        rom.write_u16(addr + 13, exit.camera.1 as u16)?;
        rom.write_u16(addr + 15, exit.player.0 as u16)?;
        rom.write_u16(addr + 17, exit.player.1 as u16)?;
        rom.write_u8(addr + 19, exit.door_type_1)?;
        rom.write_u8(addr + 20, exit.door_type_2)?;
        slot += 1;
    }
    clear_remaining_slots(rom, base, slot, cap, EXIT_ENTRY_BYTES)
}

fn write_items(rom: &mut Rom, entries: &[Item], cap: usize, version: Version) -> Result<()> {
    let base = item_table_addr(version);
    let mut slot = 0usize;
    for item in entries {
        let addr = base + slot * ITEM_ENTRY_BYTES;
        rom.write_u8(addr, item.map_id)?;
        rom.write_u8(addr + 1, item.item_id)?;
        rom.write_u16(addr + 2, item.x as u16)?;
        rom.write_u16(addr + 4, item.y as u16)?;
        slot += 1;
    }
    clear_remaining_slots(rom, base, slot, cap, ITEM_ENTRY_BYTES)
}

fn write_sprites(rom: &mut Rom, per_state: &[Vec<Sprite>; 3], caps: &[usize; 3], version: Version) -> Result<()> {
    let base = sprite_table_addr(version);
    for game_state in 0..3usize {
        let cap = caps[game_state];
        let state_base = base + game_state * cap * SPRITE_ENTRY_BYTES;
        let mut slot = 0usize;
        for sprite in &per_state[game_state] {
            let addr = state_base + slot * SPRITE_ENTRY_BYTES;
            rom.write_u8(addr, sprite.map_id)?;
            rom.write_u8(addr + 1, sprite.sprite_id)?;
            rom.write_u16(addr + 2, sprite.x as u16)?;
            rom.write_u16(addr + 4, sprite.y as u16)?;
            slot += 1;
        }
        clear_remaining_slots(rom, state_base, slot, cap, SPRITE_ENTRY_BYTES)?;
    }
    Ok(())
}

fn clear_remaining_slots(rom: &mut Rom, base: usize, from_slot: usize, capacity: usize, entry_bytes: usize) -> Result<()> {
    for slot in from_slot..capacity {
        rom.write_u8(base + slot * entry_bytes, DELETED_MARKER)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Module, WritePolicy};
    use crate::project::Project;
    use crate::rom::Rom;
    use crate::tiles::World;

    fn test_rom() -> Rom {
        let mut data = vec![0u8; 0x200000];
        for i in 0..AREA_COUNT {
            data[area::SCREEN_SIZES_ADDR + i] = 0x01;
        }
        for i in 0..AREAS_PER_WORLD {
            data[area::PARENT_TABLE_ADDR + i] = i as u8;
        }
        Rom::new(data)
    }

    #[test]
    fn save_roundtrips_a_painted_tile_through_the_rom() {
        let mut overworld = Overworld::load(test_rom()).unwrap();
        overworld.set_tile(World::Light, 0, 0, 0x07);
        let project = Project::default();
        let mut manifest = HackManifest::default();

        save(&mut overworld, &project, &mut manifest).unwrap();

        let reloaded = Overworld::load(overworld.rom().clone()).unwrap();
        assert_eq!(reloaded.get_tile(World::Light, 0, 0), 0x07);
    }

    #[test]
    fn save_persists_area_graphics_and_parent_edits() {
        let mut overworld = Overworld::load(test_rom()).unwrap();
        overworld.areas_mut().get_mut(3).unwrap().area_graphics = 9;
        overworld.areas_mut().get_mut(3).unwrap().parent = 2;
        let project = Project::default();
        let mut manifest = HackManifest::default();

        save(&mut overworld, &project, &mut manifest).unwrap();

        let reloaded = Overworld::load(overworld.rom().clone()).unwrap();
        let area = reloaded.area(3).unwrap();
        assert_eq!(area.area_graphics, 9);
        assert_eq!(area.parent, 2);
    }

    #[test]
    fn save_persists_an_inserted_entrance() {
        let mut overworld = Overworld::load(test_rom()).unwrap();
        overworld.insert_entrance(32, 32, 0x05, 3, false).unwrap();
        let project = Project::default();
        let mut manifest = HackManifest::default();

        save(&mut overworld, &project, &mut manifest).unwrap();

        let rom = overworld.rom();
        let map_id = rom.read_u8(ENTRANCE_TABLE_VANILLA_ADDR).unwrap();
        assert_eq!(map_id, 0x05);
    }

    #[test]
    fn save_roundtrips_v3_only_fields_and_wide_size() {
        let mut data = vec![0u8; 0x200000];
        for i in 0..AREA_COUNT {
            data[area::SCREEN_SIZES_ADDR + i] = 0x01;
        }
        for i in 0..AREAS_PER_WORLD {
            data[area::PARENT_TABLE_ADDR + i] = i as u8;
        }
        data[crate::version::ASM_VERSION_ADDR] = 3;
        let rom = Rom::new(data);

        let mut overworld = Overworld::load(rom).unwrap();
        {
            let edited = overworld.areas_mut().get_mut(10).unwrap();
            edited.size = area::AreaSize::Wide;
            edited.main_palette = Some(0x05);
            edited.animated_gfx = Some(0x12);
            edited.bg_color = Some(0x6318);
            edited.subscreen_overlay = Some(0x0042);
            edited.custom_tileset = Some([9, 8, 7, 6, 5, 4, 3, 2]);
            edited.mosaic = area::Mosaic { up: true, down: false, left: true, right: false };
            edited.sprite_graphics = [0x01, 0x02, 0x03];
            edited.sprite_palette = [0x04, 0x05, 0x06];
            edited.music = [1, 2, 3, 4];
        }
        let project = Project::default();
        let mut manifest = HackManifest::default();

        save(&mut overworld, &project, &mut manifest).unwrap();

        let reloaded = Overworld::load(overworld.rom().clone()).unwrap();
        let area = reloaded.area(10).unwrap();
        assert_eq!(area.size, area::AreaSize::Wide);
        assert_eq!(area.main_palette, Some(0x05));
        assert_eq!(area.animated_gfx, Some(0x12));
        assert_eq!(area.bg_color, Some(0x6318));
        assert_eq!(area.subscreen_overlay, Some(0x0042));
        assert_eq!(area.custom_tileset, Some([9, 8, 7, 6, 5, 4, 3, 2]));
        assert_eq!(area.mosaic, area::Mosaic { up: true, down: false, left: true, right: false });
        assert_eq!(area.sprite_graphics, [0x01, 0x02, 0x03]);
        assert_eq!(area.sprite_palette, [0x04, 0x05, 0x06]);
        assert_eq!(area.music, [1, 2, 3, 4]);
    }

    #[test]
    fn block_policy_aborts_before_any_write_when_maps_conflict() {
        let mut overworld = Overworld::load(test_rom()).unwrap();
        let before = overworld.area(0).unwrap().clone();
        let mut project = Project::default();
        project.write_policy = WritePolicy::Block;
        let mut manifest = HackManifest::default();
        manifest.register(Module {
            name: "conflicting_patch".into(),
            start: Rom::pc_to_lorom(area::AREA_GRAPHICS_ADDR),
            end: Rom::pc_to_lorom(area::AREA_GRAPHICS_ADDR),
        });

        let err = save(&mut overworld, &project, &mut manifest);
        assert!(matches!(err, Err(Error::Conflict(_))));
        assert_eq!(overworld.area(0).unwrap().area_graphics, before.area_graphics);
    }

    #[test]
    fn disabling_a_phase_leaves_its_rom_region_untouched() {
        let mut overworld = Overworld::load(test_rom()).unwrap();
        overworld.insert_entrance(0, 0, 0, 5, false).unwrap();
        let mut project = Project::default();
        project.feature_flags.save_overworld_entrances = false;
        let mut manifest = HackManifest::default();

        save(&mut overworld, &project, &mut manifest).unwrap();

        assert_eq!(overworld.rom().read_u8(ENTRANCE_TABLE_VANILLA_ADDR).unwrap(), 0);
    }
}
