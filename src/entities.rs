//! Entity collections: entrances (and holes, which share storage), exits,
//! items, and sprites (one array per game-state). Grounded directly on
//! `entity_operations.h`'s free-function insertion helpers (`InsertEntrance`,
//! `InsertExit`, `InsertItem`, `InsertSprite`, `GetParentMapId`,
//! `SnapToEntityGrid`, `ClampToOverworldBounds`), reshaped from that header's
//! `Overworld*`-taking free functions into slot-reuse collections owned by
//! each entity kind.
//!
//! Per spec.md's §9 open-question resolution, an entity stores only its
//! map-local tile coordinates; world-pixel coordinates are derived on demand
//! rather than cached, so there is exactly one source of truth for position.

use crate::error::{Error, Result};

pub const ENTITY_GRID: i32 = 16;
pub const OVERWORLD_MAX_COORD: i32 = 4080; // 4096 - 16, per ClampToOverworldBounds

/// Snaps a raw mouse/canvas position to the 16x16 entity grid.
pub fn snap_to_entity_grid(x: i32, y: i32) -> (i32, i32) {
    ((x / ENTITY_GRID) * ENTITY_GRID, (y / ENTITY_GRID) * ENTITY_GRID)
}

/// Clamps a position to the valid overworld pixel range `[0, 4080]`.
pub fn clamp_to_overworld_bounds(x: i32, y: i32) -> (i32, i32) {
    (x.clamp(0, OVERWORLD_MAX_COORD), y.clamp(0, OVERWORLD_MAX_COORD))
}

/// Resolves the effective parent map id for a multi-area map: `0xFF` means
/// "this map is its own parent".
pub fn parent_map_id(area_parent: u8, current_map: u8) -> u8 {
    if area_parent == 0xFF {
        current_map
    } else {
        area_parent
    }
}

/// Converts a world-pixel position into map-local tile coordinates (0..32)
/// within the 32x32-tile16 area that contains it.
pub fn world_pixel_to_local_tile(x: i32, y: i32) -> (u8, u8) {
    (((x / 16) % 32) as u8, ((y / 16) % 32) as u8)
}

/// Converts map-local tile coordinates back to a world-pixel position for a
/// given area id (area = world_index * 0x40 + local, 8x8 areas per world).
pub fn local_tile_to_world_pixel(area_id: u8, local_x: u8, local_y: u8) -> (i32, i32) {
    let local_area = (area_id & 0x3F) as i32;
    let area_col = local_area % 8;
    let area_row = local_area / 8;
    (
        area_col * 512 + local_x as i32 * 16,
        area_row * 512 + local_y as i32 * 16,
    )
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EntityHandle {
    pub slot: usize,
}

/// A fixed-capacity collection with deleted-slot reuse (spec.md §3.2/§3.3:
/// "Entity slot reuse"). Shared by every entity kind below.
struct SlotArray<T> {
    slots: Vec<Option<T>>,
}

impl<T> SlotArray<T> {
    fn new() -> Self {
        SlotArray { slots: Vec::new() }
    }

    fn with_capacity(cap: usize) -> Self {
        let mut slots = Vec::with_capacity(cap);
        slots.resize_with(cap, || None);
        SlotArray { slots }
    }

    /// Finds the first deleted (`None`) slot and repurposes it; appends a
    /// new slot only if the array was constructed with spare unused entries.
    /// Returns `SlotsExhausted` if every slot holds a live entity and the
    /// array is at capacity.
    fn insert(&mut self, value: T) -> Result<EntityHandle> {
        if let Some(slot) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[slot] = Some(value);
            return Ok(EntityHandle { slot });
        }
        Err(Error::SlotsExhausted)
    }

    fn delete(&mut self, handle: EntityHandle) -> Result<()> {
        let slot = self
            .slots
            .get_mut(handle.slot)
            .ok_or(Error::InvalidArgument(format!("entity slot {} out of range", handle.slot)))?;
        if slot.is_none() {
            return Err(Error::InvalidArgument(format!("entity slot {} already deleted", handle.slot)));
        }
        *slot = None;
        Ok(())
    }

    fn get(&self, handle: EntityHandle) -> Option<&T> {
        self.slots.get(handle.slot).and_then(|s| s.as_ref())
    }

    fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut T> {
        self.slots.get_mut(handle.slot).and_then(|s| s.as_mut())
    }

    fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn iter_live(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Entrance {
    pub map_id: u8,
    pub x: i32,
    pub y: i32,
    pub entrance_id: u16,
    pub is_hole: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Exit {
    pub map_id: u8,
    pub x: i32,
    pub y: i32,
    pub room_id: u16,
    pub scroll: (i16, i16),
    pub camera: (i16, i16),
    pub player: (i16, i16),
    pub door_type_1: u8,
    pub door_type_2: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub map_id: u8,
    pub item_id: u8,
    pub x: i32,
    pub y: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Sprite {
    pub game_state: u8, // 0, 1, or 2
    pub map_id: u8,
    pub sprite_id: u8,
    pub x: i32,
    pub y: i32,
}

/// Owns every entity collection for one overworld: entrances (holes share
/// the same store per spec.md §6.1), exits, items, and one sprite array per
/// game-state.
pub struct EntityStore {
    entrances: SlotArray<Entrance>,
    exits: SlotArray<Exit>,
    items: SlotArray<Item>,
    sprites: [SlotArray<Sprite>; 3],
}

impl EntityStore {
    pub fn with_capacities(entrance_cap: usize, exit_cap: usize, item_cap: usize, sprite_cap: usize) -> Self {
        EntityStore {
            entrances: SlotArray::with_capacity(entrance_cap),
            exits: SlotArray::with_capacity(exit_cap),
            items: SlotArray::with_capacity(item_cap),
            sprites: [
                SlotArray::with_capacity(sprite_cap),
                SlotArray::with_capacity(sprite_cap),
                SlotArray::with_capacity(sprite_cap),
            ],
        }
    }

    /// Inserts an entrance (or hole) at `mouse_pos`, snapped to the entity
    /// grid and resolved against the current map's parent, following
    /// `InsertEntrance`.
    pub fn insert_entrance(
        &mut self,
        mouse_x: i32,
        mouse_y: i32,
        current_map: u8,
        area_parent: u8,
        entrance_id: u16,
        is_hole: bool,
    ) -> Result<EntityHandle> {
        let (x, y) = snap_to_entity_grid(mouse_x, mouse_y);
        let (x, y) = clamp_to_overworld_bounds(x, y);
        let map_id = parent_map_id(area_parent, current_map);
        self.entrances.insert(Entrance { map_id, x, y, entrance_id, is_hole })
    }

    pub fn insert_exit(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8, area_parent: u8) -> Result<EntityHandle> {
        let (x, y) = snap_to_entity_grid(mouse_x, mouse_y);
        let (x, y) = clamp_to_overworld_bounds(x, y);
        let map_id = parent_map_id(area_parent, current_map);
        self.exits.insert(Exit {
            map_id,
            x,
            y,
            room_id: 0,
            scroll: (0, 0),
            camera: (0, 0),
            player: (0, 0),
            door_type_1: 0,
            door_type_2: 0,
        })
    }

    pub fn insert_item(&mut self, mouse_x: i32, mouse_y: i32, current_map: u8, area_parent: u8, item_id: u8) -> Result<EntityHandle> {
        let (x, y) = snap_to_entity_grid(mouse_x, mouse_y);
        let (x, y) = clamp_to_overworld_bounds(x, y);
        let map_id = parent_map_id(area_parent, current_map);
        self.items.insert(Item { map_id, item_id, x, y })
    }

    pub fn insert_sprite(
        &mut self,
        mouse_x: i32,
        mouse_y: i32,
        current_map: u8,
        area_parent: u8,
        game_state: u8,
        sprite_id: u8,
    ) -> Result<EntityHandle> {
        let (x, y) = snap_to_entity_grid(mouse_x, mouse_y);
        let (x, y) = clamp_to_overworld_bounds(x, y);
        let map_id = parent_map_id(area_parent, current_map);
        let array = self
            .sprites
            .get_mut(game_state as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("game state {game_state} out of range")))?;
        array.insert(Sprite { game_state, map_id, sprite_id, x, y })
    }

    pub fn delete_entrance(&mut self, handle: EntityHandle) -> Result<()> {
        self.entrances.delete(handle)
    }
    pub fn delete_exit(&mut self, handle: EntityHandle) -> Result<()> {
        self.exits.delete(handle)
    }
    pub fn delete_item(&mut self, handle: EntityHandle) -> Result<()> {
        self.items.delete(handle)
    }
    pub fn delete_sprite(&mut self, game_state: u8, handle: EntityHandle) -> Result<()> {
        self.sprites
            .get_mut(game_state as usize)
            .ok_or_else(|| Error::InvalidArgument(format!("game state {game_state} out of range")))?
            .delete(handle)
    }

    pub fn entrance(&self, handle: EntityHandle) -> Option<&Entrance> {
        self.entrances.get(handle)
    }
    pub fn exit(&self, handle: EntityHandle) -> Option<&Exit> {
        self.exits.get(handle)
    }
    pub fn item(&self, handle: EntityHandle) -> Option<&Item> {
        self.items.get(handle)
    }
    pub fn sprite(&self, game_state: u8, handle: EntityHandle) -> Option<&Sprite> {
        self.sprites.get(game_state as usize).and_then(|a| a.get(handle))
    }
    pub fn sprite_mut(&mut self, game_state: u8, handle: EntityHandle) -> Option<&mut Sprite> {
        self.sprites.get_mut(game_state as usize).and_then(|a| a.get_mut(handle))
    }

    pub fn live_entrance_count(&self) -> usize {
        self.entrances.live_count()
    }
    pub fn live_exit_count(&self) -> usize {
        self.exits.live_count()
    }
    pub fn live_item_count(&self) -> usize {
        self.items.live_count()
    }
    pub fn live_sprite_count(&self, game_state: u8) -> usize {
        self.sprites.get(game_state as usize).map(|a| a.live_count()).unwrap_or(0)
    }

    // -- capacities, for the save pipeline's fixed-slot ROM tables --

    pub(crate) fn entrance_capacity(&self) -> usize {
        self.entrances.capacity()
    }
    pub(crate) fn exit_capacity(&self) -> usize {
        self.exits.capacity()
    }
    pub(crate) fn item_capacity(&self) -> usize {
        self.items.capacity()
    }
    pub(crate) fn sprite_capacity(&self, game_state: u8) -> usize {
        self.sprites.get(game_state as usize).map(|a| a.capacity()).unwrap_or(0)
    }

    pub fn entrances(&self) -> impl Iterator<Item = &Entrance> {
        self.entrances.iter_live()
    }
    pub fn exits(&self) -> impl Iterator<Item = &Exit> {
        self.exits.iter_live()
    }
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter_live()
    }
    pub fn sprites(&self, game_state: u8) -> impl Iterator<Item = &Sprite> {
        self.sprites[game_state as usize].iter_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_rounds_down_to_grid() {
        assert_eq!(snap_to_entity_grid(120, 72), (112, 64));
    }

    #[test]
    fn clamp_keeps_positions_in_bounds() {
        assert_eq!(clamp_to_overworld_bounds(-5, 9000), (0, 4080));
    }

    #[test]
    fn parent_map_id_resolves_self_parent() {
        assert_eq!(parent_map_id(0xFF, 0x05), 0x05);
        assert_eq!(parent_map_id(0x02, 0x05), 0x02);
    }

    #[test]
    fn insert_snaps_and_resolves_parent() {
        let mut store = EntityStore::with_capacities(4, 4, 4, 4);
        let handle = store.insert_entrance(120, 72, 0x05, 0xFF, 7, false).unwrap();
        let entrance = store.entrance(handle).unwrap();
        assert_eq!((entrance.map_id, entrance.x, entrance.y), (0x05, 112, 64));
    }

    #[test]
    fn insert_into_full_collection_is_slots_exhausted() {
        let mut store = EntityStore::with_capacities(1, 1, 1, 1);
        store.insert_item(0, 0, 0, 0xFF, 1).unwrap();
        assert!(matches!(store.insert_item(0, 0, 0, 0xFF, 1), Err(Error::SlotsExhausted)));
    }

    #[test]
    fn delete_then_reinsert_reuses_the_slot() {
        let mut store = EntityStore::with_capacities(1, 1, 1, 1);
        let handle = store.insert_item(0, 0, 0, 0xFF, 1).unwrap();
        store.delete_item(handle).unwrap();
        assert_eq!(store.live_item_count(), 0);
        let reused = store.insert_item(16, 16, 0, 0xFF, 2).unwrap();
        assert_eq!(reused.slot, handle.slot);
        assert_eq!(store.live_item_count(), 1);
    }

    #[test]
    fn local_tile_and_world_pixel_roundtrip_within_one_area() {
        let (lx, ly) = world_pixel_to_local_tile(100, 50);
        let (wx, wy) = local_tile_to_world_pixel(0, lx, ly);
        assert_eq!((wx, wy), (96, 48));
    }
}
