//! C5 — map tiles: the three 256x256 tile16 layers (light/dark/special
//! worlds) and tile16<->tile32 compaction for on-disk storage.

use hashbrown::HashMap;

use crate::error::{Error, Result};

pub type TileCoord = u16;
pub type Tile16Id = u16;

pub const AREA_TILE16_DIM: usize = 32; // one area = 32x32 tile16s
pub const WORLD_TILE16_DIM: usize = 256; // one world = 256x256 tile16s = 8x8 areas
pub const WORLD_TILE32_DIM: usize = WORLD_TILE16_DIM / 2;

/// A deduplicated tile32 entry: the four tile16 ids it's built from, in
/// TL/TR/BL/BR order (matching tile16's own sub-tile order).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile32 {
    pub tile16_ids: [Tile16Id; 4],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum World {
    Light = 0,
    Dark = 1,
    Special = 2,
}

impl World {
    pub const ALL: [World; 3] = [World::Light, World::Dark, World::Special];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone)]
struct WorldGrid {
    ids: Vec<Tile16Id>,
}

impl WorldGrid {
    fn new() -> Self {
        WorldGrid { ids: vec![0; WORLD_TILE16_DIM * WORLD_TILE16_DIM] }
    }

    #[inline]
    fn index(x: TileCoord, y: TileCoord) -> usize {
        y as usize * WORLD_TILE16_DIM + x as usize
    }

    fn get(&self, x: TileCoord, y: TileCoord) -> Tile16Id {
        self.ids[Self::index(x, y)]
    }

    fn set(&mut self, x: TileCoord, y: TileCoord, id: Tile16Id) {
        let idx = Self::index(x, y);
        self.ids[idx] = id;
    }
}

/// Owns the three world-sized tilemap layers; source of truth for painting.
pub struct MapTiles {
    worlds: [WorldGrid; 3],
}

impl Default for MapTiles {
    fn default() -> Self {
        MapTiles { worlds: [WorldGrid::new(), WorldGrid::new(), WorldGrid::new()] }
    }
}

impl MapTiles {
    pub fn new() -> Self {
        Self::default()
    }

    fn in_bounds(x: TileCoord, y: TileCoord) -> bool {
        (x as usize) < WORLD_TILE16_DIM && (y as usize) < WORLD_TILE16_DIM
    }

    pub fn get_tile(&self, world: World, x: TileCoord, y: TileCoord) -> Tile16Id {
        if !Self::in_bounds(x, y) {
            return 0;
        }
        self.worlds[world.index()].get(x, y)
    }

    /// No error; out-of-range coordinates are silently clamped away (a
    /// no-op), per spec.md's exported-operation contract for `SetTile`.
    pub fn set_tile(&mut self, world: World, x: TileCoord, y: TileCoord, id: Tile16Id) {
        if !Self::in_bounds(x, y) {
            return;
        }
        self.worlds[world.index()].set(x, y, id);
    }

    /// Deduplicates every 2x2 tile16 block across all three worlds into a
    /// tile32 table ordered by first use, plus per-world 128x128 index
    /// grids into that table. Fails with `Encoding` if the table would
    /// exceed `max_entries` (the ROM-defined tile32 table capacity).
    pub fn compact_tile32(&self, max_entries: usize) -> Result<(Vec<Tile32>, [Vec<u16>; 3])> {
        let mut table: Vec<Tile32> = Vec::new();
        let mut index_of: HashMap<Tile32, u16> = HashMap::new();
        let mut per_world_indices: [Vec<u16>; 3] = [
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
            vec![0; WORLD_TILE32_DIM * WORLD_TILE32_DIM],
        ];

        for world in World::ALL {
            let grid = &self.worlds[world.index()];
            for ty in 0..WORLD_TILE32_DIM {
                for tx in 0..WORLD_TILE32_DIM {
                    let x0 = (tx * 2) as TileCoord;
                    let y0 = (ty * 2) as TileCoord;
                    let quad = Tile32 {
                        tile16_ids: [
                            grid.get(x0, y0),
                            grid.get(x0 + 1, y0),
                            grid.get(x0, y0 + 1),
                            grid.get(x0 + 1, y0 + 1),
                        ],
                    };
                    let id = *index_of.entry(quad).or_insert_with(|| {
                        table.push(quad);
                        (table.len() - 1) as u16
                    });
                    if table.len() > max_entries {
                        return Err(Error::Encoding(format!(
                            "tile32 table overflow: {} entries exceeds capacity {max_entries}",
                            table.len()
                        )));
                    }
                    per_world_indices[world.index()][ty * WORLD_TILE32_DIM + tx] = id;
                }
            }
        }
        Ok((table, per_world_indices))
    }

    /// Inverse of `compact_tile32`: rebuilds the three tile16 grids from a
    /// tile32 table and per-world 128x128 index grids.
    pub fn expand_from_tile32(table: &[Tile32], per_world_indices: &[Vec<u16>; 3]) -> Result<Self> {
        let mut out = MapTiles::new();
        for world in World::ALL {
            let indices = &per_world_indices[world.index()];
            if indices.len() != WORLD_TILE32_DIM * WORLD_TILE32_DIM {
                return Err(Error::Decode("tile32 index grid has wrong dimensions".into()));
            }
            for ty in 0..WORLD_TILE32_DIM {
                for tx in 0..WORLD_TILE32_DIM {
                    let tile32_id = indices[ty * WORLD_TILE32_DIM + tx] as usize;
                    let quad = table
                        .get(tile32_id)
                        .ok_or_else(|| Error::Decode(format!("tile32 id {tile32_id} out of range")))?;
                    let x0 = (tx * 2) as TileCoord;
                    let y0 = (ty * 2) as TileCoord;
                    out.worlds[world.index()].set(x0, y0, quad.tile16_ids[0]);
                    out.worlds[world.index()].set(x0 + 1, y0, quad.tile16_ids[1]);
                    out.worlds[world.index()].set(x0, y0 + 1, quad.tile16_ids[2]);
                    out.worlds[world.index()].set(x0 + 1, y0 + 1, quad.tile16_ids[3]);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_roundtrips_and_leaves_neighbors_alone() {
        let mut tiles = MapTiles::new();
        tiles.set_tile(World::Light, 5, 5, 0x42);
        assert_eq!(tiles.get_tile(World::Light, 5, 5), 0x42);
        assert_eq!(tiles.get_tile(World::Light, 5, 6), 0);
        assert_eq!(tiles.get_tile(World::Light, 4, 5), 0);
    }

    #[test]
    fn out_of_range_set_is_a_no_op() {
        let mut tiles = MapTiles::new();
        tiles.set_tile(World::Light, 9999, 9999, 0x11);
        assert_eq!(tiles.get_tile(World::Light, 0, 0), 0);
    }

    #[test]
    fn tile32_roundtrip_and_no_duplicates() {
        let mut tiles = MapTiles::new();
        tiles.set_tile(World::Light, 0, 0, 1);
        tiles.set_tile(World::Light, 1, 0, 2);
        tiles.set_tile(World::Light, 0, 1, 3);
        tiles.set_tile(World::Light, 1, 1, 4);
        tiles.set_tile(World::Light, 64, 64, 1);
        tiles.set_tile(World::Light, 65, 64, 2);
        tiles.set_tile(World::Light, 64, 65, 3);
        tiles.set_tile(World::Light, 65, 65, 4);

        let (table, indices) = tiles.compact_tile32(9000).unwrap();
        let mut seen = std::collections::HashSet::new();
        for q in &table {
            assert!(seen.insert(*q), "duplicate tile32 entry in table");
        }
        assert_eq!(
            indices[World::Light.index()][0],
            indices[World::Light.index()][32 * WORLD_TILE32_DIM + 32]
        );

        let rebuilt = MapTiles::expand_from_tile32(&table, &indices).unwrap();
        assert_eq!(rebuilt.get_tile(World::Light, 0, 0), 1);
        assert_eq!(rebuilt.get_tile(World::Light, 65, 65), 4);
    }

    #[test]
    fn tile32_overflow_is_an_encoding_error() {
        let mut tiles = MapTiles::new();
        let mut id = 1u16;
        for ty in 0..4 {
            for tx in 0..4 {
                tiles.set_tile(World::Light, (tx * 2) as u16, (ty * 2) as u16, id);
                id = id.wrapping_add(1);
            }
        }
        assert!(tiles.compact_tile32(2).is_err());
    }
}
