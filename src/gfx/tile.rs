//! C4 — tile decoder: tile8 bitplane expansion, tile16 sub-tile composition,
//! and the per-area blockset atlas.
//!
//! Tile8 decoding generalizes the teacher's `import.rs::load_graphics`
//! (which expands a 3bpp planar sheet for its placeholder graphics import)
//! to the 4bpp planar layout spec.md specifies, following the same
//! bit-plane-interleaving shape the wider retrieval pack uses for SNES/GB
//! tile formats (e.g. `Tile::from_xbpp` in the SMW-editor reference).

use crate::error::{Error, Result};
use crate::palette::ColorRgb;

pub type ColorIdx = u8; // 0-15, index into a 16-color palette row
pub type Tile8 = [[ColorIdx; 8]; 8];

pub const TILES_PER_SHEET: usize = 64;
pub const SHEET_BYTES: usize = TILES_PER_SHEET * 32; // 4bpp: 32 bytes/tile8
pub const SHEET_COUNT: usize = 0xDF;

/// Expands one sheet's worth of raw 4bpp planar graphics data into 64
/// indexed tile8 bitmaps.
pub fn decode_sheet(data: &[u8]) -> Result<Vec<Tile8>> {
    if data.len() != SHEET_BYTES {
        return Err(Error::Decode(format!(
            "unexpected graphics sheet length: {} (expected {SHEET_BYTES})",
            data.len()
        )));
    }
    let mut tiles = Vec::with_capacity(TILES_PER_SHEET);
    for t in 0..TILES_PER_SHEET {
        let base = t * 32;
        let mut tile: Tile8 = [[0; 8]; 8];
        for y in 0..8 {
            let p0 = data[base + y * 2];
            let p1 = data[base + y * 2 + 1];
            let p2 = data[base + 16 + y * 2];
            let p3 = data[base + 16 + y * 2 + 1];
            for x in 0..8 {
                let bit = 7 - x;
                let c0 = (p0 >> bit) & 1;
                let c1 = (p1 >> bit) & 1;
                let c2 = (p2 >> bit) & 1;
                let c3 = (p3 >> bit) & 1;
                tile[y][x] = c0 | (c1 << 1) | (c2 << 2) | (c3 << 3);
            }
        }
        tiles.push(tile);
    }
    Ok(tiles)
}

/// A single sub-tile reference within a tile16, as stored in ROM: a 16-bit
/// word with bitfields `{tile8_id: 10, palette: 3, priority: 1, h_flip: 1,
/// v_flip: 1}`. This is the canonical in-memory form (spec.md §9 open
/// question); ROM-boundary code does all packing here.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubTile {
    pub tile8_id: u16, // 0..=1023
    pub palette: u8,   // 0..=7, a 4-bit-wide offset once combined with priority's sibling bit is not used; kept 3 bits per spec
    pub priority: bool,
    pub h_flip: bool,
    pub v_flip: bool,
}

impl SubTile {
    pub fn from_word(word: u16) -> Self {
        SubTile {
            tile8_id: word & 0x3FF,
            palette: ((word >> 10) & 0x7) as u8,
            priority: (word >> 13) & 1 != 0,
            h_flip: (word >> 14) & 1 != 0,
            v_flip: (word >> 15) & 1 != 0,
        }
    }

    pub fn to_word(self) -> u16 {
        (self.tile8_id & 0x3FF)
            | ((self.palette as u16 & 0x7) << 10)
            | ((self.priority as u16) << 13)
            | ((self.h_flip as u16) << 14)
            | ((self.v_flip as u16) << 15)
    }
}

/// A 16x16 cell made of four sub-tiles in top-left, top-right, bottom-left,
/// bottom-right order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Tile16 {
    pub sub_tiles: [SubTile; 4],
}

impl Tile16 {
    pub fn from_bytes(bytes: &[u8; 8]) -> Self {
        let word = |i: usize| u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]]);
        Tile16 {
            sub_tiles: [
                SubTile::from_word(word(0)),
                SubTile::from_word(word(1)),
                SubTile::from_word(word(2)),
                SubTile::from_word(word(3)),
            ],
        }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        for (i, sub) in self.sub_tiles.iter().enumerate() {
            let w = sub.to_word().to_le_bytes();
            out[i * 2] = w[0];
            out[i * 2 + 1] = w[1];
        }
        out
    }
}

fn apply_flip(tile: Tile8, h_flip: bool, v_flip: bool) -> Tile8 {
    let mut out = tile;
    if h_flip {
        for row in out.iter_mut() {
            row.reverse();
        }
    }
    if v_flip {
        out.reverse();
    }
    out
}

/// Resolves a sub-tile to 8x8 palette indices in `[0, 255]` (tile8 color
/// index `0..15` plus the sub-tile's 4-bit palette-row offset). A tile8 id
/// beyond the area's sheet set degrades to a solid index-0 tile rather than
/// erroring (spec.md's "hot per-pixel paths do not error").
pub fn render_sub_tile(sub: &SubTile, sheets: &[Tile8]) -> [[u8; 8]; 8] {
    let tile = sheets.get(sub.tile8_id as usize).copied().unwrap_or([[0; 8]; 8]);
    let flipped = apply_flip(tile, sub.h_flip, sub.v_flip);
    let offset = (sub.palette as u8) << 4;
    let mut out = [[0u8; 8]; 8];
    for y in 0..8 {
        for x in 0..8 {
            out[y][x] = if flipped[y][x] == 0 { 0 } else { flipped[y][x] | offset };
        }
    }
    out
}

/// Renders a full tile16 cell (16x16 palette indices), placing its four
/// sub-tiles in TL/TR/BL/BR order.
pub fn render_tile16(tile16: &Tile16, sheets: &[Tile8]) -> [[u8; 16]; 16] {
    let mut out = [[0u8; 16]; 16];
    let quadrants = [(0, 0), (8, 0), (0, 8), (8, 8)];
    for (sub, (ox, oy)) in tile16.sub_tiles.iter().zip(quadrants) {
        let rendered = render_sub_tile(sub, sheets);
        for y in 0..8 {
            for x in 0..8 {
                out[oy + y][ox + x] = rendered[y][x];
            }
        }
    }
    out
}

/// A rendered blockset: every tile16 for an area's graphics set, laid out
/// 8-across (128px wide) with each tile16 in its own 16x16 cell, as 8bpp
/// palette indices ready to be looked up against a composed area palette.
pub struct BlocksetAtlas {
    pub width: usize,
    pub height: usize,
    pub indices: Vec<u8>,
}

const ATLAS_COLS: usize = 8; // 128px / 16px

impl BlocksetAtlas {
    pub fn build(tile16_defs: &[Tile16], sheets: &[Tile8]) -> Self {
        let rows = tile16_defs.len().div_ceil(ATLAS_COLS).max(1);
        let width = ATLAS_COLS * 16;
        let height = rows * 16;
        let mut indices = vec![0u8; width * height];
        let mut atlas = BlocksetAtlas { width, height, indices: std::mem::take(&mut indices) };
        for (id, tile16) in tile16_defs.iter().enumerate() {
            atlas.write_cell(id, tile16, sheets);
        }
        atlas
    }

    fn cell_origin(&self, tile16_id: usize) -> (usize, usize) {
        let col = tile16_id % ATLAS_COLS;
        let row = tile16_id / ATLAS_COLS;
        (col * 16, row * 16)
    }

    /// Re-renders a single tile16's cell in place, for live editing without
    /// a full atlas rebuild (spec.md's "pending tile changes").
    pub fn write_cell(&mut self, tile16_id: usize, tile16: &Tile16, sheets: &[Tile8]) {
        if tile16_id * 16 / self.width >= self.height / 16 {
            return; // out of the currently-sized atlas; caller should rebuild
        }
        let (ox, oy) = self.cell_origin(tile16_id);
        let rendered = render_tile16(tile16, sheets);
        for y in 0..16 {
            for x in 0..16 {
                self.indices[(oy + y) * self.width + (ox + x)] = rendered[y][x];
            }
        }
    }

    pub fn color_at(&self, x: usize, y: usize, palette: &[ColorRgb; 256]) -> ColorRgb {
        palette[self.indices[y * self.width + x] as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtile_word_roundtrip() {
        let sub = SubTile { tile8_id: 0x123, palette: 5, priority: true, h_flip: true, v_flip: false };
        let word = sub.to_word();
        assert_eq!(SubTile::from_word(word), sub);
    }

    #[test]
    fn tile16_bytes_roundtrip() {
        let tile16 = Tile16 {
            sub_tiles: [
                SubTile { tile8_id: 1, palette: 0, priority: false, h_flip: false, v_flip: false },
                SubTile { tile8_id: 2, palette: 1, priority: true, h_flip: true, v_flip: false },
                SubTile { tile8_id: 3, palette: 2, priority: false, h_flip: false, v_flip: true },
                SubTile { tile8_id: 4, palette: 3, priority: true, h_flip: true, v_flip: true },
            ],
        };
        let bytes = tile16.to_bytes();
        assert_eq!(Tile16::from_bytes(&bytes), tile16);
    }

    #[test]
    fn both_flips_rotate_180() {
        let mut tile: Tile8 = [[0; 8]; 8];
        tile[0][0] = 9;
        let flipped = apply_flip(tile, true, true);
        assert_eq!(flipped[7][7], 9);
    }

    #[test]
    fn out_of_range_tile8_id_is_solid_zero() {
        let sub = SubTile { tile8_id: 9999, palette: 0, priority: false, h_flip: false, v_flip: false };
        let rendered = render_sub_tile(&sub, &[]);
        assert_eq!(rendered, [[0u8; 8]; 8]);
    }

    #[test]
    fn atlas_write_cell_updates_only_its_region() {
        let sheets = vec![[[1u8; 8]; 8]; 1];
        let defs = vec![Tile16::default(); 2];
        let mut atlas = BlocksetAtlas::build(&defs, &sheets);
        let tile16 = Tile16 {
            sub_tiles: [SubTile { tile8_id: 0, palette: 0, priority: false, h_flip: false, v_flip: false }; 4],
        };
        atlas.write_cell(1, &tile16, &sheets);
        assert_eq!(atlas.indices[0], 0); // cell 0 untouched
        assert_eq!(atlas.indices[16], 1); // cell 1 now rendered
    }
}
