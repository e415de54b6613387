pub mod codec;
pub mod tile;

pub use tile::{BlocksetAtlas, ColorIdx, SubTile, Tile16, Tile8};
